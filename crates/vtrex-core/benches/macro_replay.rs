//! Benchmarks for macro compilation and replay.
//!
//! Run with: cargo bench -p vtrex-core

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::sink;
use vtrex_core::catalog::{MacroCatalog, MacroRole, Preferences};
use vtrex_core::grammar::Grammar;
use vtrex_core::macros::{Macro, MacroCompiler, encode_hex};
use vtrex_core::sim::{SimulatedTerminal, TerminalProfile};

// =============================================================================
// Test Data
// =============================================================================

/// A frame-sized run of cursor moves and glyphs.
fn frame_payload(len: usize) -> Vec<u8> {
    b"\x1b[14;8H:<\x08\x08\x0b/`"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("macro/replay");

    for len in [16, 64, 256] {
        let payload = frame_payload(len);
        let literal = Macro::Literal(payload.clone());
        let resident = MacroCompiler::new(true).compile(&mut sink(), &payload).unwrap();
        let mut out = Vec::with_capacity(len);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("literal", len), &literal, |b, m| {
            b.iter(|| {
                out.clear();
                m.replay(&mut out);
                black_box(out.len())
            })
        });
        group.bench_with_input(BenchmarkId::new("resident", len), &resident, |b, m| {
            b.iter(|| {
                out.clear();
                m.replay(&mut out);
                black_box(out.len())
            })
        });
    }

    group.finish();
}

fn bench_encode_hex(c: &mut Criterion) {
    let mut group = c.benchmark_group("macro/encode_hex");

    for len in [16, 256, 4096] {
        let payload = frame_payload(len);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &payload, |b, payload| {
            b.iter(|| black_box(encode_hex(payload)))
        });
    }

    group.finish();
}

fn bench_grammar(c: &mut Criterion) {
    let mut group = c.benchmark_group("grammar/parse");

    let da1 = b"\x1b[?64;1;2;7;8;9;15;18;21;22;28;29c";
    group.bench_function("da1", |b| {
        b.iter(|| black_box(Grammar::DeviceAttributes.parse(black_box(da1))))
    });
    let decxcpr = b"\x1b[?24;80;3R";
    group.bench_function("decxcpr", |b| {
        b.iter(|| black_box(Grammar::ExtendedCursorPosition.parse(black_box(decxcpr))))
    });

    group.finish();
}

fn bench_catalog(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");

    group.bench_function("probe_and_build/vt420", |b| {
        b.iter(|| {
            let sim = SimulatedTerminal::new(TerminalProfile::vt420());
            let mut session = sim.probe().unwrap();
            let catalog = MacroCatalog::build(&mut session, Preferences::default()).unwrap();
            black_box(catalog.resident_count())
        })
    });

    let sim = SimulatedTerminal::new(TerminalProfile::vt420());
    let mut session = sim.probe().unwrap();
    let mut catalog = MacroCatalog::build(&mut session, Preferences::default()).unwrap();
    group.bench_function("replay_frame/vt420", |b| {
        b.iter(|| {
            catalog.replay(MacroRole::ScrollStart);
            catalog.replay(MacroRole::CactusPart(5));
            catalog.replay(MacroRole::ScrollEnd);
            catalog.replay(MacroRole::TrexRunning(0));
            catalog.replay(MacroRole::FrameComplete);
            sim.clear_logs();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_replay,
    bench_encode_hex,
    bench_grammar,
    bench_catalog,
);

criterion_main!(benches);

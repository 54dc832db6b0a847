//! Property-based invariant tests for the wire protocol.
//!
//! 1. Hex encoding round-trips exactly and doubles the length.
//! 2. Hex output uses only uppercase digits.
//! 3. Cursor reports parse back to the numbers formatted into them.
//! 4. Any trailing byte after a report fails the match.
//! 5. Mode status maps to set/reset/unknown, and only for the asked mode.
//! 6. DA1 feature lists parse the same with `;` or `,` separators.
//! 7. Payload length alone decides literal vs resident.
//! 8. XON/XOFF anywhere in a reply never changes what is captured.

use proptest::prelude::*;
use vtrex_core::grammar::{CursorPosition, DeviceAttributes, Grammar, Reply};
use vtrex_core::macros::{LITERAL_THRESHOLD, Macro, MacroCompiler, decode_hex, encode_hex};
use vtrex_core::reader::{ResponseReader, XOFF, XON};

// ── Helpers ─────────────────────────────────────────────────────────────

/// Insert flow-control bytes before the positions in `at`.
fn with_noise(reply: &[u8], at: &[(usize, bool)]) -> Vec<u8> {
    let mut noisy = Vec::with_capacity(reply.len() + at.len());
    for (i, &b) in reply.iter().enumerate() {
        for &(pos, xon) in at {
            if pos % (reply.len() + 1) == i {
                noisy.push(if xon { XON } else { XOFF });
            }
        }
        noisy.push(b);
    }
    noisy
}

proptest! {
    #[test]
    fn hex_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
        let hex = encode_hex(&payload);
        prop_assert_eq!(hex.len(), payload.len() * 2);
        prop_assert_eq!(decode_hex(hex.as_bytes()), Some(payload));
    }

    #[test]
    fn hex_is_uppercase(payload in proptest::collection::vec(any::<u8>(), 1..64)) {
        let hex = encode_hex(&payload);
        prop_assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)));
    }

    #[test]
    fn cursor_report_round_trip(row in any::<u32>(), column in any::<u32>()) {
        let text = format!("\x1b[{row};{column}R");
        prop_assert_eq!(
            Grammar::CursorPosition.parse(text.as_bytes()),
            Some(Reply::CursorPosition(CursorPosition { row, column, page: None }))
        );
    }

    #[test]
    fn extended_report_round_trip(row in 1u32..1000, column in 1u32..1000, page in 1u32..10, marker in any::<bool>()) {
        let marker = if marker { "?" } else { "" };
        let text = format!("\x1b[{marker}{row};{column};{page}R");
        prop_assert_eq!(
            Grammar::ExtendedCursorPosition.parse(text.as_bytes()),
            Some(Reply::CursorPosition(CursorPosition { row, column, page: Some(page) }))
        );
    }

    #[test]
    fn trailing_byte_fails_match(row in 1u32..1000, column in 1u32..1000, extra in any::<u8>()) {
        let mut text = format!("\x1b[{row};{column}R").into_bytes();
        text.push(extra);
        prop_assert_eq!(Grammar::CursorPosition.parse(&text), None);
    }

    #[test]
    fn mode_status_mapping(mode in 0u32..100_000, status in 0u32..10) {
        let text = format!("\x1b[?{mode};{status}$y");
        let Some(Reply::Mode(report)) = Grammar::ModeReport.parse(text.as_bytes()) else {
            return Err(TestCaseError::fail("mode report did not parse"));
        };
        let expected = match status {
            1 => Some(true),
            2 => Some(false),
            _ => None,
        };
        prop_assert_eq!(report.state_of(mode), expected);
        prop_assert_eq!(report.state_of(mode + 1), None);
    }

    #[test]
    fn attribute_separators_are_equivalent(
        level in 1u32..100,
        features in proptest::collection::vec(0u32..50, 0..12),
    ) {
        let join = |sep: &str| {
            let mut text = format!("\x1b[?{level}");
            for code in &features {
                text.push_str(sep);
                text.push_str(&code.to_string());
            }
            text.push('c');
            text
        };
        let expected = Some(Reply::DeviceAttributes(DeviceAttributes {
            level,
            features: features.clone(),
        }));
        prop_assert_eq!(Grammar::DeviceAttributes.parse(join(";").as_bytes()), expected.clone());
        prop_assert_eq!(Grammar::DeviceAttributes.parse(join(",").as_bytes()), expected);
    }

    #[test]
    fn length_decides_residency(payload in proptest::collection::vec(any::<u8>(), 0..16)) {
        let mut compiler = MacroCompiler::new(true);
        let mut out = Vec::new();
        let compiled = compiler.compile(&mut out, &payload).unwrap();
        if payload.len() <= LITERAL_THRESHOLD {
            prop_assert_eq!(compiled, Macro::Literal(payload));
            prop_assert!(out.is_empty());
        } else {
            prop_assert_eq!(compiled, Macro::Resident(0));
            let prefix = b"\x1bP0;0;1!z";
            prop_assert!(out.starts_with(prefix));
            prop_assert!(out.ends_with(b"\x1b\\"));
            let hex = &out[prefix.len()..out.len() - 2];
            prop_assert_eq!(decode_hex(hex), Some(payload));
        }
    }

    #[test]
    fn flow_control_is_invisible(
        row in 1u32..1000,
        column in 1u32..1000,
        noise in proptest::collection::vec((any::<usize>(), any::<bool>()), 0..8),
    ) {
        let reply = format!("\x1b[{row};{column}R").into_bytes();
        let noisy = with_noise(&reply, &noise);
        let capture = ResponseReader::new(noisy.as_slice()).read_until(b'R', true).unwrap();
        prop_assert_eq!(capture.bytes, reply);
        prop_assert_eq!(capture.last_escape, Some(0));
    }
}

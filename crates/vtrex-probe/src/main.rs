#![forbid(unsafe_code)]

//! vtrex-probe binary entry point.

mod cli;
mod raw_mode;
mod report;

use std::env;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use vtrex_core::session::DeviceSession;
use vtrex_core::sim::{SimulatedTerminal, TerminalProfile};

use crate::raw_mode::RawModeGuard;
use crate::report::{ProbeReport, inspect};

/// Log to `VTREX_LOG_FILE` if set. Stdout belongs to the terminal protocol.
fn init_logging() {
    let Some(path) = env::var_os("VTREX_LOG_FILE").map(PathBuf::from) else {
        return;
    };
    let file = match File::create(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("vtrex-probe: cannot open log file {}: {err}", path.display());
            return;
        }
    };
    let filter = EnvFilter::try_from_env("VTREX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn probe_terminal(opts: &cli::Opts) -> io::Result<ProbeReport> {
    let mut raw = RawModeGuard::enter()?;
    let report = {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut session = DeviceSession::probe(stdin.lock(), stdout.lock())?;
        inspect(&mut session, opts, "terminal")?
    };
    raw.leave()?;
    Ok(report)
}

fn probe_simulated(opts: &cli::Opts, name: &str, profile: TerminalProfile) -> io::Result<ProbeReport> {
    let sim = SimulatedTerminal::new(profile);
    let mut session = sim.probe()?;
    let report = inspect(&mut session, opts, &format!("simulated {name}"))?;
    drop(session);
    tracing::debug!(replies = sim.replies_sent(), "simulation finished");
    Ok(report)
}

fn main() -> ExitCode {
    let opts = cli::Opts::parse();
    init_logging();
    tracing::info!(?opts, "starting");

    let result = match (opts.simulate.as_deref(), opts.simulated_profile()) {
        (Some(name), Some(profile)) => probe_simulated(&opts, name, profile),
        _ => probe_terminal(&opts),
    };

    match result {
        Ok(report) => {
            print!("{report}");
            tracing::info!(verdict = ?report.verdict, "probe finished");
            ExitCode::from(report.exit_code())
        }
        Err(err) => {
            tracing::error!(error = %err, "probe failed");
            eprintln!("vtrex-probe: {err}");
            ExitCode::FAILURE
        }
    }
}

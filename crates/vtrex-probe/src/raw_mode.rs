#![forbid(unsafe_code)]

//! Raw-mode guard for probing the controlling terminal.
//!
//! Replies to device queries arrive on stdin without a trailing newline, so
//! the tty must be in raw mode for the duration of the probe. The guard
//! leaves raw mode on drop, on panic (through a chained panic hook) and on
//! SIGINT/SIGTERM (through a signal thread on Unix).
//!
//! # Cleanup
//!
//! The panic and signal paths cannot reach the live session, so they write
//! a fixed best-effort reset instead of the exact saved state:
//!
//! | Sequence | Effect |
//! |----------|--------|
//! | `DCS 0;1;0 ! z ST` | clear all downloaded macros |
//! | `CSI 1 SP P` | back to page 1 |
//! | `CSI ? 64 h` | page cursor-coupling on |

use std::io::{self, Write};
use std::sync::OnceLock;

#[cfg(unix)]
use signal_hook::consts::signal::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;

use vtrex_core::macros::CLEAR_ALL_MACROS;
use vtrex_core::session::{DECPCCM, set_mode_sequence};

const HOME_PAGE: &[u8] = b"\x1b[1 P";

/// Keeps the terminal in raw mode while alive.
#[derive(Debug)]
pub struct RawModeGuard {
    active: bool,
    #[cfg(unix)]
    signal_guard: Option<SignalGuard>,
}

impl RawModeGuard {
    /// Enter raw mode and install the panic and signal cleanup paths.
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode cannot be enabled (stdin is not a tty).
    pub fn enter() -> io::Result<Self> {
        install_panic_hook();

        crossterm::terminal::enable_raw_mode()?;
        tracing::debug!("raw mode enabled");

        #[cfg(unix)]
        let signal_guard = match SignalGuard::new() {
            Ok(guard) => Some(guard),
            Err(err) => {
                tracing::warn!(error = %err, "signal handler unavailable");
                None
            }
        };

        Ok(Self {
            active: true,
            #[cfg(unix)]
            signal_guard,
        })
    }

    /// Leave raw mode now instead of at drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal refuses to leave raw mode.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        #[cfg(unix)]
        drop(self.signal_guard.take());
        crossterm::terminal::disable_raw_mode()?;
        tracing::debug!("raw mode disabled");
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

/// Bytes written by the panic and signal cleanup paths.
fn emergency_reset() -> Vec<u8> {
    let mut bytes = CLEAR_ALL_MACROS.to_vec();
    bytes.extend_from_slice(HOME_PAGE);
    bytes.extend_from_slice(&set_mode_sequence(DECPCCM, true));
    bytes
}

fn install_panic_hook() {
    static HOOK: OnceLock<()> = OnceLock::new();
    HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            best_effort_cleanup();
            previous(info);
        }));
    });
}

fn best_effort_cleanup() {
    let mut stdout = io::stdout();
    let _ = stdout.write_all(&emergency_reset());
    let _ = crossterm::terminal::disable_raw_mode();
    let _ = stdout.flush();
}

#[cfg(unix)]
#[derive(Debug)]
struct SignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalGuard {
    fn new() -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for signal in signals.forever() {
                if matches!(signal, SIGINT | SIGTERM) {
                    tracing::warn!(signal, "termination signal received, cleaning up");
                    best_effort_cleanup();
                    std::process::exit(128 + signal);
                }
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

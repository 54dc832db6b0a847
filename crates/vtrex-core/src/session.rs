#![forbid(unsafe_code)]

//! Capability negotiation session.
//!
//! [`DeviceSession::probe`] runs the startup probe sequence over a byte
//! channel and keeps the channel for later queries, macro definitions and
//! replay. Dropping the session puts back the two modes the probe had to
//! change.
//!
//! # Probe Sequence
//!
//! Order matters: each step may change terminal state that later steps
//! depend on.
//!
//! | Step | Sent | Reply | Outcome |
//! |------|------|-------|---------|
//! | 1 | `ESC 7` | - | cursor saved |
//! | 2 | `ESC SP F` | - | 7-bit C1 replies |
//! | 3 | `CSI 999;999 H`, `CSI 6 n` | CPR | width/height |
//! | 4 | `CSI c` | DA1 | feature flags |
//! | 5 | `CSI ? 112 $ p`, `CSI ? 112 l` | DECRPM | scrollback saved, disabled |
//! | 6 | `CSI ? 64 $ p`, `CSI ? 64 l` | DECRPM | page coupling saved, disabled |
//! | 7 | `CSI 3 SP P`, `CSI ? 6 n` | DECXCPR | `pages` if page field is 3 |
//! | 8 | `ESC 8`, `CSI 1 SP P`, `CSI ? 64 h` | - | back on page 1, coupled |
//!
//! Steps 5 to 7 may go unanswered and use the fallback technique from
//! [`crate::query`]. Step 4 does not: every compliant terminal answers DA1.
//!
//! # Teardown
//!
//! Page coupling (DECPCCM) and scrollback (DECRPL) are restored to the
//! values observed in steps 5 and 6: `h` if they were set, `l` if they were
//! reset, untouched if the terminal did not say. Teardown runs once, either
//! through [`DeviceSession::restore_modes`] or on drop.

use std::io::{self, Read, Write};

use crate::capabilities::{Capabilities, PROBE_EXTREME};
use crate::grammar::{Grammar, Reply};
use crate::query::{CPR_REQUEST, DA1_REQUEST, QueryEngine};

/// DEC private mode: page cursor-coupling (DECPCCM).
pub const DECPCCM: u32 = 64;
/// DEC private mode: replacement of scrolled lines / scrollback (DECRPL).
pub const DECRPL: u32 = 112;

/// Page the paging probe moves to.
const PROBE_PAGE: u32 = 3;

const SAVE_CURSOR: &[u8] = b"\x1b7";
const RESTORE_CURSOR: &[u8] = b"\x1b8";
const SELECT_7BIT_C1: &[u8] = b"\x1b F";
const EXTENDED_CPR_REQUEST: &[u8] = b"\x1b[?6n";
const COLOR_TABLE_REQUEST: &[u8] = b"\x1b[2;2$u";
const HOME_PAGE: &[u8] = b"\x1b[1 P";

/// `CSI Pn SP P`: move to page `Pn`.
fn page_move(page: u32) -> Vec<u8> {
    format!("\x1b[{page} P").into_bytes()
}

/// `CSI ? Pm h` or `CSI ? Pm l`.
#[must_use]
pub fn set_mode_sequence(mode: u32, enabled: bool) -> Vec<u8> {
    let final_byte = if enabled { 'h' } else { 'l' };
    format!("\x1b[?{mode}{final_byte}").into_bytes()
}

/// `CSI ? Pm $ p`: DECRQM for a private mode.
#[must_use]
pub fn mode_query(mode: u32) -> Vec<u8> {
    format!("\x1b[?{mode}$p").into_bytes()
}

/// `DCS $ q Pt ST`: DECRQSS for the setting named by `setting`.
#[must_use]
pub fn setting_query(setting: &str) -> Vec<u8> {
    format!("\x1bP$q{setting}\x1b\\").into_bytes()
}

/// A probed terminal and the channel to it.
#[derive(Debug)]
pub struct DeviceSession<R: Read, W: Write> {
    engine: QueryEngine<R, W>,
    caps: Capabilities,
    original_scrollback: Option<bool>,
    original_page_coupling: Option<bool>,
    modes_restored: bool,
}

impl<R: Read, W: Write> DeviceSession<R, W> {
    /// Run the probe sequence and return the session.
    ///
    /// The input must be in a mode where replies are delivered byte by byte
    /// without echo (raw mode, for a real tty).
    ///
    /// # Errors
    ///
    /// Returns `Err` only on I/O failure. If that happens after a mode was
    /// changed, the partially built session is dropped and still restores
    /// what it had observed.
    pub fn probe(input: R, output: W) -> io::Result<Self> {
        let mut session = Self {
            engine: QueryEngine::new(input, output),
            caps: Capabilities::default(),
            original_scrollback: None,
            original_page_coupling: None,
            modes_restored: false,
        };
        session.run_probe()?;
        Ok(session)
    }

    fn run_probe(&mut self) -> io::Result<()> {
        let span = crate::info_span!("probe");
        let _guard = span.enter();

        let out = self.engine.output();
        out.write_all(SAVE_CURSOR)?;
        out.write_all(SELECT_7BIT_C1)?;

        self.probe_screen_size()?;
        self.probe_device_attributes()?;

        self.original_scrollback = self.query_mode(DECRPL)?;
        self.engine.send(&set_mode_sequence(DECRPL, false))?;
        self.original_page_coupling = self.query_mode(DECPCCM)?;
        self.engine.send(&set_mode_sequence(DECPCCM, false))?;
        crate::debug!(
            scrollback = ?self.original_scrollback,
            page_coupling = ?self.original_page_coupling,
            "saved modes"
        );

        self.probe_pages()?;

        let out = self.engine.output();
        out.write_all(RESTORE_CURSOR)?;
        out.write_all(HOME_PAGE)?;
        out.write_all(&set_mode_sequence(DECPCCM, true))?;
        out.flush()?;

        crate::info!(
            width = self.caps.width,
            height = self.caps.height,
            soft_fonts = self.caps.soft_fonts,
            horizontal_scrolling = self.caps.horizontal_scrolling,
            color = self.caps.color,
            rectangle_ops = self.caps.rectangle_ops,
            macros = self.caps.macros,
            pages = self.caps.pages,
            "terminal capabilities"
        );
        Ok(())
    }

    fn probe_screen_size(&mut self) -> io::Result<()> {
        let mut request = format!("\x1b[{PROBE_EXTREME};{PROBE_EXTREME}H").into_bytes();
        request.extend_from_slice(CPR_REQUEST);
        let outcome = self.engine.query(&request, Grammar::CursorPosition, false)?;
        match outcome.into_reply() {
            Some(Reply::CursorPosition(position)) => self.caps.apply_screen_size(position),
            _ => {
                crate::debug!("no cursor report, keeping default screen size");
            }
        }
        Ok(())
    }

    fn probe_device_attributes(&mut self) -> io::Result<()> {
        let outcome = self
            .engine
            .query(DA1_REQUEST, Grammar::DeviceAttributes, false)?;
        match outcome.into_reply() {
            Some(Reply::DeviceAttributes(attrs)) => {
                crate::debug!(level = attrs.level, features = ?attrs.features, "device attributes");
                self.caps.apply_device_attributes(&attrs);
            }
            _ => {
                crate::debug!("unrecognized device attributes");
            }
        }
        Ok(())
    }

    fn probe_pages(&mut self) -> io::Result<()> {
        let mut request = page_move(PROBE_PAGE);
        request.extend_from_slice(EXTENDED_CPR_REQUEST);
        let outcome = self
            .engine
            .query(&request, Grammar::ExtendedCursorPosition, true)?;
        if let Some(Reply::CursorPosition(position)) = outcome.reply() {
            self.caps.pages = position.page == Some(PROBE_PAGE);
            crate::debug!(page = ?position.page, "page probe");
        }
        Ok(())
    }

    /// The capability snapshot.
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Ask for the state of DEC private mode `mode`.
    ///
    /// `Some(true)` if set, `Some(false)` if reset, `None` if the terminal
    /// did not answer or answered with any other status.
    ///
    /// # Errors
    ///
    /// I/O failures only.
    pub fn query_mode(&mut self, mode: u32) -> io::Result<Option<bool>> {
        let outcome = self
            .engine
            .query(&mode_query(mode), Grammar::ModeReport, true)?;
        Ok(match outcome.reply() {
            Some(Reply::Mode(report)) => report.state_of(mode),
            _ => None,
        })
    }

    /// Ask for a setting with DECRQSS, e.g. `"$~"` or `"1,|"`.
    ///
    /// Returns the reported control string, or an empty string if the
    /// setting is not supported.
    ///
    /// # Errors
    ///
    /// I/O failures only.
    pub fn query_setting(&mut self, setting: &str) -> io::Result<String> {
        let outcome = self
            .engine
            .query(&setting_query(setting), Grammar::SettingReport, true)?;
        Ok(match outcome.into_reply() {
            Some(Reply::Setting(payload)) => payload,
            _ => String::new(),
        })
    }

    /// Ask for the color table (DECCTR in RGB), empty if unsupported.
    ///
    /// # Errors
    ///
    /// I/O failures only.
    pub fn query_color_table(&mut self) -> io::Result<String> {
        let outcome = self
            .engine
            .query(COLOR_TABLE_REQUEST, Grammar::PaletteReport, true)?;
        Ok(match outcome.into_reply() {
            Some(Reply::Palette(payload)) => payload,
            _ => String::new(),
        })
    }

    /// Set or reset DEC private mode `mode`.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn set_mode(&mut self, mode: u32, enabled: bool) -> io::Result<()> {
        self.engine.send(&set_mode_sequence(mode, enabled))
    }

    /// The output stream, for collaborators that emit their own sequences.
    pub fn output(&mut self) -> &mut W {
        self.engine.output()
    }

    /// Write and flush a sequence that expects no reply.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn send(&mut self, sequence: &[u8]) -> io::Result<()> {
        self.engine.send(sequence)
    }

    /// Put page coupling and scrollback back the way the probe found them.
    ///
    /// Runs at most once; later calls (and the drop) do nothing.
    ///
    /// # Errors
    ///
    /// Propagates write errors. The session counts as restored either way.
    pub fn restore_modes(&mut self) -> io::Result<()> {
        if self.modes_restored {
            return Ok(());
        }
        self.modes_restored = true;
        let out = self.engine.output();
        if let Some(enabled) = self.original_page_coupling {
            out.write_all(&set_mode_sequence(DECPCCM, enabled))?;
        }
        if let Some(enabled) = self.original_scrollback {
            out.write_all(&set_mode_sequence(DECRPL, enabled))?;
        }
        out.flush()?;
        crate::debug!(
            page_coupling = ?self.original_page_coupling,
            scrollback = ?self.original_scrollback,
            "restored modes"
        );
        Ok(())
    }
}

impl<R: Read, W: Write> Drop for DeviceSession<R, W> {
    fn drop(&mut self) {
        // Best-effort: nothing useful can be done with a write error here.
        let _ = self.restore_modes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_sequences() {
        assert_eq!(set_mode_sequence(64, true), b"\x1b[?64h");
        assert_eq!(set_mode_sequence(112, false), b"\x1b[?112l");
        assert_eq!(mode_query(5), b"\x1b[?5$p");
    }

    #[test]
    fn setting_query_format() {
        assert_eq!(setting_query("$~"), b"\x1bP$q$~\x1b\\");
        assert_eq!(setting_query("1,|"), b"\x1bP$q1,|\x1b\\");
    }

    #[test]
    fn page_move_format() {
        assert_eq!(page_move(3), b"\x1b[3 P");
        assert_eq!(page_move(1), HOME_PAGE);
    }

    #[test]
    fn silent_input_keeps_defaults() {
        // End of input stands in for a terminal that never answers; the
        // uncertain queries then see no fallback reply either.
        let session = DeviceSession::probe(&b""[..], Vec::new()).unwrap();
        assert_eq!(*session.capabilities(), Capabilities::default());
    }

    #[test]
    fn scripted_replies_in_probe_order() {
        let replies: &[u8] = b"\x1b[50;132R\
            \x1b[?64;1;7;21;28;32c\
            \x1b[?112;2$y\x1b[1;1R\
            \x1b[?64;1$y\x1b[1;1R\
            \x1b[?999;132;3R\x1b[?64;1;7;21;28;32c";
        let mut session = DeviceSession::probe(replies, Vec::new()).unwrap();
        let caps = *session.capabilities();
        assert_eq!((caps.width, caps.height), (132, 50));
        assert!(caps.soft_fonts && caps.horizontal_scrolling && caps.pages);
        assert!(caps.rectangle_ops && caps.macros);
        assert!(!caps.color);
        assert_eq!(session.original_scrollback, Some(false));
        assert_eq!(session.original_page_coupling, Some(true));

        let written_before = session.output().len();
        session.restore_modes().unwrap();
        let tail = session.output()[written_before..].to_vec();
        assert_eq!(tail, b"\x1b[?64h\x1b[?112l");

        // Second restore is a no-op.
        session.restore_modes().unwrap();
        assert_eq!(session.output().len(), written_before + tail.len());
    }

    #[test]
    fn wrong_page_means_no_paging() {
        let replies: &[u8] = b"\x1b[24;80R\
            \x1b[?64c\
            \x1b[1;1R\
            \x1b[1;1R\
            \x1b[?24;80;1R\x1b[?64c";
        let session = DeviceSession::probe(replies, Vec::new()).unwrap();
        assert!(!session.capabilities().pages);
        assert_eq!(session.original_scrollback, None);
        assert_eq!(session.original_page_coupling, None);
    }
}

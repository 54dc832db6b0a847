#![forbid(unsafe_code)]

//! Probe report: everything learned about a terminal, ready to print.
//!
//! [`inspect`] runs the follow-up queries on a probed session and, when
//! asked, builds the macro catalog so its plan can be listed. The report is
//! collected first and printed after the session is gone, so nothing it
//! prints can interleave with terminal replies.

use std::fmt;
use std::io::{self, Read, Write};

use vtrex_core::capabilities::Capabilities;
use vtrex_core::catalog::{Layout, MacroCatalog, MacroRole};
use vtrex_core::compat::{Incompatibility, check_compatibility};
use vtrex_core::logging::escape_bytes;
use vtrex_core::macros::Macro;
use vtrex_core::palette::ColorSession;
use vtrex_core::session::DeviceSession;

use crate::cli::Opts;

/// DEC private mode: reverse video screen (DECSCNM).
pub const DECSCNM: u32 = 5;
/// DEC private mode: autowrap (DECAWM).
pub const DECAWM: u32 = 7;
/// DECRQSS setting: status display type (DECSSDT).
pub const STATUS_DISPLAY_SETTING: &str = "$~";

const LABEL_WIDTH: usize = 24;

/// Colors saved and put back by a color session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedColors {
    pub assignment: String,
    pub table: String,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroEntry {
    pub role: MacroRole,
    pub form: Macro,
}

/// The macro plan for this terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSummary {
    pub layout: Layout,
    pub entries: Vec<MacroEntry>,
}

impl MacroSummary {
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.entries.iter().filter(|e| e.form.is_resident()).count()
    }
}

/// Everything the probe found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Where the answers came from ("terminal" or a simulated profile).
    pub source: String,
    pub opts: Opts,
    pub caps: Capabilities,
    pub reverse_video: Option<bool>,
    pub autowrap: Option<bool>,
    /// Raw DECRQSS reply for the status display, empty if unanswered.
    pub status_display: String,
    /// Present only when a color session ran.
    pub colors: Option<SavedColors>,
    /// Present only with `--macros`.
    pub macros: Option<MacroSummary>,
    pub verdict: Result<(), Incompatibility>,
}

impl ProbeReport {
    /// Process exit status for this report.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.verdict.is_err())
    }
}

/// Query a probed session and collect the report.
///
/// # Errors
///
/// Propagates I/O errors from the session.
pub fn inspect<R: Read, W: Write>(
    session: &mut DeviceSession<R, W>,
    opts: &Opts,
    source: &str,
) -> io::Result<ProbeReport> {
    let caps = *session.capabilities();
    let reverse_video = session.query_mode(DECSCNM)?;
    let autowrap = session.query_mode(DECAWM)?;
    let status_display = session.query_setting(STATUS_DISPLAY_SETTING)?;

    let colors = ColorSession::begin(session, opts.preferences())?;
    let saved = colors.is_active().then(|| SavedColors {
        assignment: colors.saved_assignment().to_string(),
        table: colors.saved_table().to_string(),
    });
    colors.restore(session.output())?;

    let macros = if opts.macros {
        let catalog = MacroCatalog::build(session, opts.preferences())?;
        let summary = MacroSummary {
            layout: catalog.layout(),
            entries: catalog
                .iter()
                .map(|(role, form)| MacroEntry {
                    role,
                    form: form.clone(),
                })
                .collect(),
        };
        tracing::info!(
            entries = summary.entries.len(),
            resident = summary.resident_count(),
            "macro catalog built"
        );
        Some(summary)
    } else {
        None
    };

    Ok(ProbeReport {
        source: source.to_string(),
        opts: opts.clone(),
        caps,
        reverse_video,
        autowrap,
        status_display,
        colors: saved,
        macros,
        verdict: check_compatibility(&caps, opts.yolo),
    })
}

// --- Formatting ---

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn mode_state(state: Option<bool>) -> &'static str {
    match state {
        Some(true) => "set",
        Some(false) => "reset",
        None => "unknown",
    }
}

fn or_none(text: &str) -> &str {
    if text.is_empty() { "(no reply)" } else { text }
}

fn row(f: &mut fmt::Formatter<'_>, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(f, "{label:<LABEL_WIDTH$}{value}")
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caps = &self.caps;
        writeln!(f, "vtrex-probe: {}", self.source)?;
        writeln!(f)?;
        row(f, "Screen", format_args!("{}x{}", caps.width, caps.height))?;
        row(f, "  soft fonts", yes_no(caps.soft_fonts))?;
        row(f, "  horizontal scrolling", yes_no(caps.horizontal_scrolling))?;
        row(f, "  color", yes_no(caps.color))?;
        row(f, "  rectangle operations", yes_no(caps.rectangle_ops))?;
        row(f, "  macros", yes_no(caps.macros))?;
        row(f, "  pages", yes_no(caps.pages))?;
        row(f, "Reverse video (5)", mode_state(self.reverse_video))?;
        row(f, "Autowrap (7)", mode_state(self.autowrap))?;
        row(f, "Status display", or_none(&self.status_display))?;

        if let Some(colors) = &self.colors {
            row(f, "Color assignment", or_none(&colors.assignment))?;
            row(f, "Color table", or_none(&colors.table))?;
        }

        let opts = &self.opts;
        row(
            f,
            "Preferences",
            format_args!(
                "color {}, sound {}, blink {}, {} fps",
                yes_no(opts.color),
                yes_no(opts.sound),
                yes_no(opts.blink),
                opts.speed
            ),
        )?;

        if let Some(summary) = &self.macros {
            let resident = summary.resident_count();
            row(
                f,
                "Macros",
                format_args!(
                    "{resident} resident, {} literal, play area at column {} row {}",
                    summary.entries.len() - resident,
                    summary.layout.x_indent,
                    summary.layout.y_indent
                ),
            )?;
            for entry in &summary.entries {
                let role = format!("  {:?}", entry.role);
                match &entry.form {
                    Macro::Resident(id) => row(
                        f,
                        &role,
                        format_args!("resident #{id:<3} {} bytes", entry.form.replay_len()),
                    )?,
                    Macro::Literal(bytes) => row(
                        f,
                        &role,
                        format_args!("literal       {}", escape_bytes(bytes)),
                    )?,
                }
            }
        }

        writeln!(f)?;
        match &self.verdict {
            Ok(()) => writeln!(f, "Compatible."),
            Err(reason) => {
                writeln!(f, "{reason}")?;
                if let Incompatibility::MissingFeatures(missing) = reason {
                    writeln!(f, "Missing: {}.", missing.join(", "))?;
                }
                if let Some(hint) = reason.hint() {
                    writeln!(f, "{hint}")?;
                }
                Ok(())
            }
        }
    }
}

#![forbid(unsafe_code)]

//! Strict matchers for the reply grammars used during negotiation.
//!
//! Every matcher consumes the *whole* capture. A reply that merely contains
//! a valid report, or is cut short, or carries a malformed field, does not
//! match, and callers treat it exactly like silence.
//!
//! | Grammar | Shape | Final |
//! |---------|-------|-------|
//! | CPR | `ESC [ Pr ; Pc R` | `R` |
//! | DECXCPR | `ESC [ [?] Pr ; Pc [; Pp] R` | `R` |
//! | DECRPM | `ESC [ ? Pm ; Ps $ y` | `y` |
//! | DECRPSS | `ESC P 1 $ r D...D ESC \` | `\` |
//! | DECCTR | `ESC P 2 $ s D...D ESC \` | `\` |
//! | DA1 | `ESC [ ? Pl [;,digits]* c` | `c` |
//!
//! Numeric fields are one or more ASCII digits that fit in a `u32`.
//! DA1 separators may be `;` or `,` (some terminals emit commas).

use crate::reader::ESC;

/// Conformance level from which rectangle ops and macros are implied.
pub const LEVEL_4_CONFORMANCE: u32 = 64;

/// The fixed set of reply grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// Cursor position report (reply to `CSI 6 n`).
    CursorPosition,
    /// Extended cursor position report with optional page (reply to `CSI ? 6 n`).
    ExtendedCursorPosition,
    /// DEC private mode report (reply to `CSI ? Pm $ p`).
    ModeReport,
    /// Valid status-string report (reply to `DCS $ q Pt ST`).
    SettingReport,
    /// Color table report (reply to `CSI 2 ; 2 $ u`).
    PaletteReport,
    /// Primary device attributes (reply to `CSI c`).
    DeviceAttributes,
}

impl Grammar {
    /// All grammars.
    pub const ALL: &'static [Self] = &[
        Self::CursorPosition,
        Self::ExtendedCursorPosition,
        Self::ModeReport,
        Self::SettingReport,
        Self::PaletteReport,
        Self::DeviceAttributes,
    ];

    /// Final byte of a reply in this grammar.
    #[must_use]
    pub const fn terminator(self) -> u8 {
        match self {
            Self::CursorPosition | Self::ExtendedCursorPosition => b'R',
            Self::ModeReport => b'y',
            Self::SettingReport | Self::PaletteReport => b'\\',
            Self::DeviceAttributes => b'c',
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CursorPosition => "cpr",
            Self::ExtendedCursorPosition => "decxcpr",
            Self::ModeReport => "decrpm",
            Self::SettingReport => "decrpss",
            Self::PaletteReport => "decctr",
            Self::DeviceAttributes => "da1",
        }
    }

    /// Match `text` against this grammar in full.
    #[must_use]
    pub fn parse(self, text: &[u8]) -> Option<Reply> {
        match self {
            Self::CursorPosition => parse_cpr(text).map(Reply::CursorPosition),
            Self::ExtendedCursorPosition => parse_extended_cpr(text).map(Reply::CursorPosition),
            Self::ModeReport => parse_mode_report(text).map(Reply::Mode),
            Self::SettingReport => parse_string_report(text, b"1$r").map(Reply::Setting),
            Self::PaletteReport => parse_string_report(text, b"2$s").map(Reply::Palette),
            Self::DeviceAttributes => parse_device_attributes(text).map(Reply::DeviceAttributes),
        }
    }
}

/// Typed fields of a matched reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    CursorPosition(CursorPosition),
    Mode(ModeReport),
    Setting(String),
    Palette(String),
    DeviceAttributes(DeviceAttributes),
}

/// Cursor position, 1-based. `page` is only ever set by DECXCPR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub row: u32,
    pub column: u32,
    pub page: Option<u32>,
}

/// A DECRPM mode report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeReport {
    pub mode: u32,
    /// 0 = not recognized, 1 = set, 2 = reset, 3/4 = permanently set/reset.
    pub status: u32,
}

impl ModeReport {
    /// Tri-state value of `mode` according to this report.
    ///
    /// `None` if the report is for another mode or the status is anything
    /// other than plain set (1) or reset (2).
    #[must_use]
    pub fn state_of(&self, mode: u32) -> Option<bool> {
        if self.mode != mode {
            return None;
        }
        match self.status {
            1 => Some(true),
            2 => Some(false),
            _ => None,
        }
    }
}

/// Primary device attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAttributes {
    /// Conformance level (61 = VT100 ... 64 = VT420, 65 = VT500).
    pub level: u32,
    /// Extension codes following the level, in reply order.
    pub features: Vec<u32>,
}

// --- Scanner ---------------------------------------------------------------

/// Forward-only cursor over a capture.
struct Scanner<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a [u8]) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, literal: &[u8]) -> Option<()> {
        let end = self.pos.checked_add(literal.len())?;
        if self.text.get(self.pos..end)? == literal {
            self.pos = end;
            Some(())
        } else {
            None
        }
    }

    /// One or more digits, as a `u32`.
    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
            value = value.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    fn rest(&self) -> &'a [u8] {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos == self.text.len()
    }
}

fn parse_cpr(text: &[u8]) -> Option<CursorPosition> {
    let mut s = Scanner::new(text);
    s.expect(&[ESC, b'['])?;
    let row = s.number()?;
    s.expect(b";")?;
    let column = s.number()?;
    s.expect(b"R")?;
    s.at_end().then_some(CursorPosition {
        row,
        column,
        page: None,
    })
}

fn parse_extended_cpr(text: &[u8]) -> Option<CursorPosition> {
    let mut s = Scanner::new(text);
    s.expect(&[ESC, b'['])?;
    s.eat(b'?');
    let row = s.number()?;
    s.expect(b";")?;
    let column = s.number()?;
    let page = if s.eat(b';') { Some(s.number()?) } else { None };
    s.expect(b"R")?;
    s.at_end().then_some(CursorPosition { row, column, page })
}

fn parse_mode_report(text: &[u8]) -> Option<ModeReport> {
    let mut s = Scanner::new(text);
    s.expect(&[ESC, b'[', b'?'])?;
    let mode = s.number()?;
    s.expect(b";")?;
    let status = s.number()?;
    s.expect(b"$y")?;
    s.at_end().then_some(ModeReport { mode, status })
}

/// `ESC P <intro> payload ESC \`, where payload holds no CR or LF.
fn parse_string_report(text: &[u8], intro: &[u8]) -> Option<String> {
    let mut s = Scanner::new(text);
    s.expect(&[ESC, b'P'])?;
    s.expect(intro)?;
    let payload = s.rest().strip_suffix(&[ESC, b'\\'])?;
    if payload.iter().any(|&b| b == b'\r' || b == b'\n') {
        return None;
    }
    Some(String::from_utf8_lossy(payload).into_owned())
}

fn parse_device_attributes(text: &[u8]) -> Option<DeviceAttributes> {
    let mut s = Scanner::new(text);
    s.expect(&[ESC, b'[', b'?'])?;
    let level = s.number()?;
    let mut features = Vec::new();
    loop {
        match s.peek()? {
            b';' | b',' => s.pos += 1,
            b'0'..=b'9' => features.push(s.number()?),
            b'c' => break,
            _ => return None,
        }
    }
    s.expect(b"c")?;
    s.at_end().then_some(DeviceAttributes { level, features })
}

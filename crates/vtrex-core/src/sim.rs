#![forbid(unsafe_code)]

//! In-process stand-in for a DEC terminal.
//!
//! A [`SimulatedTerminal`] interprets the control sequences written to its
//! [`SimOutput`] handle and queues replies on its [`SimInput`] handle, so a
//! [`DeviceSession`] can be driven end to end without a tty. Reading with
//! nothing queued returns end of input instead of blocking.
//!
//! # Interpreted Sequences
//!
//! | Sequence | Name | Effect |
//! |----------|------|--------|
//! | `CSI r ; c H` | CUP | move cursor (clamped to the screen) |
//! | `CSI 6 n` | CPR | reply `CSI r ; c R` |
//! | `CSI ? 6 n` | DECXCPR | reply `CSI r ; c ; p R` |
//! | `CSI c` | DA1 | reply `CSI ? level ; codes c` |
//! | `CSI ? m $ p` | DECRQM | reply `CSI ? m ; s $ y` |
//! | `CSI ? m h` / `l` | DECSET / DECRST | record mode |
//! | `CSI p SP P` | NP/PP | move to page (clamped) |
//! | `CSI 2 ; 2 $ u` | DECCTR | reply `DCS 2 $ s table ST` |
//! | `CSI n * z` | DECINVM | expand stored macro |
//! | `DCS $ q name ST` | DECRQSS | reply `DCS 1 $ r value ST` or `DCS 0 $ r ST` |
//! | `DCS id ; 0 ; 1 ! z hex ST` | DECDMAC | store macro |
//! | `DCS 0 ; 1 ; 0 ! z ST` | DECDMAC | delete all macros |
//! | `DCS 2 $ p table ST` | DECRSPS | replace color table |
//! | `ESC 7` / `ESC 8` | DECSC / DECRC | save / restore cursor |
//!
//! Everything else (and every non-query sequence above) is appended to the
//! [`display`](SimulatedTerminal::display) log, with macro invocations
//! replaced by their expansion. Two runs that put the same bytes in the
//! display log had the same visible effect.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::rc::Rc;

use crate::capabilities::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::macros::decode_hex;
use crate::reader::{ESC, XOFF, XON};
use crate::session::DeviceSession;

/// Nested macro invocations deeper than this are dropped.
const MAX_EXPANSION_DEPTH: usize = 8;

/// How a simulated terminal behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalProfile {
    pub width: u16,
    pub height: u16,
    /// Conformance level reported in DA1.
    pub level: u32,
    /// Extension codes reported in DA1.
    pub features: Vec<u32>,
    /// Number of pages; 1 means page moves have no effect.
    pub pages: u32,
    /// Answers DECXCPR.
    pub extended_cpr: bool,
    /// Answers DECRQM.
    pub mode_reports: bool,
    /// Initial DEC private modes. Unlisted modes report status 0.
    pub modes: BTreeMap<u32, bool>,
    /// DECRQSS answers, keyed by the requested setting.
    pub settings: BTreeMap<String, String>,
    /// DECCTR answer; `None` leaves the request unanswered.
    pub color_table: Option<String>,
    /// Stores and expands DECDMAC macros.
    pub resident_macros: bool,
    /// Separate DA1 codes with `,` instead of `;`.
    pub comma_separators: bool,
    /// Wrap and split replies with XON/XOFF.
    pub flow_control_noise: bool,
    /// Never answer anything.
    pub silent: bool,
}

impl Default for TerminalProfile {
    fn default() -> Self {
        Self::vt100()
    }
}

impl TerminalProfile {
    /// A VT420 in its power-up state.
    #[must_use]
    pub fn vt420() -> Self {
        Self {
            level: 64,
            features: vec![1, 2, 7, 8, 9, 15, 18, 21],
            pages: 6,
            extended_cpr: true,
            mode_reports: true,
            modes: BTreeMap::from([(64, true), (112, false)]),
            settings: BTreeMap::from([("$~".to_string(), "0$~".to_string())]),
            resident_macros: true,
            ..Self::vt100()
        }
    }

    /// A VT525: a VT420 with color and a readable color table.
    #[must_use]
    pub fn vt525() -> Self {
        let mut profile = Self::vt420();
        profile.level = 65;
        profile.features = vec![1, 2, 7, 8, 9, 12, 15, 16, 17, 18, 19, 21, 22, 28, 29];
        profile
            .settings
            .insert("1,|".to_string(), "1;7;0,|".to_string());
        profile.color_table = Some("0;2;0;0;0/4;2;20;20;80/7;2;47;47;47".to_string());
        profile
    }

    /// A VT220: soft fonts, one page, no state reports.
    #[must_use]
    pub fn vt220() -> Self {
        Self {
            level: 62,
            features: vec![1, 2, 6, 7, 8, 9],
            ..Self::vt100()
        }
    }

    /// A VT100: answers DA1 and CPR only.
    #[must_use]
    pub fn vt100() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            level: 1,
            features: vec![2],
            pages: 1,
            extended_cpr: false,
            mode_reports: false,
            modes: BTreeMap::new(),
            settings: BTreeMap::new(),
            color_table: None,
            resident_macros: false,
            comma_separators: false,
            flow_control_noise: false,
            silent: false,
        }
    }

    /// Something that reads but never replies.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::vt100()
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_flow_control_noise(mut self) -> Self {
        self.flow_control_noise = true;
        self
    }

    #[must_use]
    pub fn with_comma_separators(mut self) -> Self {
        self.comma_separators = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ParseState {
    #[default]
    Ground,
    Escape,
    Csi,
    Dcs,
    DcsEscape,
}

#[derive(Debug)]
struct SimState {
    profile: TerminalProfile,
    parse: ParseState,
    seq: Vec<u8>,
    pending: VecDeque<u8>,
    written: Vec<u8>,
    display: Vec<u8>,
    cursor: (u32, u32),
    saved_cursor: (u32, u32),
    page: u32,
    modes: BTreeMap<u32, bool>,
    macros: BTreeMap<u32, Vec<u8>>,
    color_table: Option<String>,
    replies: usize,
}

impl SimState {
    fn new(profile: TerminalProfile) -> Self {
        Self {
            modes: profile.modes.clone(),
            color_table: profile.color_table.clone(),
            profile,
            parse: ParseState::Ground,
            seq: Vec::new(),
            pending: VecDeque::new(),
            written: Vec::new(),
            display: Vec::new(),
            cursor: (1, 1),
            saved_cursor: (1, 1),
            page: 1,
            macros: BTreeMap::new(),
            replies: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        self.written.extend_from_slice(bytes);
        self.feed(bytes, 0);
    }

    fn feed(&mut self, bytes: &[u8], depth: usize) {
        for &b in bytes {
            self.step(b, depth);
        }
    }

    fn step(&mut self, b: u8, depth: usize) {
        match self.parse {
            ParseState::Ground => {
                if b == ESC {
                    self.seq.clear();
                    self.seq.push(b);
                    self.parse = ParseState::Escape;
                } else {
                    self.display.push(b);
                }
            }
            ParseState::Escape => {
                self.seq.push(b);
                match b {
                    b'[' if self.seq.len() == 2 => self.parse = ParseState::Csi,
                    b'P' if self.seq.len() == 2 => self.parse = ParseState::Dcs,
                    0x20..=0x2f => {}
                    0x30..=0x7e => self.complete(depth),
                    ESC => {
                        // An escape interrupted by another escape starts over.
                        self.seq.clear();
                        self.seq.push(ESC);
                    }
                    _ => {
                        let seq = std::mem::take(&mut self.seq);
                        self.display.extend_from_slice(&seq);
                        self.parse = ParseState::Ground;
                    }
                }
            }
            ParseState::Csi => {
                self.seq.push(b);
                if (0x40..=0x7e).contains(&b) {
                    self.complete(depth);
                }
            }
            ParseState::Dcs => {
                self.seq.push(b);
                if b == ESC {
                    self.parse = ParseState::DcsEscape;
                }
            }
            ParseState::DcsEscape => {
                self.seq.push(b);
                match b {
                    b'\\' => self.complete(depth),
                    ESC => {}
                    _ => self.parse = ParseState::Dcs,
                }
            }
        }
    }

    /// Dispatch the finished sequence in `seq` and return to ground.
    fn complete(&mut self, depth: usize) {
        let kind = self.parse;
        let seq = std::mem::take(&mut self.seq);
        self.parse = ParseState::Ground;
        let shown = match kind {
            ParseState::Csi => self.csi(&seq[2..], depth),
            ParseState::DcsEscape => self.dcs(&seq[2..seq.len() - 2]),
            _ => self.esc(&seq[1..]),
        };
        if shown {
            self.display.extend_from_slice(&seq);
        }
    }

    /// Returns whether the sequence belongs in the display log.
    fn esc(&mut self, body: &[u8]) -> bool {
        match body {
            b"7" => self.saved_cursor = self.cursor,
            b"8" => self.cursor = self.saved_cursor,
            _ => {}
        }
        true
    }

    fn csi(&mut self, body: &[u8], depth: usize) -> bool {
        let command = Command::parse(body);
        match (command.private, command.intermediates, command.final_byte) {
            (None, b"", b'H') => {
                let row = command.param(0, 1).clamp(1, u32::from(self.profile.height));
                let column = command.param(1, 1).clamp(1, u32::from(self.profile.width));
                self.cursor = (row, column);
                true
            }
            (None, b"", b'n') if command.param(0, 0) == 6 => {
                let (row, column) = self.cursor;
                self.reply(format!("\x1b[{row};{column}R").as_bytes());
                false
            }
            (Some(b'?'), b"", b'n') if command.param(0, 0) == 6 => {
                if self.profile.extended_cpr {
                    let (row, column) = self.cursor;
                    let page = self.page;
                    self.reply(format!("\x1b[{row};{column};{page}R").as_bytes());
                }
                false
            }
            (None, b"", b'c') if command.param(0, 0) == 0 => {
                self.reply(&self.device_attributes());
                false
            }
            (Some(b'?'), b"$", b'p') => {
                if self.profile.mode_reports {
                    let mode = command.param(0, 0);
                    let status = match self.modes.get(&mode) {
                        Some(true) => 1,
                        Some(false) => 2,
                        None => 0,
                    };
                    self.reply(format!("\x1b[?{mode};{status}$y").as_bytes());
                }
                false
            }
            (Some(b'?'), b"", final_byte @ (b'h' | b'l')) => {
                for mode in command.params.iter().flatten() {
                    self.modes.insert(*mode, final_byte == b'h');
                }
                true
            }
            (None, b" ", b'P') => {
                self.page = command.param(0, 1).clamp(1, self.profile.pages.max(1));
                true
            }
            (None, b"$", b'u') if command.param(0, 0) == 2 => {
                if let Some(table) = self.color_table.clone() {
                    self.reply(format!("\x1bP2$s{table}\x1b\\").as_bytes());
                }
                false
            }
            (None, b"*", b'z') if self.profile.resident_macros => {
                let id = command.param(0, 0);
                if depth < MAX_EXPANSION_DEPTH
                    && let Some(payload) = self.macros.get(&id).cloned()
                {
                    self.feed(&payload, depth + 1);
                }
                false
            }
            _ => true,
        }
    }

    fn dcs(&mut self, body: &[u8]) -> bool {
        if let Some(name) = body.strip_prefix(b"$q") {
            let name = String::from_utf8_lossy(name).into_owned();
            match self.profile.settings.get(&name).cloned() {
                Some(value) => self.reply(format!("\x1bP1$r{value}\x1b\\").as_bytes()),
                None => self.reply(b"\x1bP0$r\x1b\\"),
            }
            return false;
        }
        if let Some(at) = find(body, b"!z") {
            if self.profile.resident_macros {
                self.define_macro(&body[..at], &body[at + 2..]);
            }
            return false;
        }
        if let Some(table) = body.strip_prefix(b"2$p")
            && self.color_table.is_some()
        {
            self.color_table = Some(String::from_utf8_lossy(table).into_owned());
        }
        true
    }

    fn define_macro(&mut self, params: &[u8], data: &[u8]) {
        let params = Command::split_params(params);
        let get = |i: usize| params.get(i).copied().flatten().unwrap_or(0);
        let (id, delete_all, hex) = (get(0), get(1) == 1, get(2) == 1);
        if delete_all {
            self.macros.clear();
        } else {
            self.macros.remove(&id);
        }
        if data.is_empty() {
            return;
        }
        let payload = if hex {
            decode_hex(data)
        } else {
            Some(data.to_vec())
        };
        if let Some(payload) = payload {
            self.macros.insert(id, payload);
        }
    }

    fn device_attributes(&self) -> Vec<u8> {
        let separator = if self.profile.comma_separators { ',' } else { ';' };
        let mut reply = format!("\x1b[?{}", self.profile.level);
        for code in &self.profile.features {
            reply.push(separator);
            reply.push_str(&code.to_string());
        }
        reply.push('c');
        reply.into_bytes()
    }

    fn reply(&mut self, bytes: &[u8]) {
        if self.profile.silent {
            return;
        }
        self.replies += 1;
        if self.profile.flow_control_noise {
            let (head, tail) = bytes.split_at(bytes.len() / 2);
            self.pending.push_back(XOFF);
            self.pending.extend(head);
            self.pending.push_back(XON);
            self.pending.push_back(XOFF);
            self.pending.extend(tail);
            self.pending.push_back(XON);
        } else {
            self.pending.extend(bytes);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// A CSI sequence split into its parts.
struct Command<'a> {
    private: Option<u8>,
    params: Vec<Option<u32>>,
    intermediates: &'a [u8],
    final_byte: u8,
}

impl<'a> Command<'a> {
    /// `body` is everything after `ESC [`, final byte included.
    fn parse(body: &'a [u8]) -> Self {
        let Some((&final_byte, rest)) = body.split_last() else {
            return Self {
                private: None,
                params: Vec::new(),
                intermediates: &[],
                final_byte: 0,
            };
        };
        let (private, rest) = match rest.first() {
            Some(&p) if matches!(p, b'<' | b'=' | b'>' | b'?') => (Some(p), &rest[1..]),
            _ => (None, rest),
        };
        let split = rest
            .iter()
            .position(|b| (0x20..=0x2f).contains(b))
            .unwrap_or(rest.len());
        Self {
            private,
            params: Self::split_params(&rest[..split]),
            intermediates: &rest[split..],
            final_byte,
        }
    }

    fn split_params(text: &[u8]) -> Vec<Option<u32>> {
        if text.is_empty() {
            return Vec::new();
        }
        text.split(|&b| b == b';')
            .map(|field| std::str::from_utf8(field).ok()?.parse().ok())
            .collect()
    }

    fn param(&self, index: usize, default: u32) -> u32 {
        self.params.get(index).copied().flatten().unwrap_or(default)
    }
}

/// Shared handle to a simulated terminal.
#[derive(Debug, Clone)]
pub struct SimulatedTerminal {
    state: Rc<RefCell<SimState>>,
}

/// Reply side of a [`SimulatedTerminal`].
#[derive(Debug, Clone)]
pub struct SimInput {
    state: Rc<RefCell<SimState>>,
}

/// Host-output side of a [`SimulatedTerminal`].
#[derive(Debug, Clone)]
pub struct SimOutput {
    state: Rc<RefCell<SimState>>,
}

impl Read for SimInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match state.pending.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for SimOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.borrow_mut().write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SimulatedTerminal {
    #[must_use]
    pub fn new(profile: TerminalProfile) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::new(profile))),
        }
    }

    #[must_use]
    pub fn input(&self) -> SimInput {
        SimInput {
            state: Rc::clone(&self.state),
        }
    }

    #[must_use]
    pub fn output(&self) -> SimOutput {
        SimOutput {
            state: Rc::clone(&self.state),
        }
    }

    /// Probe this terminal.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`DeviceSession::probe`].
    pub fn probe(&self) -> io::Result<DeviceSession<SimInput, SimOutput>> {
        DeviceSession::probe(self.input(), self.output())
    }

    /// Every byte written by the host, verbatim.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.clone()
    }

    /// Bytes with visible effect: queries and macro definitions removed,
    /// invocations expanded.
    #[must_use]
    pub fn display(&self) -> Vec<u8> {
        self.state.borrow().display.clone()
    }

    /// Forget what has been written and displayed so far.
    pub fn clear_logs(&self) {
        let mut state = self.state.borrow_mut();
        state.written.clear();
        state.display.clear();
    }

    /// Current state of DEC private mode `mode`, if ever known.
    #[must_use]
    pub fn mode(&self, mode: u32) -> Option<bool> {
        self.state.borrow().modes.get(&mode).copied()
    }

    /// Payload stored under macro `id`.
    #[must_use]
    pub fn stored_macro(&self, id: u32) -> Option<Vec<u8>> {
        self.state.borrow().macros.get(&id).cloned()
    }

    #[must_use]
    pub fn stored_macro_count(&self) -> usize {
        self.state.borrow().macros.len()
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.state.borrow().page
    }

    /// Cursor as (row, column).
    #[must_use]
    pub fn cursor(&self) -> (u32, u32) {
        self.state.borrow().cursor
    }

    #[must_use]
    pub fn color_table(&self) -> Option<String> {
        self.state.borrow().color_table.clone()
    }

    /// Number of replies sent so far.
    #[must_use]
    pub fn replies_sent(&self) -> usize {
        self.state.borrow().replies
    }

    /// Bytes queued for the host but not yet read.
    #[must_use]
    pub fn unread(&self) -> usize {
        self.state.borrow().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(term: &SimulatedTerminal, request: &[u8]) -> Vec<u8> {
        term.output().write_all(request).unwrap();
        let mut reply = Vec::new();
        term.input().read_to_end(&mut reply).unwrap();
        reply
    }

    #[test]
    fn cursor_report_after_extreme_move() {
        let term = SimulatedTerminal::new(TerminalProfile::vt420().with_size(132, 48));
        assert_eq!(exchange(&term, b"\x1b[999;999H\x1b[6n"), b"\x1b[48;132R");
        assert_eq!(term.cursor(), (48, 132));
    }

    #[test]
    fn device_attributes_separators() {
        let term = SimulatedTerminal::new(TerminalProfile::vt100());
        assert_eq!(exchange(&term, b"\x1b[c"), b"\x1b[?1;2c");
        let term = SimulatedTerminal::new(TerminalProfile::vt220().with_comma_separators());
        assert_eq!(exchange(&term, b"\x1b[0c"), b"\x1b[?62,1,2,6,7,8,9c");
    }

    #[test]
    fn mode_report_and_set() {
        let term = SimulatedTerminal::new(TerminalProfile::vt420());
        assert_eq!(exchange(&term, b"\x1b[?64$p"), b"\x1b[?64;1$y");
        assert_eq!(exchange(&term, b"\x1b[?64l\x1b[?64$p"), b"\x1b[?64;2$y");
        assert_eq!(exchange(&term, b"\x1b[?5$p"), b"\x1b[?5;0$y");
        assert_eq!(term.mode(64), Some(false));
    }

    #[test]
    fn vt100_ignores_state_queries() {
        let term = SimulatedTerminal::new(TerminalProfile::vt100());
        assert!(exchange(&term, b"\x1b[?64$p\x1b[?6n\x1b[2;2$u").is_empty());
        assert_eq!(
            exchange(&term, b"\x1bP$q$~\x1b\\"),
            b"\x1bP0$r\x1b\\"
        );
    }

    #[test]
    fn extended_cursor_report_tracks_page() {
        let term = SimulatedTerminal::new(TerminalProfile::vt420());
        assert_eq!(exchange(&term, b"\x1b[3 P\x1b[?6n"), b"\x1b[1;1;3R");
        assert_eq!(term.page(), 3);
        let single = SimulatedTerminal::new(TerminalProfile::vt420());
        single.state.borrow_mut().profile.pages = 1;
        assert_eq!(exchange(&single, b"\x1b[3 P\x1b[?6n"), b"\x1b[1;1;1R");
    }

    #[test]
    fn macros_store_expand_and_clear() {
        let term = SimulatedTerminal::new(TerminalProfile::vt420());
        let mut out = term.output();
        out.write_all(b"\x1bP0;0;1!z4142434445\x1b\\").unwrap();
        assert_eq!(term.stored_macro(0), Some(b"ABCDE".to_vec()));
        out.write_all(b"x\x1b[0*zy").unwrap();
        assert_eq!(term.display(), b"xABCDEy");
        out.write_all(b"\x1bP0;1;0!z\x1b\\").unwrap();
        assert_eq!(term.stored_macro_count(), 0);
    }

    #[test]
    fn flow_control_noise_wraps_replies() {
        let term = SimulatedTerminal::new(TerminalProfile::vt100().with_flow_control_noise());
        let reply = exchange(&term, b"\x1b[c");
        assert_eq!(reply.first(), Some(&XOFF));
        assert_eq!(reply.last(), Some(&XON));
        let clean: Vec<u8> = reply.into_iter().filter(|&b| b != XON && b != XOFF).collect();
        assert_eq!(clean, b"\x1b[?1;2c");
    }

    #[test]
    fn silent_terminal_never_replies() {
        let term = SimulatedTerminal::new(TerminalProfile::silent());
        assert!(exchange(&term, b"\x1b[c\x1b[6n").is_empty());
        assert_eq!(term.replies_sent(), 0);
    }

    #[test]
    fn color_table_query_and_restore() {
        let term = SimulatedTerminal::new(TerminalProfile::vt525());
        let reply = exchange(&term, b"\x1b[2;2$u");
        assert!(reply.starts_with(b"\x1bP2$s0;2;0;0;0"));
        term.output().write_all(b"\x1bP2$p0;2;1;1;1\x1b\\").unwrap();
        assert_eq!(term.color_table().as_deref(), Some("0;2;1;1;1"));
    }

    #[test]
    fn palette_replace_ignored_without_color() {
        let term = SimulatedTerminal::new(TerminalProfile::vt420());
        term.output().write_all(b"\x1bP2$p0;2;1;1;1\x1b\\").unwrap();
        assert_eq!(term.color_table(), None);
    }

    #[test]
    fn recursive_macro_expansion_is_bounded() {
        let term = SimulatedTerminal::new(TerminalProfile::vt420());
        let mut out = term.output();
        // Macro 0 is "x" followed by an invocation of itself.
        out.write_all(b"\x1bP0;0;1!z781B5B302A7A\x1b\\").unwrap();
        out.write_all(b"\x1b[0*z").unwrap();
        assert_eq!(term.display(), vec![b'x'; MAX_EXPANSION_DEPTH]);
    }

    #[test]
    fn display_excludes_queries() {
        let term = SimulatedTerminal::new(TerminalProfile::vt420());
        term.output().write_all(b"\x1b7A\x1b[6nB\x1b[?64$p\x1b8").unwrap();
        assert_eq!(term.display(), b"\x1b7AB\x1b8");
    }
}

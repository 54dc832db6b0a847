#![forbid(unsafe_code)]

//! The fixed set of named macros used by the renderer.
//!
//! A [`MacroCatalog`] is built once, right after probing, and addresses each
//! macro by [`MacroRole`]. Building writes every resident definition to the
//! terminal; the hot path only calls [`MacroCatalog::replay`].
//!
//! The catalog borrows the [`DeviceSession`] mutably for its whole life, so
//! nothing else touches the streams while macros are defined and replayed,
//! and it is necessarily dropped before the session.
//!
//! # Geometry
//!
//! The play area is [`PLAY_WIDTH`] x [`PLAY_HEIGHT`] cells, drawn in double
//! width, centered on the screen:
//!
//! ```text
//! x_indent = max((width  - 2 * PLAY_WIDTH) / 4, 0)
//! y_indent = max((height - PLAY_HEIGHT)    / 2, 1)
//! ```
//!
//! # Storage Lifetime
//!
//! When the terminal stores macros, all of them are deleted before the
//! first id is allocated and again when the catalog is dropped. A rebuilt
//! catalog therefore starts from id 0 without colliding with old entries.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Read, Write};

use crate::capabilities::Capabilities;
use crate::macros::{CLEAR_ALL_MACROS, Macro, MacroBuilder, MacroCompiler};
use crate::session::DeviceSession;

/// Width of the play area in (double-width) cells.
pub const PLAY_WIDTH: i32 = 30;
/// Height of the play area in rows.
pub const PLAY_HEIGHT: i32 = 10;

/// Silent note played once at build time so the first real sound does not stutter.
pub const SOUND_PRIMER: &[u8] = b"\x1b[0;1;1,~";

/// User toggles that change what gets built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    /// Use color where the terminal supports it.
    pub color: bool,
    /// Build sound macros.
    pub sound: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            color: true,
            sound: true,
        }
    }
}

/// Logical name of a catalog entry.
///
/// Indexed roles carry the frame or part number the renderer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MacroRole {
    /// Start of a scroll step: switch to page 2, scroll the ground rows.
    ScrollStart,
    /// End of a scroll step: copy the scrolled rows to page 3.
    ScrollEnd,
    /// As [`Self::ScrollStart`], scrolling the sky too.
    ScrollStartWithClouds,
    /// As [`Self::ScrollEnd`], copying the sky too.
    ScrollEndWithClouds,
    /// Copy the finished frame from page 3 to page 1.
    FrameComplete,
    /// Running frames 0 and 1.
    TrexRunning(u8),
    /// Jumping frames 2, 4, 6, 7 and 8.
    TrexJumping(u8),
    /// Dead frames 0 to 2.
    TrexDead(u8),
    TrexStanding,
    GameOverBanner,
    HighScoreLabel,
    /// Switches the play area rows to double width.
    DoubleWidth,
    /// Cloud part `height * 3 + kind`, 0 to 8.
    CloudPart(u8),
    /// Cactus parts 1 to 11.
    CactusPart(u8),
    GameOverSound,
    JumpSound,
    /// Score sounds 0 and 1.
    ScoreSound(u8),
}

/// Where the play area sits on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub x_indent: i32,
    pub y_indent: i32,
}

impl Layout {
    /// Center the play area on a screen of the given capabilities.
    #[must_use]
    pub fn for_screen(caps: &Capabilities) -> Self {
        Self {
            x_indent: ((i32::from(caps.width) - PLAY_WIDTH * 2) / 4).max(0),
            y_indent: ((i32::from(caps.height) - PLAY_HEIGHT) / 2).max(1),
        }
    }
}

// --- Sprites ---

/// (role, column, height above ground, glyphs)
const TREX_SPRITES: &[(MacroRole, i32, i32, &str)] = &[
    (MacroRole::TrexRunning(0), 3, 0, ":<\x08\x08\x0b/`"),
    (MacroRole::TrexRunning(1), 3, 0, ":<\x08\x08\x0b^\\"),
    (MacroRole::TrexJumping(2), 3, 1, ":<\x08\x08\x0b!|"),
    (MacroRole::TrexJumping(4), 3, 2, ":<\x08\x08\x0b!|"),
    (MacroRole::TrexJumping(6), 3, 3, ":<\x08\x08\x0b!|"),
    (
        MacroRole::TrexJumping(7),
        3,
        4,
        "\x1b[C,\x08\x08\x0b;K\x08\x08\x0b'\"",
    ),
    (MacroRole::TrexJumping(8), 3, 4, ":<\x08\x08\x0b!|"),
    (MacroRole::TrexDead(0), 4, 0, "&"),
    (MacroRole::TrexDead(1), 4, 1, "&"),
    (MacroRole::TrexDead(2), 4, 2, "&"),
    (MacroRole::TrexStanding, 3, 0, ":<\x08\x08\x0b/\\"),
];

/// Cactus parts 1 to 11; `ESC M` (reverse index) stacks glyphs upwards.
const CACTUS_PARTS: [&str; 11] = [
    "w\x08\x1bMW",
    "x\x08\x1bMX",
    "y\x08\x1bMY",
    "z\x08\x1bMZ",
    "n\x08\x1bMg\x08\x1bMa",
    "-\x08\x1bMh",
    "o\x08\x1bMi\x08\x1bMb",
    "p\x08\x1bMj\x08\x1bMc",
    "q\x08\x1bMk\x08\x1bMd",
    "r\x08\x1bMl\x08\x1bMe",
    "s\x08\x1bMm\x08\x1bMf",
];

const CLOUD_BOTTOM: [char; 3] = ['{', '@', '}'];
const CLOUD_TOP: [char; 3] = ['(', '?', ')'];

const GAME_OVER_SOUND: &[u8] = b"\x1b[4;1;1,~\x1b[4;1;0,~\x1b[4;1;1,~";
const JUMP_SOUND: &[u8] = b"\x1b[2;1;3,~";
const SCORE_SOUNDS: [&[u8]; 2] = [b"\x1b[4;1;3,~", b"\x1b[4;2;10,~"];

/// Named macros bound to a probed session.
#[derive(Debug)]
pub struct MacroCatalog<'s, R: Read, W: Write> {
    session: &'s mut DeviceSession<R, W>,
    compiler: MacroCompiler,
    macros: BTreeMap<MacroRole, Macro>,
    layout: Layout,
}

impl<'s, R: Read, W: Write> MacroCatalog<'s, R, W> {
    /// Build every macro for `session`'s terminal.
    ///
    /// # Errors
    ///
    /// Propagates write errors. Storage cleared before the failure is
    /// cleared again when the partial catalog is dropped.
    pub fn build(session: &'s mut DeviceSession<R, W>, preferences: Preferences) -> io::Result<Self> {
        let caps = *session.capabilities();
        let mut catalog = Self {
            session,
            compiler: MacroCompiler::new(caps.macros),
            macros: BTreeMap::new(),
            layout: Layout::for_screen(&caps),
        };

        let span = crate::debug_span!("build_catalog", resident = caps.macros);
        let _guard = span.enter();

        if caps.macros {
            catalog.session.output().write_all(CLEAR_ALL_MACROS)?;
        }
        catalog.build_scrollers()?;
        catalog.build_trex()?;
        catalog.build_labels()?;
        catalog.build_clouds(preferences.color && caps.color)?;
        catalog.build_cactus()?;
        if preferences.sound {
            catalog.build_sounds()?;
        }
        catalog.session.output().flush()?;

        crate::debug!(
            macros = catalog.macros.len(),
            resident = catalog.compiler.next_id(),
            "catalog built"
        );
        Ok(catalog)
    }

    fn define(&mut self, role: MacroRole, payload: &[u8]) -> io::Result<()> {
        let m = self.compiler.compile(self.session.output(), payload)?;
        self.macros.insert(role, m);
        Ok(())
    }

    fn define_with<F>(&mut self, role: MacroRole, build: F) -> io::Result<()>
    where
        F: FnOnce(&mut MacroBuilder) -> std::fmt::Result,
    {
        let m = self.compiler.compile_with(self.session.output(), build)?;
        self.macros.insert(role, m);
        Ok(())
    }

    fn build_scrollers(&mut self) -> io::Result<()> {
        let Layout { x_indent, y_indent } = self.layout;
        let top = y_indent + 2;
        let bottom = y_indent + 8;
        let left = x_indent + 1;
        let right = x_indent + PLAY_WIDTH;

        self.define_with(MacroRole::ScrollStart, |b| {
            write!(b, "\x1b[2 P\x1b[8;10r\x1b['~\x1b[r\x1b[10;{PLAY_WIDTH}H")
        })?;
        self.define_with(MacroRole::ScrollEnd, |b| {
            write!(b, "\x1b[1;1;3;{PLAY_WIDTH};2;{top};{left};3$v")?;
            write!(b, "\x1b[7;1;10;{PLAY_WIDTH};2;{};{left};3$v", top + 3)?;
            b.push_str("\x1b[3 P");
            Ok(())
        })?;
        self.define_with(MacroRole::ScrollStartWithClouds, |b| {
            write!(b, "\x1b[2 P\x1b[1;10r\x1b['~\x1b[r\x1b[10;{PLAY_WIDTH}H")
        })?;
        self.define_with(MacroRole::ScrollEndWithClouds, |b| {
            write!(b, "\x1b[4;1;10;{PLAY_WIDTH};2;{top};{left};3$v")?;
            b.push_str("\x1b[3 P");
            Ok(())
        })?;
        self.define_with(MacroRole::FrameComplete, |b| {
            b.push_str("\x1b[1 P");
            write!(b, "\x1b[{top};{left};{bottom};{right};3;{top};{left};1$v")?;
            write!(b, "\x1b[{};{}H", y_indent + 1, (x_indent + PLAY_WIDTH) * 2 - 6)
        })
    }

    fn build_trex(&mut self) -> io::Result<()> {
        let Layout { x_indent, y_indent } = self.layout;
        for &(role, x, y, sprite) in TREX_SPRITES {
            self.define_with(role, |b| {
                write!(b, "\x1b[{};{}H", y_indent + 7 - y, x_indent + x)?;
                b.push_str(sprite);
                Ok(())
            })?;
        }
        Ok(())
    }

    fn build_labels(&mut self) -> io::Result<()> {
        let Layout { x_indent, y_indent } = self.layout;
        self.define_with(MacroRole::GameOverBanner, |b| {
            let x = (PLAY_WIDTH - 10) / 2 + x_indent + 1;
            let y = y_indent + 3;
            write!(b, "\x1b[{y};{x}HGAME  OVER")?;
            write!(b, "\x1b[{};{}HST", y + 2, x + 4)
        })?;
        self.define_with(MacroRole::HighScoreLabel, |b| {
            write!(b, "\x1b[{};{}HHI ", y_indent + 1, (x_indent + PLAY_WIDTH) * 2 - 15)
        })?;
        self.define_with(MacroRole::DoubleWidth, |b| {
            write!(b, "\x1b[{}H", y_indent + 2)?;
            for _ in 0..7 {
                b.push_str("\x1b#6\n");
            }
            Ok(())
        })
    }

    fn build_clouds(&mut self, using_color: bool) -> io::Result<()> {
        for height in 0..3u8 {
            for kind in 0..3u8 {
                let bottom = CLOUD_BOTTOM[usize::from(kind)];
                let top = CLOUD_TOP[usize::from(kind)];
                self.define_with(MacroRole::CloudPart(height * 3 + kind), |b| {
                    if using_color {
                        b.push_str("\x1b[44m");
                    }
                    write!(
                        b,
                        "\x1b[{};{PLAY_WIDTH}H{bottom}\x08\x1bM\x1bM\x1bM{top}",
                        6 - i32::from(height)
                    )?;
                    if using_color {
                        b.push_str("\x1b[m");
                    }
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn build_cactus(&mut self) -> io::Result<()> {
        for (part, glyphs) in (1u8..).zip(CACTUS_PARTS) {
            self.define(MacroRole::CactusPart(part), glyphs.as_bytes())?;
        }
        Ok(())
    }

    fn build_sounds(&mut self) -> io::Result<()> {
        self.define(MacroRole::GameOverSound, GAME_OVER_SOUND)?;
        self.define(MacroRole::JumpSound, JUMP_SOUND)?;
        for (index, note) in (0u8..).zip(SCORE_SOUNDS) {
            self.define(MacroRole::ScoreSound(index), note)?;
        }
        self.session.output().write_all(SOUND_PRIMER)
    }

    /// Replay `role`. A role that was not built writes nothing.
    ///
    /// Does not flush; the renderer flushes once per frame.
    pub fn replay(&mut self, role: MacroRole) {
        if let Some(m) = self.macros.get(&role) {
            m.replay(self.session.output());
        }
    }

    /// The compiled macro for `role`, if it was built.
    #[must_use]
    pub fn get(&self, role: MacroRole) -> Option<&Macro> {
        self.macros.get(&role)
    }

    /// Built roles with their macros, in role order.
    pub fn iter(&self) -> impl Iterator<Item = (MacroRole, &Macro)> + '_ {
        self.macros.iter().map(|(&role, m)| (role, m))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Number of macros stored in the terminal.
    #[must_use]
    pub fn resident_count(&self) -> u32 {
        self.compiler.next_id()
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The underlying session, e.g. for ad hoc queries between frames.
    pub fn session(&mut self) -> &mut DeviceSession<R, W> {
        &mut *self.session
    }

    /// Flush the output stream.
    ///
    /// # Errors
    ///
    /// Propagates flush errors.
    pub fn flush(&mut self) -> io::Result<()> {
        self.session.output().flush()
    }
}

impl<R: Read, W: Write> Drop for MacroCatalog<'_, R, W> {
    fn drop(&mut self) {
        if self.compiler.supports_resident() {
            let out = self.session.output();
            let _ = out.write_all(CLEAR_ALL_MACROS);
            let _ = out.flush();
        }
    }
}

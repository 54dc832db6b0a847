#![forbid(unsafe_code)]

//! Color assignment and palette save/restore.
//!
//! On a color terminal the renderer wants white-on-black text and a small
//! custom palette (black, white, and a gray-blue for clouds). The terminal's
//! own settings are read back first so they can be put back afterwards.
//!
//! | Step | Sequence |
//! |------|----------|
//! | save assignment | DECRQSS `1,\|` |
//! | force white on black | `CSI 1;7;0 ,\|` (DECAC) |
//! | save color table | DECCTR `CSI 2;2 $ u` |
//! | load game palette | DECRSPS `DCS 2 $ p ... ST` |
//!
//! A [`ColorSession`] does not hold the device: restoring is an explicit
//! [`ColorSession::restore`] so that the macro catalog can keep its borrow of
//! the session in between.

use std::io::{self, Read, Write};

use crate::catalog::Preferences;
use crate::session::DeviceSession;

/// DECRQSS name of the color assignment setting (DECAC).
pub const COLOR_ASSIGNMENT_SETTING: &str = "1,|";

/// Text color 7 on background 0.
const WHITE_ON_BLACK: &[u8] = b"\x1b[1;7;0,|";

/// Entries 0, 7 and 4 as RGB percentages (color space 2).
const GAME_PALETTE: &str = "0;2;32;32;32/7;2;100;100;100/4;2;85;85;85";

/// Loaded on exit when the original table could not be read.
const FALLBACK_PALETTE: &str = "0;2;0;0;0/7;2;47;47;47/4;2;20;20;80";

/// `DCS 2 $ p <table> ST`.
#[must_use]
pub fn restore_palette_sequence(table: &str) -> Vec<u8> {
    format!("\x1bP2$p{table}\x1b\\").into_bytes()
}

/// Saved color state, active only on color terminals with color enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "call restore() to put the terminal's colors back"]
pub struct ColorSession {
    active: bool,
    saved_assignment: String,
    saved_table: String,
}

impl ColorSession {
    /// Save the terminal's colors and switch to the game palette.
    ///
    /// Does nothing (and the returned session restores nothing) unless both
    /// `preferences.color` and the terminal's color capability hold.
    ///
    /// # Errors
    ///
    /// I/O failures only.
    pub fn begin<R: Read, W: Write>(
        session: &mut DeviceSession<R, W>,
        preferences: Preferences,
    ) -> io::Result<Self> {
        let active = preferences.color && session.capabilities().color;
        let mut colors = Self {
            active,
            saved_assignment: String::new(),
            saved_table: String::new(),
        };
        if !active {
            return Ok(colors);
        }

        colors.saved_assignment = session.query_setting(COLOR_ASSIGNMENT_SETTING)?;
        session.send(WHITE_ON_BLACK)?;
        colors.saved_table = session.query_color_table()?;
        session.send(&restore_palette_sequence(GAME_PALETTE))?;
        crate::debug!(
            assignment = %colors.saved_assignment,
            table_len = colors.saved_table.len(),
            "saved colors"
        );
        Ok(colors)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The color assignment as reported before the switch, empty if unknown.
    #[must_use]
    pub fn saved_assignment(&self) -> &str {
        &self.saved_assignment
    }

    /// The color table as reported before the switch, empty if unknown.
    #[must_use]
    pub fn saved_table(&self) -> &str {
        &self.saved_table
    }

    /// Put back the saved assignment and color table.
    ///
    /// A table that could not be read is replaced with a neutral fallback for
    /// the three entries that were changed.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn restore<W: Write + ?Sized>(self, out: &mut W) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        if !self.saved_assignment.is_empty() {
            out.write_all(b"\x1b[")?;
            out.write_all(self.saved_assignment.as_bytes())?;
        }
        let table = if self.saved_table.is_empty() {
            FALLBACK_PALETTE
        } else {
            self.saved_table.as_str()
        };
        out.write_all(&restore_palette_sequence(table))?;
        out.flush()
    }
}

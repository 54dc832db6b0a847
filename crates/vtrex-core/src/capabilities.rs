#![forbid(unsafe_code)]

//! Capability snapshot of a DEC-style terminal.
//!
//! A [`Capabilities`] value is produced once by
//! [`DeviceSession::probe`](crate::session::DeviceSession::probe) and is
//! read-only afterwards. Defaults describe a terminal about which nothing is
//! known: 80x24 and no optional features.
//!
//! # Feature Sources
//!
//! A feature may be signalled either by the conformance level in the DA1
//! reply or by an explicit extension code. Either is sufficient.
//!
//! | Field | DA1 code | Implied by level >= 64 |
//! |-------|----------|------------------------|
//! | `soft_fonts` | 7 (DRCS) | no |
//! | `horizontal_scrolling` | 21 | no |
//! | `color` | 22 | no |
//! | `rectangle_ops` | 28 | yes |
//! | `macros` | 32 (DECDMAC) | yes |
//! | `pages` | - (page 3 DECXCPR probe) | no |
//!
//! # Profiles
//!
//! Predefined snapshots for tests and simulation:
//!
//! | Profile | Description |
//! |---------|-------------|
//! | `vt420()` | Level 4 with soft fonts, scrolling and pages, no color |
//! | `vt525()` | VT420 plus color |
//! | `vt220()` | Level 2 with soft fonts only |
//! | `vt100()` | Nothing beyond the default |

use crate::grammar::{CursorPosition, DeviceAttributes, LEVEL_4_CONFORMANCE};

/// Width assumed when the screen size cannot be discovered.
pub const DEFAULT_WIDTH: u16 = 80;
/// Height assumed when the screen size cannot be discovered.
pub const DEFAULT_HEIGHT: u16 = 24;
/// Row/column the cursor is sent to before asking where it ended up.
pub const PROBE_EXTREME: u16 = 999;

/// DA1 extension codes that map to capabilities.
pub mod feature_codes {
    /// Soft character sets (DRCS).
    pub const SOFT_FONTS: u32 = 7;
    /// Horizontal scrolling.
    pub const HORIZONTAL_SCROLLING: u32 = 21;
    /// ANSI color.
    pub const COLOR: u32 = 22;
    /// Rectangular editing.
    pub const RECTANGLE_OPS: u32 = 28;
    /// Terminal state interrogation / macros.
    pub const MACROS: u32 = 32;
}

/// What the attached terminal can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Screen width in cells.
    pub width: u16,
    /// Screen height in cells.
    pub height: u16,
    /// Soft font (DECDLD) download.
    pub soft_fonts: bool,
    /// Left/right margins and horizontal scrolling.
    pub horizontal_scrolling: bool,
    /// ANSI color.
    pub color: bool,
    /// Rectangular area operations (DECCRA and friends).
    pub rectangle_ops: bool,
    /// Terminal-resident macros (DECDMAC / DECINVM).
    pub macros: bool,
    /// Multiple addressable hardware pages.
    pub pages: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            soft_fonts: false,
            horizontal_scrolling: false,
            color: false,
            rectangle_ops: false,
            macros: false,
            pages: false,
        }
    }
}

impl Capabilities {
    /// A VT420: level 4, DRCS, horizontal scrolling, six pages, monochrome.
    #[must_use]
    pub fn vt420() -> Self {
        Self {
            soft_fonts: true,
            horizontal_scrolling: true,
            rectangle_ops: true,
            macros: true,
            pages: true,
            ..Self::default()
        }
    }

    /// A VT525: everything a VT420 has, plus color.
    #[must_use]
    pub fn vt525() -> Self {
        Self {
            color: true,
            ..Self::vt420()
        }
    }

    /// A VT220: soft fonts, nothing else.
    #[must_use]
    pub fn vt220() -> Self {
        Self {
            soft_fonts: true,
            ..Self::default()
        }
    }

    /// A VT100: defaults only.
    #[must_use]
    pub fn vt100() -> Self {
        Self::default()
    }

    /// Override the screen size.
    #[must_use]
    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Take the screen size from the cursor position reached after moving
    /// to [`PROBE_EXTREME`].
    ///
    /// Each axis is clamped to `1..=PROBE_EXTREME`: a terminal cannot report
    /// a position beyond where it was sent.
    pub fn apply_screen_size(&mut self, position: CursorPosition) {
        self.height = clamp_axis(position.row);
        self.width = clamp_axis(position.column);
    }

    /// Derive feature flags from a DA1 reply.
    ///
    /// Only ever sets flags; a flag already true stays true.
    pub fn apply_device_attributes(&mut self, attrs: &DeviceAttributes) {
        if attrs.level >= LEVEL_4_CONFORMANCE {
            self.rectangle_ops = true;
            self.macros = true;
        }
        for &code in &attrs.features {
            match code {
                feature_codes::SOFT_FONTS => self.soft_fonts = true,
                feature_codes::HORIZONTAL_SCROLLING => self.horizontal_scrolling = true,
                feature_codes::COLOR => self.color = true,
                feature_codes::RECTANGLE_OPS => self.rectangle_ops = true,
                feature_codes::MACROS => self.macros = true,
                _ => {}
            }
        }
    }
}

fn clamp_axis(value: u32) -> u16 {
    // PROBE_EXTREME fits in u16, so the narrowing is lossless.
    value.clamp(1, u32::from(PROBE_EXTREME)) as u16
}

#![forbid(unsafe_code)]

//! Minimum requirements for running the game on a probed terminal.
//!
//! | Check | Bypassed by `yolo` |
//! |-------|--------------------|
//! | soft fonts, horizontal scrolling, rectangle ops, pages | yes |
//! | height >= [`MIN_HEIGHT`] | no |
//! | width >= [`MIN_WIDTH`] | no |
//!
//! Checks run in that order and the first failure is reported.

use std::fmt;

use crate::capabilities::Capabilities;
use crate::catalog::{PLAY_HEIGHT, PLAY_WIDTH};

/// Fewest rows the play area fits in.
pub const MIN_HEIGHT: u16 = PLAY_HEIGHT as u16;
/// Fewest columns the double-width play area fits in.
pub const MIN_WIDTH: u16 = (PLAY_WIDTH * 2) as u16;

/// Why a terminal cannot run the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompatibility {
    /// One or more VT420 features are absent.
    MissingFeatures(Vec<&'static str>),
    /// Fewer than [`MIN_HEIGHT`] rows.
    ScreenTooShort { height: u16 },
    /// Fewer than [`MIN_WIDTH`] columns.
    ScreenTooNarrow { width: u16 },
}

impl Incompatibility {
    /// A follow-up line for the user, if the failure can be overridden.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingFeatures(_) => Some("Try --yolo to bypass the compatibility checks."),
            Self::ScreenTooShort { .. } | Self::ScreenTooNarrow { .. } => None,
        }
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFeatures(_) => {
                write!(f, "VT-Rex requires a VT420-compatible terminal or better.")
            }
            Self::ScreenTooShort { .. } => {
                write!(f, "VT-Rex requires a minimum screen height of {MIN_HEIGHT}.")
            }
            Self::ScreenTooNarrow { .. } => {
                write!(f, "VT-Rex requires a minimum screen width of {MIN_WIDTH}.")
            }
        }
    }
}

impl std::error::Error for Incompatibility {}

/// Names of the required features `caps` lacks.
#[must_use]
pub fn missing_features(caps: &Capabilities) -> Vec<&'static str> {
    [
        (caps.soft_fonts, "soft fonts"),
        (caps.horizontal_scrolling, "horizontal scrolling"),
        (caps.rectangle_ops, "rectangle operations"),
        (caps.pages, "pages"),
    ]
    .into_iter()
    .filter(|&(present, _)| !present)
    .map(|(_, name)| name)
    .collect()
}

/// Decide whether the game can run.
///
/// # Errors
///
/// The first failed check, as [`Incompatibility`].
pub fn check_compatibility(caps: &Capabilities, yolo: bool) -> Result<(), Incompatibility> {
    let missing = missing_features(caps);
    if !missing.is_empty() && !yolo {
        return Err(Incompatibility::MissingFeatures(missing));
    }
    if caps.height < MIN_HEIGHT {
        return Err(Incompatibility::ScreenTooShort {
            height: caps.height,
        });
    }
    if caps.width < MIN_WIDTH {
        return Err(Incompatibility::ScreenTooNarrow { width: caps.width });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vt420_is_compatible() {
        assert_eq!(check_compatibility(&Capabilities::vt420(), false), Ok(()));
    }

    #[test]
    fn vt220_is_not() {
        let err = check_compatibility(&Capabilities::vt220(), false).unwrap_err();
        assert_eq!(
            err,
            Incompatibility::MissingFeatures(vec![
                "horizontal scrolling",
                "rectangle operations",
                "pages"
            ])
        );
        assert_eq!(
            err.to_string(),
            "VT-Rex requires a VT420-compatible terminal or better."
        );
        assert!(err.hint().is_some());
    }

    #[test]
    fn yolo_skips_feature_check_only() {
        assert_eq!(check_compatibility(&Capabilities::vt100(), true), Ok(()));
        let short = Capabilities::vt100().with_size(80, 9);
        assert_eq!(
            check_compatibility(&short, true),
            Err(Incompatibility::ScreenTooShort { height: 9 })
        );
    }

    #[test]
    fn size_limits() {
        let narrow = Capabilities::vt420().with_size(59, 24);
        let err = check_compatibility(&narrow, false).unwrap_err();
        assert_eq!(err, Incompatibility::ScreenTooNarrow { width: 59 });
        assert_eq!(
            err.to_string(),
            "VT-Rex requires a minimum screen width of 60."
        );
        assert_eq!(err.hint(), None);

        let exact = Capabilities::vt420().with_size(60, 10);
        assert_eq!(check_compatibility(&exact, false), Ok(()));
    }

    #[test]
    fn height_checked_before_width() {
        let tiny = Capabilities::vt420().with_size(10, 5);
        assert_eq!(
            check_compatibility(&tiny, false).unwrap_err().to_string(),
            "VT-Rex requires a minimum screen height of 10."
        );
    }
}

#![forbid(unsafe_code)]

//! Command-line argument parsing for the probe.
//!
//! Parses args manually (no external dependencies) to keep the binary lean.
//! Supports environment variable overrides via `VTREX_*` prefix.

use std::env;
use std::process;

use vtrex_core::catalog::Preferences;
use vtrex_core::sim::TerminalProfile;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Frames per second used when `--speed` is absent or invalid.
pub const DEFAULT_SPEED: u32 = 15;
pub const MIN_SPEED: u32 = 1;
pub const MAX_SPEED: u32 = 30;

/// Names accepted by `--simulate`.
pub const SIMULATED_PROFILES: &[&str] = &["vt100", "vt220", "vt420", "vt525", "silent"];

const HELP_TEXT: &str = "\
vtrex-probe - VT420 capability and macro probe

USAGE:
    vtrex-probe [OPTIONS]

OPTIONS:
    --mono               No coloring
    --mute               No sound effects
    --noblink            No blinking effects
    --speed FPS          Initial speed, 1 to 30 (default: 15)
    --yolo               Bypass the feature compatibility check
    --macros             Build the macro catalog and list every macro
    --simulate=PROFILE   Probe a simulated terminal instead of the tty
                         (vt100, vt220, vt420, vt525, silent)
    --help, -h           Show this help message
    --version, -V        Show version

ENVIRONMENT VARIABLES:
    VTREX_MONO           Set to 1 for --mono
    VTREX_MUTE           Set to 1 for --mute
    VTREX_SPEED          Override --speed default
    VTREX_LOG            Log filter directives (default: info)
    VTREX_LOG_FILE       Write logs to this file (no logging if unset)";

/// A numeric option value as typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericArg {
    Parsed(i64),
    Invalid(String),
}

impl NumericArg {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text.trim().parse() {
            Ok(n) => Self::Parsed(n),
            Err(_) => Self::Invalid(text.to_string()),
        }
    }

    /// The value clamped to `min..=max`, or `None` if it did not parse.
    #[must_use]
    pub fn clamped(&self, min: u32, max: u32) -> Option<u32> {
        match self {
            Self::Parsed(n) => {
                let clamped = (*n).clamp(i64::from(min), i64::from(max));
                u32::try_from(clamped).ok()
            }
            Self::Invalid(_) => None,
        }
    }
}

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Use color where the terminal supports it.
    pub color: bool,
    /// Build sound macros.
    pub sound: bool,
    /// Use blinking effects.
    pub blink: bool,
    /// Frames per second, already clamped.
    pub speed: u32,
    /// Bypass the feature check.
    pub yolo: bool,
    /// Build and list the macro catalog.
    pub macros: bool,
    /// Probe this simulated profile instead of the tty.
    pub simulate: Option<String>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            color: true,
            sound: true,
            blink: true,
            speed: DEFAULT_SPEED,
            yolo: false,
            macros: false,
            simulate: None,
        }
    }
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Opts),
    Help,
    Version,
    /// Error message for an unusable command line.
    Invalid(String),
}

impl Opts {
    /// Parse command-line arguments and environment variables.
    ///
    /// Environment variables take precedence over defaults but are overridden
    /// by explicit command-line flags. Prints and exits for help, version
    /// and invalid arguments.
    pub fn parse() -> Self {
        match parse_command(env::args().skip(1), |key| env::var(key).ok()) {
            Command::Run(opts) => opts,
            Command::Help => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Command::Version => {
                println!("vtrex-probe {VERSION}");
                process::exit(0);
            }
            Command::Invalid(message) => {
                eprintln!("vtrex-probe: {message}");
                eprintln!("Try 'vtrex-probe --help' for more information.");
                process::exit(1);
            }
        }
    }

    #[must_use]
    pub fn preferences(&self) -> Preferences {
        Preferences {
            color: self.color,
            sound: self.sound,
        }
    }

    /// The simulated profile named by `--simulate`, if any.
    #[must_use]
    pub fn simulated_profile(&self) -> Option<TerminalProfile> {
        self.simulate.as_deref().and_then(profile_by_name)
    }
}

/// Map a `--simulate` name to its profile.
#[must_use]
pub fn profile_by_name(name: &str) -> Option<TerminalProfile> {
    match name {
        "vt100" => Some(TerminalProfile::vt100()),
        "vt220" => Some(TerminalProfile::vt220()),
        "vt420" => Some(TerminalProfile::vt420()),
        "vt525" => Some(TerminalProfile::vt525()),
        "silent" => Some(TerminalProfile::silent()),
        _ => None,
    }
}

fn env_flag(value: Option<String>) -> bool {
    matches!(value.as_deref().map(str::trim), Some("1" | "true" | "yes"))
}

fn apply_speed(opts: &mut Opts, value: &str) {
    if let Some(speed) = NumericArg::parse(value).clamped(MIN_SPEED, MAX_SPEED) {
        opts.speed = speed;
    }
}

/// Parse `args` (without the program name) with `lookup` for environment variables.
pub fn parse_command<I, F>(args: I, lookup: F) -> Command
where
    I: IntoIterator<Item = String>,
    F: Fn(&str) -> Option<String>,
{
    let mut opts = Opts::default();

    // Apply environment variable defaults first
    if env_flag(lookup("VTREX_MONO")) {
        opts.color = false;
    }
    if env_flag(lookup("VTREX_MUTE")) {
        opts.sound = false;
    }
    if let Some(val) = lookup("VTREX_SPEED") {
        apply_speed(&mut opts, &val);
    }

    // Parse command-line args (override env vars)
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Command::Help,
            "--version" | "-V" => return Command::Version,
            "--mono" => opts.color = false,
            "--mute" => opts.sound = false,
            "--noblink" => opts.blink = false,
            "--yolo" => opts.yolo = true,
            "--macros" => opts.macros = true,
            "--speed" => match args.next() {
                Some(val) => apply_speed(&mut opts, &val),
                None => return Command::Invalid("option '--speed' requires a value".into()),
            },
            other => {
                if let Some(val) = other.strip_prefix("--speed=") {
                    apply_speed(&mut opts, val);
                } else if let Some(name) = other.strip_prefix("--simulate=") {
                    if profile_by_name(name).is_none() {
                        return Command::Invalid(format!(
                            "unknown profile '{name}' (expected one of: {})",
                            SIMULATED_PROFILES.join(", ")
                        ));
                    }
                    opts.simulate = Some(name.to_string());
                } else {
                    return Command::Invalid(format!("unrecognized option '{other}'"));
                }
            }
        }
    }

    Command::Run(opts)
}

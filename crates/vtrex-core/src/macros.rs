#![forbid(unsafe_code)]

//! Macro compiler.
//!
//! Turns a fragment of output into a [`Macro`]: either the literal bytes, or
//! a reference to a copy stored in the terminal (DECDMAC) that is replayed
//! with a short invocation (DECINVM).
//!
//! # Compilation Rule
//!
//! | Condition | Result |
//! |-----------|--------|
//! | terminal has no macro storage | [`Macro::Literal`] |
//! | payload is at most [`LITERAL_THRESHOLD`] bytes | [`Macro::Literal`] |
//! | otherwise | definition written now, [`Macro::Resident`] returned |
//!
//! Short payloads stay literal because `CSI id * z` is already five bytes
//! or more.
//!
//! # Wire Format
//!
//! ```text
//! define:  DCS id ; 0 ; 1 ! z <hex> ST    (delete old id, hex encoding)
//! invoke:  CSI id * z
//! clear:   DCS 0 ; 1 ; 0 ! z ST           (delete all macros)
//! ```

use std::fmt;
use std::io::{self, Write};

/// Payloads of this many bytes or fewer are never made resident.
pub const LITERAL_THRESHOLD: usize = 5;

/// Deletes every macro stored in the terminal.
pub const CLEAR_ALL_MACROS: &[u8] = b"\x1bP0;1;0!z\x1b\\";

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// A compiled fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Macro {
    /// Replayed by writing the bytes verbatim.
    Literal(Vec<u8>),
    /// Replayed by invoking the stored macro with this id.
    Resident(u32),
}

impl Macro {
    /// Write the macro's replay form to `out`.
    ///
    /// Write errors are discarded: replay happens on the render path, where
    /// a failed frame is not actionable.
    pub fn replay<W: Write + ?Sized>(&self, out: &mut W) {
        let _ = self.write_to(out);
    }

    /// Write the replay form, reporting write errors.
    ///
    /// # Errors
    ///
    /// Propagates errors from `out`.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Self::Literal(bytes) => out.write_all(bytes),
            Self::Resident(id) => write!(out, "\x1b[{id}*z"),
        }
    }

    #[must_use]
    pub fn is_resident(&self) -> bool {
        matches!(self, Self::Resident(_))
    }

    /// Number of bytes one replay writes.
    #[must_use]
    pub fn replay_len(&self) -> usize {
        match self {
            Self::Literal(bytes) => bytes.len(),
            Self::Resident(id) => invocation(*id).len(),
        }
    }
}

/// `CSI id * z`.
#[must_use]
pub fn invocation(id: u32) -> Vec<u8> {
    format!("\x1b[{id}*z").into_bytes()
}

/// `DCS id ; 0 ; 1 ! z <hex> ST`.
#[must_use]
pub fn definition(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut seq = format!("\x1bP{id};0;1!z").into_bytes();
    seq.extend_from_slice(encode_hex(payload).as_bytes());
    seq.extend_from_slice(b"\x1b\\");
    seq
}

/// Uppercase hex, high nibble first, two digits per byte.
#[must_use]
pub fn encode_hex(payload: &[u8]) -> String {
    let mut hex = String::with_capacity(payload.len() * 2);
    for &b in payload {
        hex.push(char::from(HEX_DIGITS[usize::from(b >> 4)]));
        hex.push(char::from(HEX_DIGITS[usize::from(b & 0x0f)]));
    }
    hex
}

/// Inverse of [`encode_hex`]. Accepts either letter case.
///
/// Returns `None` for odd lengths or non-hex digits.
#[must_use]
pub fn decode_hex(hex: &[u8]) -> Option<Vec<u8>> {
    if !hex.len().is_multiple_of(2) {
        return None;
    }
    hex.chunks_exact(2)
        .map(|pair| Some((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

/// Accumulates a payload from formatted text and raw bytes.
///
/// ```
/// use std::fmt::Write as _;
/// use vtrex_core::macros::MacroBuilder;
///
/// let mut b = MacroBuilder::new();
/// write!(b, "\x1b[{};{}H", 3, 7).unwrap();
/// b.push_bytes(b":<");
/// assert_eq!(b.as_bytes(), b"\x1b[3;7H:<");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MacroBuilder {
    bytes: Vec<u8>,
}

impl MacroBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn push_str(&mut self, text: &str) -> &mut Self {
        self.push_bytes(text.as_bytes())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Write for MacroBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

/// Compiles payloads and allocates resident ids.
///
/// Ids start at 0 and are never reused by one compiler.
#[derive(Debug)]
pub struct MacroCompiler {
    resident: bool,
    next_id: u32,
}

impl MacroCompiler {
    /// A compiler that makes long payloads resident iff `macros_supported`.
    #[must_use]
    pub fn new(macros_supported: bool) -> Self {
        Self {
            resident: macros_supported,
            next_id: 0,
        }
    }

    /// Whether payloads can be made resident at all.
    #[must_use]
    pub fn supports_resident(&self) -> bool {
        self.resident
    }

    /// The id the next resident macro will get.
    #[must_use]
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Compile `payload`, writing its definition to `out` if it becomes resident.
    ///
    /// # Errors
    ///
    /// Propagates errors writing the definition. The id is consumed even
    /// then.
    pub fn compile<W: Write + ?Sized>(&mut self, out: &mut W, payload: &[u8]) -> io::Result<Macro> {
        if !self.resident || payload.len() <= LITERAL_THRESHOLD {
            return Ok(Macro::Literal(payload.to_vec()));
        }
        let id = self.next_id;
        self.next_id += 1;
        crate::trace!(id, len = payload.len(), "define macro");
        out.write_all(&definition(id, payload))?;
        Ok(Macro::Resident(id))
    }

    /// Build a payload with `build` and compile it.
    ///
    /// # Errors
    ///
    /// Propagates errors writing the definition. A formatting error in
    /// `build` surfaces as [`io::ErrorKind::Other`].
    pub fn compile_with<W, F>(&mut self, out: &mut W, build: F) -> io::Result<Macro>
    where
        W: Write + ?Sized,
        F: FnOnce(&mut MacroBuilder) -> fmt::Result,
    {
        let mut builder = MacroBuilder::new();
        build(&mut builder).map_err(io::Error::other)?;
        self.compile(out, builder.as_bytes())
    }
}

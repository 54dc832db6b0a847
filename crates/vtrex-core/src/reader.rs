#![forbid(unsafe_code)]

//! Blocking single-byte response reader.
//!
//! Reads terminal replies one byte at a time until a caller-chosen final
//! byte arrives. There is no timeout: a read only returns once the
//! terminator is seen (or the source reaches end of input). Callers that
//! are unsure whether the terminal will answer must arrange for *some*
//! terminator to be sent; see [`crate::query`].
//!
//! Software flow control bytes (XON `0x11`, XOFF `0x13`) can be injected by
//! a terminal or line at any point. They are dropped before anything else
//! looks at the byte.

use std::io::{self, ErrorKind, Read};

/// Escape introducer.
pub const ESC: u8 = 0x1b;
/// DC1 / XON.
pub const XON: u8 = 0x11;
/// DC3 / XOFF.
pub const XOFF: u8 = 0x13;

/// Bytes captured for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    /// Everything read, flow-control bytes removed, terminator included.
    pub bytes: Vec<u8>,
    /// Offset of the most recent `ESC` in `bytes`, when tracked.
    pub last_escape: Option<usize>,
    /// Whether the terminator was seen (false only at end of input).
    pub terminated: bool,
}

/// Reads replies from a byte source.
#[derive(Debug)]
pub struct ResponseReader<R> {
    input: R,
}

impl<R: Read> ResponseReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Read until `terminator` is the most recently read byte.
    ///
    /// When `track_escape` is set the offset of the last `ESC` is recorded in
    /// the returned [`Capture`].
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the source other than `Interrupted`.
    pub fn read_until(&mut self, terminator: u8, track_escape: bool) -> io::Result<Capture> {
        let mut capture = Capture::default();
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => {
                    crate::debug!(
                        captured = capture.bytes.len(),
                        "input ended before terminator"
                    );
                    return Ok(capture);
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            let ch = byte[0];
            if ch == XON || ch == XOFF {
                continue;
            }
            if track_escape && ch == ESC {
                capture.last_escape = Some(capture.bytes.len());
            }
            capture.bytes.push(ch);
            if ch == terminator {
                capture.terminated = true;
                return Ok(capture);
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(input: &[u8], terminator: u8, track: bool) -> Capture {
        ResponseReader::new(input).read_until(terminator, track).unwrap()
    }

    #[test]
    fn stops_at_terminator() {
        let cap = read(b"\x1b[24;80Rleftover", b'R', false);
        assert_eq!(cap.bytes, b"\x1b[24;80R");
        assert!(cap.terminated);
        assert_eq!(cap.last_escape, None);
    }

    #[test]
    fn leaves_unread_bytes_in_source() {
        let mut reader = ResponseReader::new(&b"\x1b[?1;2c\x1b[5;5R"[..]);
        let first = reader.read_until(b'c', false).unwrap();
        assert_eq!(first.bytes, b"\x1b[?1;2c");
        let second = reader.read_until(b'R', false).unwrap();
        assert_eq!(second.bytes, b"\x1b[5;5R");
    }

    #[test]
    fn filters_flow_control_everywhere() {
        let cap = read(b"\x11\x1b[\x1324;\x1180\x13R", b'R', false);
        assert_eq!(cap.bytes, b"\x1b[24;80R");
    }

    #[test]
    fn flow_control_never_terminates() {
        // XOFF as terminator can't happen: it is dropped first.
        let cap = read(b"ab\x13cd", XOFF, false);
        assert_eq!(cap.bytes, b"abcd");
        assert!(!cap.terminated);
    }

    #[test]
    fn tracks_last_escape() {
        let cap = read(b"\x1b[?112;2$y\x1b[1;1R", b'R', true);
        assert_eq!(cap.last_escape, Some(10));
        assert_eq!(&cap.bytes[..10], b"\x1b[?112;2$y");
    }

    #[test]
    fn escape_offset_ignores_filtered_bytes() {
        let cap = read(b"\x11\x11\x1b[c", b'c', true);
        assert_eq!(cap.last_escape, Some(0));
    }

    #[test]
    fn end_of_input_returns_partial() {
        let cap = read(b"\x1b[24;8", b'R', false);
        assert_eq!(cap.bytes, b"\x1b[24;8");
        assert!(!cap.terminated);
    }

    #[test]
    fn empty_input() {
        let cap = read(b"", b'c', true);
        assert!(cap.bytes.is_empty());
        assert_eq!(cap.last_escape, None);
    }

    #[test]
    fn retries_interrupted_reads() {
        struct Flaky {
            data: Vec<u8>,
            pos: usize,
            interrupted: bool,
        }
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(io::Error::from(ErrorKind::Interrupted));
                }
                if self.pos >= self.data.len() {
                    return Ok(0);
                }
                buf[0] = self.data[self.pos];
                self.pos += 1;
                Ok(1)
            }
        }
        let flaky = Flaky {
            data: b"\x1b[?6c".to_vec(),
            pos: 0,
            interrupted: false,
        };
        let cap = ResponseReader::new(flaky).read_until(b'c', false).unwrap();
        assert_eq!(cap.bytes, b"\x1b[?6c");
    }

    #[test]
    fn propagates_other_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(ErrorKind::BrokenPipe))
            }
        }
        let err = ResponseReader::new(Broken).read_until(b'c', false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }
}

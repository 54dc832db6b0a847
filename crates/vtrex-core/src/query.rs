#![forbid(unsafe_code)]

//! Disambiguating request/reply engine.
//!
//! The channel to the terminal is half-duplex and has no framing. A request
//! the terminal does not implement simply produces no reply, and the reader
//! has no timeout, so asking an unsupported question would block forever.
//!
//! For requests that may go unanswered the engine appends a second request
//! that every terminal answers, chosen so that its reply ends in a
//! *different* final byte than the primary reply:
//!
//! | Primary final | Fallback request | Fallback final |
//! |---------------|------------------|----------------|
//! | `R`           | DA1 `CSI c`      | `c`            |
//! | anything else | DSR-CPR `CSI 6 n`| `R`            |
//!
//! The reader then waits for the fallback's final byte. Replies arrive in
//! request order, so the fallback reply is the last escape-introduced
//! sequence in the capture; cutting at the last `ESC` leaves exactly the
//! primary reply, or nothing if the terminal stayed silent.
//!
//! This only works while no primary reply shares a final byte with its
//! fallback and no terminal echoes requests back. Both hold for the fixed
//! set of requests issued by [`crate::session`].

use std::io::{self, Read, Write};

use crate::grammar::{Grammar, Reply};
use crate::reader::{Capture, ResponseReader};

/// Primary device attributes request.
pub const DA1_REQUEST: &[u8] = b"\x1b[c";
/// Cursor position report request.
pub const CPR_REQUEST: &[u8] = b"\x1b[6n";

/// Result of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The terminal did not answer, or the answer did not match the grammar.
    NoReply,
    /// The reply matched in full.
    Matched(Match),
}

/// An owned, fully matched reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// The reply bytes (flow control removed, fallback reply cut off).
    pub captured: Vec<u8>,
    /// Typed fields.
    pub reply: Reply,
}

impl QueryOutcome {
    #[must_use]
    pub fn is_no_reply(&self) -> bool {
        matches!(self, Self::NoReply)
    }

    /// The typed reply, if any.
    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Self::NoReply => None,
            Self::Matched(m) => Some(&m.reply),
        }
    }

    #[must_use]
    pub fn into_reply(self) -> Option<Reply> {
        match self {
            Self::NoReply => None,
            Self::Matched(m) => Some(m.reply),
        }
    }
}

/// The always-answered request used to bound a reply with final byte `terminator`.
#[must_use]
pub fn fallback_for(terminator: u8) -> (&'static [u8], u8) {
    if terminator == b'R' {
        (DA1_REQUEST, b'c')
    } else {
        (CPR_REQUEST, b'R')
    }
}

/// Owns both directions of the channel and runs queries over them.
#[derive(Debug)]
pub struct QueryEngine<R, W> {
    reader: ResponseReader<R>,
    output: W,
}

impl<R: Read, W: Write> QueryEngine<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            reader: ResponseReader::new(input),
            output,
        }
    }

    /// Send `request` and decode its reply as `grammar`.
    ///
    /// With `may_not_work`, a fallback request is sent straight after and its
    /// reply is discarded, so a silent terminal yields
    /// [`QueryOutcome::NoReply`] instead of a hang.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for I/O failures on either stream. Silence and
    /// garbage are reported as `Ok(QueryOutcome::NoReply)`.
    pub fn query(
        &mut self,
        request: &[u8],
        grammar: Grammar,
        may_not_work: bool,
    ) -> io::Result<QueryOutcome> {
        self.output.write_all(request)?;
        let mut terminator = grammar.terminator();
        if may_not_work {
            let (fallback, fallback_final) = fallback_for(terminator);
            self.output.write_all(fallback)?;
            terminator = fallback_final;
        }
        self.output.flush()?;

        let capture = self.reader.read_until(terminator, may_not_work)?;
        let captured = primary_reply(capture, may_not_work);
        let outcome = match grammar.parse(&captured) {
            Some(reply) => QueryOutcome::Matched(Match { captured, reply }),
            None => QueryOutcome::NoReply,
        };

        crate::debug!(
            request = %crate::logging::escape_bytes(request),
            grammar = grammar.name(),
            may_not_work,
            matched = !outcome.is_no_reply(),
            "query"
        );
        Ok(outcome)
    }

    /// The output stream, for writing non-query sequences.
    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    /// Write and flush a sequence that expects no reply.
    ///
    /// # Errors
    ///
    /// Propagates write or flush errors.
    pub fn send(&mut self, sequence: &[u8]) -> io::Result<()> {
        self.output.write_all(sequence)?;
        self.output.flush()
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader.into_inner(), self.output)
    }
}

/// Strip the fallback reply (everything from the last `ESC`) when one was requested.
fn primary_reply(capture: Capture, fallback_sent: bool) -> Vec<u8> {
    let mut bytes = capture.bytes;
    if fallback_sent {
        bytes.truncate(capture.last_escape.unwrap_or(0));
    }
    bytes
}

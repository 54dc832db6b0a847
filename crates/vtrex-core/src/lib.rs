#![forbid(unsafe_code)]

//! Core: VT420 capability negotiation, response grammars, and resident macros.

pub mod capabilities;
pub mod catalog;
pub mod compat;
pub mod grammar;
pub mod logging;
pub mod macros;
pub mod palette;
pub mod query;
pub mod reader;
pub mod session;
pub mod sim;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};

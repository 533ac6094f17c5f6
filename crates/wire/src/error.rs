//! Errors that can occur while framing or decoding worker messages.
//!
//! Per §7 ("No error is raised across the event-loop boundary"), nothing in
//! this crate is meant to propagate as a `Result` into a Worker Session
//! handler — the [`Framer`](crate::framer::Framer) turns every variant here
//! into an `Eof` event before the loop ever sees it. `ProtocolError` exists
//! for the narrower boundary of a single read/write call.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
}

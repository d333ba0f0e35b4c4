//! Error taxonomy for the offline core.
//!
//! `TransportMalformed` is the only fatal kind: the engine answered with
//! something that is not a response. Everything else is an expected,
//! user-recoverable outcome and must reach the caller as an actionable
//! message, never as a panic.

use crate::store::records::Kind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The engine response could not be parsed (or the engine could not be
    /// reached at all). Unrecoverable for the current operation.
    #[error("engine transport malformed: {0}")]
    TransportMalformed(String),

    /// The engine reported a structured `{"error": ...}` payload.
    #[error("{0}")]
    Domain(String),

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: Kind, name: String },

    #[error("typed name {typed:?} does not match {name:?}")]
    ConfirmationMismatch { name: String, typed: String },

    #[error("not imported: {0}")]
    Import(String),

    #[error("{0} faces is not a fair die, expected one of 2, 4, 6, 8, 12, 20")]
    UnsupportedFaceCount(u32),

    /// A scanned frame did not extend the payload being merged. The caller
    /// should ask for another scan; accumulated frames are kept.
    #[error("frame does not extend the current payload, scan again")]
    FrameParseRetry,

    #[error("got {0} but launch must be from 1 to {1} included")]
    LaunchOutOfRange(u32, u32),

    #[error("dice session has {have} of {need} launches")]
    SessionIncomplete { have: usize, need: usize },

    #[error("payload needs {0} frames but at most 16 fit in a structured set")]
    TooManyFrames(usize),

    #[error("{0:?} is not a known network")]
    UnknownNetwork(String),

    #[error("bad {encoding} payload: {reason}")]
    BadEncoding { encoding: String, reason: String },

    #[error("artifact {0:?} not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_actionable() {
        let e = Error::ConfirmationMismatch { name: "cold".into(), typed: "Cold".into() };
        assert_eq!(e.to_string(), "typed name \"Cold\" does not match \"cold\"");

        let e = Error::UnsupportedFaceCount(10);
        assert!(e.to_string().contains("2, 4, 6, 8, 12, 20"));

        let e = Error::LaunchOutOfRange(21, 20);
        assert_eq!(e.to_string(), "got 21 but launch must be from 1 to 20 included");
    }
}

//! Error Types
//!
//! One error enum for the whole crate. Every variant except
//! `ResourceCloseFailure` propagates to the immediate caller; close
//! failures are only ever logged.

use crate::reader::events::TokenKind;
use std::io;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by streams, splitters and output sessions
#[derive(Debug, Error)]
pub enum Error {
    /// A split path could not be resolved against the input
    #[error("could not traverse to {path}")]
    PathNotFound { path: String },

    /// The token source hit something that is not well-formed XML
    #[error("malformed input at byte {position}: {message}")]
    MalformedInput { message: String, position: usize },

    /// The dispatch table has no write handler for this token kind
    #[error("unsupported token kind: {0}")]
    UnsupportedTokenKind(TokenKind),

    /// An operation was called out of order
    #[error("session misuse: {0}")]
    SessionMisuse(&'static str),

    /// A lock waiter was woken because the session was closed
    #[error("interrupted while waiting for the output lock")]
    LockInterrupted,

    /// Closing a sink or writer failed
    #[error("failed to close {resource}: {source}")]
    ResourceCloseFailure {
        resource: &'static str,
        #[source]
        source: io::Error,
    },

    /// Split path is blank or uses something other than plain element names
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Encoding label is not one we can read or write
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn malformed(message: impl Into<String>, position: usize) -> Self {
        Error::MalformedInput {
            message: message.into(),
            position,
        }
    }

    /// Short atom-friendly name of the error kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::PathNotFound { .. } => "path_not_found",
            Error::MalformedInput { .. } => "malformed_input",
            Error::UnsupportedTokenKind(_) => "unsupported_token_kind",
            Error::SessionMisuse(_) => "session_misuse",
            Error::LockInterrupted => "lock_interrupted",
            Error::ResourceCloseFailure { .. } => "resource_close_failure",
            Error::InvalidPath(_) => "invalid_path",
            Error::UnsupportedEncoding(_) => "unsupported_encoding",
            Error::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::PathNotFound {
            path: "/a/b".to_string(),
        };
        assert_eq!(err.to_string(), "could not traverse to /a/b");

        let err = Error::UnsupportedTokenKind(TokenKind::NotationDeclaration);
        assert_eq!(err.to_string(), "unsupported token kind: NotationDeclaration");
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(Error::LockInterrupted.kind_name(), "lock_interrupted");
        assert_eq!(Error::malformed("eof", 3).kind_name(), "malformed_input");
    }
}

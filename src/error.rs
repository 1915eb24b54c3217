//! Error types for the IRC client library.
//!
//! This module defines error types for wire-line parsing failures and
//! for fallible client operations.

use thiserror::Error;

/// Convenience type alias for Results using [`ClientError`].
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors encountered when parsing a wire line into an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The line was empty.
    #[error("empty line")]
    EmptyLine,

    /// A tags or prefix segment had no following space.
    #[error("incomplete packet")]
    Incomplete,

    /// The prefix contained `!` but the user/host split was malformed.
    #[error("invalid user@host format")]
    BadUserHost,
}

/// Errors returned from public client operations.
///
/// All of these are recoverable by the caller; none of them indicate that
/// the client itself is in a broken state (a [`ClientError::Destroyed`]
/// client is simply gone).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The operation requires a connection, but there is none.
    #[error("no connection")]
    NoConnection,

    /// The target has already been added to the client.
    #[error("target already added")]
    TargetAlreadyAdded,

    /// Another target with the same kind and name exists.
    #[error("target name and kind match existing target")]
    TargetConflict,

    /// The target is not part of the client's target list.
    #[error("target not found")]
    TargetNotFound,

    /// The status target cannot be removed.
    #[error("cannot remove status target")]
    TargetIsStatus,

    /// The client has been destroyed and accepts no further operations.
    #[error("client destroyed")]
    Destroyed,

    /// I/O error while dialing or tearing down a connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", ParseError::EmptyLine), "empty line");
        assert_eq!(format!("{}", ClientError::NoConnection), "no connection");
        assert_eq!(
            format!("{}", ClientError::TargetIsStatus),
            "cannot remove status target"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ClientError = io_err.into();
        match err {
            ClientError::Io(_) => {}
            _ => panic!("Expected Io variant"),
        }
    }
}

//! Error types for the monitor crate

use std::io;
use thiserror::Error;

/// Errors that can occur while relaying logs to a monitor client
#[derive(Error, Debug)]
pub enum MonitorError {
    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (malformed messages)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Relay buffer must hold at least one frame
    #[error("invalid buffer capacity: {capacity} (must be greater than 0)")]
    InvalidCapacity { capacity: usize },

    /// Monitor request named a level that does not exist
    #[error("unknown log level: {level}")]
    UnknownLevel { level: String },

    /// Terminal error envelope received from the server
    #[error("remote error (code {code:?}): {message}")]
    Remote { code: Option<i64>, message: String },
}

impl MonitorError {
    /// Whether the error says the peer or the connection is already gone
    ///
    /// Matches end-of-stream and the usual closed-connection kinds, then falls
    /// back to looking for "closed" in the description.
    pub fn is_benign(&self) -> bool {
        if let MonitorError::Io(e) = self
            && matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::WriteZero
            )
        {
            return true;
        }
        self.to_string().contains("closed")
    }
}

/// Result type for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_is_benign() {
        let err = MonitorError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(err.is_benign());
    }

    #[test]
    fn test_broken_pipe_is_benign() {
        let err = MonitorError::Io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_benign());
    }

    #[test]
    fn test_closed_description_is_benign() {
        let err = MonitorError::Io(io::Error::other("use of closed network connection"));
        assert!(err.is_benign());

        let err = MonitorError::Protocol("stream closed".into());
        assert!(err.is_benign());
    }

    #[test]
    fn test_other_errors_are_not_benign() {
        let err = MonitorError::Io(io::Error::other("disk quota exceeded"));
        assert!(!err.is_benign());

        let err = MonitorError::Protocol("message too large".into());
        assert!(!err.is_benign());
    }

    #[test]
    fn test_remote_error_display() {
        let err = MonitorError::Remote {
            code: Some(500),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "remote error (code Some(500)): boom");
    }
}

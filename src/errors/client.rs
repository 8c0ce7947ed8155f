use std::time::Duration;

use thiserror::Error;

use super::{ConfigValidationError, ExceptionCode, FrameError, TransportError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Transaction timeout after {elapsed:?}, limit was {limit:?}")]
    Timeout { elapsed: Duration, limit: Duration },

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Device exception: {code} in reply to function {function:#04X}")]
    Exception { function: u8, code: ExceptionCode },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),
}

/// Stable tag for every error the client can surface. Log consumers and
/// callers match on this rather than on the nested error structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotConnected,
    Transport,
    Timeout,
    Crc,
    Protocol,
    Exception,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid-argument",
            Self::NotConnected => "not-connected",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Crc => "crc",
            Self::Protocol => "protocol",
            Self::Exception => "exception",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    pub fn invalid_argument(details: impl Into<String>) -> Self {
        Self::InvalidArgument(details.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Frame(FrameError::Crc { .. }) => ErrorKind::Crc,
            Self::Frame(_) => ErrorKind::Protocol,
            Self::Exception { .. } => ErrorKind::Exception,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the transaction engine may try again after this error.
    ///
    /// Exceptions are definitive answers from the device and never retried;
    /// argument and connection-state errors are caller mistakes.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::Timeout | ErrorKind::Crc | ErrorKind::Protocol
        )
    }
}

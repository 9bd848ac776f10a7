//! Error types for the client core.
//!
//! Every failure a caller can observe travels through [`ClientError`]:
//! encode and decode failures share the channel with transport failures, so
//! a bridged future has exactly one error to inspect. Nothing in this crate
//! retries; [`ClientError::is_retriable`] is a hint for the caller.

use thiserror::Error;
use tonic::{Code, Status};

/// Client-side error conditions.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Malformed request built by the caller (e.g. a compare on an empty key).
    ///
    /// Never retried. Raised at construction time where possible, otherwise
    /// through an immediately-failed future.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The underlying RPC failed. The transport status is kept unmodified.
    #[error("transport failure: {0}")]
    Transport(#[from] Status),

    /// The server answered with a tag or enum value outside the closed set
    /// this client understands. Indicates a client/server contract mismatch.
    #[error("protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// The snapshot stream ended with an error. Delivered once to the
    /// installed snapshot callback.
    #[error("snapshot stream terminated: {status}")]
    StreamTerminated { status: Status },

    /// The bridged call was cancelled by the caller.
    #[error("call cancelled")]
    Cancelled,

    /// The client's callback context stopped before the call resolved.
    #[error("callback context shut down")]
    ContextShutdown,

    /// The callback context thread could not be started.
    #[error("callback context failed to start: {message}")]
    ContextStart { message: String },

    /// Building the transport channel failed.
    #[error("connect failed: {message}")]
    Connect { message: String },
}

impl ClientError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a ProtocolViolation error.
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// gRPC code of a transport or stream failure, if this is one.
    pub fn status_code(&self) -> Option<Code> {
        match self {
            Self::Transport(status) | Self::StreamTerminated { status } => Some(status.code()),
            _ => None,
        }
    }

    /// Check if a caller may reasonably retry the operation.
    ///
    /// Only an unavailable transport qualifies; the core never acts on this.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(status) if status.code() == Code::Unavailable)
    }

    /// Check if this error is the caller's own fault.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

/// Result type using ClientError.
pub type ClientResult<T> = Result<T, ClientError>;

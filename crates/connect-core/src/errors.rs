use thiserror::Error;

use crate::protocol::ProtocolError;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the dispatch/session engine.
///
/// Device *rejection* (a negative result from firmware, e.g. a signature
/// that did not verify) is deliberately not here: it is a normal
/// [`Response`](crate::types::Response) with `success: false`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Another call is non-terminal; calls never queue
    #[error("Device is busy with another call")]
    Busy,

    /// Method name not in the registry
    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    /// Method known but parameter shape is wrong
    #[error("Invalid parameters: {reason}")]
    InvalidParams { reason: String },

    /// Interaction response out of sequence or of the wrong kind
    #[error("State mismatch: {reason}")]
    StateMismatch { reason: String },

    /// Channel to the device failed; the session is Disconnected and a new
    /// `init_transport` is required
    #[error("Transport lost: {reason}")]
    TransportLost { reason: String },

    /// Explicit teardown while the call was in flight
    #[error("Call cancelled")]
    Cancelled,

    /// The configured overall call deadline fired
    #[error("Call timed out after {ms} ms")]
    Timeout { ms: u64 },

    /// Message envelope could not be encoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CoreError {
    /// Stable error code used in terminal response events
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Busy => "Busy",
            CoreError::UnknownMethod { .. } => "UnknownMethod",
            CoreError::InvalidParams { .. } => "InvalidParams",
            CoreError::StateMismatch { .. } => "StateMismatch",
            CoreError::TransportLost { .. } => "TransportLost",
            CoreError::Cancelled => "Cancelled",
            CoreError::Timeout { .. } => "Timeout",
            CoreError::Protocol(_) => "Protocol",
        }
    }

    /// True for errors the caller provoked (never retried by the engine,
    /// and never attributed to the device or channel)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CoreError::Busy
                | CoreError::UnknownMethod { .. }
                | CoreError::InvalidParams { .. }
                | CoreError::StateMismatch { .. }
        )
    }

    pub(crate) fn transport_lost(reason: impl Into<String>) -> Self {
        CoreError::TransportLost {
            reason: reason.into(),
        }
    }

    pub(crate) fn state_mismatch(reason: impl Into<String>) -> Self {
        CoreError::StateMismatch {
            reason: reason.into(),
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier of one live device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one call, unique within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle phase of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Uninitialized,
    Connecting,
    Ready,
    Busy,
    Disconnected,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Uninitialized => write!(f, "Uninitialized"),
            SessionPhase::Connecting => write!(f, "Connecting"),
            SessionPhase::Ready => write!(f, "Ready"),
            SessionPhase::Busy => write!(f, "Busy"),
            SessionPhase::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// State of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Issued to the device, awaiting its next message
    Pending,
    /// Suspended on a device-initiated interaction request
    AwaitingInteraction,
    Completed,
    Failed,
}

/// What kind of input the device is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Pin,
    Passphrase,
    ButtonConfirm,
    Other,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::Pin => write!(f, "pin"),
            InteractionKind::Passphrase => write!(f, "passphrase"),
            InteractionKind::ButtonConfirm => write!(f, "button-confirm"),
            InteractionKind::Other => write!(f, "other"),
        }
    }
}

/// A device-initiated pause asking the host for input.
///
/// Exists only while its parent call is [`CallState::AwaitingInteraction`];
/// resolved by exactly one matching [`InteractionAnswer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub call_id: CallId,
    pub kind: InteractionKind,
    /// Prompt metadata for the responder (device-defined, opaque here)
    pub prompt: Value,
}

/// The host's answer to an [`InteractionRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionAnswer {
    pub kind: InteractionKind,
    pub value: Value,
}

impl InteractionAnswer {
    pub fn new(kind: InteractionKind, value: impl Into<Value>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Error half of a failed [`Response`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// Terminal value of one call, delivered exactly once to the caller.
///
/// `success: false` with an error is a *normal* outcome: it is how the
/// device reports e.g. a signature that did not verify. Channel and caller
/// failures surface as [`CoreError`](crate::errors::CoreError) instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Successful device result carrying its payload
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Negative device result (or synthesized terminal failure)
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(ResponseError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

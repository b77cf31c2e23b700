//! Device protocol message envelopes.
//!
//! Every frame carries a big-endian u16 message kind followed by a JSON
//! payload. The engine only ever looks at these envelopes; the `payload`
//! and `prompt` values inside them are opaque device data passed through
//! untouched. Host→device and device→host kinds are disjoint ranges so a
//! reflected frame can never be mistaken for a reply.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::InteractionKind;

/// Errors raised while encoding or decoding protocol envelopes
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame shorter than the kind header
    #[error("Truncated frame ({0} bytes)")]
    Truncated(usize),

    /// Kind code not part of the protocol
    #[error("Unknown message kind 0x{0:04x}")]
    UnknownKind(u16),

    /// Kind valid but flowing in the wrong direction
    #[error("Unexpected message kind 0x{0:04x} for this direction")]
    UnexpectedKind(u16),

    /// Payload is not the JSON shape the kind requires
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Wire codes. Host→device kinds live below 0x8000, device→host above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageKind {
    Initialize = 0x0001,
    MethodCall = 0x0002,
    InteractionAnswer = 0x0003,
    Cancel = 0x0004,
    Success = 0x8001,
    Failure = 0x8002,
    InteractionRequest = 0x8003,
}

impl MessageKind {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(MessageKind::Initialize),
            0x0002 => Some(MessageKind::MethodCall),
            0x0003 => Some(MessageKind::InteractionAnswer),
            0x0004 => Some(MessageKind::Cancel),
            0x8001 => Some(MessageKind::Success),
            0x8002 => Some(MessageKind::Failure),
            0x8003 => Some(MessageKind::InteractionRequest),
            _ => None,
        }
    }

    fn is_device_to_host(self) -> bool {
        (self as u16) >= 0x8000
    }
}

/// Messages the host sends to the device
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    /// Session handshake; the device answers with its descriptor payload
    Initialize,
    MethodCall {
        method: String,
        params: Value,
    },
    InteractionAnswer {
        kind: InteractionKind,
        value: Value,
    },
    /// Best-effort abort of the operation in progress; never acknowledged
    Cancel,
}

/// Messages the device sends to the host
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    Success { payload: Value },
    Failure { code: String, message: String },
    InteractionRequest { kind: InteractionKind, prompt: Value },
}

#[derive(Serialize, Deserialize)]
struct MethodCallPayload {
    method: String,
    params: Value,
}

#[derive(Serialize, Deserialize)]
struct InteractionAnswerPayload {
    kind: InteractionKind,
    value: Value,
}

#[derive(Serialize, Deserialize)]
struct SuccessPayload {
    payload: Value,
}

#[derive(Serialize, Deserialize)]
struct FailurePayload {
    code: String,
    message: String,
}

#[derive(Serialize, Deserialize)]
struct InteractionRequestPayload {
    kind: InteractionKind,
    prompt: Value,
}

fn envelope(kind: MessageKind, payload: Vec<u8>) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + payload.len());
    buf.put_u16(kind as u16);
    buf.put_slice(&payload);
    buf.freeze()
}

fn split_envelope(frame: &[u8]) -> Result<(MessageKind, &[u8]), ProtocolError> {
    if frame.len() < 2 {
        return Err(ProtocolError::Truncated(frame.len()));
    }
    let code = u16::from_be_bytes([frame[0], frame[1]]);
    let kind = MessageKind::from_u16(code).ok_or(ProtocolError::UnknownKind(code))?;
    Ok((kind, &frame[2..]))
}

/// Encode a host→device message
pub fn encode_host(message: &HostMessage) -> Result<Bytes, ProtocolError> {
    let (kind, payload) = match message {
        HostMessage::Initialize => (MessageKind::Initialize, b"{}".to_vec()),
        HostMessage::MethodCall { method, params } => (
            MessageKind::MethodCall,
            serde_json::to_vec(&MethodCallPayload {
                method: method.clone(),
                params: params.clone(),
            })?,
        ),
        HostMessage::InteractionAnswer { kind, value } => (
            MessageKind::InteractionAnswer,
            serde_json::to_vec(&InteractionAnswerPayload {
                kind: *kind,
                value: value.clone(),
            })?,
        ),
        HostMessage::Cancel => (MessageKind::Cancel, b"{}".to_vec()),
    };
    Ok(envelope(kind, payload))
}

/// Decode a host→device message (device side of the wire)
pub fn decode_host(frame: &[u8]) -> Result<HostMessage, ProtocolError> {
    let (kind, payload) = split_envelope(frame)?;
    match kind {
        MessageKind::Initialize => Ok(HostMessage::Initialize),
        MessageKind::MethodCall => {
            let p: MethodCallPayload = serde_json::from_slice(payload)?;
            Ok(HostMessage::MethodCall {
                method: p.method,
                params: p.params,
            })
        }
        MessageKind::InteractionAnswer => {
            let p: InteractionAnswerPayload = serde_json::from_slice(payload)?;
            Ok(HostMessage::InteractionAnswer {
                kind: p.kind,
                value: p.value,
            })
        }
        MessageKind::Cancel => Ok(HostMessage::Cancel),
        other => Err(ProtocolError::UnexpectedKind(other as u16)),
    }
}

/// Encode a device→host message (device side of the wire)
pub fn encode_device(message: &DeviceMessage) -> Result<Bytes, ProtocolError> {
    let (kind, payload) = match message {
        DeviceMessage::Success { payload } => (
            MessageKind::Success,
            serde_json::to_vec(&SuccessPayload {
                payload: payload.clone(),
            })?,
        ),
        DeviceMessage::Failure { code, message } => (
            MessageKind::Failure,
            serde_json::to_vec(&FailurePayload {
                code: code.clone(),
                message: message.clone(),
            })?,
        ),
        DeviceMessage::InteractionRequest { kind, prompt } => (
            MessageKind::InteractionRequest,
            serde_json::to_vec(&InteractionRequestPayload {
                kind: *kind,
                prompt: prompt.clone(),
            })?,
        ),
    };
    Ok(envelope(kind, payload))
}

/// Decode a device→host message
pub fn decode_device(frame: &[u8]) -> Result<DeviceMessage, ProtocolError> {
    let (kind, payload) = split_envelope(frame)?;
    if !kind.is_device_to_host() {
        return Err(ProtocolError::UnexpectedKind(kind as u16));
    }
    match kind {
        MessageKind::Success => {
            let p: SuccessPayload = serde_json::from_slice(payload)?;
            Ok(DeviceMessage::Success { payload: p.payload })
        }
        MessageKind::Failure => {
            let p: FailurePayload = serde_json::from_slice(payload)?;
            Ok(DeviceMessage::Failure {
                code: p.code,
                message: p.message,
            })
        }
        MessageKind::InteractionRequest => {
            let p: InteractionRequestPayload = serde_json::from_slice(payload)?;
            Ok(DeviceMessage::InteractionRequest {
                kind: p.kind,
                prompt: p.prompt,
            })
        }
        // unreachable given the range check, kept for exhaustiveness
        other => Err(ProtocolError::UnexpectedKind(other as u16)),
    }
}

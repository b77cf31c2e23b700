//! Events emitted by the engine.
//!
//! Subscribers observe the full session lifecycle: device attach/detach,
//! call progress, interaction requests, and terminal responses. Within one
//! session, delivery order matches emission order; nothing is replayed for
//! late subscribers.

use serde::Serialize;
use serde_json::Value;

use hwlink_infra_common::Event;

use crate::types::{CallId, CallState, InteractionRequest, Response, SessionId};

/// One engine lifecycle event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoreEvent {
    /// A session finished its handshake; `device` is the descriptor payload
    /// the device announced
    DeviceConnect {
        session_id: SessionId,
        device: Value,
    },

    /// The session ended, by explicit teardown or transport loss
    DeviceDisconnect { session_id: SessionId },

    /// A call changed state
    CallProgress {
        session_id: SessionId,
        call_id: CallId,
        state: CallState,
    },

    /// The device paused a call and wants input
    InteractionRequest {
        session_id: SessionId,
        request: InteractionRequest,
    },

    /// Terminal outcome of a call; emitted exactly once per accepted call
    CallResponse {
        session_id: SessionId,
        call_id: CallId,
        response: Response,
    },
}

impl CoreEvent {
    /// Session this event belongs to
    pub fn session_id(&self) -> SessionId {
        match self {
            CoreEvent::DeviceConnect { session_id, .. }
            | CoreEvent::DeviceDisconnect { session_id }
            | CoreEvent::CallProgress { session_id, .. }
            | CoreEvent::InteractionRequest { session_id, .. }
            | CoreEvent::CallResponse { session_id, .. } => *session_id,
        }
    }
}

impl Event for CoreEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CoreEvent::DeviceConnect { .. } => "device-connect",
            CoreEvent::DeviceDisconnect { .. } => "device-disconnect",
            CoreEvent::CallProgress { .. } => "call-progress",
            CoreEvent::InteractionRequest { .. } => "interaction-request",
            CoreEvent::CallResponse { .. } => "call-response",
        }
    }
}

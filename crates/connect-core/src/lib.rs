//! Dispatch/session engine for hardware security devices.
//!
//! The [`Core`] owns at most one live device session and guarantees exactly
//! one outstanding device operation at a time. Callers issue
//! [`Core::call`]s; the engine serializes them into device protocol
//! messages, correlates asynchronous device replies and mid-flight
//! interaction requests (PIN, passphrase, button confirmation) back to the
//! original caller, and emits lifecycle events on an explicit
//! [`EventBus`](hwlink_infra_common::EventBus).
//!
//! Cryptographic verification itself happens on the device; payloads pass
//! through this crate as opaque JSON.

pub mod config;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod interaction;
pub mod methods;
pub mod protocol;
pub mod session;
pub mod types;

pub use config::CoreConfig;
pub use core::Core;
pub use errors::{CoreError, Result};
pub use events::CoreEvent;
pub use types::{
    CallId, CallState, InteractionAnswer, InteractionKind, InteractionRequest, Response,
    ResponseError, SessionId, SessionPhase,
};

/// Re-export of the transport layer for callers wiring custom adapters.
pub use hwlink_device_transport as transport;

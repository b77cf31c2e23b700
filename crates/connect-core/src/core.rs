//! The engine root: composes the session, dispatcher, coordinator, and
//! event bus behind the three-method surface the host application uses.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use hwlink_device_transport::{self as transport, Transport, TransportConfig, TransportEvent};
use hwlink_infra_common::EventBus;

use crate::config::CoreConfig;
use crate::dispatch::CallDispatcher;
use crate::errors::{CoreError, Result};
use crate::events::CoreEvent;
use crate::interaction::InteractionCoordinator;
use crate::session::DeviceSession;
use crate::types::{CallId, InteractionAnswer, Response, SessionId, SessionPhase};

/// One live session with the components driving it
struct SessionBundle {
    session: Arc<DeviceSession>,
    dispatcher: Arc<CallDispatcher>,
    coordinator: Arc<InteractionCoordinator>,
}

/// The dispatch/session engine.
///
/// Owns at most one device session and guarantees exactly one outstanding
/// device operation at a time. Cheap to clone handles are not provided:
/// share a `Core` with `Arc` like the rest of the stack does.
pub struct Core {
    config: CoreConfig,
    bus: EventBus<CoreEvent>,
    slot: Mutex<Option<SessionBundle>>,
}

impl Core {
    /// Build an engine with its own event bus and no session yet
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            bus: EventBus::new(),
            slot: Mutex::new(None),
        }
    }

    /// The engine's event bus. Subscribers attach here; they are never
    /// detached by the engine, `dispose()` included.
    pub fn bus(&self) -> &EventBus<CoreEvent> {
        &self.bus
    }

    /// Open (or reuse) the device session for the configured channel.
    ///
    /// Idempotent-safe: while a session is live this returns its id
    /// without renegotiating the transport, and a caller arriving during
    /// connection establishment queues until it resolves. A session that
    /// disconnected is replaced by a fresh one.
    pub async fn init_transport(&self, transport_config: &TransportConfig) -> Result<SessionId> {
        let mut slot = self.slot.lock().await;

        if let Some(bundle) = slot.as_ref() {
            match bundle.session.phase() {
                SessionPhase::Ready | SessionPhase::Busy => {
                    debug!(session = %bundle.session.id(), "reusing live session");
                    return Ok(bundle.session.id());
                }
                _ => {
                    debug!("dropping defunct session before reconnect");
                    *slot = None;
                }
            }
        }

        let (transport, events_rx) = transport::connect(transport_config)
            .await
            .map_err(|e| CoreError::transport_lost(format!("transport setup failed: {}", e)))?;

        let bundle = self.open_session(transport, events_rx).await?;
        let id = bundle.session.id();
        *slot = Some(bundle);
        Ok(id)
    }

    /// Open a session over an externally constructed transport.
    ///
    /// Same semantics as [`Core::init_transport`]; used by the test
    /// harness (mock pairs) and bespoke adapters.
    pub async fn init_transport_with(
        &self,
        transport: Arc<dyn Transport>,
        events_rx: mpsc::Receiver<TransportEvent>,
    ) -> Result<SessionId> {
        let mut slot = self.slot.lock().await;

        if let Some(bundle) = slot.as_ref() {
            match bundle.session.phase() {
                SessionPhase::Ready | SessionPhase::Busy => {
                    debug!(session = %bundle.session.id(), "reusing live session");
                    return Ok(bundle.session.id());
                }
                _ => *slot = None,
            }
        }

        let bundle = self.open_session(transport, events_rx).await?;
        let id = bundle.session.id();
        *slot = Some(bundle);
        Ok(id)
    }

    async fn open_session(
        &self,
        transport: Arc<dyn Transport>,
        events_rx: mpsc::Receiver<TransportEvent>,
    ) -> Result<SessionBundle> {
        let session =
            DeviceSession::open(transport, events_rx, self.bus.clone(), self.config.debug).await?;
        Ok(SessionBundle {
            dispatcher: Arc::new(CallDispatcher::new(session.clone(), self.config.timeout_ms)),
            coordinator: Arc::new(InteractionCoordinator::new(session.clone())),
            session,
        })
    }

    /// Issue one method call and wait for its terminal response.
    ///
    /// Fails immediately with `Busy` while another call is non-terminal
    /// and with `TransportLost` when no usable session exists. Device
    /// rejection is *not* an error: it returns `Ok` with
    /// `Response::success == false`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Response> {
        let dispatcher = {
            let slot = self.slot.lock().await;
            slot.as_ref().map(|bundle| bundle.dispatcher.clone())
        };
        match dispatcher {
            Some(dispatcher) => dispatcher.call(method, params).await,
            None => Err(CoreError::transport_lost(
                "no device session; call init_transport first",
            )),
        }
    }

    /// Answer the pending interaction of `call_id`
    pub async fn respond(&self, call_id: CallId, answer: InteractionAnswer) -> Result<()> {
        let coordinator = {
            let slot = self.slot.lock().await;
            slot.as_ref().map(|bundle| bundle.coordinator.clone())
        };
        match coordinator {
            Some(coordinator) => coordinator.respond(call_id, answer).await,
            None => Err(CoreError::state_mismatch("no device session")),
        }
    }

    /// Release the session.
    ///
    /// Idempotent: a second `dispose` observes nothing left to tear down
    /// and emits no duplicate events. An in-flight call fails with
    /// `Cancelled`; the device is never waited on. Subscribers stay
    /// attached; unsubscribing is their own business.
    pub async fn dispose(&self) {
        let bundle = {
            let mut slot = self.slot.lock().await;
            slot.take()
        };
        match bundle {
            Some(bundle) => {
                info!(session = %bundle.session.id(), "dispose: tearing down session");
                bundle.session.dispose().await;
            }
            None => debug!("dispose: nothing to tear down"),
        }
    }

    /// Phase of the current session, if any (observability/test hook)
    pub async fn session_phase(&self) -> Option<SessionPhase> {
        let slot = self.slot.lock().await;
        slot.as_ref().map(|bundle| bundle.session.phase())
    }
}

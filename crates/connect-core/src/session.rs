//! Device session: the live binding between the engine and one connected
//! device over one transport.
//!
//! The session owns the transport exclusively. A spawned pump task consumes
//! the transport's event stream and routes decoded device messages to the
//! call in flight; callers never touch the transport directly. Phase
//! transitions are broadcast on a watch channel so concurrent callers can
//! queue on `Connecting` resolution without polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use hwlink_device_transport::{Transport, TransportEvent};
use hwlink_infra_common::EventBus;

use crate::errors::{CoreError, Result};
use crate::events::CoreEvent;
use crate::protocol::{self, DeviceMessage, HostMessage};
use crate::types::{CallId, CallState, InteractionAnswer, InteractionKind, SessionId, SessionPhase};

// Handshake must resolve well before any call deadline applies
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// One device message per protocol step, so a small buffer suffices
const INBOUND_CHANNEL_CAPACITY: usize = 8;

/// Traffic routed to the call in flight
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A decoded device message
    Message(DeviceMessage),
    /// The channel to the device is gone
    TransportLost(String),
    /// Teardown while the call was in flight
    Cancelled,
}

/// Bookkeeping for the single call in flight
pub(crate) struct ActiveCall {
    pub id: CallId,
    pub method: String,
    pub state: CallState,
    pub pending_kind: Option<InteractionKind>,
    pub answer_tx: mpsc::Sender<InteractionAnswer>,
    pub inbound_tx: mpsc::Sender<Inbound>,
    pub created_at: Instant,
}

/// Receiving half handed to the dispatcher for the call's lifetime
pub(crate) struct CallContext {
    pub id: CallId,
    pub inbound_rx: mpsc::Receiver<Inbound>,
    pub answer_rx: mpsc::Receiver<InteractionAnswer>,
}

struct Shared {
    phase: SessionPhase,
    active: Option<ActiveCall>,
}

/// One live binding to one device over one transport
pub struct DeviceSession {
    id: SessionId,
    transport: Arc<dyn Transport>,
    shared: Mutex<Shared>,
    phase_tx: watch::Sender<SessionPhase>,
    next_call_id: AtomicU64,
    bus: EventBus<CoreEvent>,
    pump_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    debug: bool,
    created_at: Instant,
}

impl DeviceSession {
    /// Open a session over an already-connected transport.
    ///
    /// Performs the `Initialize` handshake; the device's descriptor payload
    /// becomes the `device-connect` event. On any handshake failure the
    /// transport is closed and no connect event is emitted.
    pub(crate) async fn open(
        transport: Arc<dyn Transport>,
        mut events_rx: mpsc::Receiver<TransportEvent>,
        bus: EventBus<CoreEvent>,
        debug: bool,
    ) -> Result<Arc<Self>> {
        let id = SessionId::new();
        let (phase_tx, _) = watch::channel(SessionPhase::Connecting);

        let session = Arc::new(Self {
            id,
            transport,
            shared: Mutex::new(Shared {
                phase: SessionPhase::Connecting,
                active: None,
            }),
            phase_tx,
            next_call_id: AtomicU64::new(1),
            bus,
            pump_task: Mutex::new(None),
            debug,
            created_at: Instant::now(),
        });

        info!(session = %id, transport = %session.transport.kind(), "opening device session");

        let device = match session.handshake(&mut events_rx).await {
            Ok(device) => device,
            Err(e) => {
                warn!(session = %id, "handshake failed: {}", e);
                session.set_phase(SessionPhase::Disconnected).await;
                let _ = session.transport.close().await;
                return Err(e);
            }
        };

        session.set_phase(SessionPhase::Ready).await;
        session.bus.publish(&CoreEvent::DeviceConnect {
            session_id: id,
            device,
        });

        // Only now does the pump own the event stream
        let handle = tokio::spawn(Self::pump(session.clone(), events_rx));
        *session.pump_task.lock().await = Some(handle);

        Ok(session)
    }

    /// Send Initialize and wait for the device descriptor
    async fn handshake(
        &self,
        events_rx: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<serde_json::Value> {
        let frame = protocol::encode_host(&HostMessage::Initialize)?;
        self.transport
            .send_frame(frame)
            .await
            .map_err(|e| CoreError::transport_lost(format!("initialize write failed: {}", e)))?;

        let deadline = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                match events_rx.recv().await {
                    Some(TransportEvent::FrameReceived { frame }) => {
                        match protocol::decode_device(&frame) {
                            Ok(DeviceMessage::Success { payload }) => return Ok(payload),
                            Ok(DeviceMessage::Failure { code, message }) => {
                                return Err(CoreError::transport_lost(format!(
                                    "device refused initialize: {} ({})",
                                    message, code
                                )))
                            }
                            Ok(other) => {
                                warn!(session = %self.id, "unexpected handshake message: {:?}", other);
                            }
                            Err(e) => {
                                return Err(CoreError::transport_lost(format!(
                                    "handshake decode failed: {}",
                                    e
                                )))
                            }
                        }
                    }
                    Some(TransportEvent::Error { error }) => {
                        return Err(CoreError::transport_lost(error))
                    }
                    Some(TransportEvent::Closed) | None => {
                        return Err(CoreError::transport_lost("transport closed during handshake"))
                    }
                }
            }
        });

        match deadline.await {
            Ok(result) => result,
            Err(_) => Err(CoreError::transport_lost("initialize timed out")),
        }
    }

    /// Consume transport events for the life of the session
    async fn pump(session: Arc<Self>, mut events_rx: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                TransportEvent::FrameReceived { frame } => match protocol::decode_device(&frame) {
                    Ok(message) => {
                        if session.debug {
                            debug!(session = %session.id, "device message: {:?}", message);
                        }
                        let inbound_tx = {
                            let shared = session.shared.lock().await;
                            shared.active.as_ref().map(|call| call.inbound_tx.clone())
                        };
                        match inbound_tx {
                            Some(tx) => {
                                let _ = tx.send(Inbound::Message(message)).await;
                            }
                            None => {
                                warn!(session = %session.id, "unsolicited device message dropped");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(session = %session.id, "undecodable device frame: {}", e);
                        session
                            .force_disconnect(format!("protocol violation: {}", e))
                            .await;
                        break;
                    }
                },
                TransportEvent::Error { error } => {
                    session.force_disconnect(error).await;
                    break;
                }
                TransportEvent::Closed => {
                    session.force_disconnect("transport closed").await;
                    break;
                }
            }
        }
        debug!(session = %session.id, "session pump terminated");
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase_tx.borrow()
    }

    /// Time since the session was opened
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn bus(&self) -> &EventBus<CoreEvent> {
        &self.bus
    }

    pub(crate) fn debug_events(&self) -> bool {
        self.debug
    }

    async fn set_phase(&self, phase: SessionPhase) {
        let mut shared = self.shared.lock().await;
        shared.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Accept a new call under the single-flight rule.
    ///
    /// `Ready` accepts and moves the session to `Busy`. Any non-terminal
    /// call (`Pending` or `AwaitingInteraction`) makes this fail with
    /// `Busy` immediately; calls never queue. A session still `Connecting`
    /// queues the caller on phase resolution.
    pub(crate) async fn begin_call(&self, method: &str) -> Result<CallContext> {
        loop {
            {
                let mut shared = self.shared.lock().await;
                match shared.phase {
                    SessionPhase::Ready => {
                        let id = CallId(self.next_call_id.fetch_add(1, Ordering::Relaxed));
                        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
                        let (answer_tx, answer_rx) = mpsc::channel(1);
                        shared.active = Some(ActiveCall {
                            id,
                            method: method.to_string(),
                            state: CallState::Pending,
                            pending_kind: None,
                            answer_tx,
                            inbound_tx,
                            created_at: Instant::now(),
                        });
                        shared.phase = SessionPhase::Busy;
                        self.phase_tx.send_replace(SessionPhase::Busy);
                        debug!(session = %self.id, call = %id, method, "call accepted");
                        return Ok(CallContext {
                            id,
                            inbound_rx,
                            answer_rx,
                        });
                    }
                    SessionPhase::Busy => return Err(CoreError::Busy),
                    SessionPhase::Uninitialized | SessionPhase::Disconnected => {
                        return Err(CoreError::transport_lost("no usable device session"))
                    }
                    SessionPhase::Connecting => {}
                }
            }
            let mut rx = self.phase_tx.subscribe();
            if rx
                .wait_for(|phase| *phase != SessionPhase::Connecting)
                .await
                .is_err()
            {
                return Err(CoreError::transport_lost("session dropped while connecting"));
            }
        }
    }

    /// Clear the call and return the session to `Ready` if still healthy
    pub(crate) async fn finish_call(&self, id: CallId) {
        let mut shared = self.shared.lock().await;
        if let Some(call) = shared.active.as_ref() {
            if call.id == id {
                debug!(
                    session = %self.id,
                    call = %id,
                    method = %call.method,
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    "call finished"
                );
                shared.active = None;
                if shared.phase == SessionPhase::Busy {
                    shared.phase = SessionPhase::Ready;
                    self.phase_tx.send_replace(SessionPhase::Ready);
                }
            }
        }
    }

    /// Remove the call without touching the phase (timeout teardown path)
    pub(crate) async fn clear_active(&self, id: CallId) {
        let mut shared = self.shared.lock().await;
        if shared.active.as_ref().map(|call| call.id) == Some(id) {
            shared.active = None;
        }
    }

    /// Record that the call is suspended on an interaction of `kind`
    pub(crate) async fn mark_awaiting(&self, id: CallId, kind: InteractionKind) {
        let mut shared = self.shared.lock().await;
        match shared.active.as_mut() {
            Some(call) if call.id == id => {
                call.state = CallState::AwaitingInteraction;
                call.pending_kind = Some(kind);
            }
            _ => warn!(session = %self.id, call = %id, "mark_awaiting on stale call"),
        }
    }

    /// Record that the interaction was answered and the call resumed
    pub(crate) async fn mark_resumed(&self, id: CallId) {
        let mut shared = self.shared.lock().await;
        match shared.active.as_mut() {
            Some(call) if call.id == id => {
                call.state = CallState::Pending;
                call.pending_kind = None;
            }
            _ => warn!(session = %self.id, call = %id, "mark_resumed on stale call"),
        }
    }

    /// Route an interaction answer to the call that asked for it.
    ///
    /// Fails with `StateMismatch` unless `call_id` names the call in
    /// flight, that call is `AwaitingInteraction`, and the answer kind
    /// matches the pending request.
    pub(crate) async fn submit_answer(
        &self,
        call_id: CallId,
        answer: InteractionAnswer,
    ) -> Result<()> {
        let shared = self.shared.lock().await;
        let call = shared
            .active
            .as_ref()
            .ok_or_else(|| CoreError::state_mismatch("no call in flight"))?;
        if call.id != call_id {
            return Err(CoreError::state_mismatch(format!(
                "call {} is not in flight",
                call_id
            )));
        }
        if call.state != CallState::AwaitingInteraction {
            return Err(CoreError::state_mismatch(format!(
                "call {} is not awaiting interaction",
                call_id
            )));
        }
        if call.pending_kind != Some(answer.kind) {
            return Err(CoreError::state_mismatch(format!(
                "pending interaction is {}, answer is {}",
                call.pending_kind.map(|k| k.to_string()).unwrap_or_default(),
                answer.kind
            )));
        }
        call.answer_tx.try_send(answer).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                CoreError::state_mismatch("an answer is already pending")
            }
            mpsc::error::TrySendError::Closed(_) => {
                CoreError::state_mismatch("call is no longer accepting answers")
            }
        })
    }

    /// Encode and write a host message; on failure the session is torn
    /// down and the error surfaces as `TransportLost`.
    pub(crate) async fn send_host(&self, message: &HostMessage) -> Result<()> {
        let frame = protocol::encode_host(message)?;
        if let Err(e) = self.transport.send_frame(frame).await {
            let reason = format!("device write failed: {}", e);
            self.force_disconnect(reason.clone()).await;
            return Err(CoreError::transport_lost(reason));
        }
        Ok(())
    }

    /// Tear the session down after a transport-level failure.
    ///
    /// Idempotent. The call in flight (if any) is failed with
    /// `TransportLost`; `device-disconnect` is published exactly once per
    /// session, and only if the session ever announced itself.
    pub(crate) async fn force_disconnect(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let (active, announce) = {
            let mut shared = self.shared.lock().await;
            if shared.phase == SessionPhase::Disconnected {
                return;
            }
            let was_live = matches!(shared.phase, SessionPhase::Ready | SessionPhase::Busy);
            shared.phase = SessionPhase::Disconnected;
            self.phase_tx.send_replace(SessionPhase::Disconnected);
            (shared.active.take(), was_live)
        };

        warn!(session = %self.id, "session disconnected: {}", reason);
        if let Some(call) = active {
            let _ = call
                .inbound_tx
                .send(Inbound::TransportLost(reason.clone()))
                .await;
        }
        let _ = self.transport.close().await;
        if announce {
            self.bus
                .publish(&CoreEvent::DeviceDisconnect { session_id: self.id });
        }
    }

    /// Cooperative teardown initiated by the host.
    ///
    /// Idempotent. Fails the call in flight with `Cancelled`, sends a
    /// best-effort `Cancel` to the device (never waiting for it to
    /// acknowledge: a hung device must not block teardown), closes the
    /// transport, and publishes `device-disconnect` exactly once.
    pub(crate) async fn dispose(&self) {
        let (active, announce) = {
            let mut shared = self.shared.lock().await;
            if shared.phase == SessionPhase::Disconnected {
                return;
            }
            let was_live = matches!(shared.phase, SessionPhase::Ready | SessionPhase::Busy);
            shared.phase = SessionPhase::Disconnected;
            self.phase_tx.send_replace(SessionPhase::Disconnected);
            (shared.active.take(), was_live)
        };

        info!(session = %self.id, "disposing device session");
        if let Some(call) = active {
            if let Ok(frame) = protocol::encode_host(&HostMessage::Cancel) {
                let _ = self.transport.send_frame(frame).await;
            }
            let _ = call.inbound_tx.send(Inbound::Cancelled).await;
        }
        let _ = self.transport.close().await;
        if announce {
            self.bus
                .publish(&CoreEvent::DeviceDisconnect { session_id: self.id });
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceSession({}, {})", self.id, self.phase())
    }
}

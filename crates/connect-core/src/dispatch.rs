//! Call dispatcher: drives one request through to completion or failure.
//!
//! The dispatcher's responsibility is strictly sequencing and correlation:
//! it validates the call, writes it to the device, then waits for exactly
//! one of a final device message, an interaction request, transport loss,
//! cancellation, or the configured deadline. Payload contents are never
//! interpreted.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::errors::{CoreError, Result};
use crate::events::CoreEvent;
use crate::methods;
use crate::protocol::{DeviceMessage, HostMessage};
use crate::session::{CallContext, DeviceSession, Inbound};
use crate::types::{CallState, InteractionRequest, Response};

/// Drives calls over one device session
pub struct CallDispatcher {
    session: Arc<DeviceSession>,
    timeout: Option<Duration>,
}

impl CallDispatcher {
    pub(crate) fn new(session: Arc<DeviceSession>, timeout_ms: Option<u64>) -> Self {
        Self {
            session,
            timeout: timeout_ms.map(Duration::from_millis),
        }
    }

    /// Issue one call and wait for its terminal outcome.
    ///
    /// Caller errors (`Busy`, `UnknownMethod`, `InvalidParams`) fail before
    /// anything reaches the device and produce no events. Once accepted, a
    /// call always ends in exactly one `call-response` event, whatever the
    /// outcome.
    pub async fn call(&self, method: &str, params: Value) -> Result<Response> {
        methods::validate(method, &params)?;

        let mut ctx = self.session.begin_call(method).await?;
        let call_id = ctx.id;
        self.publish_progress(call_id, CallState::Pending);

        let outcome = match self
            .session
            .send_host(&HostMessage::MethodCall {
                method: method.to_string(),
                params,
            })
            .await
        {
            Ok(()) => self.run_wait_loop(&mut ctx).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(response) => {
                self.session.finish_call(call_id).await;
                self.publish_terminal(call_id, response.clone());
                Ok(response)
            }
            Err(CoreError::Timeout { ms }) => {
                // The device may still be mid-operation; only a fresh
                // handshake resynchronizes, so the session cannot stay up.
                self.session.clear_active(call_id).await;
                self.publish_terminal(
                    call_id,
                    Response::rejected("Timeout", format!("call timed out after {} ms", ms)),
                );
                self.session
                    .force_disconnect(format!("call timed out after {} ms", ms))
                    .await;
                Err(CoreError::Timeout { ms })
            }
            Err(e) => {
                self.session.finish_call(call_id).await;
                self.publish_terminal(call_id, Response::rejected(e.code(), e.to_string()));
                Err(e)
            }
        }
    }

    /// Wait for the call's terminal message, suspending on interactions,
    /// under the configured overall deadline.
    async fn run_wait_loop(&self, ctx: &mut CallContext) -> Result<Response> {
        match self.timeout {
            Some(deadline) => {
                let ms = deadline.as_millis() as u64;
                match tokio::time::timeout(deadline, self.wait_loop(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Timeout { ms }),
                }
            }
            None => self.wait_loop(ctx).await,
        }
    }

    async fn wait_loop(&self, ctx: &mut CallContext) -> Result<Response> {
        loop {
            let inbound = ctx.inbound_rx.recv().await;
            match inbound {
                Some(Inbound::Message(DeviceMessage::Success { payload })) => {
                    trace!(call = %ctx.id, "device accepted");
                    return Ok(Response::ok(payload));
                }
                Some(Inbound::Message(DeviceMessage::Failure { code, message })) => {
                    // A negative device result is a normal response
                    debug!(call = %ctx.id, code = %code, "device rejected");
                    return Ok(Response::rejected(code, message));
                }
                Some(Inbound::Message(DeviceMessage::InteractionRequest { kind, prompt })) => {
                    if let Some(response) = self.handle_interaction(ctx, kind, prompt).await? {
                        return Ok(response);
                    }
                }
                Some(Inbound::TransportLost(reason)) => {
                    return Err(CoreError::transport_lost(reason));
                }
                Some(Inbound::Cancelled) => return Err(CoreError::Cancelled),
                None => {
                    return Err(CoreError::transport_lost("session torn down mid-call"));
                }
            }
        }
    }

    /// Suspend on a device interaction request until an answer arrives,
    /// then forward it and return `None` so the wait loop resumes.
    /// Transport loss and cancellation still interrupt the suspension; a
    /// terminal message the device sends on its own (e.g. it timed out the
    /// prompt) short-circuits as `Some(response)`.
    async fn handle_interaction(
        &self,
        ctx: &mut CallContext,
        kind: crate::types::InteractionKind,
        prompt: Value,
    ) -> Result<Option<Response>> {
        let call_id = ctx.id;
        self.session.mark_awaiting(call_id, kind).await;
        debug!(call = %call_id, %kind, "awaiting interaction");
        self.session.bus().publish(&CoreEvent::InteractionRequest {
            session_id: self.session.id(),
            request: InteractionRequest {
                call_id,
                kind,
                prompt,
            },
        });

        loop {
            tokio::select! {
                answer = ctx.answer_rx.recv() => {
                    let answer = answer
                        .ok_or_else(|| CoreError::transport_lost("session torn down mid-call"))?;
                    self.session
                        .send_host(&HostMessage::InteractionAnswer {
                            kind: answer.kind,
                            value: answer.value,
                        })
                        .await?;
                    self.session.mark_resumed(call_id).await;
                    if self.session.debug_events() {
                        self.publish_progress(call_id, CallState::Pending);
                    }
                    return Ok(None);
                }
                inbound = ctx.inbound_rx.recv() => {
                    match inbound {
                        Some(Inbound::TransportLost(reason)) => {
                            return Err(CoreError::transport_lost(reason));
                        }
                        Some(Inbound::Cancelled) => return Err(CoreError::Cancelled),
                        Some(Inbound::Message(DeviceMessage::Success { payload })) => {
                            self.session.mark_resumed(call_id).await;
                            return Ok(Some(Response::ok(payload)));
                        }
                        Some(Inbound::Message(DeviceMessage::Failure { code, message })) => {
                            self.session.mark_resumed(call_id).await;
                            return Ok(Some(Response::rejected(code, message)));
                        }
                        Some(Inbound::Message(DeviceMessage::InteractionRequest { .. })) => {
                            warn!(call = %call_id, "nested interaction request ignored");
                        }
                        None => {
                            return Err(CoreError::transport_lost("session torn down mid-call"));
                        }
                    }
                }
            }
        }
    }

    fn publish_progress(&self, call_id: crate::types::CallId, state: CallState) {
        self.session.bus().publish(&CoreEvent::CallProgress {
            session_id: self.session.id(),
            call_id,
            state,
        });
    }

    fn publish_terminal(&self, call_id: crate::types::CallId, response: Response) {
        self.session.bus().publish(&CoreEvent::CallResponse {
            session_id: self.session.id(),
            call_id,
            response,
        });
    }
}

//! Interaction coordinator: routes host answers back to the suspended call.
//!
//! The device can legitimately pause mid-operation to ask for a PIN, a
//! passphrase, or a physical confirmation. The suspended call is an
//! explicit state, not a callback chain: at any moment the engine can say
//! exactly which call is waiting and for what, and an external responder
//! (human UI or a scripted one) answers asynchronously without losing the
//! correlation.

use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::session::DeviceSession;
use crate::types::{CallId, InteractionAnswer};

/// Routes interaction answers to the call that raised the request
pub struct InteractionCoordinator {
    session: Arc<DeviceSession>,
}

impl InteractionCoordinator {
    pub(crate) fn new(session: Arc<DeviceSession>) -> Self {
        Self { session }
    }

    /// Answer the pending interaction of `call_id`.
    ///
    /// Valid only while that call is `AwaitingInteraction` and the answer
    /// kind matches the request the device raised; anything else fails
    /// with `StateMismatch` and leaves the call untouched. Each request
    /// accepts exactly one answer; a second `respond` races into
    /// `StateMismatch`.
    ///
    /// A valid answer re-enters the dispatcher's wait loop: the call may
    /// then complete, fail, or raise the next interaction (multi-step
    /// flows are chained, never nested).
    pub async fn respond(&self, call_id: CallId, answer: InteractionAnswer) -> Result<()> {
        debug!(call = %call_id, kind = %answer.kind, "interaction response received");
        self.session.submit_answer(call_id, answer).await
    }
}

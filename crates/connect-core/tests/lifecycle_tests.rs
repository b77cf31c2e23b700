//! Session lifecycle: idempotent init and dispose, cancellation of
//! in-flight calls, transport loss, and reconnection.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::*;
use hwlink_connect_core::transport::MockTransport;
use hwlink_connect_core::{Core, CoreConfig, CoreError, SessionPhase};

#[tokio::test]
async fn init_transport_is_idempotent_while_the_session_lives() {
    let (core, first_id) = connect_core(CoreConfig::default(), DeviceScript::default()).await;

    // A second init with a fresh pair reuses the live session untouched
    let second_id = attach_device(&core, DeviceScript::default()).await;
    assert_eq!(first_id, second_id);
    assert_eq!(core.session_phase().await, Some(SessionPhase::Ready));
    core.dispose().await;
}

#[tokio::test]
async fn dispose_twice_has_the_effect_of_disposing_once() {
    let (core, _sid, recorder) =
        connect_core_with_recorder(CoreConfig::default(), DeviceScript::default()).await;

    core.dispose().await;
    core.dispose().await;

    assert_eq!(recorder.count_of("device-disconnect"), 1);
    assert_eq!(
        recorder.types(),
        vec!["device-connect", "device-disconnect"]
    );
}

#[tokio::test]
async fn dispose_on_a_fresh_core_is_a_no_op() {
    init_test_logging();
    let core = Core::new(CoreConfig::default());
    let recorder = EventRecorder::attach(&core);

    core.dispose().await;
    assert!(recorder.types().is_empty());
}

#[tokio::test]
async fn dispose_cancels_the_call_in_flight() {
    let (core, _sid, recorder) =
        connect_core_with_recorder(CoreConfig::default(), DeviceScript::silent()).await;

    let call_core = core.clone();
    let call_task = tokio::spawn(async move {
        call_core
            .call(
                "verifyMessage",
                verify_params("Bitcoin", ADDRESS, GOOD_SIGNATURE, MESSAGE),
            )
            .await
    });
    wait_for_event(&recorder, "call-progress", 1).await;

    core.dispose().await;

    let result = call_task.await.unwrap();
    assert!(matches!(result, Err(CoreError::Cancelled)));

    // No partial response: the one terminal event carries the cancellation
    assert_eq!(recorder.count_of("call-response"), 1);
    assert_eq!(recorder.count_of("device-disconnect"), 1);
}

#[tokio::test]
async fn transport_failure_mid_call_fails_the_call_and_disconnects_the_session() {
    let (core, _sid, recorder) =
        connect_core_with_recorder(CoreConfig::default(), DeviceScript::failing()).await;

    let result = core
        .call(
            "verifyMessage",
            verify_params("Bitcoin", ADDRESS, GOOD_SIGNATURE, MESSAGE),
        )
        .await;
    assert!(matches!(result, Err(CoreError::TransportLost { .. })));
    assert_eq!(core.session_phase().await, Some(SessionPhase::Disconnected));

    // Terminal event delivered on the same channel as any other outcome
    assert_eq!(recorder.count_of("call-response"), 1);
    assert_eq!(recorder.count_of("device-disconnect"), 1);

    // The session stays unusable until a fresh init
    let result = core.call("getFeatures", json!(null)).await;
    assert!(matches!(result, Err(CoreError::TransportLost { .. })));
}

#[tokio::test]
async fn reconnect_after_transport_loss_restores_service() {
    let (core, first_id) = connect_core(CoreConfig::default(), DeviceScript::failing()).await;

    let result = core
        .call(
            "verifyMessage",
            verify_params("Bitcoin", ADDRESS, GOOD_SIGNATURE, MESSAGE),
        )
        .await;
    assert!(matches!(result, Err(CoreError::TransportLost { .. })));

    // A new init replaces the dead session with a fresh one
    let second_id = attach_device(&core, DeviceScript::default()).await;
    assert_ne!(first_id, second_id);

    let response = core
        .call(
            "verifyMessage",
            verify_params("Bitcoin", ADDRESS, GOOD_SIGNATURE, MESSAGE),
        )
        .await
        .unwrap();
    assert!(response.success);
    core.dispose().await;
}

#[tokio::test]
async fn call_without_a_session_is_a_transport_error() {
    init_test_logging();
    let core = Core::new(CoreConfig::default());
    let result = core.call("getFeatures", json!(null)).await;
    assert!(matches!(result, Err(CoreError::TransportLost { .. })));
}

#[tokio::test]
async fn handshake_failure_leaves_no_session_and_no_connect_event() {
    init_test_logging();
    let core = Arc::new(Core::new(CoreConfig::default()));
    let recorder = EventRecorder::attach(&core);

    // Device end dropped immediately: the handshake cannot complete
    let ((transport, events_rx), device) = MockTransport::pair(None);
    device.disconnect().await;

    let result = core
        .init_transport_with(Arc::new(transport), events_rx)
        .await;
    assert!(matches!(result, Err(CoreError::TransportLost { .. })));
    assert!(recorder.types().is_empty());
    assert_eq!(core.session_phase().await, None);
}

#[tokio::test]
async fn subscribers_survive_dispose() {
    let (core, _sid, recorder) =
        connect_core_with_recorder(CoreConfig::default(), DeviceScript::default()).await;

    core.dispose().await;

    // Same recorder, new session: events keep arriving
    attach_device(&core, DeviceScript::default()).await;
    core.call("getFeatures", json!(null)).await.unwrap();

    assert_eq!(recorder.count_of("device-connect"), 2);
    assert_eq!(recorder.count_of("call-response"), 1);
    core.dispose().await;
}

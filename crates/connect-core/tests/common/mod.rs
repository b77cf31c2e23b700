//! Shared harness for the integration tests: a scripted mock device on the
//! far end of a mock transport pair, an auto-responder that answers
//! interaction requests from canned answers, and an event recorder for
//! ordering assertions. Tests synchronize on event arrival, never on
//! wall-clock waits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use hwlink_connect_core::protocol::{self, DeviceMessage, HostMessage};
use hwlink_connect_core::transport::{MockDeviceHandle, MockTransport};
use hwlink_connect_core::{
    Core, CoreConfig, CoreEvent, InteractionAnswer, InteractionKind, SessionId,
};
use hwlink_infra_common::Subscription;

static INIT_LOGGING: Once = Once::new();

pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

// ---------------------------------------------------------------------------
// Fixtures (message-verification vectors the scripted device recognizes)
// ---------------------------------------------------------------------------

pub struct VerifyFixture {
    pub coin: &'static str,
    pub address: &'static str,
    pub signature: &'static str,
    pub message: String,
}

pub const ADDRESS: &str = "3CwYaeWxhpXXiHue3ciQez1DLaTEAXcKa1";
pub const TESTNET_ADDRESS: &str = "2N4VkePSzKH2sv5YBikLHGvzUYvfPxV6zS9";
pub const GOOD_SIGNATURE: &str = "249e23edf0e4e47ff1dec27f32cd78c50e74ef018ee8a6adf35ae17c7a9b0dd96f48b493fd7dbab03efb6f439c6383c9523b3bbc5f1a7d158a6af90ab154e9be80";
pub const BAD_SIGNATURE: &str = "249e23edf0e4e47ff1dec27f32cd78c50e74ef018ee8a6adf35ae17c7a9b0dd96f48b493fd7dbab03efb6f439c6383c9523b3bbc5f1a7d158a6af90ab154e9be00";
pub const LONG_SIGNATURE: &str = "245ff795c29aef7538f8b3bdb2e8add0d0722ad630a140b6aefd504a5a895cbd867cbb00981afc50edd0398211e8d7c304bb8efa461181bc0afa67ea4a720a89ed";
pub const UTF_SIGNATURE: &str = "24d0ec02ed8da8df23e7fe9e680e7867cc290312fe1c970749d8306ddad1a1eda41c6a771b13d495dd225b13b0a9d0f915a984ee3d0703f92287bf8009fbb9f7d6";
pub const MESSAGE: &str = "This is an example of a signed message.";
pub const UTF_MESSAGE: &str =
    "P\u{159}\u{ed}\u{161}ern\u{11b} \u{17e}lu\u{165}ou\u{10d}k\u{fd} k\u{16f}\u{148} \u{fa}p\u{11b}l \u{10f}\u{e1}belsk\u{e9} \u{f3}dy z\u{e1}ke\u{159}n\u{fd} u\u{10d}e\u{148} b\u{11b}\u{17e}\u{ed} pod\u{e9}l z\u{f3}ny \u{fa}l\u{16f}";

pub fn long_message() -> String {
    "VeryLongMessage!".repeat(64)
}

/// The (coin, address, signature, message) tuples the device accepts
pub fn known_good() -> Vec<VerifyFixture> {
    vec![
        VerifyFixture {
            coin: "Bitcoin",
            address: ADDRESS,
            signature: GOOD_SIGNATURE,
            message: MESSAGE.to_string(),
        },
        VerifyFixture {
            coin: "Bitcoin",
            address: ADDRESS,
            signature: LONG_SIGNATURE,
            message: long_message(),
        },
        VerifyFixture {
            coin: "Testnet",
            address: TESTNET_ADDRESS,
            signature: GOOD_SIGNATURE,
            message: MESSAGE.to_string(),
        },
        VerifyFixture {
            coin: "Bitcoin",
            address: ADDRESS,
            signature: UTF_SIGNATURE,
            message: UTF_MESSAGE.to_string(),
        },
    ]
}

pub fn verify_params(coin: &str, address: &str, signature: &str, message: &str) -> Value {
    json!({
        "coin": coin,
        "address": address,
        "signature": signature,
        "message": message,
    })
}

// ---------------------------------------------------------------------------
// Scripted mock device
// ---------------------------------------------------------------------------

/// How the device reacts to a method call
#[derive(Clone)]
pub enum CallBehavior {
    /// Run the scripted interactions, then answer from the fixture table
    Respond,
    /// Never answer (deadline tests)
    Silent,
    /// Blow up the transport instead of answering
    FailTransport,
}

#[derive(Clone)]
pub struct DeviceScript {
    pub behavior: CallBehavior,
    /// Interactions demanded, in order, before the call completes
    pub interactions: Vec<(InteractionKind, Value)>,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            behavior: CallBehavior::Respond,
            interactions: Vec::new(),
        }
    }
}

impl DeviceScript {
    pub fn with_interactions(interactions: Vec<(InteractionKind, Value)>) -> Self {
        Self {
            behavior: CallBehavior::Respond,
            interactions,
        }
    }

    pub fn silent() -> Self {
        Self {
            behavior: CallBehavior::Silent,
            interactions: Vec::new(),
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: CallBehavior::FailTransport,
            interactions: Vec::new(),
        }
    }
}

fn device_descriptor() -> Value {
    json!({ "vendor": "hwlink", "model": "one", "fw": "2.7.0" })
}

fn complete_call(method: &str, params: &Value) -> DeviceMessage {
    match method {
        "verifyMessage" => {
            let matches_fixture = known_good().iter().any(|f| {
                params["coin"] == f.coin
                    && params["address"] == f.address
                    && params["signature"] == f.signature
                    && params["message"] == f.message.as_str()
            });
            if matches_fixture {
                DeviceMessage::Success {
                    payload: json!({ "message": "Message verified" }),
                }
            } else {
                DeviceMessage::Failure {
                    code: "Failure_DataError".into(),
                    message: "Invalid signature".into(),
                }
            }
        }
        "getFeatures" => DeviceMessage::Success {
            payload: device_descriptor(),
        },
        "signMessage" => DeviceMessage::Success {
            payload: json!({ "address": ADDRESS, "signature": GOOD_SIGNATURE }),
        },
        "getAddress" => DeviceMessage::Success {
            payload: json!({ "address": ADDRESS }),
        },
        other => DeviceMessage::Failure {
            code: "Failure_UnexpectedMessage".into(),
            message: format!("device does not know {}", other),
        },
    }
}

/// Drive the device end of a mock transport pair according to a script
pub fn spawn_device(mut handle: MockDeviceHandle, script: DeviceScript) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current: Option<(String, Value)> = None;
        let mut remaining: Vec<(InteractionKind, Value)> = Vec::new();

        while let Some(frame) = handle.recv_frame().await {
            let message = match protocol::decode_host(&frame) {
                Ok(message) => message,
                Err(_) => break,
            };
            match message {
                HostMessage::Initialize => {
                    send(&handle, &DeviceMessage::Success {
                        payload: device_descriptor(),
                    })
                    .await;
                }
                HostMessage::MethodCall { method, params } => match script.behavior {
                    CallBehavior::Silent => continue,
                    CallBehavior::FailTransport => {
                        handle.inject_error("injected transport failure").await;
                    }
                    CallBehavior::Respond => {
                        current = Some((method, params));
                        remaining = script.interactions.clone();
                        remaining.reverse(); // pop() yields in scripted order
                        advance(&handle, &mut current, &mut remaining).await;
                    }
                },
                HostMessage::InteractionAnswer { .. } => {
                    advance(&handle, &mut current, &mut remaining).await;
                }
                HostMessage::Cancel => {
                    current = None;
                    remaining.clear();
                }
            }
        }
    })
}

async fn advance(
    handle: &MockDeviceHandle,
    current: &mut Option<(String, Value)>,
    remaining: &mut Vec<(InteractionKind, Value)>,
) {
    if let Some((kind, prompt)) = remaining.pop() {
        send(handle, &DeviceMessage::InteractionRequest { kind, prompt }).await;
    } else if let Some((method, params)) = current.take() {
        send(handle, &complete_call(&method, &params)).await;
    }
}

async fn send(handle: &MockDeviceHandle, message: &DeviceMessage) {
    let frame = protocol::encode_device(message).expect("device encode");
    handle.send_frame(frame).await;
}

// ---------------------------------------------------------------------------
// Core wiring helpers
// ---------------------------------------------------------------------------

/// A core wired to a scripted device over a fresh mock pair
pub async fn connect_core(config: CoreConfig, script: DeviceScript) -> (Arc<Core>, SessionId) {
    init_test_logging();
    let core = Arc::new(Core::new(config));
    let session_id = attach_device(&core, script).await;
    (core, session_id)
}

/// Like [`connect_core`], with a recorder attached before the session
/// opens so `device-connect` is observed (the bus never replays).
pub async fn connect_core_with_recorder(
    config: CoreConfig,
    script: DeviceScript,
) -> (Arc<Core>, SessionId, EventRecorder) {
    init_test_logging();
    let core = Arc::new(Core::new(config));
    let recorder = EventRecorder::attach(&core);
    let session_id = attach_device(&core, script).await;
    (core, session_id, recorder)
}

/// Attach a fresh scripted device to an existing core (reconnect tests)
pub async fn attach_device(core: &Arc<Core>, script: DeviceScript) -> SessionId {
    let ((transport, events_rx), handle) = MockTransport::pair(None);
    spawn_device(handle, script);
    core.init_transport_with(Arc::new(transport), events_rx)
        .await
        .expect("init_transport")
}

// ---------------------------------------------------------------------------
// Auto-responder (scripted interaction answers, driven by bus events)
// ---------------------------------------------------------------------------

/// Answers every interaction request with a canned answer for its kind,
/// asserting the request shape first. Reacts to event arrival only.
pub fn spawn_auto_responder(
    core: Arc<Core>,
    answers: HashMap<InteractionKind, Value>,
) -> JoinHandle<()> {
    let (subscription, mut rx) = core.bus().subscribe_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let CoreEvent::InteractionRequest { request, .. } = event {
                let answer = answers
                    .get(&request.kind)
                    .unwrap_or_else(|| panic!("no canned answer for {}", request.kind))
                    .clone();
                assert!(
                    request.prompt.is_object() || request.prompt.is_null(),
                    "interaction prompt must be structured metadata"
                );
                core.respond(request.call_id, InteractionAnswer::new(request.kind, answer))
                    .await
                    .expect("respond");
            }
        }
        subscription.unsubscribe();
    })
}

/// Canned answers for the usual three-step flow
pub fn standard_answers() -> HashMap<InteractionKind, Value> {
    HashMap::from([
        (InteractionKind::Pin, json!("1234")),
        (InteractionKind::Passphrase, json!("hunter2")),
        (InteractionKind::ButtonConfirm, json!(true)),
    ])
}

// ---------------------------------------------------------------------------
// Event recorder
// ---------------------------------------------------------------------------

/// Records every bus event for ordering assertions
pub struct EventRecorder {
    events: Arc<Mutex<Vec<CoreEvent>>>,
    subscription: Subscription<CoreEvent>,
}

impl EventRecorder {
    pub fn attach(core: &Core) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = core
            .bus()
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        Self {
            events,
            subscription,
        }
    }

    pub fn snapshot(&self) -> Vec<CoreEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Event type tags in arrival order
    pub fn types(&self) -> Vec<&'static str> {
        use hwlink_infra_common::Event;
        self.snapshot().iter().map(|e| e.event_type()).collect()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.types().iter().filter(|t| **t == event_type).count()
    }

    pub fn detach(&self) {
        self.subscription.unsubscribe();
    }
}

/// Wait (on event arrival, not wall clock) until the recorder has seen
/// `count` events of `event_type`.
pub async fn wait_for_event(recorder: &EventRecorder, event_type: &str, count: usize) {
    // Bounded by the test runner's own timeout; yields between checks so
    // the engine's tasks make progress.
    while recorder.count_of(event_type) < count {
        tokio::task::yield_now().await;
    }
}

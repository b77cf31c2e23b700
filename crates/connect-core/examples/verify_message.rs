//! Verify a signed message against a running device emulator.
//!
//! Expects an emulator listening on UDP 127.0.0.1:21324 (override with the
//! first CLI argument). Run with:
//!
//! ```sh
//! cargo run --example verify_message -- 127.0.0.1:21324
//! ```

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use hwlink_connect_core::transport::{TransportConfig, TransportKind};
use hwlink_connect_core::{Core, CoreConfig};
use hwlink_infra_common::Event;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:21324".to_string())
        .parse()
        .context("emulator address")?;

    let core = Arc::new(Core::new(CoreConfig {
        timeout_ms: Some(30_000),
        debug: false,
    }));

    // Print every engine event as it happens
    let subscription = core.bus().subscribe(|event| {
        println!("event: {}", event.event_type());
    });

    let config = TransportConfig {
        kind: TransportKind::Udp,
        addr: Some(addr),
        channel_capacity: None,
    };
    let session_id = core.init_transport(&config).await?;
    println!("session {} ready", session_id);

    let response = core
        .call(
            "verifyMessage",
            json!({
                "coin": "Bitcoin",
                "address": "3CwYaeWxhpXXiHue3ciQez1DLaTEAXcKa1",
                "signature": "249e23edf0e4e47ff1dec27f32cd78c50e74ef018ee8a6adf35ae17c7a9b0dd96f48b493fd7dbab03efb6f439c6383c9523b3bbc5f1a7d158a6af90ab154e9be80",
                "message": "This is an example of a signed message.",
            }),
        )
        .await?;

    match response.success {
        true => println!("signature verified"),
        false => println!(
            "verification failed: {}",
            response
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "no detail".into())
        ),
    }

    core.dispose().await;
    subscription.unsubscribe();
    Ok(())
}

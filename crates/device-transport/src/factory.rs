//! Kind-driven transport construction and device discovery.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transport::{TcpTransport, Transport, TransportEvent, TransportKind, UdpTransport};

// Probe window for bridge reachability checks
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration selecting and parameterizing a transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Which channel kind to use
    pub kind: TransportKind,
    /// Endpoint of the emulator (UDP) or bridge daemon (TCP)
    pub addr: Option<SocketAddr>,
    /// Capacity of the transport event channel
    pub channel_capacity: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Tcp,
            addr: None,
            channel_capacity: None,
        }
    }
}

/// A device endpoint visible through some transport kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub kind: TransportKind,
    pub addr: SocketAddr,
    pub label: String,
}

/// Open the configured channel and return it with its event stream.
///
/// Mock transports are not constructed here; tests build them with
/// [`MockTransport::pair`] and inject both halves directly.
///
/// [`MockTransport::pair`]: crate::transport::mock::MockTransport::pair
pub async fn connect(
    config: &TransportConfig,
) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
    let addr = config
        .addr
        .ok_or_else(|| Error::UnsupportedTransport("no device endpoint configured".into()))?;

    match config.kind {
        TransportKind::Udp => {
            let (transport, events_rx) = UdpTransport::connect(addr, config.channel_capacity).await?;
            Ok((Arc::new(transport), events_rx))
        }
        TransportKind::Tcp => {
            let (transport, events_rx) = TcpTransport::connect(addr, config.channel_capacity).await?;
            Ok((Arc::new(transport), events_rx))
        }
        TransportKind::Mock => Err(Error::UnsupportedTransport(
            "mock transports are injected, not constructed".into(),
        )),
    }
}

/// Report the device endpoints reachable under this configuration.
///
/// TCP endpoints are probed with a short connect timeout; an unreachable
/// bridge yields an empty list, not an error. UDP endpoints are reported
/// unprobed (datagram sockets cannot observe reachability). Failures are
/// reported to the caller and never retried here.
pub async fn enumerate(config: &TransportConfig) -> Result<Vec<DeviceDescriptor>> {
    let Some(addr) = config.addr else {
        return Ok(Vec::new());
    };

    match config.kind {
        TransportKind::Udp => {
            debug!("reporting unprobed UDP emulator endpoint {}", addr);
            Ok(vec![DeviceDescriptor {
                kind: TransportKind::Udp,
                addr,
                label: format!("emulator at {}", addr),
            }])
        }
        TransportKind::Tcp => {
            match tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    drop(stream);
                    info!("bridge at {} is reachable", addr);
                    Ok(vec![DeviceDescriptor {
                        kind: TransportKind::Tcp,
                        addr,
                        label: format!("bridge at {}", addr),
                    }])
                }
                Ok(Err(e)) => {
                    debug!("bridge probe to {} failed: {}", addr, e);
                    Ok(Vec::new())
                }
                Err(_) => {
                    debug!("bridge probe to {} timed out", addr);
                    Ok(Vec::new())
                }
            }
        }
        TransportKind::Mock => Ok(Vec::new()),
    }
}

//! In-memory transport pair for the test harness.
//!
//! [`MockTransport::pair`] wires a host-side transport to a
//! [`MockDeviceHandle`]: frames the host sends come out of the handle, and
//! frames pushed into the handle arrive on the host's event receiver. The
//! handle can also inject a transport error or drop the channel entirely,
//! which is how tests exercise mid-call transport loss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::debug;

use crate::codec;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportKind};

// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Host side of an in-memory transport pair
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

struct MockTransportInner {
    closed: Arc<AtomicBool>,
    to_device_tx: mpsc::UnboundedSender<Bytes>,
    events_tx: mpsc::Sender<TransportEvent>,
}

/// Device side of an in-memory transport pair
pub struct MockDeviceHandle {
    closed: Arc<AtomicBool>,
    from_host_rx: mpsc::UnboundedReceiver<Bytes>,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl MockTransport {
    /// Build a connected transport/device pair
    pub fn pair(
        channel_capacity: Option<usize>,
    ) -> ((Self, mpsc::Receiver<TransportEvent>), MockDeviceHandle) {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (to_device_tx, from_host_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let transport = MockTransport {
            inner: Arc::new(MockTransportInner {
                closed: closed.clone(),
                to_device_tx,
                events_tx: events_tx.clone(),
            }),
        };
        let handle = MockDeviceHandle {
            closed,
            from_host_rx,
            events_tx,
        };
        ((transport, events_rx), handle)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    async fn send_frame(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        // Run the real codec so framing is exercised even in-memory
        let framed = codec::encode_frame(&frame)?;
        self.inner
            .to_device_tx
            .send(framed)
            .map_err(|_| Error::ConnectionReset)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!("mock transport closing");
            let _ = self.inner.events_tx.send(TransportEvent::Closed).await;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransport(closed={})", self.is_closed())
    }
}

impl MockDeviceHandle {
    /// Receive the next payload the host sent, framing stripped.
    ///
    /// Returns `None` once the host side is gone.
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        let framed = self.from_host_rx.recv().await?;
        let mut buf = BytesMut::from(&framed[..]);
        match codec::try_decode_frame(&mut buf) {
            Ok(Some(payload)) => Some(payload),
            _ => None,
        }
    }

    /// Deliver a device frame to the host
    pub async fn send_frame(&self, payload: Bytes) {
        let _ = self
            .events_tx
            .send(TransportEvent::FrameReceived { frame: payload })
            .await;
    }

    /// Inject a transport-level error, as a flaky channel would
    pub async fn inject_error(&self, error: impl Into<String>) {
        let _ = self
            .events_tx
            .send(TransportEvent::Error {
                error: error.into(),
            })
            .await;
    }

    /// Drop the channel: the host observes `Closed`, as on a device unplug
    pub async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.events_tx.send(TransportEvent::Closed).await;
        }
    }

    /// Whether the pair has been closed from either side
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

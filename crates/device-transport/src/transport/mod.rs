use std::fmt;

use bytes::Bytes;

use crate::error::Result;

pub mod mock;
pub mod tcp;
pub mod udp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Represents the transport kind/channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Datagram endpoint exposed by a device emulator
    Udp,
    /// Stream connection to a local bridge daemon
    Tcp,
    /// In-memory pair used by the test harness
    Mock,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Udp => write!(f, "UDP"),
            TransportKind::Tcp => write!(f, "TCP"),
            TransportKind::Mock => write!(f, "MOCK"),
        }
    }
}

/// Events emitted by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete protocol frame arrived from the device
    FrameReceived {
        /// Frame payload, framing already stripped
        frame: Bytes,
    },

    /// Error occurred in the transport
    Error {
        /// Error description
        error: String,
    },

    /// Transport has been closed
    Closed,
}

/// A channel carrying opaque protocol frames to and from one device.
///
/// This trait defines the common interface for all transport kinds. Exactly
/// one transport is active per device session; all writes are serialized by
/// the session that owns it. Inbound traffic is delivered on the event
/// receiver returned by the concrete constructor.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// The kind of channel this transport drives
    fn kind(&self) -> TransportKind;

    /// Sends one framed payload to the device
    async fn send_frame(&self, frame: Bytes) -> Result<()>;

    /// Closes the transport; the final event on the receiver is `Closed`
    async fn close(&self) -> Result<()>;

    /// Checks if the transport is closed
    fn is_closed(&self) -> bool;
}

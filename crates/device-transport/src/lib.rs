//! Transport adapters for hardware security devices.
//!
//! A transport carries opaque protocol frames between the host and exactly
//! one device over some physical or logical channel: a UDP endpoint exposed
//! by a device emulator, a TCP connection to a local bridge daemon, or an
//! in-memory pair for tests. Frame *contents* are never interpreted here;
//! this crate owns only framing and channel lifecycle.

pub mod codec;
pub mod error;
pub mod factory;
pub mod transport;

pub use error::{Error, Result};
pub use factory::{connect, enumerate, DeviceDescriptor, TransportConfig};
pub use transport::{Transport, TransportEvent, TransportKind};
pub use transport::mock::{MockDeviceHandle, MockTransport};
pub use transport::tcp::TcpTransport;
pub use transport::udp::UdpTransport;

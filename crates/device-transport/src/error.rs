use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for device transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for device transport operations
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to bind a local socket
    #[error("Failed to bind local socket: {0}")]
    BindFailed(io::Error),

    /// Failed to connect to the specified endpoint
    #[error("Failed to connect to {0}: {1}")]
    ConnectFailed(SocketAddr, io::Error),

    /// Failed to send a frame to the device
    #[error("Failed to send frame: {0}")]
    SendFailed(io::Error),

    /// Failed to receive from the device
    #[error("Failed to receive: {0}")]
    ReceiveFailed(io::Error),

    /// Transport is closed
    #[error("Transport closed")]
    TransportClosed,

    /// Connection reset by the device or bridge
    #[error("Connection reset")]
    ConnectionReset,

    /// Stream ended mid-frame
    #[error("Stream closed")]
    StreamClosed,

    /// Frame exceeds the maximum allowed size
    #[error("Frame too large ({0} bytes)")]
    FrameTooLarge(usize),

    /// Frame does not start with the expected magic or is malformed
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Internal event channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Operation timed out
    #[error("Timeout")]
    Timeout,

    /// Requested transport kind cannot be constructed this way
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    /// Returns true if the error means the channel to the device is gone
    pub fn is_connection_closed(&self) -> bool {
        matches!(
            self,
            Error::TransportClosed | Error::ConnectionReset | Error::StreamClosed
        )
    }

    /// Returns true if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::codec;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportKind};

// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

// Read chunk size for the receive loop
const READ_CHUNK_SIZE: usize = 8192;

/// TCP transport speaking to a local bridge daemon
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<TcpTransportInner>,
}

struct TcpTransportInner {
    writer: Mutex<OwnedWriteHalf>,
    peer_addr: SocketAddr,
    closed: AtomicBool,
    events_tx: mpsc::Sender<TransportEvent>,
    receive_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl TcpTransport {
    /// Creates a new TCP transport connected to the bridge at `addr`
    pub async fn connect(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::ConnectFailed(addr, e))?;
        info!("device TCP transport connected to {}", addr);

        let (read_half, write_half) = stream.into_split();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let transport = TcpTransport {
            inner: Arc::new(TcpTransportInner {
                writer: Mutex::new(write_half),
                peer_addr: addr,
                closed: AtomicBool::new(false),
                events_tx,
                receive_task: Mutex::new(None),
                shutdown_tx,
            }),
        };

        transport.spawn_receive_loop(read_half, shutdown_rx).await;

        Ok((transport, events_rx))
    }

    // Spawns a task reading the stream and parsing frames incrementally
    async fn spawn_receive_loop(
        &self,
        mut reader: OwnedReadHalf,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let transport = self.clone();

        let handle = tokio::spawn(async move {
            let inner = &transport.inner;
            let mut recv_buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);
            let mut chunk = vec![0u8; READ_CHUNK_SIZE];

            'outer: loop {
                // Drain every complete frame already buffered
                loop {
                    match codec::try_decode_frame(&mut recv_buffer) {
                        Ok(Some(frame)) => {
                            let event = TransportEvent::FrameReceived { frame };
                            if let Err(e) = inner.events_tx.send(event).await {
                                error!("Error sending event: {}", e);
                                break 'outer;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Error decoding bridge frame: {}", e);
                            let _ = inner
                                .events_tx
                                .send(TransportEvent::Error {
                                    error: format!("Error decoding bridge frame: {}", e),
                                })
                                .await;
                            break 'outer;
                        }
                    }
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("TCP receive loop received shutdown signal");
                            break;
                        }
                    }

                    result = reader.read(&mut chunk) => {
                        match result {
                            Ok(0) => {
                                if recv_buffer.is_empty() {
                                    debug!("Bridge closed the connection");
                                } else {
                                    warn!("Bridge closed mid-frame ({} bytes pending)", recv_buffer.len());
                                    let _ = inner.events_tx.send(TransportEvent::Error {
                                        error: Error::StreamClosed.to_string(),
                                    }).await;
                                }
                                break;
                            }
                            Ok(n) => {
                                trace!("Read {} bytes from {}", n, inner.peer_addr);
                                recv_buffer.extend_from_slice(&chunk[..n]);
                            }
                            Err(e) => {
                                let err = classify_io_error(e);
                                error!("Error reading from bridge: {}", err);
                                let _ = inner.events_tx.send(TransportEvent::Error {
                                    error: err.to_string(),
                                }).await;
                                break;
                            }
                        }
                    }
                }
            }

            inner.closed.store(true, Ordering::Relaxed);
            let _ = inner.events_tx.send(TransportEvent::Closed).await;
            info!("TCP receive loop terminated");
        });

        let mut task_guard = self.inner.receive_task.lock().await;
        *task_guard = Some(handle);
    }
}

fn classify_io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => Error::ConnectionReset,
        _ => Error::ReceiveFailed(e),
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    async fn send_frame(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let framed = codec::encode_frame(&frame)?;
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&framed).await.map_err(|e| {
            if e.kind() == io::ErrorKind::BrokenPipe || e.kind() == io::ErrorKind::ConnectionReset {
                self.inner.closed.store(true, Ordering::Relaxed);
                Error::ConnectionReset
            } else {
                Error::SendFailed(e)
            }
        })?;
        writer.flush().await.map_err(Error::SendFailed)?;
        trace!("Sent {} bytes to {}", framed.len(), self.inner.peer_addr);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("TCP transport closing...");

        let _ = self.inner.shutdown_tx.send(true);
        self.inner.closed.store(true, Ordering::Relaxed);

        let mut task_guard = self.inner.receive_task.lock().await;
        if let Some(handle) = task_guard.take() {
            match tokio::time::timeout(std::time::Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("TCP receive loop terminated cleanly"),
                Ok(Err(e)) => debug!("TCP receive loop task error: {}", e),
                Err(_) => warn!("TCP receive loop termination timed out"),
            }
        }
        drop(task_guard);

        // Shut the write side down so the bridge observes EOF
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;

        info!("TCP transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TcpTransport({})", self.inner.peer_addr)
    }
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportKind};

// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

// Largest datagram we expect from an emulator endpoint
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// UDP transport speaking to a device emulator endpoint
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    closed: AtomicBool,
    events_tx: mpsc::Sender<TransportEvent>,
    receive_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl UdpTransport {
    /// Creates a new UDP transport connected to the given emulator endpoint
    pub async fn connect(
        remote: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        // Ephemeral local bind; connect() pins the peer so recv only sees it
        let bind_addr: SocketAddr = if remote.is_ipv4() {
            "0.0.0.0:0".parse().expect("literal addr")
        } else {
            "[::]:0".parse().expect("literal addr")
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(Error::BindFailed)?;
        socket
            .connect(remote)
            .await
            .map_err(|e| Error::ConnectFailed(remote, e))?;
        info!("device UDP transport connected to {}", remote);

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                socket: Arc::new(socket),
                remote,
                closed: AtomicBool::new(false),
                events_tx,
                receive_task: tokio::sync::Mutex::new(None),
                shutdown_tx,
                shutdown_rx,
            }),
        };

        transport.spawn_receive_loop().await;

        Ok((transport, events_rx))
    }

    // Spawns a task to receive datagrams from the socket
    async fn spawn_receive_loop(&self) {
        let transport = self.clone();
        let mut shutdown_rx = self.inner.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let inner = &transport.inner;
            let socket = inner.socket.clone();
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("UDP receive loop received shutdown signal");
                            break;
                        }
                    }

                    result = socket.recv(&mut buf) => {
                        match result {
                            Ok(n) => {
                                debug!("Received {} byte datagram from {}", n, inner.remote);
                                match codec::decode_datagram(&buf[..n]) {
                                    Ok(frame) => {
                                        let event = TransportEvent::FrameReceived { frame };
                                        if let Err(e) = inner.events_tx.send(event).await {
                                            error!("Error sending event: {}", e);
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!("Error decoding device frame: {}", e);
                                        let _ = inner.events_tx.send(TransportEvent::Error {
                                            error: format!("Error decoding device frame: {}", e),
                                        }).await;
                                    }
                                }
                            }
                            Err(e) => {
                                error!("Error receiving datagram: {}", e);
                                let _ = inner.events_tx.send(TransportEvent::Error {
                                    error: format!("Error receiving datagram: {}", e),
                                }).await;
                                break;
                            }
                        }
                    }
                }
            }

            // Send closed event when the loop exits
            let _ = inner.events_tx.send(TransportEvent::Closed).await;
            info!("UDP receive loop terminated");
        });

        let mut task_guard = self.inner.receive_task.lock().await;
        *task_guard = Some(handle);
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    async fn send_frame(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let framed = codec::encode_frame(&frame)?;
        debug!("Sending {} byte frame to {}", framed.len(), self.inner.remote);
        self.inner
            .socket
            .send(&framed)
            .await
            .map_err(Error::SendFailed)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("UDP transport closing...");

        // Signal shutdown to the receive loop, then wait for it to finish
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.closed.store(true, Ordering::Relaxed);

        let mut task_guard = self.inner.receive_task.lock().await;
        if let Some(handle) = task_guard.take() {
            match tokio::time::timeout(std::time::Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("UDP receive loop terminated cleanly"),
                Ok(Err(e)) => debug!("UDP receive loop task error: {}", e),
                Err(_) => warn!("UDP receive loop termination timed out"),
            }
        }
        drop(task_guard);

        info!("UDP transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UdpTransport({})", self.inner.remote)
    }
}

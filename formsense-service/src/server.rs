//! WebSocket inference server
//!
//! Accepts tracker clients on any path. Every text frame is one data-URI
//! JPEG; each gets exactly one JSON response, in order, on the same socket.

use crate::analysis::{analyze_payload, PoseEstimator};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use formsense_core::{TrackerError, TrackerResult};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tungstenite::Message;
use uuid::Uuid;

/// A connected tracker client
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Connection identifier
    pub id: Uuid,
    /// Peer address
    pub addr: SocketAddr,
    /// When the handshake completed
    pub connected_at: DateTime<Utc>,
    /// Frames answered on this connection
    pub frames: u64,
}

struct Shared {
    estimator: Arc<dyn PoseEstimator>,
    clients: DashMap<Uuid, ClientInfo>,
    frames_processed: AtomicU64,
    shutdown: CancellationToken,
}

/// Reference inference service
pub struct InferenceServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl InferenceServer {
    /// Bind the listening socket
    pub async fn bind(
        addr: impl ToSocketAddrs,
        estimator: Arc<dyn PoseEstimator>,
    ) -> TrackerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TrackerError::Transport {
                reason: format!("failed to bind inference server: {}", e),
            })?;

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                estimator,
                clients: DashMap::new(),
                frames_processed: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> TrackerResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TrackerError::Transport {
                reason: e.to_string(),
            })
    }

    /// Serve in a background task
    pub fn spawn(self) -> TrackerResult<ServerHandle> {
        let addr = self.local_addr()?;
        let shared = self.shared.clone();
        let task = tokio::spawn(self.run());
        Ok(ServerHandle {
            addr,
            shared,
            task: Some(task),
        })
    }

    /// Serve until shut down through a [`ServerHandle`] or forever
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            tracing::info!("Inference server listening on {}", addr);
        }

        loop {
            tokio::select! {
                _ = self.shared.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!("New connection from {}", addr);
                        let shared = self.shared.clone();
                        tokio::spawn(async move {
                            shared.handle_connection(stream, addr).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        tracing::info!("Inference server stopped");
    }
}

impl Shared {
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let mut ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let id = Uuid::new_v4();
        self.clients.insert(
            id,
            ClientInfo {
                id,
                addr,
                connected_at: Utc::now(),
                frames: 0,
            },
        );
        tracing::info!("Client connected: {} ({})", addr, id);

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => None,
                message = ws.next() => Some(message),
            };
            let Some(message) = next else {
                let _ = ws.close(None).await;
                break;
            };

            match message {
                Some(Ok(Message::Text(payload))) => {
                    let response = analyze_payload(&payload, self.estimator.as_ref()).await;
                    let text = match response.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to encode response: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = ws.send(Message::Text(text)).await {
                        tracing::warn!("Failed to answer {}: {}", addr, e);
                        break;
                    }
                    self.frames_processed.fetch_add(1, Ordering::Relaxed);
                    if let Some(mut client) = self.clients.get_mut(&id) {
                        client.frames += 1;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::debug!("Connection {} closed", id);
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error on connection {}: {}", id, e);
                    break;
                }
                None => break,
                Some(Ok(_)) => {
                    // Binary, ping and pong frames carry no images
                }
            }
        }

        self.clients.remove(&id);
        tracing::info!("Client disconnected: {} ({})", addr, id);
    }
}

/// Control handle for a spawned [`InferenceServer`]
pub struct ServerHandle {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL clients should use
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Clients currently connected
    pub fn client_count(&self) -> usize {
        self.shared.clients.len()
    }

    /// Snapshot of connected clients
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.shared
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Frames answered across all clients
    pub fn frames_processed(&self) -> u64 {
        self.shared.frames_processed.load(Ordering::Relaxed)
    }

    /// Stop accepting, close every client and wait for the accept loop
    pub async fn shutdown(mut self) {
        self.shared.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Inference server task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

//! Connection lifecycle for the inference service link
//!
//! The manager is a small state machine (`Connecting -> Open -> Closed`) around
//! one WebSocket. Socket I/O runs in a driver task; callers only ever see state
//! changes, a non-failing `send`, and a single message handler.

use crate::error::{TrackerError, TrackerResult};
use crate::protocol::{decode_server_message, AnalysisResult};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type ServiceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of the service connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Handshake in progress (initial state)
    Connecting,
    /// Frames may be sent
    Open,
    /// Closed explicitly or after a failure
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Bounded retry after the connection drops or fails to open
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Retries after a failure; 0 disables reconnection
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for the doubled delay
    pub max_delay: Duration,
    /// A link that stays open this long earns a fresh retry budget
    pub stable_after: Duration,
}

impl ReconnectPolicy {
    /// Never reopen once closed
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            stable_after: Duration::from_secs(30),
        }
    }

    /// Retry up to `max_attempts` times with exponential backoff
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::disabled()
        }
    }

    /// Whether any retry will happen
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Backoff before retry number `attempt` (1-based), `None` once exhausted
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    /// Retry number that follows a link which was open for `open_for`.
    ///
    /// Links that accept and then drop quickly keep consuming the same budget,
    /// so a flapping service is still given up on after `max_attempts`.
    pub fn next_attempt(&self, previous: u32, open_for: Option<Duration>) -> u32 {
        match open_for {
            Some(open_for) if open_for >= self.stable_after => 1,
            _ => previous.saturating_add(1),
        }
    }

    /// Backoff with up to 10% random jitter added
    pub fn jittered_backoff(&self, attempt: u32) -> Option<Duration> {
        self.backoff(attempt).map(|delay| {
            let jitter_ms = (delay.as_millis() as u64) / 10;
            if jitter_ms == 0 {
                delay
            } else {
                delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
            }
        })
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on a single handshake attempt
    pub connect_timeout: Duration,
    /// Bound on the graceful close before the driver is aborted
    pub close_timeout: Duration,
    /// Retry behaviour after the link drops
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(1),
            reconnect: ReconnectPolicy::disabled(),
        }
    }
}

/// Counters kept by the connection driver
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Handshakes attempted
    pub connect_attempts: u64,
    /// Handshakes that reached `Open`
    pub successful_connections: u64,
    /// Frames written to the socket
    pub messages_sent: u64,
    /// Results handed to the message handler
    pub results_delivered: u64,
    /// Results carrying an error indicator
    pub results_rejected: u64,
    /// Inbound messages that were not valid results
    pub malformed_messages: u64,
    /// Sends refused because the link was not open or already busy
    pub sends_dropped: u64,
    /// When the link last reached `Open`
    pub last_open: Option<Instant>,
}

/// Receives every accepted result, in arrival order
pub trait MessageHandler: Send + 'static {
    /// Called once per inbound result
    fn on_result(&mut self, result: AnalysisResult);

    /// Called for messages the service flagged with an error indicator
    fn on_rejected(&mut self, _reason: &str) {}
}

impl<F> MessageHandler for F
where
    F: FnMut(AnalysisResult) + Send + 'static,
{
    fn on_result(&mut self, result: AnalysisResult) {
        self(result)
    }
}

/// Outcome of a send attempt. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the socket writer
    Queued,
    /// Dropped, link not open
    NotOpen,
    /// Dropped, previous frame still being written
    Busy,
}

/// Destination for encoded frames
pub trait FrameSink {
    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Offer one payload; drops it unless the link is open and idle
    fn send(&self, payload: String) -> SendOutcome;

    /// Shorthand for `state() == Open`
    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

type SharedHandler = Arc<Mutex<Option<Box<dyn MessageHandler>>>>;

/// Owns the duplex connection to the inference service
pub struct ConnectionManager {
    config: ConnectionConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    outbound_tx: Option<mpsc::Sender<String>>,
    handler: SharedHandler,
    stats: Arc<RwLock<ConnectionStats>>,
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
    url: Option<String>,
    closed: bool,
}

impl ConnectionManager {
    /// Create an unopened manager in the `Connecting` state
    pub fn new(config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            config,
            state_tx: Arc::new(state_tx),
            outbound_tx: None,
            handler: Arc::new(Mutex::new(None)),
            stats: Arc::new(RwLock::new(ConnectionStats::default())),
            cancel: CancellationToken::new(),
            driver: None,
            url: None,
            closed: false,
        }
    }

    /// Start connecting to `url`. Returns immediately; watch `state()`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&mut self, url: &str) -> TrackerResult<()> {
        if self.closed {
            return Err(TrackerError::InvalidState {
                expected: "unopened".to_string(),
                actual: ConnectionState::Closed.to_string(),
            });
        }
        if self.driver.is_some() {
            return Err(TrackerError::InvalidState {
                expected: "unopened".to_string(),
                actual: self.state().to_string(),
            });
        }
        validate_endpoint(url)?;

        // Capacity 1: at most one frame waits for the writer, never a backlog.
        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        self.outbound_tx = Some(outbound_tx);
        self.url = Some(url.to_string());

        let driver = Driver {
            url: url.to_string(),
            config: self.config.clone(),
            state_tx: self.state_tx.clone(),
            handler: self.handler.clone(),
            stats: self.stats.clone(),
            cancel: self.cancel.clone(),
        };
        self.driver = Some(tokio::spawn(driver.run(outbound_rx)));

        debug!("Connection driver started for {}", url);
        Ok(())
    }

    /// Register the handler for inbound results, replacing any previous one
    pub fn on_message<H: MessageHandler>(&self, handler: H) {
        *self.handler.lock() = Some(Box::new(handler));
    }

    /// Close the connection. Safe to call repeatedly and in any state.
    pub async fn close(&mut self) {
        self.closed = true;
        self.cancel.cancel();
        self.outbound_tx = None;

        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(self.config.close_timeout, &mut driver)
                .await
                .is_err()
            {
                warn!("Connection driver did not stop in time, aborting");
                driver.abort();
            }
            info!("Connection to inference service closed");
        }

        set_state(&self.state_tx, ConnectionState::Closed);
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the driver counters
    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Endpoint passed to `open`
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Configuration in use
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl FrameSink for ConnectionManager {
    fn state(&self) -> ConnectionState {
        ConnectionManager::state(self)
    }

    fn send(&self, payload: String) -> SendOutcome {
        let outcome = match (&self.outbound_tx, self.state()) {
            (Some(tx), ConnectionState::Open) => match tx.try_send(payload) {
                Ok(()) => SendOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Busy,
                Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::NotOpen,
            },
            _ => SendOutcome::NotOpen,
        };

        if outcome != SendOutcome::Queued {
            self.stats.write().sends_dropped += 1;
        }
        outcome
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Reject anything that is not a `ws://` or `wss://` URL with a host
pub fn validate_endpoint(url: &str) -> TrackerResult<()> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .ok_or_else(|| TrackerError::InvalidEndpoint {
            url: url.to_string(),
            reason: "scheme must be ws or wss".to_string(),
        })?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(TrackerError::InvalidEndpoint {
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(())
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
    state_tx.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        debug!("Connection state {} -> {}", current, next);
        *current = next;
        true
    });
}

/// How an open link ended
enum LinkEnd {
    /// `close()` was requested
    Cancelled,
    /// Peer closed or the socket failed
    Dropped,
}

struct Driver {
    url: String,
    config: ConnectionConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    handler: SharedHandler,
    stats: Arc<RwLock<ConnectionStats>>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self, mut outbound_rx: mpsc::Receiver<String>) {
        let mut attempt: u32 = 0;

        loop {
            set_state(&self.state_tx, ConnectionState::Connecting);
            self.stats.write().connect_attempts += 1;

            let handshake =
                tokio::time::timeout(self.config.connect_timeout, connect_async(self.url.as_str()));
            let socket = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = handshake => match result {
                    Ok(Ok((socket, _response))) => Some(socket),
                    Ok(Err(e)) => {
                        warn!("Connection to {} failed: {}", self.url, e);
                        None
                    }
                    Err(_) => {
                        warn!(
                            "Connection to {} timed out after {:?}",
                            self.url, self.config.connect_timeout
                        );
                        None
                    }
                },
            };

            let mut open_for = None;
            if let Some(socket) = socket {
                let opened_at = Instant::now();
                {
                    let mut stats = self.stats.write();
                    stats.successful_connections += 1;
                    stats.last_open = Some(Instant::now());
                }
                set_state(&self.state_tx, ConnectionState::Open);
                info!("Connected to inference service at {}", self.url);

                if let LinkEnd::Cancelled = self.run_link(socket, &mut outbound_rx).await {
                    break;
                }
                let lifetime = opened_at.elapsed();
                info!("Inference service connection lost after {:?}", lifetime);
                open_for = Some(lifetime);
            }

            set_state(&self.state_tx, ConnectionState::Closed);
            // A frame queued just before the drop must not go out after a reconnect.
            while outbound_rx.try_recv().is_ok() {}

            attempt = self.config.reconnect.next_attempt(attempt, open_for);
            let Some(delay) = self.config.reconnect.jittered_backoff(attempt) else {
                break;
            };
            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay, attempt, self.config.reconnect.max_attempts
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        set_state(&self.state_tx, ConnectionState::Closed);
    }

    async fn run_link(
        &self,
        socket: ServiceSocket,
        outbound_rx: &mut mpsc::Receiver<String>,
    ) -> LinkEnd {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    if let Err(e) = write.close().await {
                        debug!("Close handshake failed: {}", e);
                    }
                    return LinkEnd::Cancelled;
                }
                payload = outbound_rx.recv() => match payload {
                    Some(payload) => {
                        if let Err(e) = write.send(Message::Text(payload)).await {
                            warn!("Failed to send frame: {}", e);
                            return LinkEnd::Dropped;
                        }
                        self.stats.write().messages_sent += 1;
                    }
                    None => {
                        let _ = write.close().await;
                        return LinkEnd::Cancelled;
                    }
                },
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Service closed the connection: {:?}", frame);
                        return LinkEnd::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames carry no results
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        return LinkEnd::Dropped;
                    }
                    None => return LinkEnd::Dropped,
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match decode_server_message(text) {
            Ok(result) => {
                self.stats.write().results_delivered += 1;
                match self.handler.lock().as_mut() {
                    Some(handler) => handler.on_result(result),
                    None => debug!("No message handler registered, result dropped"),
                }
            }
            Err(TrackerError::ServiceRejected { reason }) => {
                self.stats.write().results_rejected += 1;
                debug!("Service could not analyse frame: {}", reason);
                if let Some(handler) = self.handler.lock().as_mut() {
                    handler.on_rejected(&reason);
                }
            }
            Err(e) => {
                self.stats.write().malformed_messages += 1;
                warn!("Dropping inbound message: {}", e);
            }
        }
    }
}

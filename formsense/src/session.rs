//! Tracking session
//!
//! A [`Session`] owns the camera stream and the service connection for one
//! tracking run. All reactions (camera ready, capture tick, inbound result,
//! link state change) happen one at a time on a single loop task, which is
//! also the only writer of the display state and the overlay surface.

use crate::config::SessionConfig;
use crate::display::{CameraStatus, DisplayState};
use crate::event::SessionEvent;
use crate::scheduler::{run_capture_cycle, CaptureScheduler, CycleOutcome};
use formsense_core::{
    AnalysisResult, ConnectionManager, ConnectionState, MessageHandler, ReconnectPolicy,
    TrackerError, TrackerResult,
};
use formsense_diagnostics::{MetricsSnapshot, SessionCounters, SessionMetrics};
use formsense_media::{
    default_provider, CameraConfig, CameraProvider, FrameEncoder, MediaError, MediaResult,
    MediaStreamHandle, OverlayRenderer, OverlaySurface, VideoResolution,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Lifecycle of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not started
    Idle,
    /// Loop running
    Running,
    /// Torn down; cannot be restarted
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Outcome of each teardown step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownReport {
    /// Capture cadence is no longer ticking
    pub scheduler_stopped: bool,
    /// Connection state after close
    pub connection: ConnectionState,
    /// Camera tracks that were live and got stopped
    pub tracks_stopped: usize,
    /// Camera tracks still live afterwards
    pub active_tracks: usize,
    /// Steps that did not end as expected
    pub errors: Vec<String>,
}

impl Default for TeardownReport {
    fn default() -> Self {
        Self {
            scheduler_stopped: true,
            connection: ConnectionState::Closed,
            tracks_stopped: 0,
            active_tracks: 0,
            errors: Vec::new(),
        }
    }
}

impl TeardownReport {
    /// Everything was released
    pub fn is_clean(&self) -> bool {
        self.scheduler_stopped
            && self.connection == ConnectionState::Closed
            && self.active_tracks == 0
            && self.errors.is_empty()
    }
}

struct Shared {
    display: RwLock<DisplayState>,
    overlay: RwLock<OverlaySurface>,
}

/// One tracking run: camera, service link, display and overlay
pub struct Session {
    config: SessionConfig,
    provider: Arc<dyn CameraProvider>,
    metrics: SessionMetrics,
    shared: Arc<Shared>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<TeardownReport>>,
    state: SessionState,
    report: Option<TeardownReport>,
}

impl Session {
    /// Create an idle session
    pub fn new(config: SessionConfig, provider: Arc<dyn CameraProvider>) -> TrackerResult<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(config.event_capacity);
        let resolution = config.camera.resolution;
        Ok(Self {
            provider,
            metrics: SessionMetrics::new(),
            shared: Arc::new(Shared {
                display: RwLock::new(DisplayState::default()),
                overlay: RwLock::new(OverlaySurface::new(resolution.width, resolution.height)),
            }),
            events,
            shutdown: CancellationToken::new(),
            task: None,
            state: SessionState::Idle,
            report: None,
            config,
        })
    }

    /// Start building a session
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.metrics.session_id()
    }

    /// Configuration in use
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Open the connection, request the camera and spawn the session loop.
    ///
    /// Returns once the loop is running; camera and link progress is reported
    /// through [`Session::subscribe`] and [`Session::display_state`]. Must be
    /// called from within a tokio runtime.
    pub fn start(&mut self) -> TrackerResult<()> {
        if self.state != SessionState::Idle {
            return Err(TrackerError::InvalidState {
                expected: SessionState::Idle.to_string(),
                actual: self.state.to_string(),
            });
        }

        let counters = self.metrics.counters();
        let (result_tx, result_rx) = watch::channel(None);
        let mut connection = ConnectionManager::new(self.config.connection.clone());
        connection.on_message(ResultForwarder {
            results: result_tx,
            counters: counters.clone(),
        });
        connection.open(&self.config.endpoint)?;
        let state_rx = connection.subscribe_state();

        let (camera_tx, camera_rx) = oneshot::channel();
        let provider = self.provider.clone();
        let camera = self.config.camera.clone();
        let acquisition = tokio::spawn(async move {
            let acquired = provider.acquire(&camera).await;
            // An unclaimed stream is released by its Drop
            let _ = camera_tx.send(acquired);
        });

        let session_loop = SessionLoop {
            capture_interval: self.config.capture_interval,
            connection,
            stream: None,
            encoder: FrameEncoder::new(self.config.jpeg_quality),
            renderer: OverlayRenderer::new(),
            counters: counters.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
        };
        let inputs = LoopInputs {
            scheduler: CaptureScheduler::new(counters),
            state_rx,
            results: result_rx,
            camera_rx,
            acquisition,
            shutdown: self.shutdown.clone(),
        };
        self.task = Some(tokio::spawn(session_loop.run(inputs)));
        self.state = SessionState::Running;

        info!(
            "Session {} started against {} using {} camera",
            self.id(),
            self.config.endpoint,
            self.provider.name()
        );
        Ok(())
    }

    /// Stop capture, close the connection and release the camera.
    ///
    /// Idempotent: later calls return the first report. Stopping a session
    /// that never started just marks it stopped.
    pub async fn stop(&mut self) -> TeardownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.shutdown.cancel();
        let report = match self.task.take() {
            Some(task) => match task.await {
                Ok(report) => report,
                Err(e) => {
                    error!("Session loop ended abnormally: {}", e);
                    TeardownReport {
                        errors: vec![format!("session loop failed: {}", e)],
                        ..Default::default()
                    }
                }
            },
            None => TeardownReport::default(),
        };

        self.state = SessionState::Stopped;
        self.report = Some(report.clone());
        info!("Session {} stopped", self.id());
        report
    }

    /// Current display state
    pub fn display_state(&self) -> DisplayState {
        self.shared.display.read().clone()
    }

    /// Copy of the overlay surface
    pub fn overlay_snapshot(&self) -> OverlaySurface {
        self.shared.overlay.read().clone()
    }

    /// Receive session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Counters and derived rates
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Live counters shared with the loop
    pub fn counters(&self) -> Arc<SessionCounters> {
        self.metrics.counters()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            // Aborting drops the loop, whose owners release camera and socket
            task.abort();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state)
            .field("endpoint", &self.config.endpoint)
            .field("camera", &self.provider.name())
            .finish()
    }
}

/// Hands accepted results to the loop and counts rejected ones.
///
/// The hand-off is a single slot: a result the loop has not picked up yet is
/// replaced by the next one.
struct ResultForwarder {
    results: watch::Sender<Option<AnalysisResult>>,
    counters: Arc<SessionCounters>,
}

impl MessageHandler for ResultForwarder {
    fn on_result(&mut self, result: AnalysisResult) {
        // Never fails, even once the loop has gone
        self.results.send_replace(Some(result));
    }

    fn on_rejected(&mut self, reason: &str) {
        self.counters.record_rejected();
        trace!("Result rejected: {}", reason);
    }
}

struct LoopInputs {
    scheduler: CaptureScheduler,
    state_rx: watch::Receiver<ConnectionState>,
    results: watch::Receiver<Option<AnalysisResult>>,
    camera_rx: oneshot::Receiver<MediaResult<MediaStreamHandle>>,
    acquisition: JoinHandle<()>,
    shutdown: CancellationToken,
}

struct SessionLoop {
    capture_interval: Duration,
    connection: ConnectionManager,
    stream: Option<MediaStreamHandle>,
    encoder: FrameEncoder,
    renderer: OverlayRenderer,
    counters: Arc<SessionCounters>,
    shared: Arc<Shared>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionLoop {
    async fn run(mut self, inputs: LoopInputs) -> TeardownReport {
        let LoopInputs {
            mut scheduler,
            mut state_rx,
            mut results,
            mut camera_rx,
            acquisition,
            shutdown,
        } = inputs;

        // The driver may already have moved on before we subscribed
        let initial = *state_rx.borrow_and_update();
        self.on_connection_state(initial);

        let mut camera_pending = true;
        let mut watching_state = true;
        let mut watching_results = true;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                changed = state_rx.changed(), if watching_state => match changed {
                    Ok(()) => {
                        let state = *state_rx.borrow_and_update();
                        self.on_connection_state(state);
                    }
                    Err(_) => watching_state = false,
                },

                acquired = &mut camera_rx, if camera_pending => {
                    camera_pending = false;
                    let acquired = acquired.unwrap_or_else(|_| Err(MediaError::BackendUnavailable {
                        backend: "camera acquisition task".to_string(),
                    }));
                    self.on_camera(acquired, &mut scheduler);
                }

                changed = results.changed(), if watching_results => match changed {
                    Ok(()) => {
                        let latest = results.borrow_and_update().clone();
                        if let Some(result) = latest {
                            self.on_result(result);
                        }
                    }
                    Err(_) => watching_results = false,
                },

                Some(_) = scheduler.next_cycle(), if scheduler.is_running() => self.on_tick(),
            }
        }

        acquisition.abort();
        self.teardown(scheduler).await
    }

    fn on_connection_state(&self, state: ConnectionState) {
        if self.shared.display.read().connection == state {
            return;
        }
        info!("Inference service link {}", state);
        self.emit(SessionEvent::ConnectionChanged { state });
        self.update_display(|display| display.connection = state);
    }

    fn on_camera(
        &mut self,
        acquired: MediaResult<MediaStreamHandle>,
        scheduler: &mut CaptureScheduler,
    ) {
        match acquired {
            Ok(stream) => {
                let label = stream.label().to_string();
                info!("Camera ready: {}", label);
                self.stream = Some(stream);
                if let Err(e) = scheduler.start(self.capture_interval) {
                    error!("Capture could not start: {}", e);
                }
                self.emit(SessionEvent::CameraReady { label });
                self.update_display(|display| display.camera = CameraStatus::Available);
            }
            Err(e) => {
                warn!("Camera unavailable, continuing without capture: {}", e);
                let reason = e.to_string();
                self.emit(SessionEvent::CameraUnavailable {
                    reason: reason.clone(),
                });
                self.update_display(|display| display.camera = CameraStatus::Unavailable { reason });
            }
        }
    }

    fn on_tick(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        match run_capture_cycle(stream, &mut self.encoder, &self.connection, &self.counters) {
            CycleOutcome::Sent {
                sequence,
                resolution,
            } => {
                trace!("Frame {} sent", sequence);
                self.sync_overlay(resolution);
            }
            other => trace!("Capture cycle: {:?}", other),
        }
    }

    fn on_result(&self, result: AnalysisResult) {
        self.counters.record_result();
        self.update_display(|display| display.apply_result(&result));

        let summary = {
            let mut surface = self.shared.overlay.write();
            self.renderer.render(&mut *surface, result.landmarks.as_ref())
        };
        self.emit(SessionEvent::OverlayRendered { summary });
    }

    fn sync_overlay(&self, resolution: VideoResolution) {
        if self.shared.overlay.write().sync_to(resolution) {
            debug!(
                "Overlay resized to {}x{}",
                resolution.width, resolution.height
            );
        }
    }

    fn update_display(&self, change: impl FnOnce(&mut DisplayState)) {
        let display = {
            let mut display = self.shared.display.write();
            change(&mut *display);
            display.clone()
        };
        self.emit(SessionEvent::DisplayUpdated { display });
    }

    fn emit(&self, event: SessionEvent) {
        trace!("Session event: {}", event.kind());
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn teardown(mut self, mut scheduler: CaptureScheduler) -> TeardownReport {
        let mut report = TeardownReport::default();

        scheduler.stop();
        report.scheduler_stopped = !scheduler.is_running();

        self.connection.close().await;
        report.connection = self.connection.state();
        if report.connection != ConnectionState::Closed {
            report
                .errors
                .push(format!("connection still {}", report.connection));
        }

        if let Some(mut stream) = self.stream.take() {
            report.tracks_stopped = stream.stop_all_tracks();
            report.active_tracks = stream.active_tracks();
            if report.active_tracks > 0 {
                report.errors.push(format!(
                    "{} camera track(s) still live",
                    report.active_tracks
                ));
            }
        }

        self.on_connection_state(report.connection);
        info!(
            "Session teardown: scheduler stopped, link {}, {} track(s) stopped",
            report.connection, report.tracks_stopped
        );
        self.emit(SessionEvent::Stopped {
            report: report.clone(),
        });
        report
    }
}

/// Fluent builder for a [`Session`]
pub struct SessionBuilder {
    config: SessionConfig,
    provider: Option<Arc<dyn CameraProvider>>,
}

impl SessionBuilder {
    /// Start from [`SessionConfig::from_env`]
    pub fn new() -> Self {
        Self::from_config(SessionConfig::from_env())
    }

    /// Start from an existing configuration
    pub fn from_config(config: SessionConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Set the inference service URL
    pub fn endpoint(mut self, url: &str) -> Self {
        self.config.endpoint = url.to_string();
        self
    }

    /// Set the capture cadence
    pub fn capture_interval(mut self, interval: Duration) -> Self {
        self.config.capture_interval = interval;
        self
    }

    /// Set JPEG quality (1-100)
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    /// Replace the camera request
    pub fn camera(mut self, camera: CameraConfig) -> Self {
        self.config.camera = camera;
        self
    }

    /// Request a capture resolution
    pub fn resolution(mut self, resolution: VideoResolution) -> Self {
        self.config.camera.resolution = resolution;
        self
    }

    /// Reconnect after the link drops
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.connection.reconnect = policy;
        self
    }

    /// Bound each connection attempt
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection.connect_timeout = timeout;
        self
    }

    /// Use a specific camera backend
    pub fn camera_provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build an idle session; the default camera backend is used unless one was set
    pub fn build(self) -> TrackerResult<Session> {
        if self.config.endpoint.trim().is_empty() {
            return Err(TrackerError::MissingConfiguration {
                field: "endpoint".to_string(),
            });
        }
        let provider = self.provider.unwrap_or_else(default_provider);
        Session::new(self.config, provider)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field(
                "provider",
                &self.provider.as_ref().map(|provider| provider.name().to_string()),
            )
            .finish()
    }
}

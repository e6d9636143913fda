//! Fixed-interval capture cadence
//!
//! Ticks fire on wall-clock time regardless of whether the previous frame
//! has been answered. Each tick runs one capture cycle: check the link,
//! snapshot, encode, send. Nothing is queued; a cycle that cannot send is
//! dropped.

use formsense_core::{FrameSink, SendOutcome, TrackerError, TrackerResult};
use formsense_diagnostics::SessionCounters;
use formsense_media::{FrameEncoder, MediaError, MediaStreamHandle, VideoResolution};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// What one capture cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A frame was handed to the connection
    Sent {
        /// Encoder sequence number of the frame
        sequence: u64,
        /// Size of the captured frame
        resolution: VideoResolution,
    },
    /// The link was not open; nothing was captured
    DroppedNotOpen,
    /// No complete frame was available yet
    SkippedNotReady,
    /// The previous frame was still being written
    DroppedBusy,
    /// The encoder failed on a complete frame
    EncodeFailed {
        /// Encoder error
        reason: String,
    },
}

/// Drives capture cycles at a fixed interval
#[derive(Debug)]
pub struct CaptureScheduler {
    interval: Option<Interval>,
    period: Duration,
    counters: Arc<SessionCounters>,
}

impl CaptureScheduler {
    /// Create a stopped scheduler reporting into `counters`
    pub fn new(counters: Arc<SessionCounters>) -> Self {
        Self {
            interval: None,
            period: Duration::ZERO,
            counters,
        }
    }

    /// Begin ticking every `period`, first tick one period from now.
    ///
    /// Restarting replaces the previous cadence.
    pub fn start(&mut self, period: Duration) -> TrackerResult<()> {
        if period.is_zero() {
            return Err(TrackerError::InvalidConfiguration {
                message: "Capture interval must be non-zero".to_string(),
            });
        }

        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        self.period = period;
        debug!("Capture scheduler started at {:?}", period);
        Ok(())
    }

    /// Stop ticking. No tick is yielded after this returns.
    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!("Capture scheduler stopped");
        }
    }

    /// Whether ticks are being produced
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Current period, zero when never started
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick and return the cycle number, `None` when stopped
    pub async fn next_cycle(&mut self) -> Option<u64> {
        let interval = self.interval.as_mut()?;
        interval.tick().await;
        self.counters.record_cycle();
        Some(self.counters.cycles())
    }
}

/// Run one capture cycle against `sink`
pub fn run_capture_cycle<S: FrameSink + ?Sized>(
    stream: &mut MediaStreamHandle,
    encoder: &mut FrameEncoder,
    sink: &S,
    counters: &SessionCounters,
) -> CycleOutcome {
    // Drop-if-busy: a closed link costs nothing, not even a snapshot
    if !sink.is_open() {
        counters.record_dropped();
        return CycleOutcome::DroppedNotOpen;
    }

    let frame = match stream.current_frame() {
        Ok(frame) => frame,
        Err(e) => {
            trace!("No frame this cycle: {}", e);
            counters.record_skipped();
            return CycleOutcome::SkippedNotReady;
        }
    };

    let encoded = match encoder.encode(&frame) {
        Ok(encoded) => encoded,
        Err(MediaError::FrameNotReady { .. } | MediaError::InvalidFrameData { .. }) => {
            counters.record_skipped();
            return CycleOutcome::SkippedNotReady;
        }
        Err(e) => {
            warn!("Frame encoding failed: {}", e);
            counters.record_skipped();
            return CycleOutcome::EncodeFailed {
                reason: e.to_string(),
            };
        }
    };

    let sequence = encoded.sequence();
    let resolution = VideoResolution::new(encoded.width(), encoded.height());
    match sink.send(encoded.into_payload()) {
        SendOutcome::Queued => {
            counters.record_sent();
            CycleOutcome::Sent {
                sequence,
                resolution,
            }
        }
        SendOutcome::Busy => {
            counters.record_dropped();
            CycleOutcome::DroppedBusy
        }
        SendOutcome::NotOpen => {
            counters.record_dropped();
            CycleOutcome::DroppedNotOpen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsense_core::ConnectionState;
    use formsense_media::{CameraConfig, CameraProvider, SyntheticCameraProvider};
    use parking_lot::Mutex;

    struct RecordingSink {
        state: ConnectionState,
        busy: bool,
        sent: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new(state: ConnectionState) -> Self {
            Self {
                state,
                busy: false,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl FrameSink for RecordingSink {
        fn state(&self) -> ConnectionState {
            self.state
        }

        fn send(&self, payload: String) -> SendOutcome {
            if self.busy {
                return SendOutcome::Busy;
            }
            self.sent.lock().push(payload);
            SendOutcome::Queued
        }
    }

    async fn stream(provider: SyntheticCameraProvider) -> MediaStreamHandle {
        provider.acquire(&CameraConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_cycle_sends_when_open() {
        let counters = SessionCounters::new();
        let sink = RecordingSink::new(ConnectionState::Open);
        let mut stream = stream(SyntheticCameraProvider::new()).await;
        let mut encoder = FrameEncoder::default();

        let outcome = run_capture_cycle(&mut stream, &mut encoder, &sink, &counters);

        assert_eq!(
            outcome,
            CycleOutcome::Sent {
                sequence: 1,
                resolution: VideoResolution::VGA,
            }
        );
        assert!(sink.sent.lock()[0].starts_with("data:image/jpeg;base64,"));
        assert_eq!(counters.frames_sent(), 1);
    }

    #[tokio::test]
    async fn test_cycle_dropped_without_encoding_when_not_open() {
        let counters = SessionCounters::new();
        let mut stream = stream(SyntheticCameraProvider::new()).await;
        let mut encoder = FrameEncoder::default();

        for state in [ConnectionState::Connecting, ConnectionState::Closed] {
            let sink = RecordingSink::new(state);
            let outcome = run_capture_cycle(&mut stream, &mut encoder, &sink, &counters);
            assert_eq!(outcome, CycleOutcome::DroppedNotOpen);
            assert!(sink.sent.lock().is_empty());
        }

        assert_eq!(encoder.frames_encoded(), 0);
        assert_eq!(counters.frames_dropped(), 2);
    }

    #[tokio::test]
    async fn test_cycle_skipped_during_warmup() {
        let counters = SessionCounters::new();
        let sink = RecordingSink::new(ConnectionState::Open);
        let mut stream = stream(SyntheticCameraProvider::new().with_warmup_frames(1)).await;
        let mut encoder = FrameEncoder::default();

        let first = run_capture_cycle(&mut stream, &mut encoder, &sink, &counters);
        let second = run_capture_cycle(&mut stream, &mut encoder, &sink, &counters);

        assert_eq!(first, CycleOutcome::SkippedNotReady);
        assert!(matches!(second, CycleOutcome::Sent { sequence: 1, .. }));
        assert_eq!(counters.frames_skipped(), 1);
    }

    #[tokio::test]
    async fn test_cycle_dropped_when_busy() {
        let counters = SessionCounters::new();
        let mut sink = RecordingSink::new(ConnectionState::Open);
        sink.busy = true;
        let mut stream = stream(SyntheticCameraProvider::new()).await;
        let mut encoder = FrameEncoder::default();

        let outcome = run_capture_cycle(&mut stream, &mut encoder, &sink, &counters);

        assert_eq!(outcome, CycleOutcome::DroppedBusy);
        assert_eq!(counters.frames_dropped(), 1);
    }

    #[tokio::test]
    async fn test_stopped_stream_skips() {
        let counters = SessionCounters::new();
        let sink = RecordingSink::new(ConnectionState::Open);
        let mut stream = stream(SyntheticCameraProvider::new()).await;
        stream.stop_all_tracks();

        let outcome = run_capture_cycle(&mut stream, &mut FrameEncoder::default(), &sink, &counters);
        assert_eq!(outcome, CycleOutcome::SkippedNotReady);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_ticks_and_stops() {
        let counters = Arc::new(SessionCounters::new());
        let mut scheduler = CaptureScheduler::new(counters.clone());
        assert_eq!(scheduler.next_cycle().await, None);

        scheduler.start(Duration::from_millis(100)).unwrap();
        let started = Instant::now();
        assert_eq!(scheduler.next_cycle().await, Some(1));
        assert_eq!(scheduler.next_cycle().await, Some(2));
        assert!(started.elapsed() >= Duration::from_millis(200));

        scheduler.stop();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.next_cycle().await, None);
        assert_eq!(counters.cycles(), 2);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut scheduler = CaptureScheduler::new(Arc::new(SessionCounters::new()));
        assert!(scheduler.start(Duration::ZERO).is_err());
        assert!(!scheduler.is_running());
    }
}

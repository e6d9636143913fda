//! Session counters and derived rate/elapsed displays

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Counters shared by the capture scheduler and the session loop
#[derive(Debug, Default)]
pub struct SessionCounters {
    cycles: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    frames_skipped: AtomicU64,
    results_applied: AtomicU64,
    results_rejected: AtomicU64,
}

impl SessionCounters {
    /// Fresh zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A capture tick fired
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame was handed to the connection
    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A cycle was dropped because the link was not ready
    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A cycle was skipped because no frame could be encoded
    pub fn record_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A result updated the display
    pub fn record_result(&self) {
        self.results_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// A result was discarded
    pub fn record_rejected(&self) {
        self.results_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Capture ticks so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Frames sent so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Cycles dropped so far
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Cycles skipped so far
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    /// Results applied so far
    pub fn results_applied(&self) -> u64 {
        self.results_applied.load(Ordering::Relaxed)
    }

    /// Results discarded so far
    pub fn results_rejected(&self) -> u64 {
        self.results_rejected.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a session's counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Session identifier
    pub session_id: Uuid,
    /// Wall-clock start of the session
    pub started_at: DateTime<Utc>,
    /// Elapsed time formatted `MM:SS`
    pub elapsed: String,
    /// Elapsed milliseconds
    pub elapsed_ms: u64,
    /// Capture ticks
    pub cycles: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Cycles dropped, link not ready
    pub frames_dropped: u64,
    /// Cycles skipped, no frame
    pub frames_skipped: u64,
    /// Results applied to the display
    pub results_applied: u64,
    /// Results discarded
    pub results_rejected: u64,
    /// Frames sent per second since start
    pub send_rate: f64,
}

impl MetricsSnapshot {
    /// JSON form for logs and demos
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Derives display metrics from [`SessionCounters`]
#[derive(Debug, Clone)]
pub struct SessionMetrics {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
    counters: Arc<SessionCounters>,
}

impl SessionMetrics {
    /// Start measuring now with fresh counters
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
            counters: Arc::new(SessionCounters::new()),
        }
    }

    /// Session identifier
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Shared counters handle
    pub fn counters(&self) -> Arc<SessionCounters> {
        self.counters.clone()
    }

    /// Time since the session started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot at the current instant
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(self.elapsed())
    }

    /// Snapshot as if `elapsed` time had passed
    pub fn snapshot_at(&self, elapsed: Duration) -> MetricsSnapshot {
        let counters = &self.counters;
        let frames_sent = counters.frames_sent();
        MetricsSnapshot {
            session_id: self.session_id,
            started_at: self.started_at,
            elapsed: format_elapsed(elapsed),
            elapsed_ms: elapsed.as_millis() as u64,
            cycles: counters.cycles(),
            frames_sent,
            frames_dropped: counters.frames_dropped(),
            frames_skipped: counters.frames_skipped(),
            results_applied: counters.results_applied(),
            results_rejected: counters.results_rejected(),
            send_rate: rate(frames_sent, elapsed),
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a duration as `MM:SS`; minutes keep counting past 59
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        count as f64 / secs
    }
}

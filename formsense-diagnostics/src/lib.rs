//! # FormSense Diagnostics
//!
//! Logging setup and session metrics for the FormSense tracker.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod session_metrics;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use session_metrics::{format_elapsed, MetricsSnapshot, SessionCounters, SessionMetrics};

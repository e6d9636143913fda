//! # FormSense - Real-Time Arm Pose Tracking
//!
//! FormSense captures camera frames at a fixed cadence, streams them as JPEG
//! data URIs to a pose inference service over a WebSocket, and turns the
//! service's answers into an elbow-angle readout and a skeleton overlay.
//!
//! ## Key Features
//!
//! - **Drop-if-busy capture**: frames are never queued; a cycle that cannot send is dropped
//! - **Latest-wins display**: only the most recent result is shown
//! - **Owned session**: one [`Session`] holds camera and link, with ordered teardown
//! - **Reference service**: a drop-in inference server for local runs and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formsense::{Session, SessionEvent};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder()
//!         .endpoint("ws://localhost:8000/ws")
//!         .capture_interval(Duration::from_millis(100))
//!         .build()?;
//!
//!     let mut events = session.subscribe();
//!     session.start()?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::DisplayUpdated { display } = event {
//!             println!("{} {}", display.angle_label(), display.feedback);
//!         }
//!     }
//!
//!     session.stop().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use formsense_core::{
    AnalysisResult, ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats,
    FeedbackPhase, FrameSink, Joint, LandmarkMap, MessageHandler, NormalizedPoint,
    ReconnectPolicy, SendOutcome, TrackerError, TrackerResult,
};

pub use formsense_media::{
    default_provider, CameraConfig, CameraProvider, FrameEncoder, MediaError,
    MediaStreamHandle, OverlayRenderer, OverlayStyle, OverlaySurface, RenderSummary,
    SyntheticCameraProvider, VideoFrame, VideoResolution,
};

pub use formsense_diagnostics::{DebugLogger, MetricsSnapshot, SessionCounters, SessionMetrics};

#[cfg(feature = "service")]
pub use formsense_service::{
    CurlSweepEstimator, InferenceServer, PoseEstimator, ServerHandle, StaticPoseEstimator,
};

// Public API modules
pub mod config;
pub mod display;
pub mod event;
pub mod scheduler;
pub mod session;

// Re-export main API types
pub use config::{SessionConfig, DEFAULT_CAPTURE_INTERVAL, DEFAULT_ENDPOINT, ENDPOINT_ENV_VAR};
pub use display::{CameraStatus, DisplayState, WAITING_FOR_STREAM};
pub use event::SessionEvent;
pub use scheduler::{run_capture_cycle, CaptureScheduler, CycleOutcome};
pub use session::{Session, SessionBuilder, SessionState, TeardownReport};

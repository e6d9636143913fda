//! What the tracker shows the user

use formsense_core::{AnalysisResult, ConnectionState, FeedbackPhase};
use serde::{Deserialize, Serialize};

/// Feedback shown before the first result arrives
pub const WAITING_FOR_STREAM: &str = "Waiting for stream...";

/// Camera availability as seen by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CameraStatus {
    /// Acquisition still in progress
    Pending,
    /// Frames are being captured
    Available,
    /// Permission denied or no device; the session keeps running without frames
    Unavailable {
        /// Why the camera could not be used
        reason: String,
    },
}

/// Latest-wins view of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    /// Elbow angle of the latest accepted result
    pub angle: f64,
    /// Feedback label of the latest accepted result
    pub feedback: String,
    /// Phase of the latest accepted result
    pub phase: FeedbackPhase,
    /// Service link state
    pub connection: ConnectionState,
    /// Camera availability
    pub camera: CameraStatus,
    /// Accepted results applied so far
    pub results_applied: u64,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            angle: 0.0,
            feedback: WAITING_FOR_STREAM.to_string(),
            phase: FeedbackPhase::Neutral,
            connection: ConnectionState::Connecting,
            camera: CameraStatus::Pending,
            results_applied: 0,
        }
    }
}

impl DisplayState {
    /// Replace the shown result; older results are not kept
    pub fn apply_result(&mut self, result: &AnalysisResult) {
        self.angle = result.angle;
        self.feedback = result.feedback.clone();
        self.phase = result.phase();
        self.results_applied += 1;
    }

    /// Whether the service link is open
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Open
    }

    /// Angle rounded for display, e.g. `"90°"`
    pub fn angle_label(&self) -> String {
        format!("{}°", self.angle.round() as i64)
    }
}

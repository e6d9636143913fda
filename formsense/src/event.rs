//! Session events

use crate::display::DisplayState;
use crate::session::TeardownReport;
use formsense_core::ConnectionState;
use formsense_media::RenderSummary;

/// Events broadcast by a running [`Session`](crate::Session)
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The service link changed state
    ConnectionChanged {
        /// New connection state
        state: ConnectionState,
    },
    /// The camera stream was acquired and capture started
    CameraReady {
        /// Stream label reported by the provider
        label: String,
    },
    /// The camera could not be acquired
    CameraUnavailable {
        /// Why acquisition failed
        reason: String,
    },
    /// The display state changed
    DisplayUpdated {
        /// Display after the change
        display: DisplayState,
    },
    /// The overlay surface was repainted
    OverlayRendered {
        /// What was drawn
        summary: RenderSummary,
    },
    /// The session loop finished tearing down
    Stopped {
        /// Outcome of each teardown step
        report: TeardownReport,
    },
}

impl SessionEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::ConnectionChanged { .. } => "connection_changed",
            SessionEvent::CameraReady { .. } => "camera_ready",
            SessionEvent::CameraUnavailable { .. } => "camera_unavailable",
            SessionEvent::DisplayUpdated { .. } => "display_updated",
            SessionEvent::OverlayRendered { .. } => "overlay_rendered",
            SessionEvent::Stopped { .. } => "stopped",
        }
    }
}

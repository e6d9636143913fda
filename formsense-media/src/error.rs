//! Media error types and handling
//!
//! Camera, encoder and overlay failures. None of these end a tracking
//! session; the caller turns them into a degraded display or a skipped cycle.

use formsense_core::TrackerError;
use thiserror::Error;

/// Main error type for media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// The user or platform refused camera access
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Camera could not be opened or started
    #[error("Device failure on {device_id}: {reason}")]
    DeviceFailure {
        /// Device identifier
        device_id: String,
        /// Failure reason
        reason: String,
    },

    /// No camera backend compiled into this build
    #[error("Camera backend unavailable: {backend}")]
    BackendUnavailable {
        /// Backend name
        backend: String,
    },

    /// Capture not active error
    #[error("Capture not active")]
    CaptureNotActive,

    /// The video has no decoded image yet
    #[error("Frame not ready: {width}x{height}")]
    FrameNotReady {
        /// Reported width
        width: u32,
        /// Reported height
        height: u32,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Encoding operation failed
    #[error("Encoding failed: {codec} - {reason}")]
    EncodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Decoding operation failed
    #[error("Decoding failed: {codec} - {reason}")]
    DecodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable within a running session
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::FrameNotReady { .. } => true,
            MediaError::InvalidFrameData { .. } => true,
            MediaError::EncodingFailed { .. } => true,
            MediaError::DecodingFailed { .. } => true,
            MediaError::PermissionDenied { .. } => false,
            MediaError::DeviceNotFound { .. } => false,
            MediaError::DeviceFailure { .. } => false,
            MediaError::BackendUnavailable { .. } => false,
            MediaError::CaptureNotActive => false,
            MediaError::InvalidConfiguration { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DeviceFailure { .. } => ErrorCategory::Device,
            MediaError::BackendUnavailable { .. } => ErrorCategory::Platform,
            MediaError::CaptureNotActive => ErrorCategory::State,
            MediaError::FrameNotReady { .. } => ErrorCategory::State,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::EncodingFailed { .. } => ErrorCategory::Codec,
            MediaError::DecodingFailed { .. } => ErrorCategory::Codec,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error means the camera cannot be used at all
    pub fn is_camera_unavailable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Permission | ErrorCategory::Device | ErrorCategory::Platform
        )
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Access refused by the user or platform
    Permission,
    /// Device and hardware errors
    Device,
    /// Platform compatibility errors
    Platform,
    /// State management errors
    State,
    /// Data validation errors
    Data,
    /// Codec-related errors
    Codec,
    /// Configuration and parameter errors
    Configuration,
}

impl From<MediaError> for TrackerError {
    fn from(error: MediaError) -> Self {
        TrackerError::Media {
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let denied = MediaError::PermissionDenied {
            operation: "open camera 0".to_string(),
        };
        assert_eq!(denied.category(), ErrorCategory::Permission);
        assert!(!denied.is_recoverable());
        assert!(denied.is_camera_unavailable());

        let not_ready = MediaError::FrameNotReady {
            width: 0,
            height: 0,
        };
        assert_eq!(not_ready.category(), ErrorCategory::State);
        assert!(not_ready.is_recoverable());
        assert!(!not_ready.is_camera_unavailable());
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::InvalidFrameData {
            expected: 921_600,
            actual: 512,
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame data: expected 921600 bytes, got 512"
        );
    }

    #[test]
    fn test_into_tracker_error() {
        let error: TrackerError = MediaError::CaptureNotActive.into();
        assert_eq!(error.error_code(), "MEDIA_ERROR");
        assert!(error.is_recoverable());
    }
}

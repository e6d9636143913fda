//! Error types for the FormSense tracker

use std::time::Duration;
use thiserror::Error;

/// Main error type for tracker operations
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Endpoint URL is not a WebSocket URL
    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint {
        /// Endpoint that was rejected
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// What is wrong with it
        message: String,
    },

    /// Transport error
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Inbound message could not be decoded
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// The service answered a frame with an error indicator
    #[error("Service rejected frame: {reason}")]
    ServiceRejected {
        /// Error indicator sent by the service
        reason: String,
    },

    /// Media pipeline error surfaced through the session
    #[error("Media error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },
}

impl TrackerError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            TrackerError::InvalidEndpoint { .. } => "INVALID_ENDPOINT".to_string(),
            TrackerError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            TrackerError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            TrackerError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            TrackerError::Timeout { .. } => "TIMEOUT".to_string(),
            TrackerError::InvalidState { .. } => "INVALID_STATE".to_string(),
            TrackerError::Protocol { .. } => "PROTOCOL_ERROR".to_string(),
            TrackerError::ServiceRejected { .. } => "SERVICE_REJECTED".to_string(),
            TrackerError::Media { .. } => "MEDIA_ERROR".to_string(),
        }
    }

    /// Whether the pipeline keeps running after this error.
    ///
    /// Per-frame failures and transport drops degrade the display instead of
    /// ending the session.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TrackerError::Transport { .. } => true,
            TrackerError::Timeout { .. } => true,
            TrackerError::Protocol { .. } => true,
            TrackerError::ServiceRejected { .. } => true,
            TrackerError::Media { .. } => true,
            TrackerError::InvalidEndpoint { .. } => false,
            TrackerError::MissingConfiguration { .. } => false,
            TrackerError::InvalidConfiguration { .. } => false,
            TrackerError::InvalidState { .. } => false,
        }
    }
}

/// Result alias used across the core crate
pub type TrackerResult<T> = Result<T, TrackerError>;

//! # FormSense Core
//!
//! Wire protocol and connection lifecycle for the FormSense pose tracker.
//! This crate owns everything that touches the inference service link: the
//! data-URI frame format, result decoding, and the `ConnectionManager` state
//! machine that carries frames out and results back.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod error;
pub mod protocol;

// Re-export main types
pub use connection::{
    validate_endpoint, ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats,
    FrameSink, MessageHandler, ReconnectPolicy, SendOutcome,
};
pub use error::{TrackerError, TrackerResult};
pub use protocol::{
    data_uri_body, decode_server_message, frame_payload, AnalysisResult, FeedbackPhase, Joint,
    LandmarkMap, NormalizedPoint, ServiceResponse, FRAME_DATA_URI_PREFIX,
};

//! # FormSense Media
//!
//! Camera acquisition, JPEG frame encoding and skeleton overlay rendering for
//! the FormSense tracker. The native camera backend is behind the `camera`
//! feature; without it a synthetic test-pattern camera is used.

#![warn(clippy::all)]

pub mod capture;
pub mod encoder;
pub mod error;
pub mod overlay;
pub mod tracks;
pub mod video_capture;

// Re-export main types
pub use capture::default_provider;
pub use encoder::{decode_frame_payload, EncodedFrame, FrameEncoder, DEFAULT_JPEG_QUALITY};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use overlay::{
    OverlayRenderer, OverlayStyle, OverlaySurface, RenderSummary, ARM_SKELETON, TRANSPARENT,
};
pub use tracks::{VideoFrame, VideoResolution};
pub use video_capture::{
    CameraConfig, CameraProvider, CameraStream, MediaStreamHandle, SyntheticCameraProvider,
};

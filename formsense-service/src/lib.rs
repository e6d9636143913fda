//! # FormSense Service
//!
//! Reference inference service for the FormSense tracker. It speaks the same
//! wire protocol as the production service and wraps an opaque
//! [`PoseEstimator`]; no pose model ships with this crate.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod server;

// Re-export main types
pub use analysis::{
    analyze_payload, analyze_pose, calculate_angle, classify, ArmPose, CurlSweepEstimator,
    Keypoint, PoseEstimator, StaticPoseEstimator, BODY_NOT_CLEAR, CONFIDENCE_THRESHOLD,
    IMAGE_DECODE_FAILED, NO_PERSON_DETECTED,
};
pub use server::{ClientInfo, InferenceServer, ServerHandle};

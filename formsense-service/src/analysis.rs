//! Frame analysis around an opaque pose estimator
//!
//! The estimator finds the arm keypoints in pixel space. Everything after
//! that (confidence gating, normalization, the elbow angle and its label) is
//! done here so every estimator produces the same wire results.

use async_trait::async_trait;
use formsense_core::protocol::{
    AnalysisResult, FeedbackPhase, Joint, LandmarkMap, NormalizedPoint, ServiceResponse,
};
use formsense_core::TrackerResult;
use formsense_media::{decode_frame_payload, VideoFrame};
use tracing::{debug, warn};

/// Minimum keypoint confidence for a joint to count as visible
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Angles above this read as a straight arm
pub const STRAIGHT_ARM_DEGREES: f64 = 160.0;

/// Angles below this read as a full curl
pub const CURLED_ARM_DEGREES: f64 = 45.0;

/// Error sent when the payload is not a decodable image
pub const IMAGE_DECODE_FAILED: &str = "Image decode failed";

/// Error sent when the estimator finds nobody
pub const NO_PERSON_DETECTED: &str = "No person detected";

/// Label sent when a tracked joint is below the confidence threshold
pub const BODY_NOT_CLEAR: &str = "Body not clear";

/// A detected keypoint in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Horizontal pixel position
    pub x: f32,
    /// Vertical pixel position
    pub y: f32,
    /// Detection confidence, 0-1
    pub confidence: f32,
}

impl Keypoint {
    /// Create a keypoint
    pub const fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// Confident enough to use
    pub fn is_visible(&self) -> bool {
        self.confidence >= CONFIDENCE_THRESHOLD
    }

    fn normalized(&self, width: u32, height: u32) -> NormalizedPoint {
        NormalizedPoint::new(
            self.x as f64 / width.max(1) as f64,
            self.y as f64 / height.max(1) as f64,
        )
    }
}

/// The tracked arm's keypoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmPose {
    /// Shoulder keypoint
    pub shoulder: Keypoint,
    /// Elbow keypoint
    pub elbow: Keypoint,
    /// Wrist keypoint
    pub wrist: Keypoint,
}

impl ArmPose {
    /// All three joints are confident
    pub fn is_clear(&self) -> bool {
        self.shoulder.is_visible() && self.elbow.is_visible() && self.wrist.is_visible()
    }
}

/// Finds the tracked arm in a frame
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    /// Locate the arm, `None` when no person is in the frame
    async fn estimate(&self, frame: &VideoFrame) -> TrackerResult<Option<ArmPose>>;
}

/// Interior angle at `b` formed by `a` and `c`, in degrees (0-180)
pub fn calculate_angle(a: NormalizedPoint, b: NormalizedPoint, c: NormalizedPoint) -> f64 {
    let radians = (c.y() - b.y()).atan2(c.x() - b.x()) - (a.y() - b.y()).atan2(a.x() - b.x());
    let degrees = radians.to_degrees().abs();
    if degrees > 180.0 {
        360.0 - degrees
    } else {
        degrees
    }
}

/// Feedback label and phase for an elbow angle
pub fn classify(angle: f64) -> (String, FeedbackPhase) {
    if angle > STRAIGHT_ARM_DEGREES {
        ("Arm Straight - Down".to_string(), FeedbackPhase::Down)
    } else if angle < CURLED_ARM_DEGREES {
        ("Arm Curl - Up".to_string(), FeedbackPhase::Up)
    } else {
        (format!("Moving... {}°", angle as i64), FeedbackPhase::Neutral)
    }
}

/// Build the response for an estimated pose on a `width` x `height` frame
pub fn analyze_pose(pose: Option<ArmPose>, width: u32, height: u32) -> ServiceResponse {
    let Some(pose) = pose else {
        return ServiceResponse::error(NO_PERSON_DETECTED);
    };

    if !pose.is_clear() {
        return ServiceResponse::Analysis(AnalysisResult {
            angle: 0.0,
            feedback: BODY_NOT_CLEAR.to_string(),
            landmarks: None,
            phase: Some(FeedbackPhase::Neutral),
        });
    }

    let shoulder = pose.shoulder.normalized(width, height);
    let elbow = pose.elbow.normalized(width, height);
    let wrist = pose.wrist.normalized(width, height);

    let angle = calculate_angle(shoulder, elbow, wrist);
    let (feedback, phase) = classify(angle);
    let landmarks: LandmarkMap = [
        (Joint::Shoulder, shoulder),
        (Joint::Elbow, elbow),
        (Joint::Wrist, wrist),
    ]
    .into_iter()
    .collect();

    ServiceResponse::Analysis(AnalysisResult {
        angle: angle.trunc(),
        feedback,
        landmarks: Some(landmarks),
        phase: Some(phase),
    })
}

/// Analyse one inbound frame payload
pub async fn analyze_payload(payload: &str, estimator: &dyn PoseEstimator) -> ServiceResponse {
    let frame = match decode_frame_payload(payload) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Rejecting frame: {}", e);
            return ServiceResponse::error(IMAGE_DECODE_FAILED);
        }
    };

    match estimator.estimate(&frame).await {
        Ok(pose) => analyze_pose(pose, frame.width, frame.height),
        Err(e) => {
            warn!("Pose estimation failed: {}", e);
            ServiceResponse::error(e.to_string())
        }
    }
}

/// Estimator that reports the same pose for every frame
#[derive(Debug, Clone)]
pub struct StaticPoseEstimator {
    pose: Option<ArmPose>,
}

impl StaticPoseEstimator {
    /// Always report `pose`
    pub fn new(pose: ArmPose) -> Self {
        Self { pose: Some(pose) }
    }

    /// Never find anyone
    pub fn empty() -> Self {
        Self { pose: None }
    }
}

#[async_trait]
impl PoseEstimator for StaticPoseEstimator {
    async fn estimate(&self, _frame: &VideoFrame) -> TrackerResult<Option<ArmPose>> {
        Ok(self.pose)
    }
}

/// Estimator that sweeps the forearm through a curl, one step per frame.
///
/// The upper arm hangs straight down from the shoulder; the elbow angle moves
/// between 170 and 30 degrees and back.
#[derive(Debug)]
pub struct CurlSweepEstimator {
    step: std::sync::atomic::AtomicU64,
    steps_per_rep: u64,
}

impl CurlSweepEstimator {
    /// Sweep completing one repetition every `steps_per_rep` frames
    pub fn new(steps_per_rep: u64) -> Self {
        Self {
            step: std::sync::atomic::AtomicU64::new(0),
            steps_per_rep: steps_per_rep.max(2),
        }
    }

    fn angle_at(&self, step: u64) -> f64 {
        let phase = (step % self.steps_per_rep) as f64 / self.steps_per_rep as f64;
        // Triangle wave 0 -> 1 -> 0 over one repetition
        let t = 1.0 - (2.0 * phase - 1.0).abs();
        170.0 - t * 140.0
    }
}

impl Default for CurlSweepEstimator {
    fn default() -> Self {
        Self::new(40)
    }
}

#[async_trait]
impl PoseEstimator for CurlSweepEstimator {
    async fn estimate(&self, frame: &VideoFrame) -> TrackerResult<Option<ArmPose>> {
        let step = self
            .step
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let angle = self.angle_at(step).to_radians();

        let (w, h) = (frame.width as f32, frame.height as f32);
        let upper = h * 0.2;
        let shoulder = (w * 0.5, h * 0.3);
        let elbow = (shoulder.0, shoulder.1 + upper);
        // Forearm direction measured from the upper arm (pointing up at the elbow)
        let wrist = (
            elbow.0 + upper * (angle as f32).sin(),
            elbow.1 - upper * (angle as f32).cos(),
        );

        Ok(Some(ArmPose {
            shoulder: Keypoint::new(shoulder.0, shoulder.1, 0.9),
            elbow: Keypoint::new(elbow.0, elbow.1, 0.9),
            wrist: Keypoint::new(wrist.0, wrist.1, 0.9),
        }))
    }
}

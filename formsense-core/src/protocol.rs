//! Wire protocol between the tracker and the inference service
//!
//! Client to service: one text frame per accepted capture cycle, holding a
//! data URI (`data:image/jpeg;base64,...`). Service to client: one JSON
//! object per analysed frame. There is no correlation id; results are matched
//! to nothing and the consumer keeps only the latest one.

use crate::error::TrackerError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Prefix of every outbound frame payload
pub const FRAME_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Build the outbound payload for a base64-encoded JPEG body
pub fn frame_payload(base64_jpeg: &str) -> String {
    let mut payload = String::with_capacity(FRAME_DATA_URI_PREFIX.len() + base64_jpeg.len());
    payload.push_str(FRAME_DATA_URI_PREFIX);
    payload.push_str(base64_jpeg);
    payload
}

/// Return the base64 body of a data URI (everything after the first comma)
pub fn data_uri_body(payload: &str) -> Option<&str> {
    payload.split_once(',').map(|(_, body)| body)
}

/// Position expressed as a fraction of the source frame's width and height.
///
/// Serialized as a two-element array `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint(pub f64, pub f64);

impl NormalizedPoint {
    /// Create a point from normalized coordinates
    pub const fn new(x: f64, y: f64) -> Self {
        Self(x, y)
    }

    /// Horizontal fraction
    pub fn x(&self) -> f64 {
        self.0
    }

    /// Vertical fraction
    pub fn y(&self) -> f64 {
        self.1
    }

    /// Both coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.0.is_finite() && self.1.is_finite()
    }

    /// Scale to pixel coordinates on a surface of the given size
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (
            (self.0 * width as f64) as f32,
            (self.1 * height as f64) as f32,
        )
    }
}

/// Joints tracked for the bicep-curl exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    /// Shoulder of the tracked arm
    Shoulder,
    /// Elbow of the tracked arm
    Elbow,
    /// Wrist of the tracked arm
    Wrist,
}

impl Joint {
    /// Every tracked joint
    pub const ALL: [Joint; 3] = [Joint::Shoulder, Joint::Elbow, Joint::Wrist];

    /// Key used for this joint on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::Shoulder => "shoulder",
            Joint::Elbow => "elbow",
            Joint::Wrist => "wrist",
        }
    }
}

/// Mapping from joint name to normalized position.
///
/// Keys are kept as strings so a payload naming an unexpected joint still
/// decodes; lookups must be checked before a joint is used in a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkMap(BTreeMap<String, NormalizedPoint>);

impl LandmarkMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a named landmark
    pub fn insert(&mut self, name: impl Into<String>, point: NormalizedPoint) {
        self.0.insert(name.into(), point);
    }

    /// Look up a landmark by wire name
    pub fn get(&self, name: &str) -> Option<NormalizedPoint> {
        self.0.get(name).copied()
    }

    /// Look up a known joint
    pub fn joint(&self, joint: Joint) -> Option<NormalizedPoint> {
        self.get(joint.as_str())
    }

    /// Number of landmarks present
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No landmarks present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate landmarks in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, NormalizedPoint)> {
        self.0.iter().map(|(name, point)| (name.as_str(), *point))
    }

    /// Joints from `required` that are absent
    pub fn missing<'a>(&self, required: &'a [Joint]) -> Vec<&'a Joint> {
        required
            .iter()
            .filter(|joint| self.joint(**joint).is_none())
            .collect()
    }
}

impl FromIterator<(Joint, NormalizedPoint)> for LandmarkMap {
    fn from_iter<I: IntoIterator<Item = (Joint, NormalizedPoint)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(joint, point)| (joint.as_str().to_string(), point))
                .collect(),
        )
    }
}

/// Movement phase shown by the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackPhase {
    /// Arm curled
    Up,
    /// Arm extended
    Down,
    /// Anything else, including unknown codes
    #[serde(other)]
    Neutral,
}

impl FeedbackPhase {
    /// Derive the phase from a free-form feedback label.
    ///
    /// Matches the labels the service has been observed to send ("... Up",
    /// "... Down"); anything else is neutral.
    pub fn from_label(label: &str) -> Self {
        if label.contains("Up") {
            FeedbackPhase::Up
        } else if label.contains("Down") {
            FeedbackPhase::Down
        } else {
            FeedbackPhase::Neutral
        }
    }
}

/// One analysed frame as produced by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Tracked joint angle in degrees (0-180 expected)
    #[serde(serialize_with = "serialize_angle")]
    pub angle: f64,
    /// Short classification label
    pub feedback: String,
    /// Landmarks, `null` when the body was not clear
    pub landmarks: Option<LandmarkMap>,
    /// Explicit phase code, when the service sends one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<FeedbackPhase>,
}

impl AnalysisResult {
    /// Phase from the explicit code, falling back to the label
    pub fn phase(&self) -> FeedbackPhase {
        self.phase
            .unwrap_or_else(|| FeedbackPhase::from_label(&self.feedback))
    }
}

/// Whole-degree angles go out as JSON integers (`180`, not `180.0`)
fn serialize_angle<S: Serializer>(angle: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if angle.fract() == 0.0 && angle.abs() <= i32::MAX as f64 {
        serializer.serialize_i64(*angle as i64)
    } else {
        serializer.serialize_f64(*angle)
    }
}

/// Raw inbound message before validation
#[derive(Debug, Clone, Default, Deserialize)]
struct ServerMessage {
    #[serde(default)]
    angle: Option<f64>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    landmarks: Option<LandmarkMap>,
    #[serde(default)]
    phase: Option<FeedbackPhase>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Decode one inbound text message.
///
/// Messages carrying an `error` indicator come back as
/// [`TrackerError::ServiceRejected`]; anything that is not a complete result
/// comes back as [`TrackerError::Protocol`].
pub fn decode_server_message(text: &str) -> Result<AnalysisResult, TrackerError> {
    let message: ServerMessage =
        serde_json::from_str(text).map_err(|e| TrackerError::Protocol {
            message: format!("undecodable result: {}", e),
        })?;

    if let Some(error) = message.error {
        let reason = match error {
            serde_json::Value::String(reason) => reason,
            other => other.to_string(),
        };
        return Err(TrackerError::ServiceRejected { reason });
    }

    let angle = message.angle.ok_or_else(|| TrackerError::Protocol {
        message: "result without angle".to_string(),
    })?;
    let feedback = message.feedback.ok_or_else(|| TrackerError::Protocol {
        message: "result without feedback".to_string(),
    })?;

    Ok(AnalysisResult {
        angle,
        feedback,
        landmarks: message.landmarks,
        phase: message.phase,
    })
}

/// Response written by an inference service for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServiceResponse {
    /// Frame analysed
    Analysis(AnalysisResult),
    /// Frame could not be analysed
    Error {
        /// Error indicator
        error: String,
    },
}

impl ServiceResponse {
    /// Error response with the given indicator
    pub fn error(reason: impl Into<String>) -> Self {
        ServiceResponse::Error {
            error: reason.into(),
        }
    }

    /// Serialize to the JSON text sent on the wire
    pub fn to_json(&self) -> Result<String, TrackerError> {
        serde_json::to_string(self).map_err(|e| TrackerError::Protocol {
            message: format!("failed to encode response: {}", e),
        })
    }
}

//! Wire format tests for frames and results

use formsense_core::{
    data_uri_body, decode_server_message, frame_payload, AnalysisResult, FeedbackPhase, Joint,
    LandmarkMap, NormalizedPoint, ServiceResponse, TrackerError, FRAME_DATA_URI_PREFIX,
};

#[test]
fn test_frame_payload_is_jpeg_data_uri() {
    let payload = frame_payload("/9j/4AAQSkZJRg==");
    assert!(payload.starts_with(FRAME_DATA_URI_PREFIX));
    assert_eq!(data_uri_body(&payload), Some("/9j/4AAQSkZJRg=="));
}

#[test]
fn test_decode_full_result() {
    let text = r#"{
        "angle": 172,
        "feedback": "Arm Straight - Down",
        "landmarks": {
            "shoulder": [0.41, 0.32],
            "elbow": [0.43, 0.51],
            "wrist": [0.44, 0.70]
        }
    }"#;

    let result = decode_server_message(text).unwrap();
    assert_eq!(result.angle, 172.0);
    assert_eq!(result.phase(), FeedbackPhase::Down);

    let landmarks = result.landmarks.unwrap();
    assert_eq!(landmarks.len(), 3);
    assert_eq!(
        landmarks.joint(Joint::Elbow),
        Some(NormalizedPoint::new(0.43, 0.51))
    );
}

#[test]
fn test_decode_body_not_clear() {
    let result =
        decode_server_message(r#"{"angle": 0, "feedback": "Body not clear", "landmarks": null}"#)
            .unwrap();
    assert!(result.landmarks.is_none());
    assert_eq!(result.phase(), FeedbackPhase::Neutral);
}

#[test]
fn test_decode_missing_landmarks_field() {
    let result = decode_server_message(r#"{"angle": 12.5, "feedback": "Arm Curl - Up"}"#).unwrap();
    assert!(result.landmarks.is_none());
    assert_eq!(result.phase(), FeedbackPhase::Up);
}

#[test]
fn test_explicit_phase_wins_over_label() {
    let result = decode_server_message(
        r#"{"angle": 100, "feedback": "Going Up soon", "landmarks": null, "phase": "down"}"#,
    )
    .unwrap();
    assert_eq!(result.phase(), FeedbackPhase::Down);
}

#[test]
fn test_error_indicator_is_rejection() {
    match decode_server_message(r#"{"error": "Image decode failed"}"#) {
        Err(TrackerError::ServiceRejected { reason }) => {
            assert_eq!(reason, "Image decode failed")
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    // Non-string indicators still count as errors.
    let err = decode_server_message(r#"{"error": {"code": 3}, "angle": 10}"#).unwrap_err();
    assert_eq!(err.error_code(), "SERVICE_REJECTED");
}

#[test]
fn test_incomplete_or_invalid_json_is_protocol_error() {
    for text in [
        "",
        "[1, 2, 3]",
        r#"{"angle": 10}"#,
        r#"{"feedback": "x"}"#,
        r#"{"angle": "ten", "feedback": "x"}"#,
        r#"{"angle": 10, "feedback": "x", "landmarks": {"elbow": [0.1]}}"#,
    ] {
        let err = decode_server_message(text).unwrap_err();
        assert_eq!(err.error_code(), "PROTOCOL_ERROR", "input: {}", text);
    }
}

#[test]
fn test_unknown_joint_names_survive_decoding() {
    let result = decode_server_message(
        r#"{"angle": 90, "feedback": "Moving... 90°", "landmarks": {"hip": [0.5, 0.9]}}"#,
    )
    .unwrap();
    let landmarks = result.landmarks.unwrap();
    assert_eq!(landmarks.get("hip"), Some(NormalizedPoint::new(0.5, 0.9)));
    assert_eq!(landmarks.missing(&Joint::ALL).len(), 3);
}

#[test]
fn test_service_response_json_shape() {
    let landmarks: LandmarkMap = [(Joint::Wrist, NormalizedPoint::new(0.25, 0.75))]
        .into_iter()
        .collect();
    let response = ServiceResponse::Analysis(AnalysisResult {
        angle: 30.0,
        feedback: "Arm Curl - Up".to_string(),
        landmarks: Some(landmarks),
        phase: Some(FeedbackPhase::Up),
    });

    let json = response.to_json().unwrap();
    assert!(json.contains(r#""angle":30,"#));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["feedback"], "Arm Curl - Up");
    assert_eq!(value["phase"], "up");
    assert_eq!(value["landmarks"]["wrist"][0], 0.25);

    let error = ServiceResponse::error("No person detected").to_json().unwrap();
    assert_eq!(error, r#"{"error":"No person detected"}"#);
}

#[test]
fn test_angle_written_as_integer_when_whole() {
    let result = |angle: f64| AnalysisResult {
        angle,
        feedback: "Body not clear".to_string(),
        landmarks: None,
        phase: None,
    };

    let whole = ServiceResponse::Analysis(result(0.0)).to_json().unwrap();
    assert_eq!(whole, r#"{"angle":0,"feedback":"Body not clear","landmarks":null}"#);

    let fractional = serde_json::to_value(result(12.5)).unwrap();
    assert_eq!(fractional["angle"].as_f64(), Some(12.5));
    assert!(fractional["angle"].as_i64().is_none());

    // Both forms read back as degrees
    assert_eq!(decode_server_message(&whole).unwrap().angle, 0.0);
}

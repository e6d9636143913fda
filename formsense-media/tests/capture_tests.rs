//! Camera acquisition and frame encoding tests

use formsense_core::{data_uri_body, FRAME_DATA_URI_PREFIX};
use formsense_media::*;
use std::time::Duration;

#[tokio::test]
async fn test_synthetic_camera_to_payload() {
    let provider = SyntheticCameraProvider::new();
    let config = CameraConfig {
        resolution: VideoResolution::new(160, 120),
        ..CameraConfig::default()
    };
    let mut stream = provider.acquire(&config).await.unwrap();
    let mut encoder = FrameEncoder::default();

    let frame = stream.current_frame().unwrap();
    let encoded = encoder.encode(&frame).unwrap();

    assert_eq!((encoded.width(), encoded.height()), (160, 120));
    assert!(encoded.payload().starts_with(FRAME_DATA_URI_PREFIX));
    assert!(data_uri_body(encoded.payload()).is_some());

    let decoded = decode_frame_payload(&encoded.into_payload()).unwrap();
    assert_eq!(decoded.resolution(), VideoResolution::new(160, 120));
}

#[tokio::test]
async fn test_sequence_numbers_increase() {
    let mut encoder = FrameEncoder::new(60);
    let frame = VideoFrame::filled(32, 32, [0, 0, 0], 0);

    let first = encoder.encode(&frame).unwrap();
    let second = encoder.encode(&frame).unwrap();
    assert_eq!(first.sequence(), 1);
    assert_eq!(second.sequence(), 2);
    assert!(second.captured_at() >= first.captured_at());
}

#[tokio::test]
async fn test_lower_quality_gives_smaller_payload() {
    let provider = SyntheticCameraProvider::new();
    let mut stream = provider.acquire(&CameraConfig::default()).await.unwrap();
    let frame = stream.current_frame().unwrap();

    let high = FrameEncoder::new(95).encode(&frame).unwrap();
    let low = FrameEncoder::new(20).encode(&frame).unwrap();
    assert!(low.payload().len() < high.payload().len());
}

#[tokio::test]
async fn test_short_buffer_is_not_ready() {
    let mut encoder = FrameEncoder::default();
    let frame = VideoFrame::new(64, 64, vec![0; 64], 0);

    let err = encoder.encode(&frame).unwrap_err();
    assert!(matches!(err, MediaError::InvalidFrameData { .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_acquire_honours_startup_delay() {
    let provider = SyntheticCameraProvider::new().with_startup_delay(Duration::from_millis(50));
    let started = std::time::Instant::now();
    let stream = provider.acquire(&CameraConfig::default()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(stream.active_tracks(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let provider = SyntheticCameraProvider::new();
    let config = CameraConfig {
        framerate: 500,
        ..CameraConfig::default()
    };

    let err = provider.acquire(&config).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(provider.live_tracks(), 0);
}

#[test]
fn test_default_provider_is_available() {
    let provider = default_provider();
    assert!(!provider.name().is_empty());
}

#[cfg(not(feature = "camera"))]
#[tokio::test]
async fn test_default_build_streams_from_synthetic_camera() {
    // Without the camera feature the native backend and its frame slot are not built
    let provider = default_provider();
    assert_eq!(provider.name(), SyntheticCameraProvider::new().name());

    let mut stream = provider.acquire(&CameraConfig::default()).await.unwrap();
    assert!(stream.current_frame().is_ok());
    assert_eq!(stream.stop_all_tracks(), 1);
}

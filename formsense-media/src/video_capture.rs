//! Camera acquisition and stream ownership
//!
//! A [`CameraProvider`] turns a [`CameraConfig`] into a [`MediaStreamHandle`],
//! the single owner of the live camera tracks for one session. Acquisition is
//! asynchronous because the platform may prompt the user for access.

use crate::error::{MediaError, MediaResult};
use crate::tracks::{VideoFrame, VideoResolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Camera request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Index of the device to open
    pub device_index: u32,
    /// Requested resolution; the device may pick the closest it supports
    pub resolution: VideoResolution,
    /// Requested frame rate
    pub framerate: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: VideoResolution::VGA,
            framerate: 30,
        }
    }
}

impl CameraConfig {
    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.resolution.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "Resolution must be non-zero".to_string(),
            });
        }
        if self.framerate == 0 || self.framerate > 120 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("Frame rate {} out of range 1-120", self.framerate),
            });
        }
        Ok(())
    }
}

/// One live video track
pub trait CameraStream: Send {
    /// Human readable track label
    fn label(&self) -> &str;

    /// Most recent decoded frame.
    ///
    /// Returns [`MediaError::FrameNotReady`] until the first frame arrives.
    fn latest_frame(&mut self) -> MediaResult<VideoFrame>;

    /// Whether the track is still producing frames
    fn is_live(&self) -> bool;

    /// Stop the track and release the device. Idempotent.
    fn stop(&mut self);
}

/// Exclusive owner of a camera stream's tracks.
///
/// Dropping the handle stops every track.
pub struct MediaStreamHandle {
    label: String,
    tracks: Vec<Box<dyn CameraStream>>,
}

impl MediaStreamHandle {
    /// Wrap live tracks
    pub fn new(label: impl Into<String>, tracks: Vec<Box<dyn CameraStream>>) -> Self {
        Self {
            label: label.into(),
            tracks,
        }
    }

    /// Stream label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of tracks still live
    pub fn active_tracks(&self) -> usize {
        self.tracks.iter().filter(|track| track.is_live()).count()
    }

    /// Latest frame of the first live track
    pub fn current_frame(&mut self) -> MediaResult<VideoFrame> {
        self.tracks
            .iter_mut()
            .find(|track| track.is_live())
            .ok_or(MediaError::CaptureNotActive)?
            .latest_frame()
    }

    /// Stop every track, returning how many were still live
    pub fn stop_all_tracks(&mut self) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut().filter(|track| track.is_live()) {
            track.stop();
            stopped += 1;
        }
        if stopped > 0 {
            info!("Stopped {} camera track(s) of {}", stopped, self.label);
        }
        stopped
    }
}

impl Drop for MediaStreamHandle {
    fn drop(&mut self) {
        self.stop_all_tracks();
    }
}

impl std::fmt::Debug for MediaStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStreamHandle")
            .field("label", &self.label)
            .field("tracks", &self.tracks.len())
            .field("active", &self.active_tracks())
            .finish()
    }
}

/// Source of camera streams
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Acquire the camera described by `config`
    async fn acquire(&self, config: &CameraConfig) -> MediaResult<MediaStreamHandle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyntheticBehavior {
    Available,
    Denied,
    Missing,
}

/// Camera provider that renders a moving test pattern.
///
/// Used by tests and by builds without the `camera` feature. Clones share the
/// live track counter, so a test can keep one clone and observe release.
#[derive(Debug, Clone)]
pub struct SyntheticCameraProvider {
    behavior: SyntheticBehavior,
    startup_delay: Duration,
    warmup_frames: u32,
    live_tracks: Arc<AtomicUsize>,
}

impl SyntheticCameraProvider {
    /// Provider that grants access immediately
    pub fn new() -> Self {
        Self {
            behavior: SyntheticBehavior::Available,
            startup_delay: Duration::ZERO,
            warmup_frames: 0,
            live_tracks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Provider whose access request is refused
    pub fn denied() -> Self {
        Self {
            behavior: SyntheticBehavior::Denied,
            ..Self::new()
        }
    }

    /// Provider with no device attached
    pub fn missing() -> Self {
        Self {
            behavior: SyntheticBehavior::Missing,
            ..Self::new()
        }
    }

    /// Delay acquisition, as a permission prompt would
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Report `FrameNotReady` for the first `frames` reads
    pub fn with_warmup_frames(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Tracks acquired from this provider that are still live
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticCameraProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraProvider for SyntheticCameraProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn acquire(&self, config: &CameraConfig) -> MediaResult<MediaStreamHandle> {
        config.validate()?;
        if !self.startup_delay.is_zero() {
            tokio::time::sleep(self.startup_delay).await;
        }

        match self.behavior {
            SyntheticBehavior::Denied => {
                return Err(MediaError::PermissionDenied {
                    operation: format!("open camera {}", config.device_index),
                })
            }
            SyntheticBehavior::Missing => {
                return Err(MediaError::DeviceNotFound {
                    device_id: config.device_index.to_string(),
                })
            }
            SyntheticBehavior::Available => {}
        }

        self.live_tracks.fetch_add(1, Ordering::SeqCst);
        let track = SyntheticTrack {
            label: format!("synthetic camera {}", config.device_index),
            resolution: config.resolution,
            started: Instant::now(),
            reads: 0,
            warmup_frames: self.warmup_frames,
            live: true,
            live_tracks: self.live_tracks.clone(),
        };
        debug!("Synthetic camera acquired at {:?}", config.resolution);

        Ok(MediaStreamHandle::new(
            "synthetic",
            vec![Box::new(track) as Box<dyn CameraStream>],
        ))
    }
}

struct SyntheticTrack {
    label: String,
    resolution: VideoResolution,
    started: Instant,
    reads: u64,
    warmup_frames: u32,
    live: bool,
    live_tracks: Arc<AtomicUsize>,
}

impl SyntheticTrack {
    /// Horizontal gradient with a bright bar sweeping left to right
    fn render_pattern(&self) -> Vec<u8> {
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let bar = (self.reads as usize * 8) % width.max(1);
        let mut data = Vec::with_capacity(width * height * VideoFrame::BYTES_PER_PIXEL);

        for y in 0..height {
            for x in 0..width {
                if x.abs_diff(bar) < 4 {
                    data.extend_from_slice(&[240, 240, 240]);
                } else {
                    let shade = ((x * 255) / width.max(1)) as u8;
                    let tint = ((y * 255) / height.max(1)) as u8;
                    data.extend_from_slice(&[shade, tint / 2, 96]);
                }
            }
        }
        data
    }
}

impl CameraStream for SyntheticTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn latest_frame(&mut self) -> MediaResult<VideoFrame> {
        if !self.live {
            return Err(MediaError::CaptureNotActive);
        }
        self.reads += 1;
        if self.reads <= self.warmup_frames as u64 {
            return Err(MediaError::FrameNotReady {
                width: 0,
                height: 0,
            });
        }

        Ok(VideoFrame::new(
            self.resolution.width,
            self.resolution.height,
            self.render_pattern(),
            self.started.elapsed().as_millis() as u64,
        ))
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_config_validation() {
        assert!(CameraConfig::default().validate().is_ok());

        let config = CameraConfig {
            framerate: 0,
            ..CameraConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CameraConfig {
            resolution: VideoResolution::new(0, 480),
            ..CameraConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_synthetic_stream_lifecycle() {
        let provider = SyntheticCameraProvider::new();
        let mut handle = provider.acquire(&CameraConfig::default()).await.unwrap();
        assert_eq!(handle.active_tracks(), 1);
        assert_eq!(provider.live_tracks(), 1);

        let frame = handle.current_frame().unwrap();
        assert_eq!(frame.resolution(), VideoResolution::VGA);
        assert!(frame.is_decoded());

        assert_eq!(handle.stop_all_tracks(), 1);
        assert_eq!(handle.stop_all_tracks(), 0);
        assert_eq!(handle.active_tracks(), 0);
        assert_eq!(provider.live_tracks(), 0);
        assert!(matches!(
            handle.current_frame(),
            Err(MediaError::CaptureNotActive)
        ));
    }

    #[tokio::test]
    async fn test_drop_releases_tracks() {
        let provider = SyntheticCameraProvider::new();
        let handle = provider.acquire(&CameraConfig::default()).await.unwrap();
        assert_eq!(provider.live_tracks(), 1);
        drop(handle);
        assert_eq!(provider.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_warmup_frames_not_ready() {
        let provider = SyntheticCameraProvider::new().with_warmup_frames(2);
        let mut handle = provider.acquire(&CameraConfig::default()).await.unwrap();
        assert!(matches!(
            handle.current_frame(),
            Err(MediaError::FrameNotReady { .. })
        ));
        assert!(handle.current_frame().is_err());
        assert!(handle.current_frame().is_ok());
    }

    #[tokio::test]
    async fn test_denied_and_missing() {
        let err = SyntheticCameraProvider::denied()
            .acquire(&CameraConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::PermissionDenied { .. }));

        let err = SyntheticCameraProvider::missing()
            .acquire(&CameraConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_camera_unavailable());
    }
}

//! Native camera capture via nokhwa
//!
//! The device is owned by a dedicated capture thread: it opens the camera,
//! reports the outcome once, then keeps the latest decoded frame in a shared
//! slot until told to stop.

use crate::error::{MediaError, MediaResult};
use crate::tracks::VideoFrame;
use crate::video_capture::{CameraConfig, CameraProvider, CameraStream, MediaStreamHandle};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Camera provider backed by the platform's native capture API
#[derive(Debug, Default)]
pub struct NativeCameraProvider;

impl NativeCameraProvider {
    /// Create a provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CameraProvider for NativeCameraProvider {
    fn name(&self) -> &str {
        "native"
    }

    async fn acquire(&self, config: &CameraConfig) -> MediaResult<MediaStreamHandle> {
        config.validate()?;

        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (opened_tx, opened_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("formsense-camera".to_string())
            .spawn({
                let config = config.clone();
                let latest = latest.clone();
                let running = running.clone();
                move || capture_loop(config, latest, running, opened_tx)
            })
            .map_err(|e| MediaError::DeviceFailure {
                device_id: config.device_index.to_string(),
                reason: format!("failed to spawn capture thread: {}", e),
            })?;

        let label = match opened_rx.await {
            Ok(Ok(label)) => label,
            Ok(Err(e)) => {
                reap(thread).await;
                return Err(e);
            }
            Err(_) => {
                reap(thread).await;
                return Err(MediaError::DeviceFailure {
                    device_id: config.device_index.to_string(),
                    reason: "capture thread exited during open".to_string(),
                });
            }
        };

        info!("Camera {} opened: {}", config.device_index, label);
        let track = NativeTrack {
            label: label.clone(),
            latest,
            running,
            thread: Some(thread),
        };
        Ok(MediaStreamHandle::new(
            label,
            vec![Box::new(track) as Box<dyn CameraStream>],
        ))
    }
}

/// Wait for a capture thread off the async workers
async fn reap(thread: JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!("Camera capture thread panicked"),
        Err(e) => warn!("Could not wait for camera capture thread: {}", e),
    }
}

fn open_camera(config: &CameraConfig) -> MediaResult<Camera> {
    let format = CameraFormat::new(
        Resolution::new(config.resolution.width, config.resolution.height),
        FrameFormat::MJPEG,
        config.framerate,
    );
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

    let mut camera = Camera::new(CameraIndex::Index(config.device_index), requested)
        .map_err(|e| map_open_error(config.device_index, e))?;
    camera
        .open_stream()
        .map_err(|e| map_open_error(config.device_index, e))?;
    Ok(camera)
}

fn map_open_error(index: u32, error: NokhwaError) -> MediaError {
    let reason = error.to_string();
    if reason.to_lowercase().contains("permission") {
        MediaError::PermissionDenied {
            operation: format!("open camera {}: {}", index, reason),
        }
    } else if reason.to_lowercase().contains("not found") {
        MediaError::DeviceNotFound {
            device_id: index.to_string(),
        }
    } else {
        MediaError::DeviceFailure {
            device_id: index.to_string(),
            reason,
        }
    }
}

fn capture_loop(
    config: CameraConfig,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    running: Arc<AtomicBool>,
    opened_tx: oneshot::Sender<MediaResult<String>>,
) {
    let mut camera = match open_camera(&config) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened_tx.send(Err(e));
            return;
        }
    };

    let label = camera.info().human_name();
    if opened_tx.send(Ok(label)).is_err() {
        // Nobody is waiting for this camera any more.
        let _ = camera.stop_stream();
        return;
    }

    let started = Instant::now();
    while running.load(Ordering::SeqCst) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>());
        match decoded {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                let frame = VideoFrame::new(
                    width,
                    height,
                    image.into_raw(),
                    started.elapsed().as_millis() as u64,
                );
                *latest.lock() = Some(frame);
            }
            Err(e) => {
                warn!("Camera frame dropped: {}", e);
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Failed to stop camera stream: {}", e);
    }
    debug!("Camera capture thread exiting");
}

struct NativeTrack {
    label: String,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CameraStream for NativeTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn latest_frame(&mut self) -> MediaResult<VideoFrame> {
        if !self.is_live() {
            return Err(MediaError::CaptureNotActive);
        }
        self.latest
            .lock()
            .clone()
            .ok_or(MediaError::FrameNotReady {
                width: 0,
                height: 0,
            })
    }

    fn is_live(&self) -> bool {
        self.thread.is_some()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Camera capture thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reap_does_not_stall_the_runtime() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let thread = std::thread::spawn(move || {
            let _ = release_rx.recv();
        });

        let reaping = tokio::spawn(reap(thread));
        // Timers still fire on this single-threaded runtime while the join is pending
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reaping.is_finished());

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), reaping)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_reap_survives_panicked_thread() {
        let thread = std::thread::spawn(|| panic!("device vanished"));
        tokio::time::timeout(Duration::from_secs(5), reap(thread))
            .await
            .unwrap();
    }
}

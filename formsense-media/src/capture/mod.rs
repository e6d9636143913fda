//! Platform camera backends

#[cfg(feature = "camera")]
pub mod native;

use crate::video_capture::CameraProvider;
use std::sync::Arc;

/// Get the best camera provider compiled into this build.
///
/// Falls back to the synthetic test pattern when the `camera` feature is off.
pub fn default_provider() -> Arc<dyn CameraProvider> {
    #[cfg(feature = "camera")]
    {
        Arc::new(native::NativeCameraProvider::new())
    }
    #[cfg(not(feature = "camera"))]
    {
        tracing::warn!("Built without the `camera` feature, using synthetic camera");
        Arc::new(crate::video_capture::SyntheticCameraProvider::new())
    }
}

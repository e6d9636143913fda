//! Video frame and resolution types

use crate::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoResolution {
    /// Create a resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 640x480
    pub const VGA: Self = Self::new(640, 480);
    /// 1280x720
    pub const HD: Self = Self::new(1280, 720);

    /// Total pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Both dimensions are non-zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One captured camera image, packed RGB24
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Row-major RGB24 pixels
    pub data: Vec<u8>,
    /// Capture timestamp in milliseconds since the stream started
    pub timestamp: u64,
}

impl VideoFrame {
    /// Bytes per RGB24 pixel
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Wrap raw RGB24 pixels
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp: u64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
        }
    }

    /// Frame filled with a single colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], timestamp: u64) -> Self {
        let pixels = width as usize * height as usize;
        let data = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::new(width, height, data, timestamp)
    }

    /// Native dimensions
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Buffer length a frame of these dimensions needs
    pub fn expected_len(&self) -> usize {
        self.resolution().pixel_count() * Self::BYTES_PER_PIXEL
    }

    /// Whether the frame holds a complete decoded image
    pub fn is_decoded(&self) -> bool {
        !self.resolution().is_empty() && self.data.len() >= self.expected_len()
    }

    /// Check the frame is usable, reporting why not
    pub fn ensure_decoded(&self) -> MediaResult<()> {
        if self.resolution().is_empty() {
            return Err(MediaError::FrameNotReady {
                width: self.width,
                height: self.height,
            });
        }
        if self.data.len() < self.expected_len() {
            return Err(MediaError::InvalidFrameData {
                expected: self.expected_len(),
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

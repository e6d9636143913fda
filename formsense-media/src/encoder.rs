//! JPEG frame encoding into data-URI payloads

use crate::error::{MediaError, MediaResult};
use crate::tracks::VideoFrame;
use formsense_core::protocol::{data_uri_body, frame_payload};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::time::Instant;

/// Default JPEG quality on the 1-100 scale
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// One encoded frame ready to send.
///
/// Timestamp and sequence stay local; only the payload goes on the wire.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    payload: String,
    width: u32,
    height: u32,
    captured_at: Instant,
    sequence: u64,
}

impl EncodedFrame {
    /// `data:image/jpeg;base64,...` payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Consume the frame, yielding the payload to send
    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Native width of the source frame
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Native height of the source frame
    pub fn height(&self) -> u32 {
        self.height
    }

    /// When the frame was encoded
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Local sequence number, starting at 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Encodes camera frames at a fixed lossy quality
#[derive(Debug)]
pub struct FrameEncoder {
    quality: u8,
    encoded: u64,
}

impl FrameEncoder {
    /// Create an encoder; quality is clamped to 1-100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            encoded: 0,
        }
    }

    /// Quality in use
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Frames encoded so far
    pub fn frames_encoded(&self) -> u64 {
        self.encoded
    }

    /// Encode a frame at its native resolution.
    ///
    /// Fails with [`MediaError::FrameNotReady`] or
    /// [`MediaError::InvalidFrameData`] when the frame holds no complete
    /// image; callers skip the cycle.
    pub fn encode(&mut self, frame: &VideoFrame) -> MediaResult<EncodedFrame> {
        frame.ensure_decoded()?;

        let pixels = &frame.data[..frame.expected_len()];
        let image = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(frame.width, frame.height, pixels)
            .ok_or(MediaError::InvalidFrameData {
                expected: frame.expected_len(),
                actual: frame.data.len(),
            })?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&image)
            .map_err(|e| MediaError::EncodingFailed {
                codec: "JPEG".to_string(),
                reason: e.to_string(),
            })?;

        self.encoded += 1;
        Ok(EncodedFrame {
            payload: frame_payload(&rbase64::encode(&jpeg)),
            width: frame.width,
            height: frame.height,
            captured_at: Instant::now(),
            sequence: self.encoded,
        })
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

/// Decode a data-URI frame payload back into RGB24 pixels
pub fn decode_frame_payload(payload: &str) -> MediaResult<VideoFrame> {
    let body = data_uri_body(payload).unwrap_or(payload);
    let bytes = rbase64::decode(body).map_err(|e| MediaError::DecodingFailed {
        codec: "base64".to_string(),
        reason: e.to_string(),
    })?;

    let image = image::load_from_memory(&bytes).map_err(|e| MediaError::DecodingFailed {
        codec: "JPEG".to_string(),
        reason: e.to_string(),
    })?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    Ok(VideoFrame::new(width, height, rgb.into_raw(), 0))
}

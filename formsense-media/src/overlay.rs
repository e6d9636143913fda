//! Skeleton overlay rendering
//!
//! The overlay is a transparent RGBA surface the size of the video. Every
//! render is a full repaint: clear, bones, then joints on top.

use crate::tracks::VideoResolution;
use formsense_core::protocol::{Joint, LandmarkMap, NormalizedPoint};
use image::{Rgba, RgbaImage};
use tracing::{debug, trace};

/// Fully transparent pixel
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Bones drawn for the tracked arm
pub const ARM_SKELETON: [(Joint, Joint); 2] = [
    (Joint::Shoulder, Joint::Elbow),
    (Joint::Elbow, Joint::Wrist),
];

/// Colours and sizes used for the skeleton
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    /// Bone colour
    pub bone_color: Rgba<u8>,
    /// Bone stroke width in pixels
    pub bone_width: f32,
    /// Joint marker colour
    pub joint_color: Rgba<u8>,
    /// Joint marker radius in pixels
    pub joint_radius: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            bone_color: Rgba([0xfc, 0xf4, 0x0a, 0xff]),
            bone_width: 4.0,
            joint_color: Rgba([0xff, 0xff, 0xff, 0xff]),
            joint_radius: 6.0,
        }
    }
}

/// Transparent drawing surface aligned with the video
#[derive(Debug, Clone)]
pub struct OverlaySurface {
    image: RgbaImage,
}

impl OverlaySurface {
    /// Create a cleared surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, TRANSPARENT),
        }
    }

    /// Surface width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Surface height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Surface dimensions
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width(), self.height())
    }

    /// Match the surface to the video's native size.
    ///
    /// Returns true when the surface was resized, which also clears it.
    pub fn sync_to(&mut self, resolution: VideoResolution) -> bool {
        if self.resolution() == resolution {
            return false;
        }
        debug!(
            "Overlay resized {}x{} -> {}x{}",
            self.width(),
            self.height(),
            resolution.width,
            resolution.height
        );
        self.image = RgbaImage::from_pixel(resolution.width, resolution.height, TRANSPARENT);
        true
    }

    /// Reset every pixel to transparent
    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// Pixel at (x, y), `None` outside the surface
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        (x < self.width() && y < self.height()).then(|| *self.image.get_pixel(x, y))
    }

    /// Whether every pixel is transparent
    pub fn is_clear(&self) -> bool {
        self.image.pixels().all(|pixel| *pixel == TRANSPARENT)
    }

    /// Number of pixels with exactly this colour
    pub fn count_pixels(&self, color: Rgba<u8>) -> usize {
        self.image.pixels().filter(|pixel| **pixel == color).count()
    }

    /// Underlying RGBA image
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Paint every pixel whose centre lies within `radius` of the segment a-b
    fn stroke_segment(&mut self, a: (f32, f32), b: (f32, f32), radius: f32, color: Rgba<u8>) {
        let Some((x0, y0, x1, y1)) = self.clip_box(
            a.0.min(b.0) - radius,
            a.1.min(b.1) - radius,
            a.0.max(b.0) + radius,
            a.1.max(b.1) + radius,
        ) else {
            return;
        };

        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let length_sq = dx * dx + dy * dy;
        let radius_sq = radius * radius;

        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let t = if length_sq > 0.0 {
                    (((px - a.0) * dx + (py - a.1) * dy) / length_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
                if (px - cx).powi(2) + (py - cy).powi(2) <= radius_sq {
                    self.image.put_pixel(x, y, color);
                }
            }
        }
    }

    /// Paint a filled disc
    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Rgba<u8>) {
        self.stroke_segment(center, center, radius, color);
    }

    /// Clamp a float box to pixel indices, `None` when fully outside
    fn clip_box(&self, left: f32, top: f32, right: f32, bottom: f32) -> Option<(u32, u32, u32, u32)> {
        if self.width() == 0 || self.height() == 0 {
            return None;
        }
        let max_x = (self.width() - 1) as f32;
        let max_y = (self.height() - 1) as f32;
        if right < 0.0 || bottom < 0.0 || left > max_x + 1.0 || top > max_y + 1.0 {
            return None;
        }
        Some((
            left.floor().clamp(0.0, max_x) as u32,
            top.floor().clamp(0.0, max_y) as u32,
            right.ceil().clamp(0.0, max_x) as u32,
            bottom.ceil().clamp(0.0, max_y) as u32,
        ))
    }
}

/// What a render call drew
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Bones drawn
    pub segments_drawn: usize,
    /// Bones skipped for a missing or invalid joint
    pub segments_skipped: usize,
    /// Joint markers drawn
    pub joints_drawn: usize,
}

impl RenderSummary {
    /// Nothing was drawn
    pub fn is_empty(&self) -> bool {
        self.segments_drawn == 0 && self.joints_drawn == 0
    }
}

/// Draws the skeleton for one result onto an overlay surface
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    style: OverlayStyle,
    skeleton: Vec<(Joint, Joint)>,
}

impl OverlayRenderer {
    /// Renderer for the tracked arm with the default style
    pub fn new() -> Self {
        Self::with_style(OverlayStyle::default())
    }

    /// Renderer with a custom style
    pub fn with_style(style: OverlayStyle) -> Self {
        Self {
            style,
            skeleton: ARM_SKELETON.to_vec(),
        }
    }

    /// Style in use
    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Repaint `surface` with the skeleton for `landmarks`.
    ///
    /// The surface is always cleared first; absent or empty landmarks leave it
    /// empty. Bones naming a missing joint are skipped.
    pub fn render(&self, surface: &mut OverlaySurface, landmarks: Option<&LandmarkMap>) -> RenderSummary {
        surface.clear();

        let mut summary = RenderSummary::default();
        let Some(landmarks) = landmarks.filter(|landmarks| !landmarks.is_empty()) else {
            return summary;
        };
        let (width, height) = (surface.width(), surface.height());

        for (from, to) in &self.skeleton {
            match (usable(landmarks.joint(*from)), usable(landmarks.joint(*to))) {
                (Some(a), Some(b)) => {
                    surface.stroke_segment(
                        a.to_pixels(width, height),
                        b.to_pixels(width, height),
                        self.style.bone_width / 2.0,
                        self.style.bone_color,
                    );
                    summary.segments_drawn += 1;
                }
                _ => {
                    trace!("Skipping bone {}-{}", from.as_str(), to.as_str());
                    summary.segments_skipped += 1;
                }
            }
        }

        for (name, point) in landmarks.iter() {
            if !point.is_finite() {
                trace!("Skipping joint {} with non-finite position", name);
                continue;
            }
            surface.fill_circle(
                point.to_pixels(width, height),
                self.style.joint_radius,
                self.style.joint_color,
            );
            summary.joints_drawn += 1;
        }

        summary
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn usable(point: Option<NormalizedPoint>) -> Option<NormalizedPoint> {
    point.filter(NormalizedPoint::is_finite)
}

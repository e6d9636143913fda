//! Overlay rendering tests
//!
//! Covers the full-repaint contract, missing-joint handling and the pixel
//! placement of bones and joint markers.

use formsense_core::{Joint, LandmarkMap, NormalizedPoint};
use formsense_media::*;

fn upright_arm() -> LandmarkMap {
    [
        (Joint::Shoulder, NormalizedPoint::new(0.5, 0.3)),
        (Joint::Elbow, NormalizedPoint::new(0.5, 0.5)),
        (Joint::Wrist, NormalizedPoint::new(0.5, 0.7)),
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// CLEAR CONTRACT
// ============================================================================

#[test]
fn test_absent_landmarks_leave_surface_cleared() {
    let renderer = OverlayRenderer::new();
    let mut surface = OverlaySurface::new(320, 240);

    renderer.render(&mut surface, Some(&upright_arm()));
    assert!(!surface.is_clear());

    let summary = renderer.render(&mut surface, None);
    assert!(summary.is_empty());
    assert!(surface.is_clear());
}

#[test]
fn test_empty_landmarks_leave_surface_cleared() {
    let renderer = OverlayRenderer::new();
    let mut surface = OverlaySurface::new(320, 240);

    renderer.render(&mut surface, Some(&upright_arm()));
    let summary = renderer.render(&mut surface, Some(&LandmarkMap::new()));

    assert_eq!(summary, RenderSummary::default());
    assert!(surface.is_clear());
}

#[test]
fn test_render_is_full_repaint() {
    let renderer = OverlayRenderer::new();
    let mut surface = OverlaySurface::new(200, 200);

    let left: LandmarkMap = [
        (Joint::Shoulder, NormalizedPoint::new(0.1, 0.1)),
        (Joint::Elbow, NormalizedPoint::new(0.1, 0.5)),
        (Joint::Wrist, NormalizedPoint::new(0.1, 0.9)),
    ]
    .into_iter()
    .collect();
    renderer.render(&mut surface, Some(&left));
    assert_ne!(surface.pixel(20, 100), Some(TRANSPARENT));

    let right: LandmarkMap = [
        (Joint::Shoulder, NormalizedPoint::new(0.9, 0.1)),
        (Joint::Elbow, NormalizedPoint::new(0.9, 0.5)),
        (Joint::Wrist, NormalizedPoint::new(0.9, 0.9)),
    ]
    .into_iter()
    .collect();
    renderer.render(&mut surface, Some(&right));

    // Nothing from the previous skeleton survives.
    assert_eq!(surface.pixel(20, 100), Some(TRANSPARENT));
    assert_ne!(surface.pixel(180, 100), Some(TRANSPARENT));
}

// ============================================================================
// SCENARIO: ANGLE 45 WITH A FULL ARM
// ============================================================================

#[test]
fn test_full_arm_draws_two_bones_and_three_joints() {
    let renderer = OverlayRenderer::new();
    let mut surface = OverlaySurface::new(640, 480);

    let summary = renderer.render(&mut surface, Some(&upright_arm()));
    assert_eq!(summary.segments_drawn, 2);
    assert_eq!(summary.segments_skipped, 0);
    assert_eq!(summary.joints_drawn, 3);

    let style = renderer.style();
    // Joint markers at the scaled pixel positions
    assert_eq!(surface.pixel(320, 144), Some(style.joint_color));
    assert_eq!(surface.pixel(320, 240), Some(style.joint_color));
    assert_eq!(surface.pixel(320, 336), Some(style.joint_color));
    // Bones between them
    assert_eq!(surface.pixel(320, 192), Some(style.bone_color));
    assert_eq!(surface.pixel(320, 288), Some(style.bone_color));
    // Nothing above the shoulder or below the wrist
    assert_eq!(surface.pixel(320, 100), Some(TRANSPARENT));
    assert_eq!(surface.pixel(320, 380), Some(TRANSPARENT));
}

// ============================================================================
// MALFORMED INPUT
// ============================================================================

#[test]
fn test_missing_joint_skips_only_its_bones() {
    let renderer = OverlayRenderer::new();
    let mut surface = OverlaySurface::new(640, 480);
    let landmarks: LandmarkMap = [
        (Joint::Shoulder, NormalizedPoint::new(0.5, 0.3)),
        (Joint::Elbow, NormalizedPoint::new(0.5, 0.5)),
    ]
    .into_iter()
    .collect();

    let summary = renderer.render(&mut surface, Some(&landmarks));
    assert_eq!(summary.segments_drawn, 1);
    assert_eq!(summary.segments_skipped, 1);
    assert_eq!(summary.joints_drawn, 2);
    assert_eq!(surface.pixel(320, 288), Some(TRANSPARENT));
}

#[test]
fn test_non_finite_coordinates_are_skipped() {
    let renderer = OverlayRenderer::new();
    let mut surface = OverlaySurface::new(100, 100);
    let landmarks: LandmarkMap = [
        (Joint::Shoulder, NormalizedPoint::new(f64::NAN, 0.3)),
        (Joint::Elbow, NormalizedPoint::new(0.5, 0.5)),
        (Joint::Wrist, NormalizedPoint::new(0.5, f64::INFINITY)),
    ]
    .into_iter()
    .collect();

    let summary = renderer.render(&mut surface, Some(&landmarks));
    assert_eq!(summary.segments_drawn, 0);
    assert_eq!(summary.segments_skipped, 2);
    assert_eq!(summary.joints_drawn, 1);
}

#[test]
fn test_unknown_joints_are_marked_but_not_connected() {
    let renderer = OverlayRenderer::new();
    let mut surface = OverlaySurface::new(100, 100);
    let mut landmarks = LandmarkMap::new();
    landmarks.insert("hip", NormalizedPoint::new(0.5, 0.5));

    let summary = renderer.render(&mut surface, Some(&landmarks));
    assert_eq!(summary.segments_drawn, 0);
    assert_eq!(summary.joints_drawn, 1);
    assert_eq!(surface.pixel(50, 50), Some(renderer.style().joint_color));
}

#[test]
fn test_custom_style() {
    let style = OverlayStyle {
        bone_color: image::Rgba([255, 0, 0, 255]),
        bone_width: 2.0,
        joint_color: image::Rgba([0, 0, 255, 255]),
        joint_radius: 3.0,
    };
    let renderer = OverlayRenderer::with_style(style);
    let mut surface = OverlaySurface::new(100, 100);

    renderer.render(&mut surface, Some(&upright_arm()));
    assert!(surface.count_pixels(style.bone_color) > 0);
    assert!(surface.count_pixels(style.joint_color) > 0);
}

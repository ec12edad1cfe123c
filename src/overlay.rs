use crate::frame::FrameDimensions;
use crate::framing::{BoundingBox, FramingEvaluation};
use crate::pose::{Landmark, SKELETON_CONNECTIONS};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Stroke/fill color for overlay primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlayColor {
    Red,
    Green,
    White,
}

/// A point in pixel space
pub type Point = (f64, f64);

/// Diagnostic overlay content for one detection cycle.
///
/// Built regardless of framing validity so the user can see why admission
/// is being denied: landmark dots, limb segments, the torso box, and the
/// shoulder midpoint marker.
#[derive(Debug, Clone, Default)]
pub struct OverlayFrame {
    pub points: Vec<Point>,
    pub segments: Vec<(Point, Point)>,
    pub bbox: Option<BoundingBox>,
    pub midpoint: Option<Point>,
}

impl OverlayFrame {
    /// Build the overlay from a detection cycle's landmarks and evaluation
    pub fn from_detection(
        landmarks: &[Landmark],
        evaluation: &FramingEvaluation,
        frame: FrameDimensions,
    ) -> Self {
        let width = frame.width as f64;
        let height = frame.height as f64;

        let points = landmarks
            .iter()
            .map(|lm| (lm.x * width, lm.y * height))
            .collect();

        let mut segments = Vec::new();
        for (from_id, to_id) in SKELETON_CONNECTIONS {
            let from = landmarks.iter().find(|lm| lm.id == from_id);
            let to = landmarks.iter().find(|lm| lm.id == to_id);
            if let (Some(from), Some(to)) = (from, to) {
                segments.push((
                    (from.x * width, from.y * height),
                    (to.x * width, to.y * height),
                ));
            }
        }

        Self {
            points,
            segments,
            bbox: evaluation.bbox,
            midpoint: evaluation.midpoint,
        }
    }

    /// Draw this overlay onto a surface. Clears first, then draws the
    /// skeleton in green and the torso box in red.
    pub fn render(&self, surface: &mut dyn RenderSurface) {
        surface.clear();
        for (from, to) in &self.segments {
            surface.draw_segment(*from, *to, OverlayColor::Green);
        }
        surface.draw_points(&self.points, OverlayColor::Green);
        if let Some(bbox) = self.bbox {
            surface.draw_box(bbox, OverlayColor::Red);
        }
        if let Some(midpoint) = self.midpoint {
            surface.draw_points(&[midpoint], OverlayColor::Green);
        }
    }
}

/// External raster surface for diagnostic overlays. Pure side-effecting
/// calls with no return contract.
pub trait RenderSurface: Send {
    fn draw_box(&mut self, bbox: BoundingBox, color: OverlayColor);
    fn draw_points(&mut self, points: &[Point], color: OverlayColor);
    fn draw_segment(&mut self, from: Point, to: Point, color: OverlayColor);
    fn clear(&mut self);
}

/// Surface that discards all draws; used when no canvas is attached
#[derive(Debug, Default)]
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn draw_box(&mut self, bbox: BoundingBox, _color: OverlayColor) {
        trace!("overlay box: {:?}", bbox);
    }

    fn draw_points(&mut self, points: &[Point], _color: OverlayColor) {
        trace!("overlay points: {}", points.len());
    }

    fn draw_segment(&mut self, _from: Point, _to: Point, _color: OverlayColor) {}

    fn clear(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FramingConfig;
    use crate::framing::FramingValidator;
    use crate::pose::landmark_ids;

    #[derive(Default)]
    struct CapturingSurface {
        boxes: Vec<(BoundingBox, OverlayColor)>,
        point_batches: Vec<usize>,
        segments: usize,
        clears: usize,
    }

    impl RenderSurface for CapturingSurface {
        fn draw_box(&mut self, bbox: BoundingBox, color: OverlayColor) {
            self.boxes.push((bbox, color));
        }

        fn draw_points(&mut self, points: &[Point], _color: OverlayColor) {
            self.point_batches.push(points.len());
        }

        fn draw_segment(&mut self, _from: Point, _to: Point, _color: OverlayColor) {
            self.segments += 1;
        }

        fn clear(&mut self) {
            self.clears += 1;
        }
    }

    fn torso() -> Vec<Landmark> {
        vec![
            Landmark::new(landmark_ids::LEFT_SHOULDER, 0.45, 0.4, 0.0, 0.9),
            Landmark::new(landmark_ids::RIGHT_SHOULDER, 0.55, 0.4, 0.0, 0.9),
            Landmark::new(landmark_ids::LEFT_HIP, 0.45, 0.55, 0.0, 0.9),
        ]
    }

    #[test]
    fn test_overlay_scales_landmarks_to_pixels() {
        let frame = FrameDimensions::new(640, 480);
        let landmarks = torso();
        let validator = FramingValidator::new(FramingConfig::default());
        let eval = validator.evaluate(Some(&landmarks), frame);

        let overlay = OverlayFrame::from_detection(&landmarks, &eval, frame);
        assert_eq!(overlay.points.len(), 3);
        assert!((overlay.points[0].0 - 0.45 * 640.0).abs() < 1e-9);
        assert!((overlay.points[0].1 - 0.4 * 480.0).abs() < 1e-9);

        // Only connections whose endpoints are both present are drawn:
        // shoulder-shoulder, left shoulder-left hip, hip-hip needs both hips
        assert_eq!(overlay.segments.len(), 2);
        assert!(overlay.bbox.is_some());
    }

    #[test]
    fn test_render_draws_box_even_when_framing_invalid() {
        let frame = FrameDimensions::new(640, 480);
        // Torso near the edge: invalid but box still present
        let mut landmarks = torso();
        for lm in &mut landmarks {
            lm.x -= 0.4;
        }
        let validator = FramingValidator::new(FramingConfig::default());
        let eval = validator.evaluate(Some(&landmarks), frame);
        assert!(!eval.valid);

        let overlay = OverlayFrame::from_detection(&landmarks, &eval, frame);
        let mut surface = CapturingSurface::default();
        overlay.render(&mut surface);

        assert_eq!(surface.clears, 1);
        assert_eq!(surface.boxes.len(), 1);
        assert_eq!(surface.boxes[0].1, OverlayColor::Red);
        // Landmark batch plus the midpoint marker
        assert_eq!(surface.point_batches, vec![3, 1]);
    }
}

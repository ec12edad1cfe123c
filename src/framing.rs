use crate::config::FramingConfig;
use crate::frame::FrameDimensions;
use crate::pose::{landmark_ids, Landmark};
use tracing::{debug, trace};

/// Axis-aligned bounding box in pixel space. Derived each detection cycle
/// and always replaced, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// True when every edge lies strictly inside the frame, keeping at
    /// least `margin` pixels of clearance. Boundary touching fails.
    pub fn is_within(&self, frame: FrameDimensions, margin: f64) -> bool {
        self.left > margin
            && self.top > margin
            && self.right() < frame.width as f64 - margin
            && self.bottom() < frame.height as f64 - margin
    }
}

/// Result of one framing evaluation. The box is present whenever the
/// anchors were, even when invalid, so the overlay can show the user why
/// admission is denied.
#[derive(Debug, Clone, Copy)]
pub struct FramingEvaluation {
    pub valid: bool,
    pub bbox: Option<BoundingBox>,
    /// Shoulder midpoint in pixel space, when the anchors were present
    pub midpoint: Option<(f64, f64)>,
}

impl FramingEvaluation {
    fn absent() -> Self {
        Self {
            valid: false,
            bbox: None,
            midpoint: None,
        }
    }
}

/// Decides whether the subject's torso bounding box lies fully within the
/// visible frame.
///
/// The box is centered horizontally on the shoulder midpoint and sized from
/// the vertical shoulder-to-hip span: half-width `width_factor * span`, top
/// edge `height_factor_top * span` above the midpoint, total height
/// `height_factor_bottom * span` (the extra extent below the midpoint
/// accounts for the legs of a standing subject).
pub struct FramingValidator {
    config: FramingConfig,
}

impl FramingValidator {
    pub fn new(config: FramingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FramingConfig {
        &self.config
    }

    /// Evaluate one detection cycle.
    ///
    /// Returns `valid = false` with no box when `landmarks` is absent or any
    /// of the three anchors (left shoulder, right shoulder, left hip) is
    /// missing or below the confidence threshold.
    pub fn evaluate(
        &self,
        landmarks: Option<&[Landmark]>,
        frame: FrameDimensions,
    ) -> FramingEvaluation {
        let landmarks = match landmarks {
            Some(lm) => lm,
            None => {
                trace!("No landmarks this cycle");
                return FramingEvaluation::absent();
            }
        };

        let left_shoulder = match self.find_anchor(landmarks, landmark_ids::LEFT_SHOULDER) {
            Some(lm) => lm,
            None => return FramingEvaluation::absent(),
        };
        let right_shoulder = match self.find_anchor(landmarks, landmark_ids::RIGHT_SHOULDER) {
            Some(lm) => lm,
            None => return FramingEvaluation::absent(),
        };
        let left_hip = match self.find_anchor(landmarks, landmark_ids::LEFT_HIP) {
            Some(lm) => lm,
            None => return FramingEvaluation::absent(),
        };

        let width = frame.width as f64;
        let height = frame.height as f64;

        let midpoint_x = (left_shoulder.x + right_shoulder.x) / 2.0 * width;
        let midpoint_y = (left_shoulder.y + right_shoulder.y) / 2.0 * height;

        let shoulder_y = left_shoulder.y * height;
        let hip_y = left_hip.y * height;
        let torso_span = (hip_y - shoulder_y).abs();

        let half_width = self.config.width_factor * torso_span;
        let bbox = BoundingBox {
            left: midpoint_x - half_width,
            top: midpoint_y - self.config.height_factor_top * torso_span,
            width: half_width * 2.0,
            height: self.config.height_factor_bottom * torso_span,
        };

        let valid = bbox.is_within(frame, self.config.edge_margin_px);

        debug!(
            "Framing evaluation: span={:.1}px box=({:.1},{:.1} {:.1}x{:.1}) valid={}",
            torso_span, bbox.left, bbox.top, bbox.width, bbox.height, valid
        );

        FramingEvaluation {
            valid,
            bbox: Some(bbox),
            midpoint: Some((midpoint_x, midpoint_y)),
        }
    }

    /// Find an anchor landmark, treating low confidence as absence
    fn find_anchor(&self, landmarks: &[Landmark], id: u32) -> Option<Landmark> {
        landmarks
            .iter()
            .find(|lm| lm.id == id && lm.confidence >= self.config.confidence_threshold)
            .copied()
    }
}

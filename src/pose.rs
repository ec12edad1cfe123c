use crate::error::Result;
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A named anatomical point produced by pose estimation.
///
/// Coordinates are normalized to [0, 1] relative to frame width/height.
/// Landmarks are produced fresh each detection cycle and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
}

impl Landmark {
    pub fn new(id: u32, x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self {
            id,
            x,
            y,
            z,
            confidence,
        }
    }
}

/// Fixed semantic landmark ids, following the MediaPipe pose topology.
pub mod landmark_ids {
    pub const LEFT_SHOULDER: u32 = 11;
    pub const RIGHT_SHOULDER: u32 = 12;
    pub const LEFT_ELBOW: u32 = 13;
    pub const RIGHT_ELBOW: u32 = 14;
    pub const LEFT_WRIST: u32 = 15;
    pub const RIGHT_WRIST: u32 = 16;
    pub const LEFT_THUMB: u32 = 21;
    pub const RIGHT_THUMB: u32 = 22;
    pub const LEFT_HIP: u32 = 23;
    pub const RIGHT_HIP: u32 = 24;
    pub const LEFT_KNEE: u32 = 25;
    pub const RIGHT_KNEE: u32 = 26;
    pub const LEFT_ANKLE: u32 = 27;
    pub const RIGHT_ANKLE: u32 = 28;
}

/// Limb connections drawn by the skeleton overlay, as (from, to) id pairs.
pub const SKELETON_CONNECTIONS: [(u32, u32); 14] = [
    (landmark_ids::LEFT_SHOULDER, landmark_ids::RIGHT_SHOULDER),
    (landmark_ids::LEFT_SHOULDER, landmark_ids::LEFT_HIP),
    (landmark_ids::RIGHT_SHOULDER, landmark_ids::RIGHT_HIP),
    (landmark_ids::LEFT_HIP, landmark_ids::RIGHT_HIP),
    (landmark_ids::LEFT_SHOULDER, landmark_ids::LEFT_ELBOW),
    (landmark_ids::LEFT_ELBOW, landmark_ids::LEFT_WRIST),
    (landmark_ids::RIGHT_SHOULDER, landmark_ids::RIGHT_ELBOW),
    (landmark_ids::RIGHT_ELBOW, landmark_ids::RIGHT_WRIST),
    (landmark_ids::LEFT_HIP, landmark_ids::LEFT_KNEE),
    (landmark_ids::LEFT_KNEE, landmark_ids::LEFT_ANKLE),
    (landmark_ids::RIGHT_HIP, landmark_ids::RIGHT_KNEE),
    (landmark_ids::RIGHT_KNEE, landmark_ids::RIGHT_ANKLE),
    (landmark_ids::LEFT_WRIST, landmark_ids::LEFT_THUMB),
    (landmark_ids::RIGHT_WRIST, landmark_ids::RIGHT_THUMB),
];

/// External pose estimation source.
///
/// `detect` is asynchronous with at most one request in flight: the runtime
/// submits the next frame only after the previous call resolves, skipping
/// frames that arrive in between rather than queuing them. Returning
/// `Ok(None)` means no body was detected; an `Err` means the inference
/// backend is unavailable for this cycle and the caller holds the last
/// known validity.
#[async_trait]
pub trait PoseSource: Send + Sync {
    async fn detect(&self, frame: &FrameData) -> Result<Option<Vec<Landmark>>>;
}

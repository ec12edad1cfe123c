use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Frame format enumeration supporting different video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// RGB24 format - 3 bytes per pixel
    Rgb24,
    /// YUV 4:2:2 format - 2 bytes per pixel, luma in every other byte
    Yuyv,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Rgb24 => 3,
            FrameFormat::Yuyv => 2,
        }
    }
}

/// Pixel dimensions of the active video/canvas surface.
///
/// Geometry is only computed against dimensions reported by the active
/// source, so these are always in sync with the stream that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions::new(self.width, self.height)
    }

    /// Get the expected frame size in bytes
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Mean per-pixel brightness on a 0-255 scale, or `None` when the frame
    /// cannot be sampled (zero dimensions or truncated data).
    ///
    /// For RGB this is the mean of (R+G+B)/3 over every pixel; for YUYV the
    /// luma bytes are averaged directly.
    pub fn mean_brightness(&self) -> Option<f64> {
        if self.width == 0 || self.height == 0 || !self.validate_size() {
            return None;
        }

        match self.format {
            FrameFormat::Rgb24 => {
                let mut total = 0.0f64;
                for px in self.data.chunks_exact(3) {
                    total += (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0;
                }
                Some(total / (self.width as f64 * self.height as f64))
            }
            FrameFormat::Yuyv => {
                // YUYV layout: Y0 U Y1 V; every even byte is luma
                let mut total = 0.0f64;
                let mut count = 0u64;
                for pair in self.data.chunks_exact(2) {
                    total += pair[0] as f64;
                    count += 1;
                }
                if count == 0 {
                    None
                } else {
                    Some(total / count as f64)
                }
            }
        }
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

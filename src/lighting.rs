use crate::config::LightingConfig;
use crate::frame::FrameData;
use crate::signal::Validity;
use tracing::{debug, trace};

/// Scale factor from normalized brightness to the nominal lux unit
const LUX_FACTOR: f64 = 1000.0;

/// One lighting measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingSample {
    pub lux: f64,
    pub valid: bool,
}

/// Decides whether scene brightness falls within an acceptable band.
///
/// Brightness is the mean of per-pixel (R+G+B)/3 over a whole frame,
/// normalized by 255 and scaled to a nominal 0-1000 "lux" unit. This is a
/// global-brightness approximation, not photometric lux.
pub struct LightingValidator {
    config: LightingConfig,
    last_sample: Option<LightingSample>,
}

impl LightingValidator {
    pub fn new(config: LightingConfig) -> Self {
        Self {
            config,
            last_sample: None,
        }
    }

    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    /// Sample a captured frame.
    ///
    /// Returns `None` when the frame cannot be sampled (zero dimensions,
    /// truncated data); the previous sample is retained in that case so a
    /// transient read failure never flips validity.
    pub fn sample(&mut self, frame: &FrameData) -> Option<LightingSample> {
        let brightness = match frame.mean_brightness() {
            Some(b) => b,
            None => {
                trace!(
                    "Frame {} not sampleable, holding last lighting value",
                    frame.id
                );
                return None;
            }
        };

        let lux = brightness / 255.0 * LUX_FACTOR;
        let valid = lux >= self.config.low_bound && lux <= self.config.high_bound;
        let sample = LightingSample { lux, valid };

        debug!("Lighting sample: {:.2} lux, valid={}", lux, valid);
        self.last_sample = Some(sample);
        Some(sample)
    }

    /// Last successful measurement, if any
    pub fn last_sample(&self) -> Option<LightingSample> {
        self.last_sample
    }

    /// Current validity; `Unknown` until the first successful sample
    pub fn validity(&self) -> Validity {
        match self.last_sample {
            Some(sample) => Validity::from_bool(sample.valid),
            None => Validity::Unknown,
        }
    }

    /// Forget the held sample, e.g. across a stream swap
    pub fn reset(&mut self) {
        self.last_sample = None;
    }
}

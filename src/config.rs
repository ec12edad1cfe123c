use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FramegateConfig {
    pub camera: CameraConfig,
    pub framing: FramingConfig,
    pub lighting: LightingConfig,
    pub controller: ControllerConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Preferred capture width in pixels
    #[serde(default = "default_camera_width")]
    pub width: u32,

    /// Preferred capture height in pixels
    #[serde(default = "default_camera_height")]
    pub height: u32,

    /// Requested frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

/// Torso bounding-box geometry. The multipliers are deliberately tunable;
/// the upstream revisions disagreed on them, so none is treated as canonical.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FramingConfig {
    /// Box half-width as a multiple of the shoulder-to-hip span
    #[serde(default = "default_width_factor")]
    pub width_factor: f64,

    /// Box extent above the shoulder midpoint as a multiple of the span
    #[serde(default = "default_height_factor_top")]
    pub height_factor_top: f64,

    /// Box extent below the shoulder midpoint as a multiple of the span
    #[serde(default = "default_height_factor_bottom")]
    pub height_factor_bottom: f64,

    /// Landmarks below this confidence count as absent
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Margin in pixels the box must keep from every frame edge.
    /// Zero still rejects boundary-touching boxes.
    #[serde(default = "default_edge_margin_px")]
    pub edge_margin_px: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LightingConfig {
    /// Raw brightness sampling period in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Validity recheck period in milliseconds
    #[serde(default = "default_recheck_interval_ms")]
    pub recheck_interval_ms: u64,

    /// Lower bound of the acceptable nominal-lux band
    #[serde(default = "default_lux_low_bound")]
    pub low_bound: f64,

    /// Upper bound of the acceptable nominal-lux band
    #[serde(default = "default_lux_high_bound")]
    pub high_bound: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControllerConfig {
    /// Pose detection cadence in milliseconds (target >= 2 Hz)
    #[serde(default = "default_detection_interval_ms")]
    pub detection_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl FramegateConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("framegate.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.width", default_camera_width())?
            .set_default("camera.height", default_camera_height())?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("framing.width_factor", default_width_factor())?
            .set_default("framing.height_factor_top", default_height_factor_top())?
            .set_default(
                "framing.height_factor_bottom",
                default_height_factor_bottom(),
            )?
            .set_default(
                "framing.confidence_threshold",
                default_confidence_threshold(),
            )?
            .set_default("framing.edge_margin_px", default_edge_margin_px())?
            .set_default(
                "lighting.sample_interval_ms",
                default_sample_interval_ms() as i64,
            )?
            .set_default(
                "lighting.recheck_interval_ms",
                default_recheck_interval_ms() as i64,
            )?
            .set_default("lighting.low_bound", default_lux_low_bound())?
            .set_default("lighting.high_bound", default_lux_high_bound())?
            .set_default(
                "controller.detection_interval_ms",
                default_detection_interval_ms() as i64,
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with FRAMEGATE_ prefix
            .add_source(Environment::with_prefix("FRAMEGATE").separator("_"))
            .build()?;

        let config: FramegateConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.framing.width_factor <= 0.0
            || self.framing.height_factor_top <= 0.0
            || self.framing.height_factor_bottom <= 0.0
        {
            return Err(ConfigError::Message(
                "Framing box factors must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.framing.confidence_threshold) {
            return Err(ConfigError::Message(
                "Framing confidence threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.framing.edge_margin_px < 0.0 {
            return Err(ConfigError::Message(
                "Framing edge margin must not be negative".to_string(),
            ));
        }

        if self.lighting.sample_interval_ms == 0 || self.lighting.recheck_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Lighting intervals must be greater than 0".to_string(),
            ));
        }

        if self.lighting.low_bound >= self.lighting.high_bound {
            return Err(ConfigError::Message(
                "Lighting low bound must be below the high bound".to_string(),
            ));
        }

        if self.controller.detection_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Detection interval must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FramegateConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                width: default_camera_width(),
                height: default_camera_height(),
                fps: default_camera_fps(),
            },
            framing: FramingConfig::default(),
            lighting: LightingConfig::default(),
            controller: ControllerConfig {
                detection_interval_ms: default_detection_interval_ms(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            width_factor: default_width_factor(),
            height_factor_top: default_height_factor_top(),
            height_factor_bottom: default_height_factor_bottom(),
            confidence_threshold: default_confidence_threshold(),
            edge_margin_px: default_edge_margin_px(),
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            recheck_interval_ms: default_recheck_interval_ms(),
            low_bound: default_lux_low_bound(),
            high_bound: default_lux_high_bound(),
        }
    }
}

// Default value functions
fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}
fn default_camera_fps() -> u32 {
    30
}

fn default_width_factor() -> f64 {
    2.0
}
fn default_height_factor_top() -> f64 {
    1.0
}
fn default_height_factor_bottom() -> f64 {
    2.6
}
fn default_confidence_threshold() -> f64 {
    0.5
}
fn default_edge_margin_px() -> f64 {
    0.0
}

fn default_sample_interval_ms() -> u64 {
    1000
}
fn default_recheck_interval_ms() -> u64 {
    2000
}
fn default_lux_low_bound() -> f64 {
    300.0
}
fn default_lux_high_bound() -> f64 {
    700.0
}

fn default_detection_interval_ms() -> u64 {
    500
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = FramegateConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.framing.width_factor, 2.0);
        assert_eq!(config.framing.height_factor_bottom, 2.6);
        assert_eq!(config.lighting.low_bound, 300.0);
        assert_eq!(config.lighting.high_bound, 700.0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = FramegateConfig::default();

        config.camera.width = 0;
        assert!(config.validate().is_err());
        config.camera.width = 640;
        assert!(config.validate().is_ok());

        config.lighting.low_bound = 800.0;
        assert!(config.validate().is_err());
        config.lighting.low_bound = 300.0;

        config.framing.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = FramegateConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.controller.detection_interval_ms, 500);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[framing]\nwidth_factor = 3.0\n\n[lighting]\nlow_bound = 200.0"
        )
        .unwrap();

        let config = FramegateConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.framing.width_factor, 3.0);
        assert_eq!(config.lighting.low_bound, 200.0);
        // Untouched sections keep their defaults
        assert_eq!(config.lighting.high_bound, 700.0);
        assert_eq!(config.framing.height_factor_bottom, 2.6);
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FramegateError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Pose inference unavailable: {details}")]
    InferenceUnavailable { details: String },

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),
}

/// Camera acquisition failures. These are fatal to the attempted stream:
/// they surface to the user and are never retried automatically.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera permission denied for device {device_id}")]
    PermissionDenied { device_id: String },

    #[error("Camera device unavailable: {device_id}")]
    DeviceUnavailable { device_id: String },

    #[error("Unknown camera device id: {device_id}")]
    UnknownDevice { device_id: String },

    #[error("No active camera stream")]
    NoActiveStream,
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Encoding failed: {details}")]
    Encoding { details: String },

    #[error("Recording started with no active stream")]
    NoActiveStream,
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

impl FramegateError {
    pub fn inference<S: Into<String>>(details: S) -> Self {
        Self::InferenceUnavailable {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FramegateError>;

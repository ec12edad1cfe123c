use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the admission pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GateEvent {
    /// Framing validity was re-evaluated from a pose detection cycle
    FramingUpdated {
        valid: bool,
        timestamp: SystemTime,
    },
    /// A lighting sample was taken
    LightingUpdated {
        lux: f64,
        valid: bool,
        timestamp: SystemTime,
    },
    /// A recording session was admitted and started
    RecordingStarted {
        session_id: String,
        timestamp: SystemTime,
    },
    /// A recording session ended
    RecordingStopped {
        session_id: String,
        reason: String,
        timestamp: SystemTime,
    },
    /// A start request was denied
    RecordingDenied {
        reason: String,
        timestamp: SystemTime,
    },
    /// The active capture device changed
    DeviceSwitched {
        device_id: String,
        timestamp: SystemTime,
    },
    /// Camera acquisition failed; fatal for the attempted stream
    CameraFailed {
        device_id: String,
        error: String,
        timestamp: SystemTime,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl GateEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            GateEvent::FramingUpdated { timestamp, .. } => *timestamp,
            GateEvent::LightingUpdated { timestamp, .. } => *timestamp,
            GateEvent::RecordingStarted { timestamp, .. } => *timestamp,
            GateEvent::RecordingStopped { timestamp, .. } => *timestamp,
            GateEvent::RecordingDenied { timestamp, .. } => *timestamp,
            GateEvent::DeviceSwitched { timestamp, .. } => *timestamp,
            GateEvent::CameraFailed { timestamp, .. } => *timestamp,
            GateEvent::SystemError { .. } => SystemTime::now(),
            GateEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            GateEvent::FramingUpdated { valid, .. } => {
                format!("Framing {}", if *valid { "valid" } else { "invalid" })
            }
            GateEvent::LightingUpdated { lux, valid, .. } => {
                format!(
                    "Lighting sample: {:.2} lux ({})",
                    lux,
                    if *valid { "valid" } else { "invalid" }
                )
            }
            GateEvent::RecordingStarted { session_id, .. } => {
                format!("Recording started: {}", session_id)
            }
            GateEvent::RecordingStopped {
                session_id, reason, ..
            } => {
                format!("Recording stopped: {} ({})", session_id, reason)
            }
            GateEvent::RecordingDenied { reason, .. } => {
                format!("Recording denied: {}", reason)
            }
            GateEvent::DeviceSwitched { device_id, .. } => {
                format!("Switched to device: {}", device_id)
            }
            GateEvent::CameraFailed {
                device_id, error, ..
            } => {
                format!("Camera {} failed: {}", device_id, error)
            }
            GateEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            GateEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            GateEvent::FramingUpdated { .. } => "framing_updated",
            GateEvent::LightingUpdated { .. } => "lighting_updated",
            GateEvent::RecordingStarted { .. } => "recording_started",
            GateEvent::RecordingStopped { .. } => "recording_stopped",
            GateEvent::RecordingDenied { .. } => "recording_denied",
            GateEvent::DeviceSwitched { .. } => "device_switched",
            GateEvent::CameraFailed { .. } => "camera_failed",
            GateEvent::SystemError { .. } => "system_error",
            GateEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<GateEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: GateEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        // Log important events at appropriate levels
        match &event {
            GateEvent::RecordingStarted { session_id, .. } => {
                info!("Recording started: {}", session_id);
            }
            GateEvent::RecordingStopped { reason, .. } => {
                info!("Recording stopped: {}", reason);
            }
            GateEvent::RecordingDenied { reason, .. } => {
                warn!("Recording denied: {}", reason);
            }
            GateEvent::CameraFailed {
                device_id, error, ..
            } => {
                error!("Camera {} failed: {}", device_id, error);
            }
            GateEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            GateEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod frame;
pub mod framing;
pub mod lighting;
pub mod overlay;
pub mod pose;
pub mod recording;
pub mod runtime;
pub mod signal;

pub use camera::{CameraSource, DeviceDescriptor, DeviceSelection, FrameStream, StreamConstraints, SyntheticCamera};
pub use config::FramegateConfig;
pub use controller::{
    AdmissionController, DenialReason, RecordingState, StartOutcome, StopReason,
};
pub use error::{CameraError, FramegateError, RecordingError, Result};
pub use events::{EventBus, GateEvent};
pub use frame::{FrameData, FrameDimensions, FrameFormat};
pub use framing::{BoundingBox, FramingEvaluation, FramingValidator};
pub use lighting::{LightingSample, LightingValidator};
pub use overlay::{NullSurface, OverlayColor, OverlayFrame, RenderSurface};
pub use pose::{Landmark, PoseSource, SKELETON_CONNECTIONS};
pub use recording::{Artifact, MemorySink, RecordingSession, RecordingSink};
pub use runtime::{GateRuntime, UserIntent};
pub use signal::{Validity, ValiditySignal};

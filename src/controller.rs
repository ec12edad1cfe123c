use crate::camera::FrameStream;
use crate::error::{FramegateError, RecordingError, Result};
use crate::events::{EventBus, GateEvent};
use crate::recording::{Artifact, RecordingSession, RecordingSink};
use crate::signal::{Validity, ValiditySignal};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Recording lifecycle state. Owned exclusively by the controller; the
/// session never transitions it on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// Why a start request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    BodyNotFramed,
    LightingNotOptimal,
    NoActiveStream,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::BodyNotFramed => write!(f, "body not framed"),
            DenialReason::LightingNotOptimal => write!(f, "lighting not optimal"),
            DenialReason::NoActiveStream => write!(f, "no active camera stream"),
        }
    }
}

/// Why a running recording stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    FramingLost,
    LightingDegraded,
    UserRequested,
    DeviceSwitched,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::FramingLost => write!(f, "interrupted: framing lost"),
            StopReason::LightingDegraded => write!(f, "interrupted: lighting degraded"),
            StopReason::UserRequested => write!(f, "stopped by user"),
            StopReason::DeviceSwitched => write!(f, "stopped: camera switched"),
        }
    }
}

/// Outcome of a `request_start` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { session_id: String },
    /// Start while already recording is a no-op, not an error
    AlreadyRecording,
    Denied(DenialReason),
}

/// Combines the framing and lighting validity signals over time into a
/// single admit/deny decision and drives the recording lifecycle.
///
/// All methods run on the single logical controller task: state is mutated
/// before any await point, so no error path can leave the machine in
/// `Recording` without an underlying session.
pub struct AdmissionController {
    state: RecordingState,
    framing: ValiditySignal,
    lighting: ValiditySignal,
    session: Option<Arc<RecordingSession>>,
    sink: Arc<dyn RecordingSink>,
    event_bus: Arc<EventBus>,
    last_denial: Option<DenialReason>,
    last_stop: Option<StopReason>,
}

impl AdmissionController {
    pub fn new(sink: Arc<dyn RecordingSink>, event_bus: Arc<EventBus>) -> Self {
        Self {
            state: RecordingState::Idle,
            framing: ValiditySignal::new("framing"),
            lighting: ValiditySignal::new("lighting"),
            session: None,
            sink,
            event_bus,
            last_denial: None,
            last_stop: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn framing_validity(&self) -> Validity {
        self.framing.value()
    }

    pub fn lighting_validity(&self) -> Validity {
        self.lighting.value()
    }

    /// The active session, for the runtime to feed frames into
    pub fn session(&self) -> Option<Arc<RecordingSession>> {
        self.session.clone()
    }

    /// Whether the start control should be enabled
    pub fn can_start(&self) -> bool {
        self.state == RecordingState::Idle && self.framing.is_valid() && self.lighting.is_valid()
    }

    /// Whether the preview should be obscured (either condition not held)
    pub fn preview_obscured(&self) -> bool {
        !(self.framing.is_valid() && self.lighting.is_valid())
    }

    /// Publish a framing evaluation result for this detection cycle
    pub fn publish_framing(&mut self, valid: bool) {
        self.framing.publish(valid);
        let _ = self.event_bus.publish(GateEvent::FramingUpdated {
            valid,
            timestamp: SystemTime::now(),
        });
    }

    /// Publish a lighting validity value from the sampling cycle
    pub fn publish_lighting(&mut self, lux: f64, valid: bool) {
        self.lighting.publish(valid);
        let _ = self.event_bus.publish(GateEvent::LightingUpdated {
            lux,
            valid,
            timestamp: SystemTime::now(),
        });
    }

    /// One controller tick: read both signals as last published and enforce
    /// the admission condition on a running recording.
    ///
    /// When both signals are invalid in the same tick only one stop happens
    /// and framing is the surfaced reason, since framing is the primary
    /// gating condition. Returns the finalized artifact when the tick
    /// interrupted a recording.
    pub async fn tick(&mut self) -> Result<Option<Artifact>> {
        if self.state != RecordingState::Recording {
            return Ok(None);
        }

        if !self.framing.is_valid() {
            return self.interrupt(StopReason::FramingLost).await;
        }
        if !self.lighting.is_valid() {
            return self.interrupt(StopReason::LightingDegraded).await;
        }
        Ok(None)
    }

    /// User intent: begin recording against the current frame stream
    pub async fn request_start(&mut self, stream: &FrameStream) -> Result<StartOutcome> {
        if self.state == RecordingState::Recording {
            debug!("Start requested while already recording, ignoring");
            return Ok(StartOutcome::AlreadyRecording);
        }

        // Framing is the primary condition: when both are invalid it is
        // the one surfaced.
        if !self.framing.is_valid() {
            return Ok(self.deny(DenialReason::BodyNotFramed));
        }
        if !self.lighting.is_valid() {
            return Ok(self.deny(DenialReason::LightingNotOptimal));
        }

        let session = match RecordingSession::start(Arc::clone(&self.sink), stream) {
            Ok(session) => Arc::new(session),
            Err(FramegateError::Recording(RecordingError::NoActiveStream)) => {
                return Ok(self.deny(DenialReason::NoActiveStream));
            }
            Err(e) => return Err(e),
        };

        let session_id = session.id().to_string();
        self.session = Some(session);
        self.state = RecordingState::Recording;
        self.last_denial = None;
        self.last_stop = None;

        let _ = self.event_bus.publish(GateEvent::RecordingStarted {
            session_id: session_id.clone(),
            timestamp: SystemTime::now(),
        });

        Ok(StartOutcome::Started { session_id })
    }

    /// User intent: stop recording and finalize the artifact.
    /// A stop while already idle is a no-op.
    pub async fn request_stop(&mut self) -> Result<Option<Artifact>> {
        if self.state == RecordingState::Idle {
            debug!("Stop requested while idle, ignoring");
            return Ok(None);
        }
        self.interrupt(StopReason::UserRequested).await
    }

    /// A device switch tears down the stream: a running recording stops
    /// (it cannot span a switch) and both validity signals reset to
    /// unknown until the next cycle confirms otherwise.
    pub async fn on_device_switch(&mut self, device_id: &str) -> Result<Option<Artifact>> {
        info!("Device switch to {}", device_id);

        let artifact = if self.state == RecordingState::Recording {
            self.interrupt(StopReason::DeviceSwitched).await?
        } else {
            None
        };

        self.framing.reset();
        self.lighting.reset();

        let _ = self.event_bus.publish(GateEvent::DeviceSwitched {
            device_id: device_id.to_string(),
            timestamp: SystemTime::now(),
        });

        Ok(artifact)
    }

    /// Textual status line for the user-facing controls
    pub fn status_line(&self) -> String {
        match self.state {
            RecordingState::Recording => "Recording".to_string(),
            RecordingState::Idle => {
                if let Some(reason) = self.last_stop {
                    return format!("Recording {}", reason);
                }
                if let Some(reason) = self.last_denial {
                    return format!("Cannot record: {}", reason);
                }
                match (self.framing.value(), self.lighting.value()) {
                    (Validity::Valid, Validity::Valid) => {
                        "Optimal conditions. You can start recording now.".to_string()
                    }
                    (Validity::Valid, _) => "Adjust lighting to optimal range".to_string(),
                    _ => "Ensure your entire body is visible in the frame".to_string(),
                }
            }
        }
    }

    fn deny(&mut self, reason: DenialReason) -> StartOutcome {
        warn!("Recording denied: {}", reason);
        self.last_denial = Some(reason);
        let _ = self.event_bus.publish(GateEvent::RecordingDenied {
            reason: reason.to_string(),
            timestamp: SystemTime::now(),
        });
        StartOutcome::Denied(reason)
    }

    /// Stop the active session with the given reason. The state transition
    /// happens before the finalize await so an encoding failure can never
    /// strand the machine in `Recording`. A clean stop is only announced
    /// once finalize succeeded; a failed finalize surfaces as a session
    /// loss instead.
    async fn interrupt(&mut self, reason: StopReason) -> Result<Option<Artifact>> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                // Defensive: Recording with no session would be a bug
                self.state = RecordingState::Idle;
                return Ok(None);
            }
        };

        self.state = RecordingState::Idle;
        self.last_stop = Some(reason);
        let session_id = session.id().to_string();

        match session.stop().await {
            Ok(artifact) => {
                let _ = self.event_bus.publish(GateEvent::RecordingStopped {
                    session_id,
                    reason: reason.to_string(),
                    timestamp: SystemTime::now(),
                });
                Ok(artifact)
            }
            Err(e) => {
                // Session is lost; the user must restart
                warn!("Finalize failed after {}: {}", reason, e);
                let _ = self.event_bus.publish(GateEvent::SystemError {
                    component: "recording".to_string(),
                    error: format!("session {} lost after {}: {}", session_id, reason, e),
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraSource, FrameStream, StreamConstraints, SyntheticCamera};
    use crate::frame::FrameData;
    use crate::recording::MemorySink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Sink that counts finalize calls, to assert single-stop semantics
    struct CountingSink {
        finalize_calls: AtomicU32,
    }

    impl CountingSink {
        fn new() -> Self {
            Self {
                finalize_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordingSink for CountingSink {
        fn mime_type(&self) -> &str {
            "video/webm"
        }

        async fn encode_frame(&self, _frame: &FrameData) -> Result<Vec<u8>> {
            Ok(vec![1])
        }

        async fn finalize(&self) -> Result<Vec<u8>> {
            self.finalize_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    /// Sink whose finalize always fails
    struct FailingSink;

    #[async_trait]
    impl RecordingSink for FailingSink {
        fn mime_type(&self) -> &str {
            "video/webm"
        }

        async fn encode_frame(&self, _frame: &FrameData) -> Result<Vec<u8>> {
            Ok(vec![1])
        }

        async fn finalize(&self) -> Result<Vec<u8>> {
            Err(RecordingError::Encoding {
                details: "muxer crashed".to_string(),
            }
            .into())
        }
    }

    async fn open_stream() -> FrameStream {
        SyntheticCamera::single(128)
            .open(
                "synthetic-0",
                StreamConstraints {
                    width: 8,
                    height: 8,
                    frame_rate: 100,
                },
            )
            .await
            .unwrap()
    }

    fn controller_with(sink: Arc<dyn RecordingSink>) -> AdmissionController {
        AdmissionController::new(sink, Arc::new(EventBus::new(64)))
    }

    fn controller() -> AdmissionController {
        controller_with(Arc::new(MemorySink::new()))
    }

    #[tokio::test]
    async fn test_start_denied_while_framing_invalid() {
        let mut ctrl = controller();
        ctrl.publish_framing(false);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        let outcome = ctrl.request_start(&stream).await.unwrap();

        assert_eq!(outcome, StartOutcome::Denied(DenialReason::BodyNotFramed));
        assert_eq!(ctrl.state(), RecordingState::Idle);
        assert!(ctrl.session().is_none(), "no session may be created");
    }

    #[tokio::test]
    async fn test_start_denied_with_unknown_signals() {
        // Fresh controller: both signals unknown, which gates like invalid
        let mut ctrl = controller();
        let stream = open_stream().await;

        let outcome = ctrl.request_start(&stream).await.unwrap();
        assert_eq!(outcome, StartOutcome::Denied(DenialReason::BodyNotFramed));
    }

    #[tokio::test]
    async fn test_denial_prefers_framing_when_both_invalid() {
        let mut ctrl = controller();
        ctrl.publish_framing(false);
        ctrl.publish_lighting(100.0, false);

        let stream = open_stream().await;
        let outcome = ctrl.request_start(&stream).await.unwrap();
        assert_eq!(outcome, StartOutcome::Denied(DenialReason::BodyNotFramed));
    }

    #[tokio::test]
    async fn test_lighting_denial_when_only_lighting_invalid() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(100.0, false);

        let stream = open_stream().await;
        let outcome = ctrl.request_start(&stream).await.unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Denied(DenialReason::LightingNotOptimal)
        );
    }

    #[tokio::test]
    async fn test_admitted_start_transitions_to_recording() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        let outcome = ctrl.request_start(&stream).await.unwrap();

        assert!(matches!(outcome, StartOutcome::Started { .. }));
        assert!(ctrl.is_recording());
        assert!(ctrl.session().is_some());
        assert_eq!(ctrl.status_line(), "Recording");
    }

    #[tokio::test]
    async fn test_start_while_recording_is_noop() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        ctrl.request_start(&stream).await.unwrap();
        let first_session = ctrl.session().unwrap().id().to_string();

        let outcome = ctrl.request_start(&stream).await.unwrap();
        assert_eq!(outcome, StartOutcome::AlreadyRecording);
        assert_eq!(ctrl.session().unwrap().id(), first_session);
    }

    #[tokio::test]
    async fn test_framing_loss_interrupts_with_single_stop() {
        let sink = Arc::new(CountingSink::new());
        let mut ctrl = controller_with(sink.clone());
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        ctrl.request_start(&stream).await.unwrap();

        // Both signals degrade in the same tick
        ctrl.publish_framing(false);
        ctrl.publish_lighting(100.0, false);

        let artifact = ctrl.tick().await.unwrap();
        assert!(artifact.is_some());
        assert_eq!(ctrl.state(), RecordingState::Idle);
        assert_eq!(sink.finalize_calls.load(Ordering::SeqCst), 1);
        // Framing-first reason
        assert!(ctrl.status_line().contains("framing lost"));

        // Subsequent ticks do nothing
        assert!(ctrl.tick().await.unwrap().is_none());
        assert_eq!(sink.finalize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lighting_degradation_interrupts() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        ctrl.request_start(&stream).await.unwrap();

        ctrl.publish_lighting(900.0, false);
        let artifact = ctrl.tick().await.unwrap();

        assert!(artifact.is_some());
        assert_eq!(ctrl.state(), RecordingState::Idle);
        assert!(ctrl.status_line().contains("lighting degraded"));
    }

    #[tokio::test]
    async fn test_finalize_failure_reports_session_lost_not_clean_stop() {
        let bus = Arc::new(EventBus::new(64));
        let mut events = bus.subscribe();
        let mut ctrl = AdmissionController::new(Arc::new(FailingSink), Arc::clone(&bus));
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        ctrl.request_start(&stream).await.unwrap();

        assert!(ctrl.request_stop().await.is_err());
        assert_eq!(ctrl.state(), RecordingState::Idle);

        let mut saw_clean_stop = false;
        let mut saw_session_lost = false;
        while let Ok(event) = events.try_recv() {
            match event {
                GateEvent::RecordingStopped { .. } => saw_clean_stop = true,
                GateEvent::SystemError { component, .. } => {
                    saw_session_lost = component == "recording";
                }
                _ => {}
            }
        }
        assert!(
            !saw_clean_stop,
            "a failed finalize must not be announced as a clean stop"
        );
        assert!(saw_session_lost);
    }

    #[tokio::test]
    async fn test_stop_twice_while_idle_has_no_effect() {
        let mut ctrl = controller();
        assert!(ctrl.request_stop().await.unwrap().is_none());
        assert!(ctrl.request_stop().await.unwrap().is_none());
        assert_eq!(ctrl.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_user_stop_yields_artifact() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        ctrl.request_start(&stream).await.unwrap();

        let session = ctrl.session().unwrap();
        let frame = FrameData::new(
            1,
            SystemTime::now(),
            vec![128; 8 * 8 * 3],
            8,
            8,
            crate::frame::FrameFormat::Rgb24,
        );
        session.push_frame(&frame).await.unwrap();

        let artifact = ctrl.request_stop().await.unwrap().unwrap();
        assert_eq!(artifact.frame_count, 1);
        assert_eq!(ctrl.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_device_switch_mid_recording_stops_and_resets_signals() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let stream = open_stream().await;
        ctrl.request_start(&stream).await.unwrap();

        let artifact = ctrl.on_device_switch("back").await.unwrap();
        assert!(artifact.is_some());
        assert_eq!(ctrl.state(), RecordingState::Idle);
        assert!(ctrl.session().is_none());

        // Validity is never assumed across a stream swap
        assert_eq!(ctrl.framing_validity(), Validity::Unknown);
        assert_eq!(ctrl.lighting_validity(), Validity::Unknown);
        assert!(!ctrl.can_start());
    }

    #[tokio::test]
    async fn test_device_switch_while_idle_only_resets() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let artifact = ctrl.on_device_switch("back").await.unwrap();
        assert!(artifact.is_none());
        assert_eq!(ctrl.framing_validity(), Validity::Unknown);
    }

    #[tokio::test]
    async fn test_status_line_progression() {
        let mut ctrl = controller();
        assert!(ctrl.status_line().contains("entire body"));
        assert!(ctrl.preview_obscured());

        ctrl.publish_framing(true);
        assert!(ctrl.status_line().contains("lighting"));

        ctrl.publish_lighting(500.0, true);
        assert!(ctrl.status_line().contains("start recording"));
        assert!(!ctrl.preview_obscured());
        assert!(ctrl.can_start());
    }

    #[tokio::test]
    async fn test_start_against_closed_stream_is_denial() {
        let mut ctrl = controller();
        ctrl.publish_framing(true);
        ctrl.publish_lighting(500.0, true);

        let mut stream = open_stream().await;
        stream.close();

        let outcome = ctrl.request_start(&stream).await.unwrap();
        assert_eq!(outcome, StartOutcome::Denied(DenialReason::NoActiveStream));
        assert_eq!(ctrl.state(), RecordingState::Idle);
    }
}

use crate::camera::{CameraSource, DeviceSelection, FrameStream, StreamConstraints};
use crate::config::FramegateConfig;
use crate::controller::AdmissionController;
use crate::error::{CameraError, Result};
use crate::events::{EventBus, GateEvent};
use crate::frame::FrameData;
use crate::framing::FramingValidator;
use crate::lighting::LightingValidator;
use crate::overlay::{OverlayFrame, RenderSurface};
use crate::pose::PoseSource;
use crate::recording::{Artifact, RecordingSink};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// User intents fed into the runtime from the outer controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    RequestStart,
    RequestStop,
    SwitchDevice(String),
    Shutdown,
}

/// One dispatched step of the cooperative loop. Selecting into an enum
/// first keeps every handler outside the select so events are processed
/// strictly sequentially.
enum Step {
    Frame(Option<FrameData>),
    DetectionTick,
    LightingSampleTick,
    LightingRecheckTick,
    Intent(Option<UserIntent>),
    Interrupted,
}

/// Event-driven runtime tying the camera, the two validators, and the
/// admission controller together on a single logical task.
///
/// Frame arrival, the periodic timers, and user intents are dispatched
/// sequentially; validators may await their backends, but each signal is
/// published atomically when the work resolves and the controller never
/// awaits mid-transition.
pub struct GateRuntime {
    config: FramegateConfig,
    camera: Arc<dyn CameraSource>,
    pose: Arc<dyn PoseSource>,
    event_bus: Arc<EventBus>,
    controller: AdmissionController,
    framing: FramingValidator,
    lighting: LightingValidator,
    selection: DeviceSelection,
    surface: Box<dyn RenderSurface>,
    artifact_tx: mpsc::UnboundedSender<Artifact>,
}

impl GateRuntime {
    pub fn new(
        config: FramegateConfig,
        camera: Arc<dyn CameraSource>,
        pose: Arc<dyn PoseSource>,
        sink: Arc<dyn RecordingSink>,
        surface: Box<dyn RenderSurface>,
        event_bus: Arc<EventBus>,
        artifact_tx: mpsc::UnboundedSender<Artifact>,
    ) -> Self {
        let controller = AdmissionController::new(sink, Arc::clone(&event_bus));
        let framing = FramingValidator::new(config.framing.clone());
        let lighting = LightingValidator::new(config.lighting.clone());

        Self {
            config,
            camera,
            pose,
            event_bus,
            controller,
            framing,
            lighting,
            selection: DeviceSelection::default(),
            surface,
            artifact_tx,
        }
    }

    fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            width: self.config.camera.width,
            height: self.config.camera.height,
            frame_rate: self.config.camera.fps,
        }
    }

    /// Acquire a stream on the given device. Acquisition failure is fatal
    /// to the attempted stream: it surfaces to the user and is not retried.
    async fn acquire_stream(&mut self, device_id: &str) -> Result<FrameStream> {
        let constraints = self.constraints();
        match self.camera.open(device_id, constraints).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                let _ = self.event_bus.publish(GateEvent::CameraFailed {
                    device_id: device_id.to_string(),
                    error: e.to_string(),
                    timestamp: SystemTime::now(),
                });
                Err(e)
            }
        }
    }

    /// Run until shutdown. Consumes the runtime; the stream is released on
    /// every exit path when the handle drops.
    pub async fn run(mut self, mut intents: mpsc::Receiver<UserIntent>) -> Result<()> {
        let devices = self.camera.list_devices().await?;
        if devices.is_empty() {
            return Err(CameraError::DeviceUnavailable {
                device_id: "<none>".to_string(),
            }
            .into());
        }
        self.selection = DeviceSelection::new(devices);
        let initial_id = self.selection.available()[0].id.clone();
        self.selection.select(&initial_id)?;

        let mut stream = self.acquire_stream(&initial_id).await?;
        info!(
            "Runtime started on device {} ({}x{})",
            initial_id,
            stream.dimensions().width,
            stream.dimensions().height
        );

        let mut detection =
            tokio::time::interval(Duration::from_millis(self.config.controller.detection_interval_ms));
        let mut sampling =
            tokio::time::interval(Duration::from_millis(self.config.lighting.sample_interval_ms));
        let mut recheck =
            tokio::time::interval(Duration::from_millis(self.config.lighting.recheck_interval_ms));
        // Backpressure by skipping, not queuing: a detection cycle that
        // overruns its period drops the missed ticks.
        detection.set_missed_tick_behavior(MissedTickBehavior::Skip);
        sampling.set_missed_tick_behavior(MissedTickBehavior::Skip);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut latest_frame: Option<FrameData> = None;

        loop {
            let step = tokio::select! {
                frame = stream.next_frame() => Step::Frame(frame),
                _ = detection.tick() => Step::DetectionTick,
                _ = sampling.tick() => Step::LightingSampleTick,
                _ = recheck.tick() => Step::LightingRecheckTick,
                intent = intents.recv() => Step::Intent(intent),
                _ = tokio::signal::ctrl_c() => Step::Interrupted,
            };

            match step {
                Step::Frame(Some(frame)) => {
                    if let Some(session) = self.controller.session() {
                        if let Err(e) = session.push_frame(&frame).await {
                            warn!("Failed to buffer frame {}: {}", frame.id, e);
                        }
                    }
                    latest_frame = Some(frame);
                }
                Step::Frame(None) => {
                    // Producer died underneath us; fatal for this stream
                    error!("Frame stream ended unexpectedly");
                    let _ = self.event_bus.publish(GateEvent::CameraFailed {
                        device_id: stream.device_id().to_string(),
                        error: "frame stream ended".to_string(),
                        timestamp: SystemTime::now(),
                    });
                    self.finalize_on_exit().await;
                    return Err(CameraError::DeviceUnavailable {
                        device_id: stream.device_id().to_string(),
                    }
                    .into());
                }
                Step::DetectionTick => {
                    if let Some(frame) = latest_frame.clone() {
                        self.run_detection_cycle(&frame).await;
                        self.publish_interruption_artifact().await;
                    }
                }
                Step::LightingSampleTick => {
                    if let Some(frame) = &latest_frame {
                        // Unsampleable frames retain the previous value
                        let _ = self.lighting.sample(frame);
                    }
                }
                Step::LightingRecheckTick => {
                    if let Some(sample) = self.lighting.last_sample() {
                        self.controller.publish_lighting(sample.lux, sample.valid);
                        self.publish_interruption_artifact().await;
                    }
                }
                Step::Intent(Some(UserIntent::RequestStart)) => {
                    match self.controller.request_start(&stream).await {
                        Ok(outcome) => debug!("Start request outcome: {:?}", outcome),
                        Err(e) => error!("Start request failed: {}", e),
                    }
                }
                Step::Intent(Some(UserIntent::RequestStop)) => {
                    match self.controller.request_stop().await {
                        Ok(Some(artifact)) => self.hand_off(artifact),
                        Ok(None) => {}
                        Err(e) => error!("Stop failed, session lost: {}", e),
                    }
                }
                Step::Intent(Some(UserIntent::SwitchDevice(device_id))) => {
                    // Validate the id before touching the stream: a switch to
                    // an unknown device is rejected in place and the current
                    // stream and any running recording stay up.
                    if let Err(e) = self.selection.select(&device_id) {
                        warn!("Ignoring switch to unknown device {}: {}", device_id, e);
                        let _ = self.event_bus.publish(GateEvent::CameraFailed {
                            device_id: device_id.clone(),
                            error: e.to_string(),
                            timestamp: SystemTime::now(),
                        });
                    } else {
                        match self.switch_device(stream, &device_id).await {
                            Ok(new_stream) => stream = new_stream,
                            Err(e) => {
                                error!("Device switch to {} failed: {}", device_id, e);
                                return Err(e);
                            }
                        }
                        latest_frame = None;
                    }
                }
                Step::Intent(Some(UserIntent::Shutdown)) | Step::Intent(None) | Step::Interrupted => {
                    info!("Runtime shutting down");
                    let _ = self.event_bus.publish(GateEvent::ShutdownRequested {
                        timestamp: SystemTime::now(),
                        reason: "user shutdown".to_string(),
                    });
                    self.finalize_on_exit().await;
                    return Ok(());
                }
            }
        }
    }

    /// One pose detection cycle: submit the frame, evaluate framing,
    /// publish the signal, and redraw the overlay. At most one request is
    /// in flight since the loop awaits the result here.
    async fn run_detection_cycle(&mut self, frame: &FrameData) {
        let landmarks = match self.pose.detect(frame).await {
            Ok(landmarks) => landmarks,
            Err(e) => {
                // No retry: the previous signal value stands until the
                // next successful cycle.
                debug!("Pose inference unavailable this cycle: {}", e);
                return;
            }
        };

        let dimensions = frame.dimensions();
        let evaluation = self.framing.evaluate(landmarks.as_deref(), dimensions);
        self.controller.publish_framing(evaluation.valid);

        match &landmarks {
            Some(landmarks) => {
                let overlay = OverlayFrame::from_detection(landmarks, &evaluation, dimensions);
                overlay.render(self.surface.as_mut());
            }
            None => self.surface.clear(),
        }
    }

    /// Controller tick after a signal publish; hands off the artifact when
    /// the tick interrupted a recording.
    async fn publish_interruption_artifact(&mut self) {
        match self.controller.tick().await {
            Ok(Some(artifact)) => self.hand_off(artifact),
            Ok(None) => {}
            Err(e) => error!("Interrupted session lost: {}", e),
        }
    }

    /// Device switch to an already-selected id: stop any recording, tear
    /// down the old stream first, then acquire the new one.
    async fn switch_device(
        &mut self,
        mut old_stream: FrameStream,
        device_id: &str,
    ) -> Result<FrameStream> {
        match self.controller.on_device_switch(device_id).await {
            Ok(Some(artifact)) => self.hand_off(artifact),
            Ok(None) => {}
            Err(e) => error!("Session lost during device switch: {}", e),
        }
        self.lighting.reset();

        old_stream.close();
        drop(old_stream);

        self.acquire_stream(device_id).await
    }

    /// Stop a running recording on shutdown so no buffered data is lost
    async fn finalize_on_exit(&mut self) {
        match self.controller.request_stop().await {
            Ok(Some(artifact)) => self.hand_off(artifact),
            Ok(None) => {}
            Err(e) => error!("Finalize on exit failed: {}", e),
        }
    }

    fn hand_off(&self, artifact: Artifact) {
        info!(
            "Artifact ready: {} ({} bytes, {})",
            artifact.suggested_file_name(),
            artifact.data.len(),
            artifact.mime_type
        );
        if self.artifact_tx.send(artifact).is_err() {
            warn!("No artifact consumer attached, artifact dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticCamera;
    use crate::error::FramegateError;
    use crate::overlay::NullSurface;
    use crate::pose::{landmark_ids, Landmark, PoseSource};
    use crate::recording::MemorySink;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Pose source that always reports a well-centered torso
    struct CenteredPose;

    #[async_trait]
    impl PoseSource for CenteredPose {
        async fn detect(&self, _frame: &FrameData) -> Result<Option<Vec<Landmark>>> {
            Ok(Some(vec![
                Landmark::new(landmark_ids::LEFT_SHOULDER, 0.45, 0.4, 0.0, 0.9),
                Landmark::new(landmark_ids::RIGHT_SHOULDER, 0.55, 0.4, 0.0, 0.9),
                Landmark::new(landmark_ids::LEFT_HIP, 0.45, 0.5, 0.0, 0.9),
            ]))
        }
    }

    /// Pose source whose answer can be swapped mid-run
    struct ScriptedPose {
        landmarks: Mutex<Option<Vec<Landmark>>>,
    }

    impl ScriptedPose {
        fn centered() -> Arc<Self> {
            Arc::new(Self {
                landmarks: Mutex::new(Some(vec![
                    Landmark::new(landmark_ids::LEFT_SHOULDER, 0.45, 0.4, 0.0, 0.9),
                    Landmark::new(landmark_ids::RIGHT_SHOULDER, 0.55, 0.4, 0.0, 0.9),
                    Landmark::new(landmark_ids::LEFT_HIP, 0.45, 0.5, 0.0, 0.9),
                ])),
            })
        }

        fn lose_body(&self) {
            *self.landmarks.lock() = None;
        }
    }

    #[async_trait]
    impl PoseSource for ScriptedPose {
        async fn detect(&self, _frame: &FrameData) -> Result<Option<Vec<Landmark>>> {
            Ok(self.landmarks.lock().clone())
        }
    }

    /// Pose source whose backend is down for every cycle
    struct FailingPose;

    #[async_trait]
    impl PoseSource for FailingPose {
        async fn detect(&self, _frame: &FrameData) -> Result<Option<Vec<Landmark>>> {
            Err(FramegateError::inference("backend offline"))
        }
    }

    fn fast_config() -> FramegateConfig {
        let mut config = FramegateConfig::default();
        config.camera.width = 16;
        config.camera.height = 16;
        config.camera.fps = 100;
        config.controller.detection_interval_ms = 10;
        config.lighting.sample_interval_ms = 10;
        config.lighting.recheck_interval_ms = 10;
        config
    }

    fn build_runtime(
        pose: Arc<dyn PoseSource>,
    ) -> (
        GateRuntime,
        mpsc::UnboundedReceiver<Artifact>,
        Arc<EventBus>,
    ) {
        let config = fast_config();
        let event_bus = Arc::new(EventBus::new(256));
        let (artifact_tx, artifact_rx) = mpsc::unbounded_channel();
        let runtime = GateRuntime::new(
            config,
            Arc::new(SyntheticCamera::single(128)), // ~502 lux scene
            pose,
            Arc::new(MemorySink::new()),
            Box::new(NullSurface),
            Arc::clone(&event_bus),
            artifact_tx,
        );
        (runtime, artifact_rx, event_bus)
    }

    #[tokio::test]
    async fn test_start_stop_round_trip_yields_artifact() {
        let (runtime, mut artifacts, _bus) = build_runtime(Arc::new(CenteredPose));
        let (intent_tx, intent_rx) = mpsc::channel(8);

        let handle = tokio::spawn(runtime.run(intent_rx));

        // Let both signals settle to valid, then record for a while
        tokio::time::sleep(Duration::from_millis(100)).await;
        intent_tx.send(UserIntent::RequestStart).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        intent_tx.send(UserIntent::RequestStop).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx.send(UserIntent::Shutdown).await.unwrap();

        handle.await.unwrap().unwrap();

        let artifact = artifacts.recv().await.expect("artifact after stop");
        assert!(artifact.frame_count > 0);
        assert!(!artifact.data.is_empty());
    }

    #[tokio::test]
    async fn test_losing_body_interrupts_recording() {
        let pose = ScriptedPose::centered();
        let (runtime, mut artifacts, bus) = build_runtime(pose.clone());
        let mut events = bus.subscribe();
        let (intent_tx, intent_rx) = mpsc::channel(8);

        let handle = tokio::spawn(runtime.run(intent_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        intent_tx.send(UserIntent::RequestStart).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        pose.lose_body();
        tokio::time::sleep(Duration::from_millis(100)).await;
        intent_tx.send(UserIntent::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        // The interruption produced an artifact without a user stop
        assert!(artifacts.recv().await.is_some());

        let mut saw_framing_stop = false;
        while let Ok(event) = events.try_recv() {
            if let GateEvent::RecordingStopped { reason, .. } = event {
                saw_framing_stop = reason.contains("framing lost");
            }
        }
        assert!(saw_framing_stop, "stop reason must surface framing loss");
    }

    #[tokio::test]
    async fn test_device_switch_mid_recording_interrupts() {
        use crate::camera::DeviceDescriptor;

        let config = fast_config();
        let event_bus = Arc::new(EventBus::new(256));
        let mut events = event_bus.subscribe();
        let (artifact_tx, mut artifacts) = mpsc::unbounded_channel();
        let camera = SyntheticCamera::new(
            vec![
                DeviceDescriptor {
                    id: "front".to_string(),
                    label: "Front camera".to_string(),
                },
                DeviceDescriptor {
                    id: "back".to_string(),
                    label: "Back camera".to_string(),
                },
            ],
            128,
        );
        let runtime = GateRuntime::new(
            config,
            Arc::new(camera),
            Arc::new(CenteredPose),
            Arc::new(MemorySink::new()),
            Box::new(NullSurface),
            Arc::clone(&event_bus),
            artifact_tx,
        );
        let (intent_tx, intent_rx) = mpsc::channel(8);
        let handle = tokio::spawn(runtime.run(intent_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        intent_tx.send(UserIntent::RequestStart).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx
            .send(UserIntent::SwitchDevice("back".to_string()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx.send(UserIntent::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        // Recording cannot span a device switch: finalized automatically
        assert!(artifacts.recv().await.is_some());

        let mut saw_switch_stop = false;
        let mut saw_switch = false;
        while let Ok(event) = events.try_recv() {
            match event {
                GateEvent::RecordingStopped { reason, .. } => {
                    saw_switch_stop |= reason.contains("camera switched");
                }
                GateEvent::DeviceSwitched { device_id, .. } => {
                    saw_switch = device_id == "back";
                }
                _ => {}
            }
        }
        assert!(saw_switch_stop);
        assert!(saw_switch);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_device_keeps_recording() {
        let (runtime, mut artifacts, bus) = build_runtime(Arc::new(CenteredPose));
        let mut events = bus.subscribe();
        let (intent_tx, intent_rx) = mpsc::channel(8);
        let handle = tokio::spawn(runtime.run(intent_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        intent_tx.send(UserIntent::RequestStart).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx
            .send(UserIntent::SwitchDevice("does-not-exist".to_string()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx.send(UserIntent::RequestStop).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx.send(UserIntent::Shutdown).await.unwrap();

        // The runtime survives the rejected switch
        handle.await.unwrap().unwrap();

        let artifact = artifacts
            .recv()
            .await
            .expect("recording survives a switch to an unknown device");
        assert!(artifact.frame_count > 0);

        let mut saw_rejection = false;
        while let Ok(event) = events.try_recv() {
            match event {
                GateEvent::CameraFailed { device_id, .. } => {
                    saw_rejection = device_id == "does-not-exist";
                }
                GateEvent::DeviceSwitched { .. } => {
                    panic!("no switch may be reported for an unknown device");
                }
                GateEvent::RecordingStopped { reason, .. } => {
                    assert!(reason.contains("stopped by user"), "reason was {}", reason);
                }
                _ => {}
            }
        }
        assert!(saw_rejection, "the rejection must surface on the event bus");
    }

    #[tokio::test]
    async fn test_inference_outage_keeps_running_and_denies_start() {
        let (runtime, _artifacts, bus) = build_runtime(Arc::new(FailingPose));
        let mut events = bus.subscribe();
        let (intent_tx, intent_rx) = mpsc::channel(8);
        let handle = tokio::spawn(runtime.run(intent_rx));

        // Framing never leaves unknown while the backend is down
        tokio::time::sleep(Duration::from_millis(100)).await;
        intent_tx.send(UserIntent::RequestStart).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx.send(UserIntent::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        let mut denied = false;
        while let Ok(event) = events.try_recv() {
            match event {
                GateEvent::RecordingDenied { .. } => denied = true,
                GateEvent::FramingUpdated { .. } => {
                    panic!("no framing value may be published without a result");
                }
                _ => {}
            }
        }
        assert!(denied);
    }

    #[tokio::test]
    async fn test_start_denied_before_signals_settle() {
        let (runtime, _artifacts, bus) = build_runtime(Arc::new(CenteredPose));
        let mut events = bus.subscribe();
        let (intent_tx, intent_rx) = mpsc::channel(8);

        let handle = tokio::spawn(runtime.run(intent_rx));

        // Immediately: both signals still unknown
        intent_tx.send(UserIntent::RequestStart).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        intent_tx.send(UserIntent::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        let mut denied = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, GateEvent::RecordingDenied { .. }) {
                denied = true;
            }
        }
        assert!(denied);
    }
}

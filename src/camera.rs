use crate::error::{CameraError, Result};
use crate::frame::{FrameData, FrameDimensions, FrameFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A capture device as reported by the camera source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
}

/// Constraints requested when opening a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// A live frame stream from an opened device.
///
/// The handle owns the stream's resources: closing it (or dropping it)
/// tears the producer down. A closed handle yields no further frames and
/// stays closed, which is what makes a stream unusable after a device
/// switch.
pub struct FrameStream {
    id: u64,
    device_id: String,
    dimensions: FrameDimensions,
    frames: mpsc::Receiver<FrameData>,
    shutdown: Arc<AtomicBool>,
}

impl FrameStream {
    pub fn new(
        id: u64,
        device_id: String,
        dimensions: FrameDimensions,
        frames: mpsc::Receiver<FrameData>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            device_id,
            dimensions,
            frames,
            shutdown,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    /// Receive the next frame, or `None` once the stream has ended
    pub async fn next_frame(&mut self) -> Option<FrameData> {
        if self.is_closed() {
            return None;
        }
        self.frames.recv().await
    }

    /// Tear down the stream and release the device. Idempotent.
    pub fn close(&mut self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            debug!("Closing frame stream {} ({})", self.id, self.device_id);
            self.frames.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        // Stream resources must be released on every exit path
        self.close();
    }
}

/// External camera/device source.
///
/// Opening a device is fatal on failure: `PermissionDenied` and
/// `DeviceUnavailable` surface to the user with no automatic retry.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;
    async fn open(&self, device_id: &str, constraints: StreamConstraints) -> Result<FrameStream>;
}

/// Tracks the device catalog and the currently selected device.
///
/// Invariant: a selected id always references a device present in the
/// catalog at selection time.
#[derive(Debug, Clone, Default)]
pub struct DeviceSelection {
    available: Vec<DeviceDescriptor>,
    selected: Option<String>,
}

impl DeviceSelection {
    pub fn new(available: Vec<DeviceDescriptor>) -> Self {
        Self {
            available,
            selected: None,
        }
    }

    pub fn available(&self) -> &[DeviceDescriptor] {
        &self.available
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Select a device by id, failing when it is not in the catalog
    pub fn select(&mut self, device_id: &str) -> Result<&DeviceDescriptor> {
        let device = self
            .available
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| CameraError::UnknownDevice {
                device_id: device_id.to_string(),
            })?;
        self.selected = Some(device.id.clone());
        Ok(device)
    }

    /// Replace the catalog, clearing the selection if it disappeared
    pub fn refresh(&mut self, available: Vec<DeviceDescriptor>) {
        if let Some(selected) = &self.selected {
            if !available.iter().any(|d| &d.id == selected) {
                warn!("Selected device {} no longer available", selected);
                self.selected = None;
            }
        }
        self.available = available;
    }
}

/// Synthetic camera producing uniform frames at the requested rate.
///
/// Used by the demo binary and tests; real deployments plug in an actual
/// device backend behind [`CameraSource`].
pub struct SyntheticCamera {
    devices: Vec<DeviceDescriptor>,
    /// Fill value for every RGB channel of every generated pixel
    brightness: u8,
    stream_counter: AtomicU64,
}

impl SyntheticCamera {
    pub fn new(devices: Vec<DeviceDescriptor>, brightness: u8) -> Self {
        Self {
            devices,
            brightness,
            stream_counter: AtomicU64::new(0),
        }
    }

    /// A single-device source with a mid-gray scene
    pub fn single(brightness: u8) -> Self {
        Self::new(
            vec![DeviceDescriptor {
                id: "synthetic-0".to_string(),
                label: "Synthetic camera".to_string(),
            }],
            brightness,
        )
    }
}

#[async_trait]
impl CameraSource for SyntheticCamera {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.devices.clone())
    }

    async fn open(&self, device_id: &str, constraints: StreamConstraints) -> Result<FrameStream> {
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(CameraError::DeviceUnavailable {
                device_id: device_id.to_string(),
            }
            .into());
        }

        let stream_id = self.stream_counter.fetch_add(1, Ordering::SeqCst);
        let dimensions = FrameDimensions::new(constraints.width, constraints.height);
        let (tx, rx) = mpsc::channel(4);
        let shutdown = Arc::new(AtomicBool::new(false));

        info!(
            "Opening synthetic stream {} on {} ({}x{} @ {}fps)",
            stream_id, device_id, constraints.width, constraints.height, constraints.frame_rate
        );

        let producer_shutdown = Arc::clone(&shutdown);
        let brightness = self.brightness;
        tokio::spawn(async move {
            let frame_period = Duration::from_millis(1000 / constraints.frame_rate.max(1) as u64);
            let pixel_count = (constraints.width * constraints.height) as usize;
            let mut frame_id = 0u64;

            loop {
                if producer_shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let frame = FrameData::new(
                    frame_id,
                    SystemTime::now(),
                    vec![brightness; pixel_count * 3],
                    constraints.width,
                    constraints.height,
                    FrameFormat::Rgb24,
                );
                frame_id += 1;

                if tx.send(frame).await.is_err() {
                    // Receiver closed; the stream was torn down
                    break;
                }
                tokio::time::sleep(frame_period).await;
            }
            debug!("Synthetic producer for stream {} stopped", stream_id);
        });

        Ok(FrameStream::new(
            stream_id,
            device_id.to_string(),
            dimensions,
            rx,
            shutdown,
        ))
    }
}

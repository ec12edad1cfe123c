use crate::camera::FrameStream;
use crate::error::{RecordingError, Result};
use crate::frame::FrameData;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Finalized recording output handed back to the caller
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub mime_type: String,
    pub frame_count: u64,
    pub data: Vec<u8>,
}

impl Artifact {
    /// Suggested download file name, e.g. `recording_20240131_120000.webm`
    pub fn suggested_file_name(&self) -> String {
        let extension = match self.mime_type.as_str() {
            "video/webm" => "webm",
            "video/mp4" => "mp4",
            _ => "bin",
        };
        format!(
            "recording_{}.{}",
            self.created_at.format("%Y%m%d_%H%M%S"),
            extension
        )
    }
}

/// External recording sink: encodes frames into container chunks.
///
/// Container and codec details are the sink's concern; the session only
/// buffers the chunks it emits and concatenates them on finalize.
#[async_trait]
pub trait RecordingSink: Send + Sync {
    fn mime_type(&self) -> &str;

    /// Encode one frame into zero or more container bytes
    async fn encode_frame(&self, frame: &FrameData) -> Result<Vec<u8>>;

    /// Produce any trailing container bytes
    async fn finalize(&self) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Stopped,
}

/// Thin lifecycle wrapper around the recording sink.
///
/// Guarantees at most one active underlying encoder per session: `stop` is
/// a no-op after the first call, and each session starts from an empty
/// chunk buffer. The session never drives recording state on its own; it
/// only reports success or failure back to the admission controller.
pub struct RecordingSession {
    id: String,
    stream_id: u64,
    started_at: DateTime<Utc>,
    sink: Arc<dyn RecordingSink>,
    chunks: Mutex<Vec<Vec<u8>>>,
    frame_count: Mutex<u64>,
    state: Mutex<SessionState>,
}

impl RecordingSession {
    /// Start a new session against the given stream.
    ///
    /// Fails with `NoActiveStream` when the stream handle has already been
    /// closed (e.g. start raced a device switch).
    pub fn start(sink: Arc<dyn RecordingSink>, stream: &FrameStream) -> Result<Self> {
        if stream.is_closed() {
            return Err(RecordingError::NoActiveStream.into());
        }

        let id = Uuid::new_v4().to_string();
        info!("Recording session {} started on stream {}", id, stream.id());

        Ok(Self {
            id,
            stream_id: stream.id(),
            started_at: Utc::now(),
            sink,
            chunks: Mutex::new(Vec::new()),
            frame_count: Mutex::new(0),
            state: Mutex::new(SessionState::Active),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn is_active(&self) -> bool {
        *self.state.lock() == SessionState::Active
    }

    /// Encode and buffer one frame. Frames arriving after stop are dropped.
    pub async fn push_frame(&self, frame: &FrameData) -> Result<()> {
        if !self.is_active() {
            debug!("Session {} already stopped, dropping frame", self.id);
            return Ok(());
        }

        let chunk = self.sink.encode_frame(frame).await?;
        if !chunk.is_empty() {
            self.chunks.lock().push(chunk);
        }
        *self.frame_count.lock() += 1;
        Ok(())
    }

    /// Stop and finalize the session.
    ///
    /// The first call concatenates the buffered chunks into one artifact
    /// and clears the buffer; every later call is a no-op returning `None`.
    pub async fn stop(&self) -> Result<Option<Artifact>> {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Stopped {
                debug!("Session {} stop called again, ignoring", self.id);
                return Ok(None);
            }
            *state = SessionState::Stopped;
        }

        let trailer = match self.sink.finalize().await {
            Ok(trailer) => trailer,
            Err(e) => {
                // The session is lost; the buffer is cleared so nothing
                // leaks into a later session.
                warn!("Session {} finalize failed: {}", self.id, e);
                self.chunks.lock().clear();
                return Err(e);
            }
        };

        let mut chunks = self.chunks.lock();
        let mut data = Vec::with_capacity(chunks.iter().map(|c| c.len()).sum::<usize>());
        for chunk in chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }
        data.extend_from_slice(&trailer);

        let frame_count = *self.frame_count.lock();
        info!(
            "Recording session {} finalized: {} frames, {} bytes",
            self.id,
            frame_count,
            data.len()
        );

        Ok(Some(Artifact {
            id: Uuid::new_v4().to_string(),
            session_id: self.id.clone(),
            created_at: self.started_at,
            mime_type: self.sink.mime_type().to_string(),
            frame_count,
            data,
        }))
    }
}

/// In-memory sink that stores frames as length-prefixed raw chunks.
///
/// Stands in for a real container encoder in tests and the demo binary.
pub struct MemorySink {
    mime_type: String,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            mime_type: "video/webm".to_string(),
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordingSink for MemorySink {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn encode_frame(&self, frame: &FrameData) -> Result<Vec<u8>> {
        let mut chunk = Vec::with_capacity(8 + frame.data.len());
        chunk.extend_from_slice(&(frame.data.len() as u64).to_le_bytes());
        chunk.extend_from_slice(&frame.data);
        Ok(chunk)
    }

    async fn finalize(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

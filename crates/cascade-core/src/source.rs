//! The producer boundary: independently clocked frame sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::texture::RenderSize;

/// Describes where a producer gets its frames and how to decode them.
///
/// A descriptor is inert data; the producer itself is opened lazily (and
/// reopened after context recreation) from the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Input location (file path or URL).
    pub location: String,

    /// Decoded output width (pixels).
    #[serde(default = "default_width")]
    pub width: u32,

    /// Decoded output height (pixels).
    #[serde(default = "default_height")]
    pub height: u32,

    /// Nominal output fps.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Whether to loop when the input ends.
    #[serde(default = "default_loop", rename = "loop")]
    pub looping: bool,

    /// Optional explicit decoder binary path.
    #[serde(default)]
    pub ffmpeg_path: Option<String>,
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    360
}
fn default_fps() -> u32 {
    30
}
fn default_loop() -> bool {
    true
}

impl SourceDescriptor {
    pub fn for_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            looping: default_loop(),
            ffmpeg_path: None,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.location.trim().is_empty() {
            return Err(PipelineError::InvalidDescriptor("location is empty".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidDescriptor(
                "width/height must be > 0".into(),
            ));
        }
        if self.fps == 0 {
            return Err(PipelineError::InvalidDescriptor("fps must be > 0".into()));
        }
        Ok(())
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        let descriptor: SourceDescriptor =
            serde_json::from_str(&text).map_err(|source| PipelineError::Json {
                path: PathBuf::from(path),
                source,
            })?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// One decoded frame: tightly packed RGBA8 plus the texture-coordinate
/// transform the producer wants applied when sampling it.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    pub transform: Mat4,
}

impl SourceFrame {
    pub fn rgba(width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes,
            transform: Mat4::IDENTITY,
        }
    }
}

/// Invoked by the producer on its own thread whenever a new frame is ready.
/// Must not touch GPU state; raise a [`RenderSignal`](crate::RenderSignal)
/// and return.
pub type FrameCallback = Arc<dyn Fn() + Send + Sync>;

/// An independently clocked frame producer (video decoder, camera, ...).
///
/// Producers are context-scoped collaborators: their frame delivery surface is
/// bound to GPU state, so they are reopened from the descriptor whenever the
/// context is recreated. Releasing a producer is `Drop`.
pub trait MediaProducer {
    /// Open a fresh producer instance for the descriptor.
    fn open(descriptor: &SourceDescriptor) -> Result<Self, PipelineError>
    where
        Self: Sized;

    /// Native output dimensions. Only meaningful after `open`; callers must
    /// re-query rather than cache across instances.
    fn native_size(&self) -> RenderSize;

    /// Register the frame-available callback. Called from the producer's own
    /// thread, so it must be cheap and thread-safe.
    fn set_frame_callback(&mut self, callback: FrameCallback);

    /// Begin producing frames.
    fn start(&mut self);

    /// Stop producing frames. Stopping an unstarted producer is a no-op.
    fn stop(&mut self);

    /// Latch: consume the most recent produced frame, if any. Frames
    /// superseded since the last latch are dropped, never queued.
    fn take_latest_frame(&mut self) -> Option<SourceFrame>;
}

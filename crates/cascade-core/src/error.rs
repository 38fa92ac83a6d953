use std::path::PathBuf;

use thiserror::Error;

use crate::texture::TextureId;

/// Errors used across the cascade crates.
///
/// Contract rule: this type lives in `cascade-core` and is re-exported by
/// backends and stage crates; no crate defines a competing error enum.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ---- Descriptor / config ----
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("json parse error at {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid source descriptor: {0}")]
    InvalidDescriptor(String),

    // ---- Backend resource lifecycle ----
    #[error("vertex shader compile error: {0}")]
    VertexCompile(String),

    #[error("fragment shader compile error: {0}")]
    FragmentCompile(String),

    #[error("program link error: {0}")]
    Link(String),

    #[error("resource allocation failed: {0}")]
    ResourceAllocation(String),

    // ---- Producer boundary ----
    #[error("producer open failed: {0}")]
    ProducerOpen(String),

    // ---- Protocol misuse (programmer errors, fail fast) ----
    #[error("{op} called while stage is {state}")]
    InvalidState { op: &'static str, state: &'static str },

    #[error("stale texture reference: {0:?} is not alive on this context")]
    StaleTexture(TextureId),
}

impl PipelineError {
    pub fn allocation<T: Into<String>>(msg: T) -> Self {
        PipelineError::ResourceAllocation(msg.into())
    }

    /// Allocation-class failures leave the stage `Uninitialized`; the driver
    /// may retry them on the next context lifecycle event. Everything else is
    /// either a config error or a protocol misuse and is not retried.
    pub fn is_allocation(&self) -> bool {
        matches!(
            self,
            PipelineError::VertexCompile(_)
                | PipelineError::FragmentCompile(_)
                | PipelineError::Link(_)
                | PipelineError::ResourceAllocation(_)
                | PipelineError::ProducerOpen(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_classification() {
        assert!(PipelineError::allocation("fbo incomplete").is_allocation());
        assert!(PipelineError::Link("log".into()).is_allocation());
        assert!(PipelineError::ProducerOpen("spawn failed".into()).is_allocation());
        assert!(!PipelineError::InvalidDescriptor("width is 0".into()).is_allocation());
        assert!(!PipelineError::InvalidState {
            op: "render",
            state: "Uninitialized",
        }
        .is_allocation());
    }
}

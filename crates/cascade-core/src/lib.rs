#![forbid(unsafe_code)]

//! cascade contract crate.
//!
//! This crate is **contract-only**: no GL handles, no windowing, no OS policy.
//! It defines the vocabulary the stage machinery is written against: texture
//! handles and sizes, the [`RenderContext`] rendering boundary, the
//! [`MediaProducer`] boundary for independently clocked frame sources, shader
//! source composition, the coalescing render signal, and the error taxonomy.
//!
//! Deterministic in-memory stand-ins for both boundaries live in [`mock`] so
//! the full stage protocol can be exercised without a GPU or a decoder.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod context;
pub mod error;
pub mod mock;
pub mod shader;
pub mod signal;
pub mod source;
pub mod texture;

// ---- Stable re-exports ----
pub use context::{
    ExternalSamplerSupport, FramebufferId, ProgramId, RenderContext, RenderTarget, UniformLocation,
};
pub use error::PipelineError;
pub use signal::RenderSignal;
pub use source::{FrameCallback, MediaProducer, SourceDescriptor, SourceFrame};
pub use texture::{RenderSize, TextureHandle, TextureId, TextureKind};

// Per-frame texture-coordinate transforms are plain `glam` matrices; re-export
// the crate so dependents stay version-aligned.
pub use glam;

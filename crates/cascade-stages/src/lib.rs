#![forbid(unsafe_code)]

//! Backend-agnostic stage machinery.
//!
//! A pipeline is a chain of stages: a producer-type stage turns an
//! independently clocked media source into GPU textures, zero or more filter
//! stages transform them, and a terminal stage presents the result. Stages
//! hold GPU resources only between `initialize` and `teardown`; the
//! [`PipelineDriver`] replays that lifecycle whenever the rendering context is
//! created or lost, and runs render passes when a producer signals work.
//!
//! Everything here is written against `cascade_core::RenderContext`, so the
//! whole protocol runs unchanged on the glow backend or on the in-memory mock.

pub mod binding;
pub mod driver;
pub mod filter;
pub mod screen;
pub mod source;
pub mod stage;

pub use binding::ShaderBinding;
pub use driver::PipelineDriver;
pub use filter::ShaderFilterStage;
pub use screen::ScreenStage;
pub use source::MediaSourceStage;
pub use stage::{ConsumerStage, FrameConsumer, Stage, StageCore, StageState};

pub use cascade_core::PipelineError;

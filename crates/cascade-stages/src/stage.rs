//! The stage contract and its shared plumbing.

use cascade_core::{PipelineError, RenderContext, RenderSize, TextureHandle};

use crate::binding::ShaderBinding;

/// Lifecycle state of a stage.
///
/// `Uninitialized → Ready` via `initialize`, back via `teardown` (or context
/// loss). `Errored` marks a stage whose render pass failed; it stays unusable
/// until the next `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Uninitialized,
    Ready,
    Errored,
}

impl StageState {
    pub fn name(&self) -> &'static str {
        match self {
            StageState::Uninitialized => "Uninitialized",
            StageState::Ready => "Ready",
            StageState::Errored => "Errored",
        }
    }
}

/// One node in the texture-processing chain.
///
/// All methods run on the context-affine render thread. `initialize` must be
/// idempotent after `teardown`, and `teardown` must be safe to call
/// repeatedly. `render` is only legal in `Ready`; anything else is a protocol
/// misuse and fails fast with
/// [`InvalidState`](PipelineError::InvalidState).
pub trait Stage {
    /// (Re)allocate GPU resources sized to the current render size.
    /// Allocation failures leave the stage `Uninitialized`; the driver decides
    /// whether to retry on the next context event.
    fn initialize(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError>;

    /// Run one render pass, leaving the output texture holding the new frame
    /// and pushing it to the downstream consumer within the same call.
    fn render(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError>;

    /// Release GPU resources; state becomes `Uninitialized`.
    fn teardown(&mut self, ctx: &mut dyn RenderContext);

    fn state(&self) -> StageState;

    fn render_size(&self) -> RenderSize;

    fn set_render_size(&mut self, size: RenderSize);
}

/// Capability: accepts a texture pushed by an upstream stage.
///
/// The handle is valid only for the duration of this call; implementations
/// that keep it must expect [`StaleTexture`](PipelineError::StaleTexture)
/// once the upstream re-initializes.
pub trait FrameConsumer {
    /// A new upstream texture is available. `source_size` is the producing
    /// stage's render size, kept separate from the consumer's own size.
    fn on_texture_ready(
        &mut self,
        ctx: &mut dyn RenderContext,
        texture: TextureHandle,
        source_size: RenderSize,
    ) -> Result<(), PipelineError>;
}

/// A stage that can sit downstream of a producer.
pub trait ConsumerStage: Stage + FrameConsumer {}

impl<T: Stage + FrameConsumer> ConsumerStage for T {}

/// Shared lifecycle plumbing: state, render size, shader binding and the
/// optional offscreen target. Concrete stages compose this instead of
/// inheriting a base class.
#[derive(Debug)]
pub struct StageCore {
    state: StageState,
    render_size: RenderSize,
    target: Option<cascade_core::RenderTarget>,
    binding: Option<ShaderBinding>,
}

impl Default for StageCore {
    fn default() -> Self {
        Self::new()
    }
}

impl StageCore {
    pub fn new() -> Self {
        Self {
            state: StageState::Uninitialized,
            render_size: RenderSize::ZERO,
            target: None,
            binding: None,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn set_state(&mut self, state: StageState) {
        self.state = state;
    }

    pub fn mark_ready(&mut self) {
        self.state = StageState::Ready;
    }

    pub fn render_size(&self) -> RenderSize {
        self.render_size
    }

    pub fn set_render_size(&mut self, size: RenderSize) {
        self.render_size = size;
    }

    /// Compile the program and rebuild the attribute/uniform binding.
    pub fn init_program(
        &mut self,
        ctx: &mut dyn RenderContext,
        vertex_src: &str,
        fragment_src: &str,
        uniform_names: &[&str],
    ) -> Result<(), PipelineError> {
        if let Some(old) = self.binding.take() {
            ctx.delete_program(old.program());
        }
        let program = ctx.compile_program(vertex_src, fragment_src)?;
        self.binding = Some(ShaderBinding::build(ctx, program, uniform_names));
        Ok(())
    }

    /// (Re)allocate the offscreen output target at the current render size.
    pub fn init_target(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        if let Some(old) = self.target.take() {
            ctx.delete_render_target(old);
        }
        let size = self.render_size;
        let target = ctx.create_render_target(size.width.max(1), size.height.max(1))?;
        self.target = Some(target);
        Ok(())
    }

    /// Release program and target. Safe to call repeatedly.
    pub fn teardown(&mut self, ctx: &mut dyn RenderContext) {
        if let Some(binding) = self.binding.take() {
            ctx.delete_program(binding.program());
        }
        if let Some(target) = self.target.take() {
            ctx.delete_render_target(target);
        }
        self.state = StageState::Uninitialized;
    }

    pub fn ensure_ready(&self, op: &'static str) -> Result<(), PipelineError> {
        if self.state() != StageState::Ready {
            return Err(PipelineError::InvalidState {
                op,
                state: self.state().name(),
            });
        }
        Ok(())
    }

    /// Bind the offscreen target, set the viewport and select the program.
    pub fn begin_offscreen_pass(&self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        let target = self.target.as_ref().ok_or(PipelineError::InvalidState {
            op: "begin_offscreen_pass",
            state: "no output target",
        })?;
        ctx.bind_render_target(Some(target))?;
        ctx.set_viewport(RenderSize::new(target.width, target.height));
        self.use_own_program(ctx)
    }

    /// Bind the default framebuffer at the given viewport and select the
    /// program.
    pub fn begin_present_pass(
        &self,
        ctx: &mut dyn RenderContext,
        viewport: RenderSize,
    ) -> Result<(), PipelineError> {
        ctx.bind_render_target(None)?;
        ctx.set_viewport(viewport);
        self.use_own_program(ctx)
    }

    fn use_own_program(&self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        let binding = self.binding.as_ref().ok_or(PipelineError::InvalidState {
            op: "render",
            state: "no shader binding",
        })?;
        ctx.use_program(binding.program())
    }

    pub fn binding(&self) -> Option<&ShaderBinding> {
        self.binding.as_ref()
    }

    /// The output texture as an exchangeable handle, if a target exists.
    pub fn output(&self) -> Option<TextureHandle> {
        self.target.as_ref().map(|t| t.handle())
    }

    pub fn target_size(&self) -> Option<RenderSize> {
        self.target
            .as_ref()
            .map(|t| RenderSize::new(t.width, t.height))
    }
}

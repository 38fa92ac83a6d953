//! Terminal stage: presents its input texture to the default framebuffer.

use cascade_core::shader::{ShaderTemplate, U_TEXTURE0};
use cascade_core::{PipelineError, RenderContext, RenderSize, TextureHandle, TextureKind};

use crate::stage::{FrameConsumer, Stage, StageCore, StageState};

/// Screen endpoint: no downstream, no offscreen target.
///
/// Its render size comes from the context's default-target size and is
/// independent of the adopted input dimensions, so a 640×360 source presents
/// fine on a 1280×720 surface. `on_texture_ready` draws synchronously: when
/// it returns, the frame is on the presentation target (modulo the host's
/// buffer swap).
pub struct ScreenStage {
    core: StageCore,
    input: Option<(TextureHandle, RenderSize)>,
}

impl Default for ScreenStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenStage {
    pub fn new() -> Self {
        Self {
            core: StageCore::new(),
            input: None,
        }
    }

    /// Dimensions reported by the upstream stage for the adopted texture.
    /// Distinct from [`render_size`](Stage::render_size), which tracks the
    /// presentation surface.
    pub fn input_size(&self) -> Option<RenderSize> {
        self.input.map(|(_, size)| size)
    }

    pub fn input_texture(&self) -> Option<TextureHandle> {
        self.input.map(|(texture, _)| texture)
    }

    fn render_pass(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        let (texture, _) = self.input.ok_or(PipelineError::InvalidState {
            op: "render",
            state: "no upstream texture delivered",
        })?;

        // Track host resizes: the presentation viewport is whatever the
        // surface currently is.
        let viewport = ctx.default_target_size();
        self.core.set_render_size(viewport);

        self.core.begin_present_pass(ctx, viewport)?;
        ctx.bind_texture(0, TextureKind::Rendered, texture.id)?;
        if let Some(binding) = self.core.binding() {
            if let Some(location) = binding.uniform(U_TEXTURE0) {
                ctx.set_uniform_i32(location, 0);
            }
        }
        ctx.draw_quad();
        Ok(())
    }
}

impl Stage for ScreenStage {
    fn initialize(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        self.core.teardown(ctx);
        self.input = None;

        self.core.set_render_size(ctx.default_target_size());

        let template = ShaderTemplate::passthrough();
        self.core.init_program(
            ctx,
            &template.vertex_source(),
            &template.fragment_source(),
            &[U_TEXTURE0],
        )?;

        self.core.mark_ready();
        Ok(())
    }

    fn render(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        self.core.ensure_ready("render")?;
        let result = self.render_pass(ctx);
        if result.is_err() {
            self.core.set_state(StageState::Errored);
        }
        result
    }

    fn teardown(&mut self, ctx: &mut dyn RenderContext) {
        self.core.teardown(ctx);
        self.input = None;
    }

    fn state(&self) -> StageState {
        self.core.state()
    }

    fn render_size(&self) -> RenderSize {
        self.core.render_size()
    }

    fn set_render_size(&mut self, size: RenderSize) {
        self.core.set_render_size(size);
    }
}

impl FrameConsumer for ScreenStage {
    fn on_texture_ready(
        &mut self,
        ctx: &mut dyn RenderContext,
        texture: TextureHandle,
        source_size: RenderSize,
    ) -> Result<(), PipelineError> {
        self.core.ensure_ready("on_texture_ready")?;
        // Adopt the input id and the source's reported dimensions; the frame
        // is fully drawn by the time this returns.
        self.input = Some((texture, source_size));
        self.render(ctx)
    }
}

//! Generic single-input filter stage.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use cascade_core::shader::{ShaderTemplate, U_RESOLUTION, U_TEXTURE0};
use cascade_core::{PipelineError, RenderContext, RenderSize, TextureHandle, TextureKind};

use crate::stage::{ConsumerStage, FrameConsumer, Stage, StageCore, StageState};

/// Pulls one input texture, applies a caller-supplied fragment shader, and
/// produces one output texture at its own render size.
///
/// If no render size is set before initialization, the stage adopts the
/// upstream size on first delivery. Float parameters registered before
/// `initialize` are resolved into the binding and uploaded on every pass.
pub struct ShaderFilterStage {
    fragment_src: String,
    params: HashMap<String, f32>,
    input: Option<TextureHandle>,
    core: StageCore,
    downstream: Option<Rc<RefCell<dyn ConsumerStage>>>,
}

impl ShaderFilterStage {
    pub fn new(fragment_src: impl Into<String>) -> Self {
        Self {
            fragment_src: fragment_src.into(),
            params: HashMap::new(),
            input: None,
            core: StageCore::new(),
            downstream: None,
        }
    }

    pub fn set_downstream(&mut self, stage: Rc<RefCell<dyn ConsumerStage>>) {
        self.downstream = Some(stage);
    }

    /// Set a float uniform for the custom fragment shader. Parameters present
    /// before `initialize` get a resolved location; later additions for names
    /// the shader does not declare are silently inactive.
    pub fn set_param(&mut self, name: impl Into<String>, value: f32) {
        self.params.insert(name.into(), value);
    }

    pub fn output(&self) -> Option<TextureHandle> {
        self.core.output()
    }

    fn render_pass(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        let input = self.input.ok_or(PipelineError::InvalidState {
            op: "render",
            state: "no upstream texture delivered",
        })?;

        self.core.begin_offscreen_pass(ctx)?;
        ctx.bind_texture(0, TextureKind::Rendered, input.id)?;
        let size = self.core.render_size();
        if let Some(binding) = self.core.binding() {
            if let Some(location) = binding.uniform(U_TEXTURE0) {
                ctx.set_uniform_i32(location, 0);
            }
            if let Some(location) = binding.uniform(U_RESOLUTION) {
                ctx.set_uniform_vec2(location, size.width as f32, size.height as f32);
            }
            for (name, value) in &self.params {
                if let Some(location) = binding.uniform(name) {
                    ctx.set_uniform_f32(location, *value);
                }
            }
        }
        ctx.draw_quad();

        if let Some(downstream) = &self.downstream {
            let output = self.core.output().ok_or(PipelineError::InvalidState {
                op: "render",
                state: "no output target",
            })?;
            downstream
                .borrow_mut()
                .on_texture_ready(ctx, output, size)?;
        }
        Ok(())
    }
}

impl Stage for ShaderFilterStage {
    fn initialize(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        self.core.teardown(ctx);
        // Whatever the previous upstream delivered died with the old context.
        self.input = None;

        let template = ShaderTemplate::passthrough();
        let mut uniform_names: Vec<&str> = vec![U_TEXTURE0, U_RESOLUTION];
        uniform_names.extend(self.params.keys().map(String::as_str));
        self.core.init_program(
            ctx,
            &template.vertex_source(),
            &self.fragment_src,
            &uniform_names,
        )?;

        // The target can only be sized once a size is known; with no explicit
        // size it is allocated lazily on first delivery.
        if !self.core.render_size().is_zero() {
            if let Err(e) = self.core.init_target(ctx) {
                self.core.teardown(ctx);
                return Err(e);
            }
        }

        if let Some(downstream) = &self.downstream {
            if let Err(e) = downstream.borrow_mut().initialize(ctx) {
                self.core.teardown(ctx);
                return Err(e);
            }
        }

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
        if let Some(downstream) = &self.downstream {
            downstream.borrow_mut().teardown(ctx);
        }
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

impl FrameConsumer for ShaderFilterStage {
    fn on_texture_ready(
        &mut self,
        ctx: &mut dyn RenderContext,
        texture: TextureHandle,
        source_size: RenderSize,
    ) -> Result<(), PipelineError> {
        self.core.ensure_ready("on_texture_ready")?;
        if self.core.render_size().is_zero() {
            self.core.set_render_size(source_size);
        }
        if self.core.target_size() != Some(self.core.render_size()) {
            self.core.init_target(ctx)?;
        }
        self.input = Some(texture);
        self.render(ctx)
    }
}

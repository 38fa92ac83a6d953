//! Producer-type stage: bridges an independently clocked media producer into
//! the pull-based stage chain.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use cascade_core::glam::Mat4;
use cascade_core::shader::{ShaderTemplate, U_TEXTURE0, U_TRANSFORM};
use cascade_core::{
    MediaProducer, PipelineError, RenderContext, RenderSignal, RenderSize, SourceDescriptor,
    TextureId, TextureKind,
};
use tracing::{debug, warn};

use crate::stage::{ConsumerStage, Stage, StageCore, StageState};

/// Turns a [`MediaProducer`] into a stage.
///
/// The producer is opened lazily inside `initialize` (and reopened after
/// every context recreation, since its delivery surface is context-scoped).
/// Frame delivery is push-based from the producer's thread: the
/// frame-available callback raises the shared [`RenderSignal`], and the next
/// render pass latches the most recent frame into the externally written
/// texture before sampling it.
pub struct MediaSourceStage<P: MediaProducer> {
    descriptor: SourceDescriptor,
    signal: RenderSignal,
    producer: Option<P>,
    external_texture: Option<TextureId>,
    /// Texture-coordinate transform of the last latched frame. Kept across
    /// passes so a pass without a fresh frame samples consistently.
    transform: Mat4,
    pending_start: bool,
    core: StageCore,
    downstream: Option<Rc<RefCell<dyn ConsumerStage>>>,
}

impl<P: MediaProducer> MediaSourceStage<P> {
    /// `signal` is the driver's render signal; the producer's frame-available
    /// callback raises it from the producer thread.
    pub fn new(descriptor: SourceDescriptor, signal: RenderSignal) -> Self {
        Self {
            descriptor,
            signal,
            producer: None,
            external_texture: None,
            transform: Mat4::IDENTITY,
            pending_start: false,
            core: StageCore::new(),
            downstream: None,
        }
    }

    pub fn set_downstream(&mut self, stage: Rc<RefCell<dyn ConsumerStage>>) {
        self.downstream = Some(stage);
    }

    /// Start playback now if the stage is ready, otherwise record the request
    /// and honor it exactly once when `initialize` completes.
    pub fn start(&mut self) {
        if self.core.state() == StageState::Ready {
            if let Some(producer) = self.producer.as_mut() {
                producer.start();
            }
        } else {
            self.pending_start = true;
        }
    }

    /// Stop playback. Stopping a stage that is not ready is a no-op; there is
    /// nothing running to stop.
    pub fn stop(&mut self) {
        if self.core.state() == StageState::Ready {
            if let Some(producer) = self.producer.as_mut() {
                producer.stop();
            }
        }
    }

    /// Swap the source descriptor for the *next* `initialize`. The currently
    /// open producer is unaffected; callers needing an immediate swap must
    /// force re-initialization.
    pub fn set_source(&mut self, descriptor: SourceDescriptor) {
        self.descriptor = descriptor;
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn producer(&self) -> Option<&P> {
        self.producer.as_ref()
    }

    pub fn producer_mut(&mut self) -> Option<&mut P> {
        self.producer.as_mut()
    }

    pub fn output(&self) -> Option<cascade_core::TextureHandle> {
        self.core.output()
    }

    /// Open a fresh producer, retrying once with another fresh instance on an
    /// open failure before surfacing an allocation-class error.
    fn open_producer(&self) -> Result<P, PipelineError> {
        match P::open(&self.descriptor) {
            Ok(producer) => Ok(producer),
            Err(first @ PipelineError::ProducerOpen(_)) => {
                warn!(
                    location = %self.descriptor.location,
                    error = %first,
                    "producer open failed, retrying with a fresh instance"
                );
                P::open(&self.descriptor).map_err(|second| {
                    PipelineError::allocation(format!(
                        "producer open failed after retry: {second}"
                    ))
                })
            }
            Err(other) => Err(other),
        }
    }

    fn release_gpu(&mut self, ctx: &mut dyn RenderContext) {
        self.core.teardown(ctx);
        if let Some(texture) = self.external_texture.take() {
            ctx.delete_texture(texture);
        }
    }

    fn render_pass(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        let external = self.external_texture.ok_or(PipelineError::InvalidState {
            op: "render",
            state: "no external texture",
        })?;

        // Latch the newest producer frame before sampling; skipping this would
        // draw a stale frame. A pass with no fresh frame re-uses the previous
        // upload and transform.
        if let Some(producer) = self.producer.as_mut() {
            if let Some(frame) = producer.take_latest_frame() {
                ctx.upload_texture(external, frame.width, frame.height, &frame.bytes)?;
                self.transform = frame.transform;
            }
        }

        self.core.begin_offscreen_pass(ctx)?;
        ctx.bind_texture(0, TextureKind::External, external)?;
        if let Some(binding) = self.core.binding() {
            if let Some(location) = binding.uniform(U_TEXTURE0) {
                ctx.set_uniform_i32(location, 0);
            }
            if let Some(location) = binding.uniform(U_TRANSFORM) {
                ctx.set_uniform_mat4(location, &self.transform);
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
                .on_texture_ready(ctx, output, self.core.render_size())?;
        }
        Ok(())
    }
}

impl<P: MediaProducer> Stage for MediaSourceStage<P> {
    fn initialize(&mut self, ctx: &mut dyn RenderContext) -> Result<(), PipelineError> {
        // Release the previous producer first: its delivery surface is bound
        // to the resources we are about to drop.
        if let Some(mut old) = self.producer.take() {
            old.stop();
        }
        self.release_gpu(ctx);

        let mut producer = self.open_producer()?;

        // Late-bound resolution: the true size is only known once the
        // producer is open, so re-query instead of caching across instances.
        let native = producer.native_size();
        self.core.set_render_size(native);
        debug!(
            location = %self.descriptor.location,
            width = native.width,
            height = native.height,
            "producer opened"
        );

        let template = ShaderTemplate::external(ctx.external_sampler_support());
        self.core.init_program(
            ctx,
            &template.vertex_source(),
            &template.fragment_source(),
            &[U_TEXTURE0, U_TRANSFORM],
        )?;
        if let Err(e) = self.core.init_target(ctx) {
            self.release_gpu(ctx);
            return Err(e);
        }
        let external = match ctx.create_texture(TextureKind::External, native.width, native.height)
        {
            Ok(texture) => texture,
            Err(e) => {
                self.release_gpu(ctx);
                return Err(e);
            }
        };
        self.external_texture = Some(external);
        self.transform = Mat4::IDENTITY;

        let signal = self.signal.clone();
        producer.set_frame_callback(Arc::new(move || signal.raise()));
        self.producer = Some(producer);

        if let Some(downstream) = &self.downstream {
            let result = downstream.borrow_mut().initialize(ctx);
            if let Err(e) = result {
                self.release_gpu(ctx);
                return Err(e);
            }
        }

        self.core.mark_ready();
        // Honor a start requested before the producer existed, exactly once.
        if self.pending_start {
            self.pending_start = false;
            if let Some(producer) = self.producer.as_mut() {
                producer.start();
            }
        }
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
        self.release_gpu(ctx);
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

//! Pipeline driver: context lifecycle + render scheduling.

use std::cell::RefCell;
use std::rc::Rc;

use cascade_core::{PipelineError, RenderContext, RenderSignal};
use tracing::{debug, error, trace, warn};

use crate::stage::{Stage, StageState};

/// Owns the rendering context and the root stages, and replays stage
/// lifecycle over context creation/loss.
///
/// Render passes run either on the host's own schedule
/// ([`render_pass`](PipelineDriver::render_pass)) or when a producer raised
/// the shared signal ([`pump`](PipelineDriver::pump)). A stage that is not
/// `Ready` is never rendered; a root whose chain failed to initialize stays
/// `Uninitialized` and is retried on the next context event.
pub struct PipelineDriver<C: RenderContext> {
    context: C,
    roots: Vec<Rc<RefCell<dyn Stage>>>,
    signal: RenderSignal,
}

impl<C: RenderContext> PipelineDriver<C> {
    pub fn new(context: C) -> Self {
        Self {
            context,
            roots: Vec::new(),
            signal: RenderSignal::new(),
        }
    }

    /// The shared work-pending signal. Hand clones to producer stages and to
    /// hosts that want to install an event-loop waker.
    pub fn signal(&self) -> RenderSignal {
        self.signal.clone()
    }

    /// Request a render pass; honored by the next [`pump`](Self::pump).
    pub fn request_render(&self) {
        self.signal.raise();
    }

    pub fn add_root(&mut self, stage: Rc<RefCell<dyn Stage>>) {
        self.roots.push(stage);
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// The context was created or recreated: rebuild every chain. Allocation
    /// failures are contained per root and retried on the next call.
    pub fn on_context_created(&mut self) {
        let ctx = &mut self.context;
        for (index, root) in self.roots.iter().enumerate() {
            let mut stage = root.borrow_mut();
            stage.teardown(ctx);
            match stage.initialize(ctx) {
                Ok(()) => debug!(root = index, "stage chain initialized"),
                Err(e) if e.is_allocation() => warn!(
                    root = index,
                    error = %e,
                    "stage chain failed to initialize, will retry on next context event"
                ),
                Err(e) => error!(root = index, error = %e, "stage chain failed to initialize"),
            }
        }
    }

    /// The context is about to be destroyed: release everything.
    pub fn on_context_lost(&mut self) {
        let ctx = &mut self.context;
        for root in &self.roots {
            root.borrow_mut().teardown(ctx);
        }
    }

    /// Render every ready root. Producing stages push their output through
    /// their chains within this call.
    pub fn render_pass(&mut self) -> Result<(), PipelineError> {
        let ctx = &mut self.context;
        for root in &self.roots {
            let mut stage = root.borrow_mut();
            if stage.state() == StageState::Ready {
                stage.render(ctx)?;
            } else {
                trace!(state = stage.state().name(), "skipping root, not ready");
            }
        }
        Ok(())
    }

    /// Run a render pass if one was requested since the last pump. Returns
    /// whether a pass ran.
    pub fn pump(&mut self) -> Result<bool, PipelineError> {
        if self.signal.take() {
            self.render_pass()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MediaSourceStage;
    use cascade_core::mock::{MockContext, MockProducer};
    use cascade_core::{RenderSize, SourceDescriptor};

    fn driver_with_two_roots() -> (
        PipelineDriver<MockContext>,
        Rc<RefCell<MediaSourceStage<MockProducer>>>,
        Rc<RefCell<MediaSourceStage<MockProducer>>>,
    ) {
        let ctx = MockContext::new(RenderSize::new(320, 240));
        let mut driver = PipelineDriver::new(ctx);
        let a = Rc::new(RefCell::new(MediaSourceStage::<MockProducer>::new(
            SourceDescriptor::for_location("mock:a"),
            driver.signal(),
        )));
        let b = Rc::new(RefCell::new(MediaSourceStage::<MockProducer>::new(
            SourceDescriptor::for_location("mock:b"),
            driver.signal(),
        )));
        driver.add_root(a.clone());
        driver.add_root(b.clone());
        (driver, a, b)
    }

    #[test]
    fn failed_root_is_contained_and_retried() {
        let (mut driver, a, b) = driver_with_two_roots();

        // First root's program compile is the first allocation of the event.
        driver.context_mut().fail_next_allocations(1);
        driver.on_context_created();
        assert_eq!(a.borrow().state(), StageState::Uninitialized);
        assert_eq!(b.borrow().state(), StageState::Ready);

        // Next context event retries the failed root.
        driver.on_context_created();
        assert_eq!(a.borrow().state(), StageState::Ready);
        assert_eq!(b.borrow().state(), StageState::Ready);
    }

    #[test]
    fn pump_runs_only_when_signalled() {
        let (mut driver, _a, _b) = driver_with_two_roots();
        driver.on_context_created();

        assert!(!driver.pump().expect("idle pump"));
        driver.signal().raise();
        assert!(driver.pump().expect("signalled pump"));
        assert!(!driver.pump().expect("signal consumed"));
    }

    #[test]
    fn non_ready_roots_are_never_rendered() {
        let (mut driver, a, _b) = driver_with_two_roots();
        // No context event yet: nothing is ready, a pass renders nothing.
        driver.render_pass().expect("pass over unready roots");
        assert_eq!(a.borrow().state(), StageState::Uninitialized);
        assert!(driver.context().draws().is_empty());
    }
}

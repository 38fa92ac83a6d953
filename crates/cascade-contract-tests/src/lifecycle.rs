//! Stage lifecycle contracts: fail-fast state checks, idempotent teardown,
//! full resource rotation across re-initialization.

use std::sync::atomic::{AtomicUsize, Ordering};

use cascade_core::mock::{MockContext, MockProducer};
use cascade_core::{
    FrameCallback, MediaProducer, PipelineError, RenderSignal, RenderSize, SourceDescriptor,
    SourceFrame,
};
use cascade_stages::{FrameConsumer, MediaSourceStage, ScreenStage, Stage, StageState};

fn mock_ctx() -> MockContext {
    MockContext::new(RenderSize::new(1280, 720))
}

fn source_stage(location: &str, width: u32, height: u32) -> MediaSourceStage<MockProducer> {
    let mut descriptor = SourceDescriptor::for_location(location);
    descriptor.width = width;
    descriptor.height = height;
    MediaSourceStage::new(descriptor, RenderSignal::new())
}

#[test]
fn render_before_initialize_fails_fast() {
    let mut ctx = mock_ctx();
    let mut stage = source_stage("mock:clip", 640, 360);

    let err = stage.render(&mut ctx).expect_err("render must fail");
    assert!(matches!(err, PipelineError::InvalidState { .. }), "got: {err}");
    // Never silently produce a texture.
    assert!(ctx.draws().is_empty());
}

#[test]
fn teardown_twice_is_a_no_op() {
    let mut ctx = mock_ctx();
    let mut stage = source_stage("mock:clip", 640, 360);
    stage.initialize(&mut ctx).expect("initialize");
    assert!(ctx.alive_texture_count() > 0);

    stage.teardown(&mut ctx);
    let after_first = ctx.alive_texture_count();
    assert_eq!(after_first, 0);
    assert_eq!(stage.state(), StageState::Uninitialized);

    stage.teardown(&mut ctx);
    assert_eq!(ctx.alive_texture_count(), after_first);
    assert_eq!(stage.state(), StageState::Uninitialized);
}

#[test]
fn reinitialize_rotates_output_texture_and_requeries_size() {
    let mut ctx = mock_ctx();
    let mut stage = source_stage("mock:clip", 640, 360);

    stage.initialize(&mut ctx).expect("first initialize");
    let first = stage.output().expect("output after initialize");
    assert_eq!(stage.render_size(), RenderSize::new(640, 360));

    stage.teardown(&mut ctx);

    // Deferred-apply source swap takes effect on the next initialize, which
    // must re-query the size from the fresh producer instead of caching it.
    let mut swapped = SourceDescriptor::for_location("mock:other");
    swapped.width = 320;
    swapped.height = 180;
    stage.set_source(swapped);

    stage.initialize(&mut ctx).expect("second initialize");
    let second = stage.output().expect("output after re-initialize");

    assert_ne!(first.id, second.id, "output texture must be freshly allocated");
    assert_eq!(stage.render_size(), RenderSize::new(320, 180));
}

#[test]
fn set_source_does_not_touch_open_producer() {
    let mut ctx = mock_ctx();
    let mut stage = source_stage("mock:clip", 640, 360);
    stage.initialize(&mut ctx).expect("initialize");

    let mut swapped = SourceDescriptor::for_location("mock:other");
    swapped.width = 320;
    swapped.height = 180;
    stage.set_source(swapped);

    // Still the old producer, still the old size, until re-initialization.
    assert_eq!(stage.render_size(), RenderSize::new(640, 360));
    assert_eq!(
        stage.producer().expect("producer open").native_size(),
        RenderSize::new(640, 360)
    );
}

#[test]
fn consumer_keeping_a_handle_across_teardown_hits_stale_detection() {
    let mut ctx = mock_ctx();
    let mut source = source_stage("mock:clip", 640, 360);
    let mut screen = ScreenStage::new();

    screen.initialize(&mut ctx).expect("screen initialize");
    source.initialize(&mut ctx).expect("source initialize");

    let handle = source.output().expect("source output");
    source
        .producer()
        .expect("producer open")
        .emit_frame(SourceFrame::rgba(640, 360, vec![9; 640 * 360 * 4]));
    source.render(&mut ctx).expect("source render");
    screen
        .on_texture_ready(&mut ctx, handle, source.render_size())
        .expect("delivery within the pass is valid");

    // The handle dies with the owner's teardown; presenting it afterwards is
    // a protocol violation and must be detected, not drawn.
    source.teardown(&mut ctx);
    let err = screen.render(&mut ctx).expect_err("stale handle must fail");
    assert!(matches!(err, PipelineError::StaleTexture(_)), "got: {err}");
    assert_eq!(screen.state(), StageState::Errored);
}

#[test]
fn permanent_open_failure_surfaces_as_allocation_and_leaves_uninitialized() {
    let mut ctx = mock_ctx();
    let mut stage = source_stage("fail:forever", 640, 360);

    let err = stage.initialize(&mut ctx).expect_err("open must fail");
    assert!(matches!(err, PipelineError::ResourceAllocation(_)), "got: {err}");
    assert!(err.is_allocation());
    assert_eq!(stage.state(), StageState::Uninitialized);
    assert_eq!(ctx.alive_texture_count(), 0);
}

/// Fails its first `open`, then behaves like [`MockProducer`].
struct FlakyProducer {
    inner: MockProducer,
}

static FLAKY_FAILURES_LEFT: AtomicUsize = AtomicUsize::new(0);

impl MediaProducer for FlakyProducer {
    fn open(descriptor: &SourceDescriptor) -> Result<Self, PipelineError> {
        if FLAKY_FAILURES_LEFT
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PipelineError::ProducerOpen("flaky: first open".into()));
        }
        MockProducer::open(descriptor).map(|inner| Self { inner })
    }

    fn native_size(&self) -> RenderSize {
        self.inner.native_size()
    }

    fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.inner.set_frame_callback(callback);
    }

    fn start(&mut self) {
        self.inner.start();
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn take_latest_frame(&mut self) -> Option<SourceFrame> {
        self.inner.take_latest_frame()
    }
}

#[test]
fn one_failed_open_is_retried_with_a_fresh_instance() {
    let mut ctx = mock_ctx();
    FLAKY_FAILURES_LEFT.store(1, Ordering::SeqCst);

    let mut stage = MediaSourceStage::<FlakyProducer>::new(
        SourceDescriptor::for_location("mock:flaky"),
        RenderSignal::new(),
    );
    stage
        .initialize(&mut ctx)
        .expect("retry with a fresh instance must succeed");
    assert_eq!(stage.state(), StageState::Ready);
}

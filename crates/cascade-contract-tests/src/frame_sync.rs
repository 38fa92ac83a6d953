//! Producer/render-loop synchronization contracts: deferred start, signal
//! coalescing, latch semantics and the per-frame transform path.

use cascade_core::glam::{Mat4, Vec3, Vec4};
use cascade_core::mock::{MockContext, MockProducer, UniformValue};
use cascade_core::shader::U_TRANSFORM;
use cascade_core::{RenderSignal, RenderSize, SourceDescriptor, SourceFrame};
use cascade_stages::{MediaSourceStage, Stage};

fn mock_ctx() -> MockContext {
    MockContext::new(RenderSize::new(1280, 720))
}

fn small_stage(signal: RenderSignal) -> MediaSourceStage<MockProducer> {
    let mut descriptor = SourceDescriptor::for_location("mock:clip");
    descriptor.width = 2;
    descriptor.height = 2;
    MediaSourceStage::new(descriptor, signal)
}

fn frame(fill: u8) -> SourceFrame {
    SourceFrame::rgba(2, 2, vec![fill; 16])
}

#[test]
fn start_before_initialize_is_honored_exactly_once() {
    let mut ctx = mock_ctx();
    let mut stage = small_stage(RenderSignal::new());

    // Requested before the producer exists; must not be lost.
    stage.start();
    stage.initialize(&mut ctx).expect("initialize");
    assert_eq!(stage.producer().expect("producer").starts(), 1);
    assert!(stage.producer().expect("producer").is_playing());

    // The request was consumed: a context recreation opens a fresh producer
    // and must not replay it.
    stage.teardown(&mut ctx);
    stage.initialize(&mut ctx).expect("re-initialize");
    assert_eq!(stage.producer().expect("producer").starts(), 0);
}

#[test]
fn start_when_ready_is_immediate() {
    let mut ctx = mock_ctx();
    let mut stage = small_stage(RenderSignal::new());
    stage.initialize(&mut ctx).expect("initialize");

    assert_eq!(stage.producer().expect("producer").starts(), 0);
    stage.start();
    assert_eq!(stage.producer().expect("producer").starts(), 1);
}

#[test]
fn stop_before_ready_is_benign() {
    let mut ctx = mock_ctx();
    let mut stage = small_stage(RenderSignal::new());

    stage.stop();
    stage.initialize(&mut ctx).expect("initialize");
    let producer = stage.producer().expect("producer");
    assert_eq!(producer.starts(), 0);
    assert_eq!(producer.stops(), 0);
}

#[test]
fn frame_available_raises_the_render_signal() {
    let mut ctx = mock_ctx();
    let signal = RenderSignal::new();
    let mut stage = small_stage(signal.clone());
    stage.initialize(&mut ctx).expect("initialize");

    assert!(!signal.is_pending());
    stage.producer().expect("producer").emit_frame(frame(1));
    assert!(signal.is_pending());
}

#[test]
fn frames_emitted_from_the_producer_thread_are_signalled() {
    let mut ctx = mock_ctx();
    let signal = RenderSignal::new();
    let mut stage = small_stage(signal.clone());
    stage.initialize(&mut ctx).expect("initialize");

    let emitter = stage.producer().expect("producer").emitter();
    std::thread::spawn(move || emitter.emit(frame(1)))
        .join()
        .expect("producer thread");
    assert!(signal.take());
}

#[test]
fn latch_presents_only_the_newest_frame() {
    let mut ctx = mock_ctx();
    let mut stage = small_stage(RenderSignal::new());
    stage.initialize(&mut ctx).expect("initialize");

    // Three frames between two passes: only the last may reach the GPU.
    let producer = stage.producer().expect("producer");
    producer.emit_frame(frame(1));
    producer.emit_frame(frame(2));
    producer.emit_frame(frame(3));

    stage.render(&mut ctx).expect("render");
    let uploads = ctx.uploads();
    assert_eq!(uploads.len(), 1, "at-most-latest, not a queue");
    assert_eq!(uploads[0].bytes, vec![3; 16]);

    // No new frame: the next pass re-uses the upload instead of repeating it.
    stage.render(&mut ctx).expect("second render");
    assert_eq!(ctx.uploads().len(), 1);
}

#[test]
fn transform_matrix_reaches_the_shader_unchanged() {
    let mut ctx = mock_ctx();
    let mut stage = small_stage(RenderSignal::new());
    stage.initialize(&mut ctx).expect("initialize");

    let m = Mat4::from_translation(Vec3::new(0.25, 0.0, 0.0))
        * Mat4::from_scale(Vec3::new(0.5, 1.0, 1.0));
    let mut f = frame(5);
    f.transform = m;
    stage.producer().expect("producer").emit_frame(f);
    stage.render(&mut ctx).expect("render");

    let draw = ctx.draws().last().expect("one draw");
    let drawn = match draw.uniforms.get(U_TRANSFORM) {
        Some(UniformValue::Mat4(v)) => *v,
        other => panic!("uTransform not a mat4: {other:?}"),
    };
    assert_eq!(drawn, m);

    // Hand-computed mapping of the unit quad corners through the same matrix
    // the vertex shader applies to texture coordinates.
    let origin = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
    assert_eq!((origin.x, origin.y), (0.25, 0.0));
    let far = m * Vec4::new(1.0, 1.0, 0.0, 1.0);
    assert_eq!((far.x, far.y), (0.75, 1.0));
}

#[test]
fn pass_without_a_new_frame_reuses_the_last_transform() {
    let mut ctx = mock_ctx();
    let mut stage = small_stage(RenderSignal::new());
    stage.initialize(&mut ctx).expect("initialize");

    let m = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
    let mut f = frame(7);
    f.transform = m;
    stage.producer().expect("producer").emit_frame(f);
    stage.render(&mut ctx).expect("render with frame");

    ctx.clear_journal();
    stage.render(&mut ctx).expect("render without frame");
    let draw = ctx.draws().last().expect("one draw");
    assert_eq!(
        draw.uniforms.get(U_TRANSFORM),
        Some(&UniformValue::Mat4(m))
    );
}

//! Whole-chain contracts: production at the source ripples forward to the
//! presentation target within one signalled pass, with per-stage sizes kept
//! independent.

use std::cell::RefCell;
use std::rc::Rc;

use cascade_core::mock::{MockContext, MockProducer, UniformValue};
use cascade_core::{RenderSize, SourceDescriptor, SourceFrame};
use cascade_stages::{MediaSourceStage, PipelineDriver, ScreenStage, ShaderFilterStage, Stage};

const GAIN_FRAG: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 o_color;
uniform sampler2D uTex0;
uniform float uGain;
void main() {
    vec4 c = texture(uTex0, v_uv);
    c.rgb *= uGain;
    o_color = c;
}
"#;

fn sd_video() -> SourceDescriptor {
    // 640x360 defaults, spelled out where the numbers matter.
    let mut d = SourceDescriptor::for_location("mock:clip");
    d.width = 640;
    d.height = 360;
    d
}

fn sd_frame(fill: u8) -> SourceFrame {
    SourceFrame::rgba(640, 360, vec![fill; 640 * 360 * 4])
}

#[test]
fn source_to_screen_sizes_stay_independent() {
    let ctx = MockContext::new(RenderSize::new(1280, 720));
    let mut driver = PipelineDriver::new(ctx);

    let screen = Rc::new(RefCell::new(ScreenStage::new()));
    let source = Rc::new(RefCell::new(MediaSourceStage::<MockProducer>::new(
        sd_video(),
        driver.signal(),
    )));
    source.borrow_mut().set_downstream(screen.clone());
    source.borrow_mut().start();
    driver.add_root(source.clone());

    driver.on_context_created();
    assert_eq!(
        source.borrow().producer().expect("producer").starts(),
        1,
        "deferred start consumed on initialize"
    );

    // One emitted frame raises the signal; the pump runs one pass and the
    // frame ripples source -> screen synchronously.
    source
        .borrow()
        .producer()
        .expect("producer")
        .emit_frame(sd_frame(7));
    assert!(driver.pump().expect("signalled pump"));

    {
        let screen = screen.borrow();
        assert_eq!(screen.input_size(), Some(RenderSize::new(640, 360)));
        assert_eq!(screen.render_size(), RenderSize::new(1280, 720));
    }

    let draws = driver.context().draws();
    assert_eq!(draws.len(), 2, "source pass + screen pass");
    let present = draws.last().expect("present draw");
    assert_eq!(present.target, None, "screen draws to the default framebuffer");
    assert_eq!(present.viewport, RenderSize::new(1280, 720));

    // Nothing further is pending: the pass fully consumed the notification.
    assert!(!driver.pump().expect("idle pump"));
}

#[test]
fn filter_chain_ripples_and_adopts_upstream_size() {
    let ctx = MockContext::new(RenderSize::new(1280, 720));
    let mut driver = PipelineDriver::new(ctx);

    let screen = Rc::new(RefCell::new(ScreenStage::new()));
    let filter = {
        let mut f = ShaderFilterStage::new(GAIN_FRAG);
        f.set_param("uGain", 0.5);
        f.set_downstream(screen.clone());
        Rc::new(RefCell::new(f))
    };
    let source = Rc::new(RefCell::new(MediaSourceStage::<MockProducer>::new(
        sd_video(),
        driver.signal(),
    )));
    source.borrow_mut().set_downstream(filter.clone());
    source.borrow_mut().start();
    driver.add_root(source.clone());

    driver.on_context_created();
    source
        .borrow()
        .producer()
        .expect("producer")
        .emit_frame(sd_frame(3));
    assert!(driver.pump().expect("signalled pump"));

    // The filter output (not the source output) is what the screen adopted.
    let filter_out = filter.borrow().output().expect("filter output");
    assert_eq!(
        screen.borrow().input_texture().map(|t| t.id),
        Some(filter_out.id)
    );
    // With no explicit size, the filter adopted the upstream's 640x360.
    assert_eq!(filter.borrow().render_size(), RenderSize::new(640, 360));

    let draws = driver.context().draws();
    assert_eq!(draws.len(), 3, "source + filter + screen passes");
    let filter_draw = &draws[1];
    assert_eq!(filter_draw.viewport, RenderSize::new(640, 360));
    assert_eq!(
        filter_draw.uniforms.get("uGain"),
        Some(&UniformValue::F32(0.5))
    );
}

#[test]
fn context_recreation_reinitializes_the_whole_chain() {
    let ctx = MockContext::new(RenderSize::new(1280, 720));
    let mut driver = PipelineDriver::new(ctx);

    let screen = Rc::new(RefCell::new(ScreenStage::new()));
    let source = Rc::new(RefCell::new(MediaSourceStage::<MockProducer>::new(
        sd_video(),
        driver.signal(),
    )));
    source.borrow_mut().set_downstream(screen.clone());
    driver.add_root(source.clone());

    driver.on_context_created();
    let first_out = source.borrow().output().expect("first output");

    // Context loss and recreation: every id is reissued, nothing is reused.
    driver.on_context_lost();
    assert_eq!(driver.context().alive_texture_count(), 0);
    assert_eq!(driver.context().alive_program_count(), 0);

    driver.on_context_created();
    let second_out = source.borrow().output().expect("second output");
    assert_ne!(first_out.id, second_out.id);

    // The recreated chain still renders end to end.
    source
        .borrow()
        .producer()
        .expect("producer")
        .emit_frame(sd_frame(1));
    assert!(driver.pump().expect("pump after recreation"));
    assert_eq!(screen.borrow().input_size(), Some(RenderSize::new(640, 360)));
}

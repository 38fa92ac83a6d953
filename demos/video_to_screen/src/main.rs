//! Minimal host: video file -> source stage -> screen stage.
//!
//! The decoder pushes frame-available signals from its worker thread; the
//! event loop pumps the driver, which runs a pass only when work is pending.

use std::cell::RefCell;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::rc::Rc;

use glutin::config::ConfigTemplateBuilder;
use glutin::context::{
    ContextAttributesBuilder, NotCurrentGlContextSurfaceAccessor, PossiblyCurrentContext,
};
use glutin::display::GetGlDisplay;
use glutin::prelude::{GlConfig, GlDisplay, GlSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::ControlFlow;

use cascade_core::{RenderSize, SourceDescriptor};
use cascade_glow::GlowContext;
use cascade_input_video::FfmpegVideoProducer;
use cascade_stages::{MediaSourceStage, PipelineDriver, ScreenStage};

const WIN_W: u32 = 960;
const WIN_H: u32 = 540;

fn make_gl(
    event_loop: &winit::event_loop::EventLoop<()>,
) -> (
    winit::window::Window,
    glutin::surface::Surface<glutin::surface::WindowSurface>,
    PossiblyCurrentContext,
    glow::Context,
) {
    let template =
        ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(0).with_stencil_size(0);

    let display_builder = DisplayBuilder::new().with_window_builder(Some(
        winit::window::WindowBuilder::new()
            .with_title("cascade: video_to_screen")
            .with_inner_size(PhysicalSize::new(WIN_W, WIN_H)),
    ));

    let (window, gl_config) = display_builder
        .build(event_loop, template, |configs| {
            configs
                .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                .unwrap()
        })
        .unwrap();

    let window = window.unwrap();
    let raw_window_handle = window.raw_window_handle();

    let gl_display = gl_config.display();

    let context_attributes = ContextAttributesBuilder::new().build(Some(raw_window_handle));
    let not_current_gl_context =
        unsafe { gl_display.create_context(&gl_config, &context_attributes).unwrap() };

    let size = window.inner_size();
    let attrs = glutin::surface::SurfaceAttributesBuilder::<glutin::surface::WindowSurface>::new()
        .build(
            raw_window_handle,
            NonZeroU32::new(size.width.max(1)).unwrap(),
            NonZeroU32::new(size.height.max(1)).unwrap(),
        );

    let gl_surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs).unwrap() };
    let gl_context = not_current_gl_context.make_current(&gl_surface).unwrap();

    let gl = unsafe {
        glow::Context::from_loader_function(|s| {
            gl_display.get_proc_address(std::ffi::CStr::from_bytes_with_nul_unchecked(
                format!("{s}\0").as_bytes(),
            )) as *const _
        })
    };

    (window, gl_surface, gl_context, gl)
}

fn print_usage_and_exit() -> ! {
    eprintln!(
        "Usage:
  cascade-demo-video-to-screen --config path/to/source.json
  cascade-demo-video-to-screen --file path/to/video.mp4 [--w 640 --h 360 --fps 30] [--loop 0|1] [--ffmpeg /path/to/ffmpeg]

Config JSON format:
{{
  \"location\": \"path/to/video.mp4\",
  \"width\": 640,
  \"height\": 360,
  \"fps\": 30,
  \"loop\": true,
  \"ffmpeg_path\": \"optional/explicit/ffmpeg\"
}}

Notes:
- ffmpeg resolution priority: --ffmpeg > descriptor.ffmpeg_path > $CASCADE_FFMPEG > PATH
"
    );
    std::process::exit(2);
}

fn parse_args() -> SourceDescriptor {
    let mut args = std::env::args().skip(1);

    let mut config_path: Option<PathBuf> = None;
    let mut file: Option<String> = None;
    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    let mut fps: Option<u32> = None;
    let mut loop_flag: Option<bool> = None;
    let mut ffmpeg_path: Option<String> = None;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            "--file" => file = args.next(),
            "--w" => width = args.next().and_then(|s| s.parse().ok()),
            "--h" => height = args.next().and_then(|s| s.parse().ok()),
            "--fps" => fps = args.next().and_then(|s| s.parse().ok()),
            "--loop" => {
                loop_flag = args.next().map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            }
            "--ffmpeg" => ffmpeg_path = args.next(),
            "--help" | "-h" => print_usage_and_exit(),
            _ => {
                eprintln!("Unknown arg: {a}");
                print_usage_and_exit();
            }
        }
    }

    let mut descriptor = if let Some(p) = config_path {
        SourceDescriptor::from_json_path(&p).unwrap_or_else(|e| {
            eprintln!("Failed to load config {p:?}: {e}");
            std::process::exit(2);
        })
    } else {
        let Some(f) = file else {
            print_usage_and_exit();
        };
        SourceDescriptor::for_location(f)
    };

    // CLI overrides
    if let Some(w) = width {
        descriptor.width = w;
    }
    if let Some(h) = height {
        descriptor.height = h;
    }
    if let Some(x) = fps {
        descriptor.fps = x;
    }
    if let Some(l) = loop_flag {
        descriptor.looping = l;
    }
    if let Some(ff) = ffmpeg_path {
        descriptor.ffmpeg_path = Some(ff);
    }

    if let Err(e) = descriptor.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    descriptor
}

fn main() {
    tracing_subscriber::fmt::init();
    let descriptor = parse_args();

    let event_loop = winit::event_loop::EventLoop::new();
    let (window, gl_surface, gl_context, gl) = make_gl(&event_loop);

    let size = window.inner_size();
    let ctx = GlowContext::new(gl, RenderSize::new(size.width.max(1), size.height.max(1)))
        .expect("create glow context");
    let mut driver = PipelineDriver::new(ctx);

    let screen = Rc::new(RefCell::new(ScreenStage::new()));
    let source = Rc::new(RefCell::new(MediaSourceStage::<FfmpegVideoProducer>::new(
        descriptor,
        driver.signal(),
    )));
    source.borrow_mut().set_downstream(screen);
    // Requested before the producer exists; honored once initialize completes.
    source.borrow_mut().start();
    driver.add_root(source);

    driver.on_context_created();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                WindowEvent::Resized(size) => {
                    gl_surface.resize(
                        &gl_context,
                        NonZeroU32::new(size.width.max(1)).unwrap(),
                        NonZeroU32::new(size.height.max(1)).unwrap(),
                    );
                    driver
                        .context_mut()
                        .set_surface_size(RenderSize::new(size.width.max(1), size.height.max(1)));
                }
                _ => {}
            },
            Event::MainEventsCleared => window.request_redraw(),
            Event::RedrawRequested(_) => match driver.pump() {
                Ok(true) => {
                    gl_surface.swap_buffers(&gl_context).unwrap();
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "render pass failed");
                    *control_flow = ControlFlow::Exit;
                }
            },
            _ => {}
        }
    });
}

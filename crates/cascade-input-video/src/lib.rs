#![forbid(unsafe_code)]

//! ffmpeg-backed [`MediaProducer`].
//!
//! Spawns an ffmpeg child decoding the descriptor's location to raw RGBA and
//! reads exact-size frames on a worker thread. The newest frame sits in a
//! single-slot latch; every store fires the frame-available callback on the
//! worker thread. Start/stop gate the reader, and dropping the producer
//! shuts the worker down and reaps the child.

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cascade_core::glam::{Mat4, Vec3};
use cascade_core::{
    FrameCallback, MediaProducer, PipelineError, RenderSize, SourceDescriptor, SourceFrame,
};
use tracing::warn;

/// Env var overriding the ffmpeg binary, below an explicit descriptor path.
pub const FFMPEG_ENV: &str = "CASCADE_FFMPEG";

pub struct FfmpegVideoProducer {
    descriptor: SourceDescriptor,
    latest: Arc<Mutex<Option<SourceFrame>>>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    playing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MediaProducer for FfmpegVideoProducer {
    fn open(descriptor: &SourceDescriptor) -> Result<Self, PipelineError> {
        descriptor.validate()?;

        let ffmpeg = resolve_ffmpeg_path(descriptor.ffmpeg_path.as_deref());
        let child = spawn_ffmpeg(&ffmpeg, descriptor).map_err(|e| {
            PipelineError::ProducerOpen(format!("failed to spawn ffmpeg at {ffmpeg:?}: {e}"))
        })?;

        let latest = Arc::new(Mutex::new(None));
        let callback: Arc<Mutex<Option<FrameCallback>>> = Arc::new(Mutex::new(None));
        let playing = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = thread::spawn({
            let descriptor = descriptor.clone();
            let latest = Arc::clone(&latest);
            let callback = Arc::clone(&callback);
            let playing = Arc::clone(&playing);
            let shutdown = Arc::clone(&shutdown);
            move || decode_loop(child, descriptor, latest, callback, playing, shutdown)
        });

        Ok(Self {
            descriptor: descriptor.clone(),
            latest,
            callback,
            playing,
            shutdown,
            worker: Some(worker),
        })
    }

    fn native_size(&self) -> RenderSize {
        // The child scales to the descriptor's output size, so that is the
        // native size of everything this producer emits.
        RenderSize::new(self.descriptor.width, self.descriptor.height)
    }

    fn set_frame_callback(&mut self, callback: FrameCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn start(&mut self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn take_latest_frame(&mut self) -> Option<SourceFrame> {
        self.latest.lock().unwrap().take()
    }
}

impl Drop for FfmpegVideoProducer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for FfmpegVideoProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegVideoProducer")
            .field("location", &self.descriptor.location)
            .field("playing", &self.playing.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// ---------------- internal ----------------

fn decode_loop(
    mut child: Child,
    descriptor: SourceDescriptor,
    latest: Arc<Mutex<Option<SourceFrame>>>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    playing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    let frame_len = (descriptor.width as usize) * (descriptor.height as usize) * 4;
    let mut buf = vec![0u8; frame_len];
    let transform = flip_v_transform();
    let mut logged_spawn_error = false;

    'respawn: loop {
        let mut stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                warn!("ffmpeg child has no piped stdout, stopping decode worker");
                return;
            }
        };

        loop {
            if shutdown.load(Ordering::SeqCst) {
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
            if !playing.load(Ordering::SeqCst) {
                // Paused: stop draining the pipe; backpressure holds the
                // child at (roughly) the current position.
                thread::sleep(Duration::from_millis(15));
                continue;
            }

            match stdout.read_exact(&mut buf) {
                Ok(()) => {
                    let frame = SourceFrame {
                        width: descriptor.width,
                        height: descriptor.height,
                        bytes: buf.clone(),
                        transform,
                    };
                    *latest.lock().unwrap() = Some(frame);
                    let cb = callback.lock().unwrap().clone();
                    if let Some(cb) = cb {
                        cb();
                    }
                }
                Err(_) => {
                    // EOF or stream ended.
                    let _ = child.kill();
                    let _ = child.wait();
                    if !descriptor.looping {
                        // Leave the last frame in the latch and exit.
                        return;
                    }
                    break;
                }
            }
        }

        // Looped playback: respawn the child.
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let ffmpeg = resolve_ffmpeg_path(descriptor.ffmpeg_path.as_deref());
            match spawn_ffmpeg(&ffmpeg, &descriptor) {
                Ok(c) => {
                    logged_spawn_error = false;
                    child = c;
                    continue 'respawn;
                }
                Err(e) => {
                    if !logged_spawn_error {
                        warn!(path = ?ffmpeg, error = %e, "failed to respawn ffmpeg");
                        logged_spawn_error = true;
                    }
                    thread::sleep(Duration::from_millis(500));
                }
            }
        }
    }
}

/// Decoded rows arrive top-down while GL texture coordinates are bottom-up,
/// so frames carry a vertical flip: (u, v) -> (u, 1 - v).
fn flip_v_transform() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)) * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
}

/// ffmpeg args:
/// - `-re` (throttle to real time using input timestamps)
/// - `-stream_loop -1` (optional, for looping)
/// - `-vf scale=WxH` (trust source fps; orientation handled by the frame
///   transform, not a flip filter)
/// - `-pix_fmt rgba -f rawvideo pipe:1`
fn spawn_ffmpeg(ffmpeg: &Path, descriptor: &SourceDescriptor) -> std::io::Result<Child> {
    let mut cmd = Command::new(ffmpeg);

    cmd.arg("-hide_banner").arg("-loglevel").arg("error");
    cmd.arg("-re");

    if descriptor.looping {
        cmd.arg("-stream_loop").arg("-1");
    }

    cmd.arg("-i")
        .arg(&descriptor.location)
        .arg("-vf")
        .arg(format!("scale={}:{}", descriptor.width, descriptor.height))
        .arg("-pix_fmt")
        .arg("rgba")
        .arg("-f")
        .arg("rawvideo")
        .arg("pipe:1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    cmd.spawn()
}

fn resolve_ffmpeg_path(explicit: Option<&str>) -> PathBuf {
    // Priority: explicit descriptor path, then env override, then PATH.
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }
    if let Some(p) = std::env::var_os(FFMPEG_ENV) {
        return PathBuf::from(p);
    }
    PathBuf::from(ffmpeg_filename())
}

fn ffmpeg_filename() -> &'static OsStr {
    #[cfg(windows)]
    {
        OsStr::new("ffmpeg.exe")
    }
    #[cfg(not(windows))]
    {
        OsStr::new("ffmpeg")
    }
}

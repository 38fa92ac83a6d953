//! Deterministic in-memory doubles for the rendering and producer boundaries.
//!
//! [`MockContext`] journals every upload, uniform and draw so the stage
//! protocol can be verified without a GPU; [`MockProducer`] is a hand-cranked
//! frame source. Both are also useful as defaults during integration
//! bring-up.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use glam::Mat4;

use crate::context::{
    ExternalSamplerSupport, FramebufferId, ProgramId, RenderContext, RenderTarget, UniformLocation,
};
use crate::error::PipelineError;
use crate::shader;
use crate::source::{FrameCallback, MediaProducer, SourceDescriptor, SourceFrame};
use crate::texture::{RenderSize, TextureId, TextureKind};

/// A uniform value as observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    I32(i32),
    F32(f32),
    Vec2([f32; 2]),
    Mat4(Mat4),
}

/// One texture upload observed by the mock.
#[derive(Debug, Clone)]
pub struct TextureUpload {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// One draw call observed by the mock, with the state bound at issue time.
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub program: ProgramId,
    /// `None` means the default (presentation) framebuffer.
    pub target: Option<FramebufferId>,
    pub viewport: RenderSize,
    pub textures: Vec<(u32, TextureId)>,
    /// Uniform values of the drawing program, keyed by name.
    pub uniforms: HashMap<String, UniformValue>,
}

#[derive(Debug, Clone)]
struct MockTexture {
    kind: TextureKind,
    width: u32,
    height: u32,
}

/// In-memory [`RenderContext`] with a full journal.
#[derive(Debug)]
pub struct MockContext {
    next_id: u64,
    surface_size: RenderSize,
    external_support: ExternalSamplerSupport,

    textures: HashMap<TextureId, MockTexture>,
    framebuffers: HashSet<FramebufferId>,
    programs: HashMap<ProgramId, (String, String)>,

    locations: HashMap<(ProgramId, String), UniformLocation>,
    location_names: HashMap<UniformLocation, (ProgramId, String)>,
    uniform_values: HashMap<UniformLocation, UniformValue>,

    current_program: Option<ProgramId>,
    current_target: Option<FramebufferId>,
    current_viewport: RenderSize,
    bound_textures: BTreeMap<u32, TextureId>,

    uploads: Vec<TextureUpload>,
    draws: Vec<DrawCall>,

    fail_allocations: usize,
}

impl MockContext {
    pub fn new(surface_size: RenderSize) -> Self {
        Self {
            next_id: 1,
            surface_size,
            external_support: ExternalSamplerSupport::OesEglImage,
            textures: HashMap::new(),
            framebuffers: HashSet::new(),
            programs: HashMap::new(),
            locations: HashMap::new(),
            location_names: HashMap::new(),
            uniform_values: HashMap::new(),
            current_program: None,
            current_target: None,
            current_viewport: RenderSize::ZERO,
            bound_textures: BTreeMap::new(),
            uploads: Vec::new(),
            draws: Vec::new(),
            fail_allocations: 0,
        }
    }

    pub fn set_surface_size(&mut self, size: RenderSize) {
        self.surface_size = size;
    }

    pub fn set_external_sampler_support(&mut self, support: ExternalSamplerSupport) {
        self.external_support = support;
    }

    /// Make the next `n` resource allocations (textures, targets, programs)
    /// fail with an allocation error.
    pub fn fail_next_allocations(&mut self, n: usize) {
        self.fail_allocations = n;
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn uploads(&self) -> &[TextureUpload] {
        &self.uploads
    }

    pub fn clear_journal(&mut self) {
        self.uploads.clear();
        self.draws.clear();
    }

    pub fn texture_is_alive(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    pub fn alive_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn alive_program_count(&self) -> usize {
        self.programs.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_allocation(&mut self, what: &str) -> Result<(), PipelineError> {
        if self.fail_allocations > 0 {
            self.fail_allocations -= 1;
            return Err(PipelineError::allocation(format!(
                "mock: {what} allocation rejected"
            )));
        }
        Ok(())
    }
}

impl RenderContext for MockContext {
    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
    ) -> Result<TextureId, PipelineError> {
        self.check_allocation("texture")?;
        let id = TextureId(self.next_id());
        self.textures.insert(
            id,
            MockTexture {
                kind,
                width,
                height,
            },
        );
        Ok(id)
    }

    fn upload_texture(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), PipelineError> {
        let tex = self
            .textures
            .get_mut(&id)
            .ok_or(PipelineError::StaleTexture(id))?;
        tex.width = width;
        tex.height = height;
        self.uploads.push(TextureUpload {
            texture: id,
            width,
            height,
            bytes: rgba.to_vec(),
        });
        Ok(())
    }

    fn delete_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn bind_texture(
        &mut self,
        unit: u32,
        kind: TextureKind,
        id: TextureId,
    ) -> Result<(), PipelineError> {
        let tex = self.textures.get(&id).ok_or(PipelineError::StaleTexture(id))?;
        debug_assert_eq!(tex.kind, kind, "texture bound with mismatched kind");
        self.bound_textures.insert(unit, id);
        Ok(())
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTarget, PipelineError> {
        self.check_allocation("render target")?;
        let texture = self.create_texture(TextureKind::Rendered, width, height)?;
        let framebuffer = FramebufferId(self.next_id());
        self.framebuffers.insert(framebuffer);
        Ok(RenderTarget {
            framebuffer,
            texture,
            width,
            height,
        })
    }

    fn delete_render_target(&mut self, target: RenderTarget) {
        self.framebuffers.remove(&target.framebuffer);
        self.textures.remove(&target.texture);
    }

    fn bind_render_target(&mut self, target: Option<&RenderTarget>) -> Result<(), PipelineError> {
        match target {
            Some(t) => {
                if !self.framebuffers.contains(&t.framebuffer) {
                    return Err(PipelineError::allocation(format!(
                        "mock: framebuffer {:?} is not alive",
                        t.framebuffer
                    )));
                }
                self.current_target = Some(t.framebuffer);
            }
            None => self.current_target = None,
        }
        Ok(())
    }

    fn set_viewport(&mut self, size: RenderSize) {
        self.current_viewport = size;
    }

    fn compile_program(
        &mut self,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, PipelineError> {
        self.check_allocation("program")?;
        let id = ProgramId(self.next_id());
        self.programs
            .insert(id, (vertex_src.to_string(), fragment_src.to_string()));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), PipelineError> {
        if !self.programs.contains_key(&program) {
            return Err(PipelineError::allocation(format!(
                "mock: program {program:?} is not alive"
            )));
        }
        self.current_program = Some(program);
        Ok(())
    }

    fn attribute_location(&mut self, program: ProgramId, name: &str) -> Option<u32> {
        let (vert, _) = self.programs.get(&program)?;
        if !vert.contains(name) {
            return None;
        }
        // The fullscreen draw uses fixed attribute layout, like the backends.
        match name {
            n if n == shader::A_POSITION => Some(0),
            n if n == shader::A_TEXCOORD => Some(1),
            _ => None,
        }
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        {
            let (vert, frag) = self.programs.get(&program)?;
            // Active-uniform behavior: only names that appear in the source.
            if !vert.contains(name) && !frag.contains(name) {
                return None;
            }
        }
        let key = (program, name.to_string());
        if let Some(loc) = self.locations.get(&key) {
            return Some(*loc);
        }
        let loc = UniformLocation(self.next_id() as u32);
        self.locations.insert(key.clone(), loc);
        self.location_names.insert(loc, key);
        Some(loc)
    }

    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32) {
        self.uniform_values.insert(location, UniformValue::I32(value));
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        self.uniform_values.insert(location, UniformValue::F32(value));
    }

    fn set_uniform_vec2(&mut self, location: UniformLocation, x: f32, y: f32) {
        self.uniform_values
            .insert(location, UniformValue::Vec2([x, y]));
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.uniform_values
            .insert(location, UniformValue::Mat4(*value));
    }

    fn draw_quad(&mut self) {
        let Some(program) = self.current_program else {
            debug_assert!(false, "draw_quad with no program bound");
            return;
        };
        let mut uniforms = HashMap::new();
        for (loc, value) in &self.uniform_values {
            if let Some((prog, name)) = self.location_names.get(loc) {
                if *prog == program {
                    uniforms.insert(name.clone(), value.clone());
                }
            }
        }
        self.draws.push(DrawCall {
            program,
            target: self.current_target,
            viewport: self.current_viewport,
            textures: self.bound_textures.iter().map(|(u, t)| (*u, *t)).collect(),
            uniforms,
        });
    }

    fn default_target_size(&self) -> RenderSize {
        self.surface_size
    }

    fn external_sampler_support(&self) -> ExternalSamplerSupport {
        self.external_support
    }
}

/// Hand-cranked [`MediaProducer`].
///
/// Opens successfully for any valid descriptor whose location does not start
/// with `fail:`; native size comes from the descriptor. Tests drive it with
/// [`emit_frame`](MockProducer::emit_frame) or a cross-thread
/// [`MockFrameEmitter`].
pub struct MockProducer {
    native_size: RenderSize,
    latest: Arc<Mutex<Option<SourceFrame>>>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    playing: bool,
    starts: u32,
    stops: u32,
}

impl MockProducer {
    /// Push a frame into the latch and fire the frame-available callback,
    /// exactly like a real producer thread would.
    pub fn emit_frame(&self, frame: SourceFrame) {
        *self.latest.lock().unwrap() = Some(frame);
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// A handle that can emit frames from another thread.
    pub fn emitter(&self) -> MockFrameEmitter {
        MockFrameEmitter {
            latest: Arc::clone(&self.latest),
            callback: Arc::clone(&self.callback),
        }
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn stops(&self) -> u32 {
        self.stops
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl MediaProducer for MockProducer {
    fn open(descriptor: &SourceDescriptor) -> Result<Self, PipelineError> {
        descriptor.validate()?;
        if descriptor.location.starts_with("fail:") {
            return Err(PipelineError::ProducerOpen(format!(
                "mock: refusing to open {}",
                descriptor.location
            )));
        }
        Ok(Self {
            native_size: RenderSize::new(descriptor.width, descriptor.height),
            latest: Arc::new(Mutex::new(None)),
            callback: Arc::new(Mutex::new(None)),
            playing: false,
            starts: 0,
            stops: 0,
        })
    }

    fn native_size(&self) -> RenderSize {
        self.native_size
    }

    fn set_frame_callback(&mut self, callback: FrameCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn start(&mut self) {
        self.playing = true;
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.stops += 1;
    }

    fn take_latest_frame(&mut self) -> Option<SourceFrame> {
        self.latest.lock().unwrap().take()
    }
}

impl fmt::Debug for MockProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProducer")
            .field("native_size", &self.native_size)
            .field("playing", &self.playing)
            .field("starts", &self.starts)
            .field("stops", &self.stops)
            .finish()
    }
}

/// Cross-thread frame emitter for [`MockProducer`].
#[derive(Clone)]
pub struct MockFrameEmitter {
    latest: Arc<Mutex<Option<SourceFrame>>>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
}

impl MockFrameEmitter {
    pub fn emit(&self, frame: SourceFrame) {
        *self.latest.lock().unwrap() = Some(frame);
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl fmt::Debug for MockFrameEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFrameEmitter").finish_non_exhaustive()
    }
}

//! cascade rendering backend (glow/OpenGL).
//
// This crate contains **only** the `RenderContext` realization over a live GL
// context: texture/FBO/program lifecycle, uniform plumbing and the fullscreen
// draw. It does NOT contain windowing, decode policy, or stage logic.
#![allow(clippy::missing_safety_doc)]

use std::collections::HashMap;

use glow::HasContext;

use cascade_core::glam::Mat4;
use cascade_core::{
    ExternalSamplerSupport, FramebufferId, ProgramId, RenderContext, RenderSize, RenderTarget,
    TextureId, TextureKind, UniformLocation,
};

pub use cascade_core::PipelineError;

#[derive(Debug, Clone, Copy)]
struct TextureEntry {
    native: glow::NativeTexture,
    kind: TextureKind,
    width: u32,
    height: u32,
}

/// `RenderContext` over a glow GL context.
///
/// The host owns the GL context/surface lifecycle; this type owns the id
/// indirection tables, which double as the alive-sets used to reject stale
/// handles. Externally written textures are plain `TEXTURE_2D` on desktop GL,
/// so `external_sampler_support` reports `Native` and composed shaders stay
/// extension-free.
pub struct GlowContext {
    gl: glow::Context,
    quad: FullscreenTriangle,
    surface_size: RenderSize,
    next_id: u64,
    textures: HashMap<TextureId, TextureEntry>,
    framebuffers: HashMap<FramebufferId, glow::NativeFramebuffer>,
    programs: HashMap<ProgramId, glow::NativeProgram>,
    uniform_slots: Vec<glow::NativeUniformLocation>,
}

impl GlowContext {
    pub fn new(gl: glow::Context, surface_size: RenderSize) -> Result<Self, PipelineError> {
        let quad = unsafe { FullscreenTriangle::new(&gl)? };
        Ok(Self {
            gl,
            quad,
            surface_size,
            next_id: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            uniform_slots: Vec::new(),
        })
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    /// Hosts call this on window resize so presentation passes track the
    /// surface.
    pub fn set_surface_size(&mut self, size: RenderSize) {
        self.surface_size = size;
    }

    /// Explicitly delete every GL object still tracked by this context.
    pub fn destroy(&mut self) {
        unsafe {
            for (_, entry) in self.textures.drain() {
                self.gl.delete_texture(entry.native);
            }
            for (_, fbo) in self.framebuffers.drain() {
                self.gl.delete_framebuffer(fbo);
            }
            for (_, program) in self.programs.drain() {
                self.gl.delete_program(program);
            }
            self.quad.destroy(&self.gl);
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn native_texture(&self, id: TextureId) -> Result<glow::NativeTexture, PipelineError> {
        self.textures
            .get(&id)
            .map(|entry| entry.native)
            .ok_or(PipelineError::StaleTexture(id))
    }
}

impl RenderContext for GlowContext {
    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
    ) -> Result<TextureId, PipelineError> {
        let native = unsafe { create_gl_texture(&self.gl, width as i32, height as i32)? };
        let id = TextureId(self.next_id());
        self.textures.insert(
            id,
            TextureEntry {
                native,
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
        let entry = self
            .textures
            .get_mut(&id)
            .ok_or(PipelineError::StaleTexture(id))?;
        debug_assert_eq!(rgba.len(), (width * height * 4) as usize);

        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(entry.native));
            if entry.width == width && entry.height == height {
                self.gl.tex_sub_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(rgba),
                );
            } else {
                // Size changed (rare): reallocate storage in place.
                self.gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    glow::RGBA8 as i32,
                    width as i32,
                    height as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    Some(rgba),
                );
                entry.width = width;
                entry.height = height;
            }
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    fn delete_texture(&mut self, id: TextureId) {
        if let Some(entry) = self.textures.remove(&id) {
            unsafe { self.gl.delete_texture(entry.native) };
        }
    }

    fn bind_texture(
        &mut self,
        unit: u32,
        _kind: TextureKind,
        id: TextureId,
    ) -> Result<(), PipelineError> {
        let native = self.native_texture(id)?;
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(native));
        }
        Ok(())
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTarget, PipelineError> {
        let ww = (width.max(1)) as i32;
        let hh = (height.max(1)) as i32;

        let tex = unsafe { create_gl_texture(&self.gl, ww, hh)? };
        let fbo = unsafe {
            let fbo = self
                .gl
                .create_framebuffer()
                .map_err(|e| PipelineError::allocation(format!("create_framebuffer failed: {e:?}")))?;

            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(tex),
                0,
            );

            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            if status != glow::FRAMEBUFFER_COMPLETE {
                self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                self.gl.delete_framebuffer(fbo);
                self.gl.delete_texture(tex);
                return Err(PipelineError::allocation(format!(
                    "framebuffer incomplete: 0x{status:x}"
                )));
            }

            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            fbo
        };

        let texture = TextureId(self.next_id());
        self.textures.insert(
            texture,
            TextureEntry {
                native: tex,
                kind: TextureKind::Rendered,
                width: ww as u32,
                height: hh as u32,
            },
        );
        let framebuffer = FramebufferId(self.next_id());
        self.framebuffers.insert(framebuffer, fbo);

        Ok(RenderTarget {
            framebuffer,
            texture,
            width: ww as u32,
            height: hh as u32,
        })
    }

    fn delete_render_target(&mut self, target: RenderTarget) {
        if let Some(fbo) = self.framebuffers.remove(&target.framebuffer) {
            unsafe { self.gl.delete_framebuffer(fbo) };
        }
        self.delete_texture(target.texture);
    }

    fn bind_render_target(&mut self, target: Option<&RenderTarget>) -> Result<(), PipelineError> {
        match target {
            Some(t) => {
                let fbo = self.framebuffers.get(&t.framebuffer).ok_or_else(|| {
                    PipelineError::allocation(format!(
                        "framebuffer {:?} is not alive on this context",
                        t.framebuffer
                    ))
                })?;
                unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(*fbo)) };
            }
            None => unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) },
        }
        Ok(())
    }

    fn set_viewport(&mut self, size: RenderSize) {
        unsafe {
            self.gl
                .viewport(0, 0, size.width as i32, size.height as i32)
        };
    }

    fn compile_program(
        &mut self,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, PipelineError> {
        let native = unsafe { compile_gl_program(&self.gl, vertex_src, fragment_src)? };
        let id = ProgramId(self.next_id());
        self.programs.insert(id, native);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(native) = self.programs.remove(&program) {
            unsafe { self.gl.delete_program(native) };
        }
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), PipelineError> {
        let native = self.programs.get(&program).ok_or_else(|| {
            PipelineError::allocation(format!("program {program:?} is not alive on this context"))
        })?;
        unsafe { self.gl.use_program(Some(*native)) };
        Ok(())
    }

    fn attribute_location(&mut self, program: ProgramId, name: &str) -> Option<u32> {
        let native = self.programs.get(&program)?;
        unsafe { self.gl.get_attrib_location(*native, name) }
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let native = *self.programs.get(&program)?;
        let location = unsafe { self.gl.get_uniform_location(native, name)? };
        self.uniform_slots.push(location);
        Some(UniformLocation((self.uniform_slots.len() - 1) as u32))
    }

    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32) {
        if let Some(native) = self.uniform_slots.get(location.0 as usize) {
            unsafe { self.gl.uniform_1_i32(Some(native), value) };
        }
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        if let Some(native) = self.uniform_slots.get(location.0 as usize) {
            unsafe { self.gl.uniform_1_f32(Some(native), value) };
        }
    }

    fn set_uniform_vec2(&mut self, location: UniformLocation, x: f32, y: f32) {
        if let Some(native) = self.uniform_slots.get(location.0 as usize) {
            unsafe { self.gl.uniform_2_f32(Some(native), x, y) };
        }
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        if let Some(native) = self.uniform_slots.get(location.0 as usize) {
            unsafe {
                self.gl
                    .uniform_matrix_4_f32_slice(Some(native), false, &value.to_cols_array())
            };
        }
    }

    fn draw_quad(&mut self) {
        unsafe { self.quad.draw(&self.gl) };
    }

    fn default_target_size(&self) -> RenderSize {
        self.surface_size
    }

    fn external_sampler_support(&self) -> ExternalSamplerSupport {
        ExternalSamplerSupport::Native
    }
}

unsafe fn create_gl_texture(
    gl: &glow::Context,
    w: i32,
    h: i32,
) -> Result<glow::NativeTexture, PipelineError> {
    let tex = gl
        .create_texture()
        .map_err(|e| PipelineError::allocation(format!("create_texture failed: {e:?}")))?;
    gl.bind_texture(glow::TEXTURE_2D, Some(tex));
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_MIN_FILTER,
        glow::LINEAR as i32,
    );
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_MAG_FILTER,
        glow::LINEAR as i32,
    );
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_WRAP_S,
        glow::CLAMP_TO_EDGE as i32,
    );
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_WRAP_T,
        glow::CLAMP_TO_EDGE as i32,
    );
    gl.tex_image_2d(
        glow::TEXTURE_2D,
        0,
        glow::RGBA8 as i32,
        w.max(1),
        h.max(1),
        0,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        None,
    );
    gl.bind_texture(glow::TEXTURE_2D, None);
    Ok(tex)
}

unsafe fn compile_gl_program(
    gl: &glow::Context,
    vert_src: &str,
    frag_src: &str,
) -> Result<glow::NativeProgram, PipelineError> {
    let vs = gl
        .create_shader(glow::VERTEX_SHADER)
        .map_err(|e| PipelineError::allocation(format!("create_shader(VS) failed: {e:?}")))?;
    gl.shader_source(vs, vert_src);
    gl.compile_shader(vs);
    if !gl.get_shader_compile_status(vs) {
        let log = gl.get_shader_info_log(vs);
        gl.delete_shader(vs);
        return Err(PipelineError::VertexCompile(log));
    }

    let fs = gl
        .create_shader(glow::FRAGMENT_SHADER)
        .map_err(|e| PipelineError::allocation(format!("create_shader(FS) failed: {e:?}")))?;
    gl.shader_source(fs, frag_src);
    gl.compile_shader(fs);
    if !gl.get_shader_compile_status(fs) {
        let log = gl.get_shader_info_log(fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        return Err(PipelineError::FragmentCompile(log));
    }

    let program = gl
        .create_program()
        .map_err(|e| PipelineError::allocation(format!("create_program failed: {e:?}")))?;
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(PipelineError::Link(log));
    }

    Ok(program)
}

/// Fullscreen draw geometry: a single oversized triangle.
struct FullscreenTriangle {
    vao: glow::NativeVertexArray,
    vbo: glow::NativeBuffer,
}

impl FullscreenTriangle {
    unsafe fn new(gl: &glow::Context) -> Result<Self, PipelineError> {
        let verts: [f32; 12] = [
            -1.0, -1.0, 0.0, 0.0, 3.0, -1.0, 2.0, 0.0, -1.0, 3.0, 0.0, 2.0,
        ];

        let vao = gl
            .create_vertex_array()
            .map_err(|e| PipelineError::allocation(format!("create_vertex_array: {e}")))?;
        let vbo = gl
            .create_buffer()
            .map_err(|e| PipelineError::allocation(format!("create_buffer: {e}")))?;

        gl.bind_vertex_array(Some(vao));
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
        gl.buffer_data_u8_slice(
            glow::ARRAY_BUFFER,
            bytemuck::cast_slice(&verts),
            glow::STATIC_DRAW,
        );

        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 4 * 4, 0);

        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, 4 * 4, 2 * 4);

        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        gl.bind_vertex_array(None);

        Ok(Self { vao, vbo })
    }

    unsafe fn draw(&self, gl: &glow::Context) {
        gl.bind_vertex_array(Some(self.vao));
        gl.draw_arrays(glow::TRIANGLES, 0, 3);
        gl.bind_vertex_array(None);
    }

    unsafe fn destroy(&mut self, gl: &glow::Context) {
        gl.delete_vertex_array(self.vao);
        gl.delete_buffer(self.vbo);
    }
}

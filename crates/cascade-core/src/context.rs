//! The rendering-context boundary.
//!
//! Every resource-touching stage operation takes an explicit `&mut dyn
//! RenderContext` instead of relying on ambient thread-bound state. The trait
//! is sized to what the stage protocol actually consumes; vertex geometry for
//! the fullscreen draw is owned by the backend and reached only through
//! [`RenderContext::draw_quad`].

use glam::Mat4;

use crate::error::PipelineError;
use crate::texture::{RenderSize, TextureHandle, TextureId, TextureKind};

/// Opaque shader program id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Opaque framebuffer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

/// Opaque uniform location within a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Offscreen render target: framebuffer + color texture pair.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub framebuffer: FramebufferId,
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    /// The color texture as an exchangeable handle.
    pub fn handle(&self) -> TextureHandle {
        TextureHandle {
            id: self.texture,
            width: self.width,
            height: self.height,
        }
    }
}

/// What the shading language needs in order to sample an
/// [`External`](TextureKind::External) texture on this context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSamplerSupport {
    /// Plain `sampler2D`; no extension directive (desktop GL).
    Native,
    /// `samplerExternalOES` behind the `GL_OES_EGL_image_external` directive
    /// (GLES with EGLImage-backed producers).
    OesEglImage,
}

/// Explicit handle to the rendering context.
///
/// All calls must happen on the context-affine render thread. Resource ids are
/// invalidated wholesale when the context is destroyed; after recreation every
/// stage re-allocates through a fresh round of `initialize`.
pub trait RenderContext {
    // ---- Textures ----
    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
    ) -> Result<TextureId, PipelineError>;

    /// Upload tightly packed RGBA8 pixels. Reallocates storage when the size
    /// differs from the texture's current size.
    fn upload_texture(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), PipelineError>;

    fn delete_texture(&mut self, id: TextureId);

    /// Bind a texture to a sampler unit. Binding a deleted id is rejected
    /// with [`PipelineError::StaleTexture`].
    fn bind_texture(
        &mut self,
        unit: u32,
        kind: TextureKind,
        id: TextureId,
    ) -> Result<(), PipelineError>;

    // ---- Render targets ----
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTarget, PipelineError>;

    fn delete_render_target(&mut self, target: RenderTarget);

    /// `None` binds the default framebuffer (the presentation target).
    fn bind_render_target(&mut self, target: Option<&RenderTarget>) -> Result<(), PipelineError>;

    fn set_viewport(&mut self, size: RenderSize);

    // ---- Programs ----
    fn compile_program(
        &mut self,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, PipelineError>;

    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: ProgramId) -> Result<(), PipelineError>;

    /// Location of a vertex attribute, `None` if inactive.
    fn attribute_location(&mut self, program: ProgramId, name: &str) -> Option<u32>;

    /// Location of a uniform, `None` if inactive.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    // Uniform setters apply to the program selected with `use_program`.
    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32);
    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32);
    fn set_uniform_vec2(&mut self, location: UniformLocation, x: f32, y: f32);
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);

    // ---- Draw ----
    /// Issue the backend's fullscreen draw into the bound target.
    fn draw_quad(&mut self);

    // ---- Host surface ----
    /// Size of the default presentation target (window surface / viewport).
    fn default_target_size(&self) -> RenderSize;

    /// Shader requirements for sampling `External` textures on this context.
    fn external_sampler_support(&self) -> ExternalSamplerSupport;
}

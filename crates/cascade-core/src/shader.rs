//! Shader source composition.
//!
//! Stages assemble their GLSL from a shared base plus named extension points:
//! extension directives (inserted right after `#version`), the sampler type
//! used for externally written textures, and an optional texture-coordinate
//! transform block in the vertex shader. The transform applies to texture
//! coordinates only; position geometry is never touched.

use crate::context::ExternalSamplerSupport;

// Attribute / varying / uniform names shared between composed shaders and the
// bindings built against them.
pub const A_POSITION: &str = "a_pos";
pub const A_TEXCOORD: &str = "a_uv";
pub const V_TEXCOORD: &str = "v_uv";
pub const U_TEXTURE0: &str = "uTex0";
pub const U_TRANSFORM: &str = "uTransform";
pub const U_RESOLUTION: &str = "uResolution";

const VERSION_DIRECTIVE: &str = "#version 330 core";
const EXT_EGL_IMAGE_DIRECTIVE: &str = "#extension GL_OES_EGL_image_external : require";

/// Composable template for one stage's vertex + fragment pair.
#[derive(Debug, Clone, Default)]
pub struct ShaderTemplate {
    extensions: Vec<&'static str>,
    external_sampler: bool,
    transform_texcoords: bool,
}

impl ShaderTemplate {
    /// Plain passthrough: sample `uTex0` at interpolated coordinates.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Template for sampling an externally written texture: texture
    /// coordinates run through `uTransform` before interpolation, and the
    /// fragment shader gains whatever sampler/extension the context requires.
    pub fn external(support: ExternalSamplerSupport) -> Self {
        let mut t = Self {
            transform_texcoords: true,
            ..Self::default()
        };
        if support == ExternalSamplerSupport::OesEglImage {
            t.extensions.push(EXT_EGL_IMAGE_DIRECTIVE);
            t.external_sampler = true;
        }
        t
    }

    pub fn vertex_source(&self) -> String {
        let mut src = String::new();
        src.push_str(VERSION_DIRECTIVE);
        src.push('\n');
        src.push_str(&format!("layout (location = 0) in vec2 {A_POSITION};\n"));
        src.push_str(&format!("layout (location = 1) in vec2 {A_TEXCOORD};\n"));
        if self.transform_texcoords {
            src.push_str(&format!("uniform mat4 {U_TRANSFORM};\n"));
        }
        src.push_str(&format!("out vec2 {V_TEXCOORD};\n"));
        src.push_str("void main() {\n");
        if self.transform_texcoords {
            src.push_str(&format!(
                "    vec4 tc = {U_TRANSFORM} * vec4({A_TEXCOORD}, 0.0, 1.0);\n"
            ));
            src.push_str(&format!("    {V_TEXCOORD} = tc.xy;\n"));
        } else {
            src.push_str(&format!("    {V_TEXCOORD} = {A_TEXCOORD};\n"));
        }
        src.push_str(&format!(
            "    gl_Position = vec4({A_POSITION}, 0.0, 1.0);\n"
        ));
        src.push_str("}\n");
        src
    }

    pub fn fragment_source(&self) -> String {
        let sampler = if self.external_sampler {
            "samplerExternalOES"
        } else {
            "sampler2D"
        };

        let mut src = String::new();
        src.push_str(VERSION_DIRECTIVE);
        src.push('\n');
        for ext in &self.extensions {
            src.push_str(ext);
            src.push('\n');
        }
        src.push_str(&format!("in vec2 {V_TEXCOORD};\n"));
        src.push_str("out vec4 o_color;\n");
        src.push_str(&format!("uniform {sampler} {U_TEXTURE0};\n"));
        src.push_str("void main() {\n");
        src.push_str(&format!(
            "    o_color = texture({U_TEXTURE0}, {V_TEXCOORD});\n"
        ));
        src.push_str("}\n");
        src
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_has_no_directive_or_transform() {
        let t = ShaderTemplate::passthrough();
        let vert = t.vertex_source();
        let frag = t.fragment_source();

        assert!(!vert.contains(U_TRANSFORM));
        assert!(vert.contains("v_uv = a_uv;"));
        assert!(!frag.contains("#extension"));
        assert!(frag.contains("uniform sampler2D uTex0;"));
    }

    #[test]
    fn external_oes_inserts_directive_after_version() {
        let t = ShaderTemplate::external(ExternalSamplerSupport::OesEglImage);
        let frag = t.fragment_source();

        let version_at = frag.find("#version").expect("version line");
        let ext_at = frag.find("#extension").expect("extension line");
        assert!(version_at < ext_at, "directive must follow #version:\n{frag}");
        assert!(frag.contains("uniform samplerExternalOES uTex0;"));
    }

    #[test]
    fn external_transforms_texcoords_not_positions() {
        let t = ShaderTemplate::external(ExternalSamplerSupport::Native);
        let vert = t.vertex_source();

        assert!(vert.contains("uTransform * vec4(a_uv, 0.0, 1.0)"));
        assert!(vert.contains("gl_Position = vec4(a_pos, 0.0, 1.0);"));
        // Native support: no directive, plain sampler.
        let frag = t.fragment_source();
        assert!(!frag.contains("#extension"));
        assert!(frag.contains("sampler2D"));
    }
}

//! Per-stage shader program binding.

use std::collections::HashMap;

use cascade_core::shader;
use cascade_core::{ProgramId, RenderContext, UniformLocation};

/// A compiled program plus the attribute/uniform locations a stage needs.
///
/// Built once per `initialize` and dropped on `teardown`; locations are never
/// valid across a rebuild of the program.
#[derive(Debug)]
pub struct ShaderBinding {
    program: ProgramId,
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, UniformLocation>,
}

impl ShaderBinding {
    /// Query the standard attributes plus the given uniform names. Inactive
    /// names are simply absent; setters skip them.
    pub fn build(
        ctx: &mut dyn RenderContext,
        program: ProgramId,
        uniform_names: &[&str],
    ) -> Self {
        let mut attributes = HashMap::new();
        for name in [shader::A_POSITION, shader::A_TEXCOORD] {
            if let Some(location) = ctx.attribute_location(program, name) {
                attributes.insert(name.to_string(), location);
            }
        }

        let mut uniforms = HashMap::new();
        for name in uniform_names {
            if let Some(location) = ctx.uniform_location(program, name) {
                uniforms.insert((*name).to_string(), location);
            }
        }

        Self {
            program,
            attributes,
            uniforms,
        }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }
}

//! Driver seam between the panel core and an OpenGL implementation.
//!
//! `GlApi` mirrors the slice of `glow::HasContext` the panel needs, minus the
//! `unsafe`: an implementation promises that its context stays current on the
//! calling thread for as long as the driver value exists. Two drivers ship
//! with the crate:
//! - `GlowDriver` wraps a real `glow::Context` handed over by the host.
//! - `HeadlessGl` keeps GL-like bookkeeping in memory (names, bindings, the
//!   error flag queue) so the render loop can run without a window.
//!
//! Handle kinds are associated types, so a buffer can never be passed where a
//! texture is expected.

mod glow_driver;
mod headless;

use std::fmt::{self, Debug};
use std::hash::Hash;

pub use glow_driver::GlowDriver;
pub use headless::{
    HeadlessBuffer, HeadlessGl, HeadlessProgram, HeadlessShader, HeadlessStats, HeadlessTexture,
    HeadlessUniform, HeadlessVertexArray, UniformValue,
};

use crate::error::RenderError;

/// `GL_CONTEXT_LOST`, reported by drivers whose context went away.
pub const CONTEXT_LOST: u32 = 0x0507;

/// Upper bound on flags cleared by a single drain; a lost context may report
/// `CONTEXT_LOST` on every query.
const MAX_DRAINED_ERRORS: usize = 16;

/// Class of GPU object, used for accounting and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Shader,
    Program,
    Buffer,
    VertexArray,
    Texture,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Shader => "shader",
            ResourceKind::Program => "program",
            ResourceKind::Buffer => "buffer",
            ResourceKind::VertexArray => "vertex array",
            ResourceKind::Texture => "texture",
        };
        f.write_str(label)
    }
}

/// The OpenGL entry points used by the panel.
///
/// Enum arguments take the raw `glow` constants (`glow::ARRAY_BUFFER`,
/// `glow::TEXTURE_2D`, ...).
pub trait GlApi {
    type Shader: Copy + Debug + Eq + Hash;
    type Program: Copy + Debug + Eq + Hash;
    type Buffer: Copy + Debug + Eq + Hash;
    type VertexArray: Copy + Debug + Eq + Hash;
    type Texture: Copy + Debug + Eq + Hash;
    type UniformLocation: Clone + Debug;

    /// Pops the oldest pending error flag, `glow::NO_ERROR` when clean.
    fn get_error(&self) -> u32;

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    fn compile_shader(&self, shader: Self::Shader);
    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn get_shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn bind_attrib_location(&self, program: Self::Program, index: u32, name: &str);
    fn link_program(&self, program: Self::Program);
    fn get_program_link_status(&self, program: Self::Program) -> bool;
    fn get_program_info_log(&self, program: Self::Program) -> String;
    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    fn use_program(&self, program: Option<Self::Program>);
    fn delete_program(&self, program: Self::Program);

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>);
    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32);
    fn delete_buffer(&self, buffer: Self::Buffer);

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn enable_vertex_attrib_array(&self, index: u32);
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);

    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>);
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    fn delete_texture(&self, texture: Self::Texture);

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn uniform_1_f32(&self, location: Option<&Self::UniformLocation>, x: f32);
    fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32);
    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32);
}

/// Strict check: the first pending flag becomes `RenderError::UnexpectedDriver`.
pub(crate) fn check_error<G: GlApi + ?Sized>(
    gl: &G,
    operation: &'static str,
) -> Result<(), RenderError> {
    match gl.get_error() {
        glow::NO_ERROR => Ok(()),
        code => Err(RenderError::UnexpectedDriver { code, operation }),
    }
}

/// Clears pending flags without raising. Returns how many were discarded.
pub(crate) fn drain_errors<G: GlApi + ?Sized>(gl: &G) -> usize {
    let mut drained = 0;
    while drained < MAX_DRAINED_ERRORS && gl.get_error() != glow::NO_ERROR {
        drained += 1;
    }
    drained
}

/// Symbolic name of a GL error code.
pub fn error_name(code: u32) -> &'static str {
    match code {
        glow::NO_ERROR => "NO_ERROR",
        glow::INVALID_ENUM => "INVALID_ENUM",
        glow::INVALID_VALUE => "INVALID_VALUE",
        glow::INVALID_OPERATION => "INVALID_OPERATION",
        glow::INVALID_FRAMEBUFFER_OPERATION => "INVALID_FRAMEBUFFER_OPERATION",
        glow::OUT_OF_MEMORY => "OUT_OF_MEMORY",
        glow::STACK_UNDERFLOW => "STACK_UNDERFLOW",
        glow::STACK_OVERFLOW => "STACK_OVERFLOW",
        CONTEXT_LOST => "CONTEXT_LOST",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_check_reports_first_flag() {
        let gl = HeadlessGl::new();
        gl.inject_error(glow::INVALID_ENUM);
        gl.inject_error(glow::INVALID_VALUE);
        let err = check_error(&gl, "probe").unwrap_err();
        assert_eq!(
            err,
            RenderError::UnexpectedDriver {
                code: glow::INVALID_ENUM,
                operation: "probe"
            }
        );
        // only one flag consumed
        assert_eq!(gl.get_error(), glow::INVALID_VALUE);
    }

    #[test]
    fn drain_clears_all_pending_flags() {
        let gl = HeadlessGl::new();
        gl.inject_error(glow::INVALID_ENUM);
        gl.inject_error(glow::OUT_OF_MEMORY);
        assert_eq!(drain_errors(&gl), 2);
        assert!(check_error(&gl, "after drain").is_ok());
    }

    #[test]
    fn drain_is_bounded_on_lost_context() {
        let gl = HeadlessGl::new();
        gl.lose_context();
        assert_eq!(drain_errors(&gl), MAX_DRAINED_ERRORS);
    }

    #[test]
    fn error_names_cover_common_codes() {
        assert_eq!(error_name(glow::INVALID_OPERATION), "INVALID_OPERATION");
        assert_eq!(error_name(CONTEXT_LOST), "CONTEXT_LOST");
        assert_eq!(error_name(0xdead), "UNKNOWN");
    }
}

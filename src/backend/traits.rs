//! Core device abstraction
//!
//! The renderer drives a single immediate-mode graphics device through this trait.
//! Every call is synchronous and issued from the thread that owns the device.

use std::ops::Range;

use glam::Vec4;
use thiserror::Error;

use crate::backend::types::*;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Failed to compile {stage} shader: {log}")]
    ShaderCompilationFailed { stage: ShaderStage, log: String },
    #[error("Failed to link program: {0}")]
    ProgramLinkFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u64);

            impl $name {
                pub fn raw(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

define_handle! {
    /// Handle to a compiled shader stage
    ShaderHandle,
    /// Handle to a linked program
    ProgramHandle,
    /// Handle to a GPU buffer
    BufferHandle,
    /// Handle to a vertex layout object
    VertexArrayHandle,
    /// Handle to a GPU texture
    TextureHandle,
    /// Handle to an offscreen framebuffer
    FramebufferHandle,
}

/// Location of a uniform inside a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

/// Index of a uniform block inside a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformBlockIndex(pub u32);

/// Immediate-mode graphics device.
///
/// Pipeline state setters are plain writes: implementations must not skip a call
/// because the value matches what is already bound.
pub trait GraphicsDevice {
    /// Get backend name
    fn name(&self) -> &'static str;

    // Shaders and programs
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> BackendResult<ShaderHandle>;
    fn delete_shader(&mut self, shader: ShaderHandle);
    fn link_program(&mut self, shaders: &[ShaderHandle]) -> BackendResult<ProgramHandle>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn use_program(&mut self, program: ProgramHandle);
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);
    fn uniform_block_index(
        &mut self,
        program: ProgramHandle,
        name: &str,
    ) -> Option<UniformBlockIndex>;
    fn bind_uniform_block(
        &mut self,
        program: ProgramHandle,
        block: UniformBlockIndex,
        binding: u32,
    );

    // Buffers and vertex layouts
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> BackendResult<BufferHandle>;
    fn destroy_buffer(&mut self, buffer: BufferHandle);
    fn create_vertex_array(&mut self) -> BackendResult<VertexArrayHandle>;
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle);
    fn set_vertex_attribute(
        &mut self,
        vertex_array: VertexArrayHandle,
        location: u32,
        buffer: BufferHandle,
        format: VertexFormat,
    );
    fn set_element_buffer(&mut self, vertex_array: VertexArrayHandle, buffer: BufferHandle);
    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    // Textures and framebuffers
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> BackendResult<TextureHandle>;
    fn destroy_texture(&mut self, texture: TextureHandle);
    fn bind_texture(&mut self, unit: u32, target: TextureTarget, texture: TextureHandle);
    /// Create a framebuffer from color attachments (in draw-buffer order) and an
    /// optional depth attachment.
    fn create_framebuffer(
        &mut self,
        colors: &[TextureHandle],
        depth: Option<TextureHandle>,
    ) -> BackendResult<FramebufferHandle>;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);
    /// Bind an offscreen framebuffer, or the default one when `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    // Fixed-function state
    fn set_viewport(&mut self, rect: Rect);
    fn set_scissor(&mut self, rect: Rect);
    fn set_scissor_test(&mut self, enabled: bool);
    fn set_clear_color(&mut self, color: Vec4);
    fn clear(&mut self, flags: ClearFlags);
    /// Enable depth testing with the given function, or disable it when `None`.
    fn set_depth_test(&mut self, compare: Option<CompareFunction>);
    fn set_depth_write(&mut self, enabled: bool);
    /// Enable blending with the given state, or disable it when `None`.
    fn set_blend(&mut self, blend: Option<BlendState>);
    fn set_cull_mode(&mut self, mode: CullMode);
    fn set_polygon_mode(&mut self, mode: PolygonMode);

    // Draw commands
    fn draw(&mut self, topology: PrimitiveTopology, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    );
}

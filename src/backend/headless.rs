//! Headless graphics device for testing and offline runs.
//!
//! This device doesn't touch any GPU. It allocates handles, keeps just enough
//! bookkeeping to answer shader reflection queries, and records every call as a
//! [`DeviceCommand`] so callers can inspect exactly what was submitted.

use std::collections::HashMap;
use std::ops::Range;

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A single recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CompileShader {
        stage: ShaderStage,
        shader: ShaderHandle,
    },
    DeleteShader(ShaderHandle),
    LinkProgram {
        program: ProgramHandle,
        shaders: Vec<ShaderHandle>,
    },
    DeleteProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    SetUniform {
        location: UniformLocation,
        value: UniformValue,
    },
    BindUniformBlock {
        program: ProgramHandle,
        block: UniformBlockIndex,
        binding: u32,
    },
    CreateBuffer {
        buffer: BufferHandle,
        kind: BufferKind,
        size: usize,
    },
    DestroyBuffer(BufferHandle),
    CreateVertexArray(VertexArrayHandle),
    DestroyVertexArray(VertexArrayHandle),
    SetVertexAttribute {
        vertex_array: VertexArrayHandle,
        location: u32,
        buffer: BufferHandle,
        format: VertexFormat,
    },
    SetElementBuffer {
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
    },
    BindVertexArray(VertexArrayHandle),
    CreateTexture(TextureHandle),
    DestroyTexture(TextureHandle),
    BindTexture {
        unit: u32,
        target: TextureTarget,
        texture: TextureHandle,
    },
    CreateFramebuffer(FramebufferHandle),
    DestroyFramebuffer(FramebufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    SetViewport(Rect),
    SetScissor(Rect),
    SetScissorTest(bool),
    SetClearColor(Vec4),
    Clear(ClearFlags),
    SetDepthTest(Option<CompareFunction>),
    SetDepthWrite(bool),
    SetBlend(Option<BlendState>),
    SetCullMode(CullMode),
    SetPolygonMode(PolygonMode),
    Draw {
        topology: PrimitiveTopology,
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        topology: PrimitiveTopology,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

impl DeviceCommand {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceCommand::Draw { .. } | DeviceCommand::DrawIndexed { .. }
        )
    }
}

struct CompiledShader {
    stage: ShaderStage,
    source: String,
}

struct LinkedProgram {
    sources: Vec<(ShaderStage, String)>,
    locations: HashMap<String, UniformLocation>,
}

/// Command-recording device.
pub struct HeadlessDevice {
    next_id: u64,
    next_location: i32,
    shaders: HashMap<ShaderHandle, CompiledShader>,
    programs: HashMap<ProgramHandle, LinkedProgram>,
    uniform_names: HashMap<UniformLocation, String>,
    commands: Vec<DeviceCommand>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Create a new headless device.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            next_location: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            uniform_names: HashMap::new(),
            commands: Vec::new(),
        }
    }

    /// All commands recorded so far, in submission order.
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drain the recorded commands.
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Recorded draw commands, in submission order.
    pub fn draw_calls(&self) -> Vec<&DeviceCommand> {
        self.commands.iter().filter(|c| c.is_draw()).collect()
    }

    /// Name of the uniform a location was handed out for.
    pub fn uniform_name(&self, location: UniformLocation) -> Option<&str> {
        self.uniform_names.get(&location).map(String::as_str)
    }

    /// Values uploaded to the uniform called `name`, in submission order.
    pub fn uniform_uploads(&self, name: &str) -> Vec<UniformValue> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::SetUniform { location, value }
                    if self.uniform_name(*location) == Some(name) =>
                {
                    Some(*value)
                }
                _ => None,
            })
            .collect()
    }

    /// Stage sources a live program was linked from.
    pub fn program_sources(&self, program: ProgramHandle) -> Option<&[(ShaderStage, String)]> {
        self.programs.get(&program).map(|p| p.sources.as_slice())
    }

    pub fn live_program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn live_shader_count(&self) -> usize {
        self.shaders.len()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: DeviceCommand) {
        log::trace!("HeadlessDevice: {:?}", command);
        self.commands.push(command);
    }
}

/// True when `name` appears in `source` as a whole identifier.
fn contains_identifier(source: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    source.match_indices(name).any(|(start, _)| {
        let before = source[..start].chars().next_back();
        let after = source[start + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// True when `source` declares a `uniform <name>` block.
fn declares_block(source: &str, name: &str) -> bool {
    source.lines().any(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        tokens
            .windows(2)
            .any(|w| w[0] == "uniform" && w[1].trim_end_matches('{') == name)
    })
}

impl GraphicsDevice for HeadlessDevice {
    fn name(&self) -> &'static str {
        "Headless"
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> BackendResult<ShaderHandle> {
        if !source.contains("void main") {
            return Err(BackendError::ShaderCompilationFailed {
                stage,
                log: "0:1: error: missing entry point 'main'".to_owned(),
            });
        }
        let shader = ShaderHandle(self.alloc_id());
        self.shaders.insert(
            shader,
            CompiledShader {
                stage,
                source: source.to_owned(),
            },
        );
        self.record(DeviceCommand::CompileShader { stage, shader });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
        self.record(DeviceCommand::DeleteShader(shader));
    }

    fn link_program(&mut self, shaders: &[ShaderHandle]) -> BackendResult<ProgramHandle> {
        if shaders.is_empty() {
            return Err(BackendError::ProgramLinkFailed(
                "no shader stages attached".to_owned(),
            ));
        }
        let mut sources = Vec::with_capacity(shaders.len());
        for shader in shaders {
            let compiled = self
                .shaders
                .get(shader)
                .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", shader)))?;
            sources.push((compiled.stage, compiled.source.clone()));
        }
        let program = ProgramHandle(self.alloc_id());
        self.programs.insert(
            program,
            LinkedProgram {
                sources,
                locations: HashMap::new(),
            },
        );
        self.record(DeviceCommand::LinkProgram {
            program,
            shaders: shaders.to_vec(),
        });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.record(DeviceCommand::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.record(DeviceCommand::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let linked = self.programs.get_mut(&program)?;
        if let Some(location) = linked.locations.get(name) {
            return Some(*location);
        }
        if !linked
            .sources
            .iter()
            .any(|(_, source)| contains_identifier(source, name))
        {
            return None;
        }
        let location = UniformLocation(self.next_location);
        self.next_location += 1;
        linked.locations.insert(name.to_owned(), location);
        self.uniform_names.insert(location, name.to_owned());
        Some(location)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.record(DeviceCommand::SetUniform {
            location,
            value: *value,
        });
    }

    fn uniform_block_index(
        &mut self,
        program: ProgramHandle,
        name: &str,
    ) -> Option<UniformBlockIndex> {
        let linked = self.programs.get(&program)?;
        linked
            .sources
            .iter()
            .position(|(_, source)| declares_block(source, name))
            .map(|index| UniformBlockIndex(index as u32))
    }

    fn bind_uniform_block(
        &mut self,
        program: ProgramHandle,
        block: UniformBlockIndex,
        binding: u32,
    ) {
        self.record(DeviceCommand::BindUniformBlock {
            program,
            block,
            binding,
        });
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> BackendResult<BufferHandle> {
        if data.is_empty() {
            return Err(BackendError::BufferCreationFailed(
                "buffer data is empty".to_owned(),
            ));
        }
        let buffer = BufferHandle(self.alloc_id());
        self.record(DeviceCommand::CreateBuffer {
            buffer,
            kind,
            size: data.len(),
        });
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.record(DeviceCommand::DestroyBuffer(buffer));
    }

    fn create_vertex_array(&mut self) -> BackendResult<VertexArrayHandle> {
        let vertex_array = VertexArrayHandle(self.alloc_id());
        self.record(DeviceCommand::CreateVertexArray(vertex_array));
        Ok(vertex_array)
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.record(DeviceCommand::DestroyVertexArray(vertex_array));
    }

    fn set_vertex_attribute(
        &mut self,
        vertex_array: VertexArrayHandle,
        location: u32,
        buffer: BufferHandle,
        format: VertexFormat,
    ) {
        self.record(DeviceCommand::SetVertexAttribute {
            vertex_array,
            location,
            buffer,
            format,
        });
    }

    fn set_element_buffer(&mut self, vertex_array: VertexArrayHandle, buffer: BufferHandle) {
        self.record(DeviceCommand::SetElementBuffer {
            vertex_array,
            buffer,
        });
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.record(DeviceCommand::BindVertexArray(vertex_array));
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent ({}x{})",
                descriptor.label, descriptor.width, descriptor.height
            )));
        }
        let texture = TextureHandle(self.alloc_id());
        self.record(DeviceCommand::CreateTexture(texture));
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.record(DeviceCommand::DestroyTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, target: TextureTarget, texture: TextureHandle) {
        self.record(DeviceCommand::BindTexture {
            unit,
            target,
            texture,
        });
    }

    fn create_framebuffer(
        &mut self,
        colors: &[TextureHandle],
        depth: Option<TextureHandle>,
    ) -> BackendResult<FramebufferHandle> {
        if colors.is_empty() && depth.is_none() {
            return Err(BackendError::FramebufferCreationFailed(
                "framebuffer has no attachments".into(),
            ));
        }
        let framebuffer = FramebufferHandle(self.alloc_id());
        self.record(DeviceCommand::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.record(DeviceCommand::DestroyFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.record(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.record(DeviceCommand::SetViewport(rect));
    }

    fn set_scissor(&mut self, rect: Rect) {
        self.record(DeviceCommand::SetScissor(rect));
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.record(DeviceCommand::SetScissorTest(enabled));
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.record(DeviceCommand::SetClearColor(color));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.record(DeviceCommand::Clear(flags));
    }

    fn set_depth_test(&mut self, compare: Option<CompareFunction>) {
        self.record(DeviceCommand::SetDepthTest(compare));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.record(DeviceCommand::SetDepthWrite(enabled));
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.record(DeviceCommand::SetBlend(blend));
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.record(DeviceCommand::SetCullMode(mode));
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.record(DeviceCommand::SetPolygonMode(mode));
    }

    fn draw(&mut self, topology: PrimitiveTopology, vertices: Range<u32>, instances: Range<u32>) {
        self.record(DeviceCommand::Draw {
            topology,
            vertices,
            instances,
        });
    }

    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) {
        self.record(DeviceCommand::DrawIndexed {
            topology,
            indices,
            base_vertex,
            instances,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERT: &str = "uniform mat4 uModel;\nvoid main() { gl_Position = uModel[0]; }\n";
    const FRAG: &str = "layout(std140) uniform FrameBlock {\n vec4 x;\n};\nvoid main() {}\n";

    fn linked(device: &mut HeadlessDevice) -> ProgramHandle {
        let vs = device.compile_shader(ShaderStage::Vertex, VERT).unwrap();
        let fs = device.compile_shader(ShaderStage::Fragment, FRAG).unwrap();
        device.link_program(&[vs, fs]).unwrap()
    }

    #[test]
    fn test_compile_requires_entry_point() {
        let mut device = HeadlessDevice::new();
        let err = device
            .compile_shader(ShaderStage::Fragment, "out vec4 color;")
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::ShaderCompilationFailed {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert!(device.commands().is_empty());
    }

    #[test]
    fn test_uniform_location_is_stable() {
        let mut device = HeadlessDevice::new();
        let program = linked(&mut device);

        let first = device.uniform_location(program, "uModel");
        assert!(first.is_some());
        assert_eq!(device.uniform_location(program, "uModel"), first);
        assert_eq!(device.uniform_name(first.unwrap()), Some("uModel"));
        assert_eq!(device.uniform_location(program, "uMod"), None);
        assert_eq!(device.uniform_location(program, "uMissing"), None);
    }

    #[test]
    fn test_uniform_block_lookup() {
        let mut device = HeadlessDevice::new();
        let program = linked(&mut device);

        assert!(device.uniform_block_index(program, "FrameBlock").is_some());
        assert!(device.uniform_block_index(program, "LightBlock").is_none());
    }

    #[test]
    fn test_link_rejects_empty() {
        let mut device = HeadlessDevice::new();
        assert!(device.link_program(&[]).is_err());
    }

    #[test]
    fn test_framebuffer_needs_an_attachment() {
        let mut device = HeadlessDevice::new();
        assert!(matches!(
            device.create_framebuffer(&[], None),
            Err(BackendError::FramebufferCreationFailed(_))
        ));

        let depth = device
            .create_texture(&TextureDescriptor {
                width: 8,
                height: 8,
                format: TextureFormat::Depth32Float,
                ..Default::default()
            })
            .unwrap();
        assert!(device.create_framebuffer(&[], Some(depth)).is_ok());
    }

    #[test]
    fn test_records_draws_in_order() {
        let mut device = HeadlessDevice::new();
        device.clear(ClearFlags::all());
        device.draw(PrimitiveTopology::Triangles, 0..3, 0..1);
        device.draw_indexed(PrimitiveTopology::Lines, 0..6, 0, 0..2);

        assert_eq!(device.commands().len(), 3);
        assert_eq!(device.draw_calls().len(), 2);
        assert_eq!(device.take_commands().len(), 3);
        assert!(device.commands().is_empty());
    }
}

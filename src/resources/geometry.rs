//! Vertex layout and draw range description
//!
//! The renderer never generates vertex data. Callers upload attribute and index
//! arrays; the geometry tracks what a draw call needs: the vertex layout handle,
//! topology, whether it is indexed, and which sub-range to submit.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;

/// Standard attribute slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Position,
    Color,
    Uv,
    Normal,
}

impl Attribute {
    pub fn location(&self) -> u32 {
        match self {
            Attribute::Position => 0,
            Attribute::Color => 1,
            Attribute::Uv => 2,
            Attribute::Normal => 3,
        }
    }
}

/// Sub-range of the vertex or index buffer submitted in one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    pub start: u32,
    pub count: u32,
}

impl DrawRange {
    pub fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    pub fn as_range(&self) -> std::ops::Range<u32> {
        self.start..self.start.saturating_add(self.count)
    }
}

/// Geometry description owned by meshes
#[derive(Debug)]
pub struct Geometry {
    vertex_array: VertexArrayHandle,
    buffers: Vec<BufferHandle>,
    topology: PrimitiveTopology,
    indexed: bool,
    vertex_count: u32,
    index_count: u32,
    draw_range: DrawRange,
}

impl Geometry {
    pub fn new<D: GraphicsDevice + ?Sized>(device: &mut D) -> BackendResult<Self> {
        Ok(Self {
            vertex_array: device.create_vertex_array()?,
            buffers: Vec::new(),
            topology: PrimitiveTopology::Triangles,
            indexed: false,
            vertex_count: 0,
            index_count: 0,
            draw_range: DrawRange::default(),
        })
    }

    /// Build a geometry from positions and optional indices.
    pub fn from_positions<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        positions: &[Vec3],
        indices: Option<&[u32]>,
    ) -> BackendResult<Self> {
        let mut geometry = Self::new(device)?;
        let data = bytemuck::cast_slice(positions);
        geometry.set_attribute(device, Attribute::Position, 3, data)?;
        if let Some(indices) = indices {
            geometry.set_index(device, indices)?;
        }
        Ok(geometry)
    }

    /// Upload a float attribute with `components` values per vertex.
    pub fn set_attribute<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        attribute: Attribute,
        components: u32,
        data: &[f32],
    ) -> BackendResult<()> {
        let format = VertexFormat::from_components(components).ok_or_else(|| {
            BackendError::BufferCreationFailed(format!(
                "{:?} attribute has {} components",
                attribute, components
            ))
        })?;
        if data.len() % components as usize != 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?} attribute length {} is not a multiple of {}",
                attribute,
                data.len(),
                components
            )));
        }

        let buffer = device.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(data))?;
        device.set_vertex_attribute(self.vertex_array, attribute.location(), buffer, format);
        self.buffers.push(buffer);

        if attribute == Attribute::Position {
            self.vertex_count = (data.len() / components as usize) as u32;
            if !self.indexed {
                self.draw_range = DrawRange::new(0, self.vertex_count);
            }
        }
        Ok(())
    }

    pub fn set_normals<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        normals: &[Vec3],
    ) -> BackendResult<()> {
        self.set_attribute(device, Attribute::Normal, 3, bytemuck::cast_slice(normals))
    }

    pub fn set_uvs<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        uvs: &[Vec2],
    ) -> BackendResult<()> {
        self.set_attribute(device, Attribute::Uv, 2, bytemuck::cast_slice(uvs))
    }

    pub fn set_colors<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        colors: &[Vec4],
    ) -> BackendResult<()> {
        self.set_attribute(device, Attribute::Color, 4, bytemuck::cast_slice(colors))
    }

    /// Upload indices; the geometry becomes indexed and the range covers every index.
    pub fn set_index<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        indices: &[u32],
    ) -> BackendResult<()> {
        let buffer = device.create_buffer(BufferKind::Index, bytemuck::cast_slice(indices))?;
        device.set_element_buffer(self.vertex_array, buffer);
        self.buffers.push(buffer);

        self.indexed = true;
        self.index_count = indices.len() as u32;
        self.draw_range = DrawRange::new(0, self.index_count);
        Ok(())
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn set_topology(&mut self, topology: PrimitiveTopology) {
        self.topology = topology;
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_layout(&self) -> VertexArrayHandle {
        self.vertex_array
    }

    pub fn draw_range(&self) -> DrawRange {
        self.draw_range
    }

    pub fn set_draw_range(&mut self, start: u32, count: u32) {
        self.draw_range = DrawRange::new(start, count);
    }

    /// Reset the range to every index (indexed) or every vertex.
    pub fn clear_draw_range(&mut self) {
        let count = if self.indexed {
            self.index_count
        } else {
            self.vertex_count
        };
        self.draw_range = DrawRange::new(0, count);
    }

    pub fn bind<D: GraphicsDevice + ?Sized>(&self, device: &mut D) {
        device.bind_vertex_array(self.vertex_array);
    }

    pub fn destroy<D: GraphicsDevice + ?Sized>(self, device: &mut D) {
        for buffer in self.buffers {
            device.destroy_buffer(buffer);
        }
        device.destroy_vertex_array(self.vertex_array);
    }
}

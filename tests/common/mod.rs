//! Shared fixtures for renderer integration tests.

#![allow(dead_code)]

use glam::Vec3;

use scene_renderer::backend::{DeviceCommand, HeadlessDevice};
use scene_renderer::resources::{BasicMaterial, Geometry, Material, Mesh};
use scene_renderer::shader::ProgramDesc;
use scene_renderer::scene::{Node, NodeRef};
use scene_renderer::{Renderer, RendererConfig};

/// Renderer on a headless device with the construction commands discarded.
pub fn headless_renderer() -> Renderer<HeadlessDevice> {
    let mut renderer = Renderer::new(HeadlessDevice::new(), RendererConfig::default());
    renderer.device_mut().clear_commands();
    renderer
}

// ============================================================================
// Geometry
// ============================================================================

pub const CUBE_POSITIONS: [Vec3; 8] = [
    Vec3::new(-0.5, -0.5, -0.5),
    Vec3::new(0.5, -0.5, -0.5),
    Vec3::new(0.5, 0.5, -0.5),
    Vec3::new(-0.5, 0.5, -0.5),
    Vec3::new(-0.5, -0.5, 0.5),
    Vec3::new(0.5, -0.5, 0.5),
    Vec3::new(0.5, 0.5, 0.5),
    Vec3::new(-0.5, 0.5, 0.5),
];

#[rustfmt::skip]
pub const CUBE_INDICES: [u32; 36] = [
    0, 2, 1, 2, 0, 3,
    4, 5, 6, 6, 7, 4,
    0, 7, 3, 7, 0, 4,
    1, 6, 5, 6, 1, 2,
    3, 6, 2, 6, 3, 7,
    0, 1, 5, 5, 4, 0,
];

pub fn cube_geometry(device: &mut HeadlessDevice) -> Geometry {
    Geometry::from_positions(device, &CUBE_POSITIONS, Some(&CUBE_INDICES[..]))
        .expect("cube geometry")
}

pub fn triangle_geometry(device: &mut HeadlessDevice) -> Geometry {
    Geometry::from_positions(device, &[Vec3::ZERO, Vec3::X, Vec3::Y], None)
        .expect("triangle geometry")
}

// ============================================================================
// Materials and meshes
// ============================================================================

pub const PLAIN_VERT: &str = r#"#include "common"
layout(location = 0) in vec3 aPosition;
void main() {
  gl_Position = uProjection * uView * uModel * vec4(aPosition, 1.0);
}
"#;

pub const PLAIN_FRAG: &str = r#"out vec4 FragColor;
uniform vec4 uTint;
void main() {
  FragColor = uTint;
}
"#;

/// Fragment source the headless device refuses to compile.
pub const BROKEN_FRAG: &str = "out vec4 FragColor;\n";

pub fn basic_mesh(geometry: Geometry) -> Mesh {
    Mesh::from_parts(geometry, BasicMaterial::default().into_material())
}

/// Mesh node with a triangle and a default basic material.
pub fn triangle_node(renderer: &mut Renderer<HeadlessDevice>, name: &str) -> NodeRef {
    Node::mesh(name, basic_mesh(triangle_geometry(renderer.device_mut())))
}

pub fn plain_material() -> Material {
    Material::from_desc("plain", ProgramDesc::inline(PLAIN_VERT, PLAIN_FRAG))
}

pub fn broken_material() -> Material {
    Material::from_desc("broken", ProgramDesc::inline(PLAIN_VERT, BROKEN_FRAG))
}

// ============================================================================
// Command inspection
// ============================================================================

/// Position of the first command matching `predicate`.
pub fn position_of(
    commands: &[DeviceCommand],
    predicate: impl Fn(&DeviceCommand) -> bool,
) -> Option<usize> {
    commands.iter().position(predicate)
}

pub fn count_of(commands: &[DeviceCommand], predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
    commands.iter().filter(|c| predicate(c)).count()
}

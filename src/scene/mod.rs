//! Scene hierarchy

mod camera;
mod light;
mod node;
mod transform;

pub use camera::*;
pub use light::*;
pub use node::*;
pub use transform::*;

use std::rc::Rc;

use glam::{Mat3, Vec4};

use crate::resources::Texture;

/// What a scene draws behind its meshes
#[derive(Debug, Clone)]
pub enum SceneBackground {
    /// Clear the color buffer with a solid color
    Color(Vec4),
    /// Draw a cube map skybox
    CubeMap {
        texture: Rc<Texture>,
        intensity: f32,
        rotation: Mat3,
        flip: bool,
    },
}

impl SceneBackground {
    pub fn color(color: Vec4) -> Self {
        SceneBackground::Color(color)
    }

    pub fn cube_map(texture: Rc<Texture>) -> Self {
        SceneBackground::CubeMap {
            texture,
            intensity: 1.0,
            rotation: Mat3::IDENTITY,
            flip: false,
        }
    }

    pub fn with_intensity(self, value: f32) -> Self {
        match self {
            SceneBackground::CubeMap {
                texture,
                rotation,
                flip,
                ..
            } => SceneBackground::CubeMap {
                texture,
                intensity: value,
                rotation,
                flip,
            },
            other => other,
        }
    }
}

//! Camera system

use glam::{Mat4, Vec3};

use crate::scene::{Node, NodeKind, NodeRef};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn is_orthographic(&self) -> bool {
        matches!(self, Projection::Orthographic { .. })
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// What the renderer needs from a camera.
pub trait CameraView {
    fn view_matrix(&self) -> Mat4;
    fn projection_matrix(&self) -> Mat4;
    fn world_position(&self) -> Vec3;
}

/// Camera backed by a camera node in the scene hierarchy
#[derive(Debug, Clone)]
pub struct Camera {
    node: NodeRef,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new("camera", Projection::default())
    }
}

impl Camera {
    pub fn new(name: impl Into<String>, projection: Projection) -> Self {
        Self {
            node: Node::camera(name, projection),
        }
    }

    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(
            "camera",
            Projection::perspective(fov_y_degrees, aspect, near, far),
        )
    }

    /// Wrap an existing node. Returns `None` unless it is a camera node.
    pub fn from_node(node: NodeRef) -> Option<Self> {
        match node.kind() {
            NodeKind::Camera(_) => Some(Self { node }),
            _ => None,
        }
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn projection(&self) -> Projection {
        self.node.projection().unwrap_or_default()
    }

    pub fn set_projection(&self, projection: Projection) {
        self.node.set_projection(projection);
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&self, width: f32, height: f32) {
        if height <= 0.0 {
            return;
        }
        let mut projection = self.projection();
        projection.set_aspect(width / height);
        self.set_projection(projection);
    }

    pub fn look_at(&self, target: Vec3) {
        self.node.look_at(target);
    }

    pub fn set_position(&self, position: Vec3) {
        self.node.set_position(position);
    }
}

impl CameraView for Camera {
    fn view_matrix(&self) -> Mat4 {
        self.node.world_matrix().inverse()
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection().matrix()
    }

    fn world_position(&self) -> Vec3 {
        self.node.world_position()
    }
}

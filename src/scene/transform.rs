//! Local transform value

use glam::{Mat4, Quat, Vec3};

/// Local translation, rotation and scale of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
            ..Default::default()
        }
    }

    /// Local matrix, `T * R * S`.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Move along a local axis, expressed in parent space by the rotation.
    pub fn translate_on_axis(&mut self, axis: Vec3, distance: f32) {
        self.position += self.rotation * axis.normalize() * distance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_is_trs() {
        let t = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            scale: Vec3::splat(2.0),
        };
        let expected = Mat4::from_translation(t.position)
            * Mat4::from_quat(t.rotation)
            * Mat4::from_scale(t.scale);
        assert!(t.matrix().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_translate_on_axis_follows_rotation() {
        let mut t = Transform::from_position_rotation(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        t.translate_on_axis(Vec3::new(0.0, 0.0, 4.0), 2.0);
        assert!(t.position.abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-5));
    }
}

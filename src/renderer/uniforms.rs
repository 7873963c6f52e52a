//! Per-frame uniform snapshot

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};

use crate::backend::GraphicsDevice;
use crate::clock::FrameContext;
use crate::scene::CameraView;
use crate::shader::Program;

/// Values shared by every draw of a frame.
///
/// Laid out std140-compatible so it can back a uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    /// xyz = camera world position
    pub camera_position: Vec4,
    pub mouse: Vec2,
    pub resolution: Vec2,
    pub time: f32,
    pub delta: f32,
    _padding: [f32; 2],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec4::W,
            mouse: Vec2::ZERO,
            resolution: Vec2::ZERO,
            time: 0.0,
            delta: 0.0,
            _padding: [0.0; 2],
        }
    }
}

impl FrameUniforms {
    pub fn new(frame: &FrameContext, camera: &dyn CameraView) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            camera_position: camera.world_position().extend(1.0),
            mouse: frame.mouse,
            resolution: frame.resolution,
            time: frame.time,
            delta: frame.delta,
            _padding: [0.0; 2],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Upload as individual uniforms to the program in use.
    pub fn upload(&self, program: &mut Program, device: &mut dyn GraphicsDevice) {
        program.set_uniform(device, "uTime", self.time);
        program.set_uniform(device, "uDelta", self.delta);
        program.set_uniform(device, "uMouse", self.mouse);
        program.set_uniform(device, "uResolution", self.resolution);
        program.set_uniform(device, "uView", self.view);
        program.set_uniform(device, "uProjection", self.projection);
        program.set_uniform(device, "uCameraPos", self.camera_position.truncate());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessDevice, UniformValue};
    use crate::scene::Camera;
    use crate::shader::{ProgramDesc, ShaderPreprocessor};
    use glam::Vec3;

    #[test]
    fn test_layout_is_std140_sized() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 176);
        assert_eq!(FrameUniforms::default().as_bytes().len(), 176);
    }

    #[test]
    fn test_snapshot_reads_camera_and_frame() {
        let camera = Camera::default();
        camera.set_position(Vec3::new(0.0, 2.0, 5.0));
        let frame = FrameContext {
            time: 1.5,
            delta: 0.25,
            mouse: Vec2::new(4.0, 8.0),
            resolution: Vec2::new(640.0, 480.0),
        };

        let uniforms = FrameUniforms::new(&frame, &camera);
        assert_eq!(uniforms.time, 1.5);
        assert_eq!(
            uniforms.camera_position.truncate(),
            Vec3::new(0.0, 2.0, 5.0)
        );
        assert_eq!(uniforms.view, camera.view_matrix());
    }

    #[test]
    fn test_upload_sends_every_frame_uniform() {
        let mut device = HeadlessDevice::new();
        let pre = ShaderPreprocessor::default();
        let mut program = Program::new(ProgramDesc::registry("basic_vert", "basic_frag"));
        program.ensure_built(&mut device, &pre).unwrap();

        let uniforms = FrameUniforms {
            time: 2.0,
            ..Default::default()
        };
        uniforms.upload(&mut program, &mut device);

        assert_eq!(
            device.uniform_uploads("uTime"),
            vec![UniformValue::Float(2.0)]
        );
        for name in [
            "uDelta",
            "uMouse",
            "uResolution",
            "uView",
            "uProjection",
            "uCameraPos",
        ] {
            assert_eq!(device.uniform_uploads(name).len(), 1, "{name}");
        }
    }
}

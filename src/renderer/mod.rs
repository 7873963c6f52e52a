//! Scene renderer
//!
//! Walks a node tree once per frame and issues one draw call per visible mesh
//! against a [`GraphicsDevice`]. Backgrounds are drawn before any mesh.

mod render_target;
mod uniforms;

pub use render_target::*;
pub use uniforms::*;

use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

use crate::backend::{ClearFlags, FramebufferHandle, GraphicsDevice, Rect};
use crate::clock::FrameContext;
use crate::events::{EventBus, FramebufferResized, SceneChanged};
use crate::resources::{Geometry, Mesh, PipelineState, SkyboxMaterial};
use crate::scene::{CameraView, NodeId, NodeRef, SceneBackground};
use crate::shader::{FileStorage, ShaderPreprocessor, ShaderRegistry};
use crate::RendererConfig;

/// Unit cube corners for the skybox
const SKYBOX_POSITIONS: [Vec3; 8] = [
    Vec3::new(-1.0, -1.0, -1.0),
    Vec3::new(1.0, -1.0, -1.0),
    Vec3::new(1.0, 1.0, -1.0),
    Vec3::new(-1.0, 1.0, -1.0),
    Vec3::new(-1.0, -1.0, 1.0),
    Vec3::new(1.0, -1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(-1.0, 1.0, 1.0),
];

#[rustfmt::skip]
const SKYBOX_INDICES: [u32; 36] = [
    0, 1, 2, 2, 3, 0, // -Z
    4, 6, 5, 6, 4, 7, // +Z
    0, 3, 7, 7, 4, 0, // -X
    1, 5, 6, 6, 2, 1, // +X
    3, 2, 6, 6, 7, 3, // +Y
    0, 4, 5, 5, 1, 0, // -Y
];

/// Draws node trees onto a device
pub struct Renderer<D: GraphicsDevice> {
    device: D,
    preprocessor: ShaderPreprocessor,
    events: EventBus,
    config: RendererConfig,
    current_target: Option<SharedRenderTarget>,
    /// Framebuffer and viewport last sent to the device for `current_target`
    bound_target: Option<(FramebufferHandle, Rect)>,
    width: u32,
    height: u32,
    auto_clear: bool,
    clear_color: Vec4,
    scissor_test: bool,
    frame: FrameContext,
    frame_uniforms: FrameUniforms,
    skybox: Option<Mesh>,
    last_root: Option<NodeId>,
}

impl<D: GraphicsDevice> Renderer<D> {
    pub fn new(mut device: D, config: RendererConfig) -> Self {
        let preprocessor = match &config.shader_root {
            Some(root) => {
                ShaderPreprocessor::new(ShaderRegistry::with_builtins(), FileStorage::new(root))
            }
            None => ShaderPreprocessor::default(),
        };

        device.set_clear_color(config.clear_color);
        device.set_viewport(Rect::from_size(config.width, config.height));
        log::info!(
            "Renderer created on {} ({}x{})",
            device.name(),
            config.width,
            config.height
        );

        Self {
            device,
            preprocessor,
            events: EventBus::new(),
            current_target: None,
            bound_target: None,
            width: config.width,
            height: config.height,
            auto_clear: config.auto_clear,
            clear_color: config.clear_color,
            scissor_test: false,
            frame: FrameContext::default(),
            frame_uniforms: FrameUniforms::default(),
            skybox: None,
            last_root: None,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn preprocessor(&self) -> &ShaderPreprocessor {
        &self.preprocessor
    }

    pub fn preprocessor_mut(&mut self) -> &mut ShaderPreprocessor {
        &mut self.preprocessor
    }

    /// Bus carrying [`FramebufferResized`] and [`SceneChanged`].
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_uniforms(&self) -> &FrameUniforms {
        &self.frame_uniforms
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn render_target(&self) -> Option<&SharedRenderTarget> {
        self.current_target.as_ref()
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn set_frame_context(&mut self, frame: FrameContext) {
        self.frame = frame;
    }

    /// Bind `target`, or the default framebuffer for `None`.
    ///
    /// Targets are compared by identity. Rebinding the current one is free unless
    /// it was resized since it was bound.
    pub fn set_render_target(&mut self, target: Option<SharedRenderTarget>) {
        let binding = target.as_ref().map(|target| {
            let target = target.borrow();
            (target.framebuffer(), target.viewport())
        });
        let same_target = match (&self.current_target, &target) {
            (None, None) => true,
            (Some(current), Some(next)) => Rc::ptr_eq(current, next),
            _ => false,
        };
        self.current_target = target;
        if same_target && binding == self.bound_target {
            return;
        }

        match binding {
            Some((framebuffer, viewport)) => {
                self.device.bind_framebuffer(Some(framebuffer));
                self.device.set_viewport(viewport);
                log::debug!("Render target -> {:?} ({:?})", framebuffer, viewport);
            }
            None => {
                self.device.bind_framebuffer(None);
                self.device.set_viewport(Rect::from_size(self.width, self.height));
                log::debug!("Render target -> default framebuffer");
            }
        }
        self.bound_target = binding;
    }

    /// Record a new default framebuffer size.
    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        if self.current_target.is_none() {
            self.device.set_viewport(Rect::from_size(width, height));
        }
        self.events.emit(&FramebufferResized { width, height });
    }

    pub fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
        self.device.set_clear_color(color);
    }

    pub fn auto_clear(&self) -> bool {
        self.auto_clear
    }

    pub fn set_auto_clear(&mut self, enabled: bool) {
        self.auto_clear = enabled;
    }

    pub fn clear(&mut self, color: bool, depth: bool, stencil: bool) {
        let flags = ClearFlags::from_bools(color, depth, stencil);
        if !flags.is_empty() {
            self.device.clear(flags);
        }
    }

    pub fn set_viewport(&mut self, rect: Rect) {
        self.device.set_viewport(rect);
    }

    pub fn set_scissor(&mut self, rect: Rect) {
        self.device.set_scissor(rect);
    }

    pub fn scissor_test(&self) -> bool {
        self.scissor_test
    }

    pub fn set_scissor_test(&mut self, enabled: bool) {
        self.scissor_test = enabled;
        self.device.set_scissor_test(enabled);
    }

    /// Restore default fixed-function state, plus the configured clear color and
    /// auto-clear.
    pub fn reset_state(&mut self) {
        self.auto_clear = self.config.auto_clear;
        self.set_clear_color(self.config.clear_color);
        PipelineState::default().apply(&mut self.device, false);
        self.set_scissor_test(false);
        let viewport = match self.bound_target {
            Some((_, viewport)) => viewport,
            None => Rect::from_size(self.width, self.height),
        };
        self.device.set_viewport(viewport);
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    /// Draw every visible mesh under `root`, in traversal order.
    ///
    /// Hidden nodes are skipped but their children are still visited.
    pub fn render(&mut self, root: &NodeRef, camera: &dyn CameraView) {
        if self.last_root != Some(root.id()) {
            self.last_root = Some(root.id());
            self.events.emit(&SceneChanged { name: root.name() });
        }

        // Picks up a resize of the bound target.
        self.set_render_target(self.current_target.clone());

        if self.auto_clear {
            self.clear(true, true, true);
        }
        self.frame_uniforms = FrameUniforms::new(&self.frame, camera);

        let mut drawables: Vec<NodeRef> = Vec::new();
        root.traverse(&mut |node| {
            if node.is_visible() && node.is_mesh() {
                drawables.push(Rc::clone(node));
            }
        });

        if let Some(background) = root.background() {
            self.render_background(&background);
        }

        for node in &drawables {
            let model = node.world_matrix();
            if let Some(mesh) = node.mesh_data() {
                self.render_mesh(&mesh, model);
            }
        }
    }

    fn render_background(&mut self, background: &SceneBackground) {
        match background {
            SceneBackground::Color(color) => {
                self.device.set_clear_color(*color);
                self.device.clear(ClearFlags::COLOR);
                self.device.set_clear_color(self.clear_color);
            }
            SceneBackground::CubeMap {
                texture,
                intensity,
                rotation,
                flip,
            } => {
                let Some(skybox) = self.skybox_mesh() else {
                    return;
                };
                if let Some(material) = skybox.material() {
                    let mut material = material.borrow_mut();
                    if let Some(resources) = material.resources_mut::<SkyboxMaterial>() {
                        resources.cube_map = Some(Rc::clone(texture));
                        resources.intensity = *intensity;
                        resources.rotation = *rotation;
                        resources.flip = *flip;
                    }
                }
                self.render_mesh(&skybox, Mat4::IDENTITY);
            }
        }
    }

    /// Cube mesh shared by every skybox draw, created on first use.
    fn skybox_mesh(&mut self) -> Option<Mesh> {
        if self.skybox.is_none() {
            match Geometry::from_positions(
                &mut self.device,
                &SKYBOX_POSITIONS,
                Some(&SKYBOX_INDICES[..]),
            ) {
                Ok(geometry) => {
                    let material = SkyboxMaterial::default().into_material();
                    self.skybox = Some(Mesh::from_parts(geometry, material));
                }
                Err(err) => {
                    log::error!("Failed to create skybox geometry: {}", err);
                    return None;
                }
            }
        }
        self.skybox.clone()
    }

    /// Draw one mesh with the current frame uniforms. Returns whether a draw
    /// call was issued.
    pub fn render_mesh(&mut self, mesh: &Mesh, model: Mat4) -> bool {
        let (Some(geometry), Some(material)) = (mesh.geometry(), mesh.material()) else {
            log::error!("Mesh has no geometry or material, skipping draw");
            return false;
        };
        let geometry = geometry.borrow();
        let material = material.borrow();
        let device: &mut dyn GraphicsDevice = &mut self.device;

        let Some(_) = material.ensure_program(device, &self.preprocessor) else {
            return false;
        };
        material.pipeline().apply(device, mesh.is_wireframe());

        {
            let mut program = material.program().borrow_mut();
            program.use_program(device);
            // TODO: move per-frame values into a uniform block bound once per frame.
            self.frame_uniforms.upload(&mut program, device);
            program.set_uniform(device, "uModel", model);
        }
        material.apply_uniforms_and_resources(device);

        geometry.bind(device);
        let range = geometry.draw_range().as_range();
        let instances = 0..mesh.instance_count();
        if geometry.is_indexed() {
            device.draw_indexed(geometry.topology(), range, 0, instances);
        } else {
            device.draw(geometry.topology(), range, instances);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCommand, HeadlessDevice, PolygonMode};
    use crate::resources::BasicMaterial;
    use crate::scene::{Camera, Node};

    fn renderer() -> Renderer<HeadlessDevice> {
        let mut renderer = Renderer::new(HeadlessDevice::new(), RendererConfig::default());
        renderer.device_mut().clear_commands();
        renderer
    }

    #[test]
    fn test_auto_clear_clears_all_buffers() {
        let mut renderer = renderer();
        renderer.render(&Node::scene("empty"), &Camera::default());
        assert_eq!(
            renderer.device().commands(),
            &[DeviceCommand::Clear(ClearFlags::all())]
        );
    }

    #[test]
    fn test_auto_clear_off() {
        let mut renderer = renderer();
        renderer.set_auto_clear(false);
        renderer.render(&Node::scene("empty"), &Camera::default());
        assert!(renderer.device().commands().is_empty());
    }

    #[test]
    fn test_clear_with_nothing_selected_is_silent() {
        let mut renderer = renderer();
        renderer.clear(false, false, false);
        renderer.clear(true, false, false);
        assert_eq!(
            renderer.device().commands(),
            &[DeviceCommand::Clear(ClearFlags::COLOR)]
        );
    }

    #[test]
    fn test_default_target_restores_viewport() {
        let mut renderer = renderer();
        let target = RenderTarget::create(renderer.device_mut(), 64, 32)
            .unwrap()
            .shared();
        renderer.set_render_target(Some(Rc::clone(&target)));
        renderer.device_mut().clear_commands();

        renderer.set_render_target(None);
        let (width, height) = renderer.framebuffer_size();
        assert_eq!(
            renderer.device().commands(),
            &[
                DeviceCommand::BindFramebuffer(None),
                DeviceCommand::SetViewport(Rect::from_size(width, height)),
            ]
        );
    }

    #[test]
    fn test_resize_emits_event() {
        let mut renderer = renderer();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let sink = std::sync::Arc::clone(&seen);
        let _sub = renderer.events().subscribe(move |e: &FramebufferResized| {
            *sink.lock() = Some((e.width, e.height));
        });

        renderer.set_framebuffer_size(1024, 768);
        renderer.set_framebuffer_size(1024, 768);
        assert_eq!(*seen.lock(), Some((1024, 768)));
        assert_eq!(
            renderer.device().commands(),
            &[DeviceCommand::SetViewport(Rect::from_size(1024, 768))]
        );
    }

    #[test]
    fn test_scene_change_emitted_once_per_root() {
        let mut renderer = renderer();
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&count);
        let _sub = renderer.events().subscribe(move |_: &SceneChanged| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let root = Node::scene("level");
        let camera = Camera::default();
        renderer.render(&root, &camera);
        renderer.render(&root, &camera);
        renderer.render(&Node::scene("other"), &camera);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mesh_without_material_is_skipped() {
        let mut renderer = renderer();
        let geometry = Geometry::from_positions(
            renderer.device_mut(),
            &[Vec3::ZERO, Vec3::X, Vec3::Y],
            None,
        )
        .unwrap();
        let mut mesh = Mesh::default();
        mesh.set_geometry(Some(Rc::new(std::cell::RefCell::new(geometry))));

        assert!(!renderer.render_mesh(&mesh, Mat4::IDENTITY));
        assert!(renderer.device().draw_calls().is_empty());
    }

    #[test]
    fn test_wireframe_sets_line_mode() {
        let mut renderer = renderer();
        let geometry = Geometry::from_positions(
            renderer.device_mut(),
            &[Vec3::ZERO, Vec3::X, Vec3::Y],
            None,
        )
        .unwrap();
        let mut mesh = Mesh::from_parts(geometry, BasicMaterial::default().into_material());
        mesh.set_wireframe(true);

        assert!(renderer.render_mesh(&mesh, Mat4::IDENTITY));
        assert!(renderer
            .device()
            .commands()
            .contains(&DeviceCommand::SetPolygonMode(PolygonMode::Line)));
        assert_eq!(renderer.device().draw_calls().len(), 1);
    }

    #[test]
    fn test_color_background_clears_then_restores() {
        let mut renderer = renderer();
        renderer.set_auto_clear(false);
        let root = Node::scene("bg");
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        root.set_background(Some(SceneBackground::color(red)));

        renderer.render(&root, &Camera::default());
        let clear_color = renderer.clear_color();
        assert_eq!(
            renderer.device().commands(),
            &[
                DeviceCommand::SetClearColor(red),
                DeviceCommand::Clear(ClearFlags::COLOR),
                DeviceCommand::SetClearColor(clear_color),
            ]
        );
    }

    #[test]
    fn test_reset_state_restores_defaults() {
        let mut renderer = renderer();
        renderer.set_scissor_test(true);
        renderer.reset_state();
        assert!(!renderer.scissor_test());
        assert!(renderer
            .device()
            .commands()
            .contains(&DeviceCommand::SetScissorTest(false)));
    }

    #[test]
    fn test_reset_state_restores_configured_clear() {
        let mut renderer = renderer();
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        renderer.set_auto_clear(false);
        renderer.set_clear_color(red);
        renderer.device_mut().clear_commands();

        renderer.reset_state();
        let default_color = Vec4::new(0.07, 0.13, 0.17, 1.0);
        assert!(renderer.auto_clear());
        assert_eq!(renderer.clear_color(), default_color);
        assert!(renderer
            .device()
            .commands()
            .contains(&DeviceCommand::SetClearColor(default_color)));

        renderer.render(&Node::scene("after reset"), &Camera::default());
        assert_eq!(
            renderer.device().commands().last(),
            Some(&DeviceCommand::Clear(ClearFlags::all()))
        );
    }

    #[test]
    fn test_reset_state_uses_custom_config() {
        let config = RendererConfig {
            clear_color: Vec4::ONE,
            auto_clear: false,
            ..Default::default()
        };
        let mut renderer = Renderer::new(HeadlessDevice::new(), config);
        renderer.set_auto_clear(true);
        renderer.set_clear_color(Vec4::ZERO);

        renderer.reset_state();
        assert!(!renderer.auto_clear());
        assert_eq!(renderer.clear_color(), Vec4::ONE);
    }

    #[test]
    fn test_resized_target_rebound_with_new_viewport() {
        let mut renderer = renderer();
        let target = RenderTarget::create(renderer.device_mut(), 64, 64)
            .unwrap()
            .shared();
        renderer.set_render_target(Some(Rc::clone(&target)));

        target
            .borrow_mut()
            .set_size(renderer.device_mut(), 200, 100)
            .unwrap();
        renderer.device_mut().clear_commands();
        renderer.set_auto_clear(false);
        renderer.render(&Node::scene("resized"), &Camera::default());

        let framebuffer = target.borrow().framebuffer();
        assert_eq!(
            renderer.device().commands(),
            &[
                DeviceCommand::BindFramebuffer(Some(framebuffer)),
                DeviceCommand::SetViewport(Rect::from_size(200, 100)),
            ]
        );

        // Bound state now matches, so later frames and rebinds are silent.
        renderer.device_mut().clear_commands();
        renderer.render(&Node::scene("resized"), &Camera::default());
        renderer.set_render_target(Some(Rc::clone(&target)));
        assert!(renderer.device().commands().is_empty());
    }
}

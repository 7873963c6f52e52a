//! Materials: a shared program, fixed-function state and uniform values
//!
//! Typed materials ([`BasicMaterial`], [`SkyboxMaterial`]) plug into [`Material`]
//! through the [`MaterialResources`] hook, which binds their textures to fixed
//! slots and keeps their feature defines in sync with the program.

use std::any::Any;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::{Mat3, Vec3, Vec4};

use crate::backend::{
    BlendState, CompareFunction, CullMode, GraphicsDevice, PolygonMode, ProgramHandle,
    UniformValue,
};
use crate::resources::Texture;
use crate::shader::{Program, ProgramDesc, ShaderPreprocessor, SharedProgram};

/// Fixed texture units
pub mod slots {
    pub const ENV_MAP: u32 = 0;
    pub const CUBE_MAP: u32 = 1;
    pub const COLOR_MAP: u32 = 2;
    pub const ALPHA_MAP: u32 = 3;
}

/// Feature defines toggled by materials
pub mod defines {
    pub const USE_COLORMAP: &str = "USE_COLORMAP";
    pub const USE_ALPHAMAP: &str = "USE_ALPHAMAP";
    pub const USE_ENVMAP: &str = "USE_ENVMAP";
    pub const ENVMODE_REFLECTION: &str = "ENVMODE_REFLECTION";
    pub const USE_FLAT_SHADING: &str = "USE_FLAT_SHADING";
    pub const USE_VERTEX_COLOR: &str = "USE_VERTEX_COLOR";
}

/// Fixed-function state applied before every draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub blend: bool,
    pub cull_mode: CullMode,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::Less,
            blend: false,
            cull_mode: CullMode::Back,
        }
    }
}

impl PipelineState {
    /// Write every piece of state to the device, plus the polygon mode.
    pub fn apply(&self, device: &mut dyn GraphicsDevice, wireframe: bool) {
        device.set_depth_test(self.depth_test.then_some(self.depth_func));
        device.set_depth_write(self.depth_write);
        device.set_blend(self.blend.then(BlendState::alpha_blending));
        device.set_cull_mode(self.cull_mode);
        device.set_polygon_mode(if wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        });
    }
}

/// Per-material resource hook
pub trait MaterialResources: Any {
    /// Bring the program's feature defines in line with this material.
    ///
    /// Called on the first draw and again after each [`Material::resources_mut`].
    fn update_defines(&self, _program: &mut Program) {}

    /// Push material-specific uniforms and bind textures.
    fn apply(&self, program: &mut Program, device: &mut dyn GraphicsDevice);

    fn clone_box(&self) -> Box<dyn MaterialResources>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A material
pub struct Material {
    name: String,
    program: SharedProgram,
    pipeline: PipelineState,
    uniforms: BTreeMap<String, UniformValue>,
    resources: Option<Box<dyn MaterialResources>>,
    /// Bumped whenever the resources may have changed.
    resources_generation: u64,
    /// Generation whose defines were last pushed to the program.
    synced_generation: Cell<Option<u64>>,
}

/// Clones share the program and copy everything else.
impl Clone for Material {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            program: Rc::clone(&self.program),
            pipeline: self.pipeline,
            uniforms: self.uniforms.clone(),
            resources: self.resources.as_ref().map(|r| r.clone_box()),
            resources_generation: self.resources_generation,
            synced_generation: Cell::new(None),
        }
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("program", &self.program.borrow().state())
            .field("pipeline", &self.pipeline)
            .field("uniforms", &self.uniforms)
            .field("resources", &self.resources.is_some())
            .finish()
    }
}

impl Material {
    pub fn new(name: &str, program: SharedProgram) -> Self {
        Self {
            name: name.to_string(),
            program,
            pipeline: PipelineState::default(),
            uniforms: BTreeMap::new(),
            resources: None,
            resources_generation: 0,
            synced_generation: Cell::new(None),
        }
    }

    pub fn from_desc(name: &str, desc: ProgramDesc) -> Self {
        Self::new(name, Program::shared(desc))
    }

    pub fn with_resources(mut self, resources: impl MaterialResources) -> Self {
        self.resources = Some(Box::new(resources));
        self.resources_generation += 1;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineState) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_uniform(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        self.set_uniform(name, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &SharedProgram {
        &self.program
    }

    pub fn resources<T: MaterialResources>(&self) -> Option<&T> {
        self.resources.as_ref()?.as_any().downcast_ref::<T>()
    }

    /// Mutable access to the typed resources. Defines are re-synced on the next draw.
    pub fn resources_mut<T: MaterialResources>(&mut self) -> Option<&mut T> {
        let resources = self.resources.as_mut()?.as_any_mut().downcast_mut::<T>()?;
        self.resources_generation += 1;
        Some(resources)
    }

    // Pipeline state

    pub fn pipeline(&self) -> PipelineState {
        self.pipeline
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.pipeline.depth_test = enabled;
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        self.pipeline.depth_write = enabled;
    }

    pub fn set_depth_func(&mut self, func: CompareFunction) {
        self.pipeline.depth_func = func;
    }

    pub fn set_blend(&mut self, enabled: bool) {
        self.pipeline.blend = enabled;
    }

    pub fn set_cull_face(&mut self, mode: CullMode) {
        self.pipeline.cull_mode = mode;
    }

    // Uniform values

    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.uniforms.insert(name.to_string(), value.into());
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    pub fn remove_uniform(&mut self, name: &str) -> Option<UniformValue> {
        self.uniforms.remove(name)
    }

    pub fn uniforms(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.uniforms.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Add or remove a define on the shared program.
    pub fn set_define(&self, define: &str, enabled: bool) -> bool {
        self.program.borrow_mut().toggle_define(define, enabled)
    }

    pub fn remove_define(&self, define: &str) -> bool {
        self.program.borrow_mut().remove_define(define)
    }

    // Per-draw

    /// Sync defines if the resources changed since the last call, then build the
    /// program if needed.
    ///
    /// Clones sharing a program keep the defines of whichever synced last.
    pub fn ensure_program(
        &self,
        device: &mut dyn GraphicsDevice,
        preprocessor: &ShaderPreprocessor,
    ) -> Option<ProgramHandle> {
        let mut program = self.program.borrow_mut();
        if let Some(resources) = &self.resources {
            if self.synced_generation.get() != Some(self.resources_generation) {
                resources.update_defines(&mut program);
                self.synced_generation.set(Some(self.resources_generation));
            }
        }
        program.ensure_built(device, preprocessor)
    }

    /// Run the resource hook, then push every stored uniform.
    pub fn apply_uniforms_and_resources(&self, device: &mut dyn GraphicsDevice) {
        let mut program = self.program.borrow_mut();
        if let Some(resources) = &self.resources {
            resources.apply(&mut program, device);
        }
        for (name, value) in &self.uniforms {
            program.set_uniform(device, name, *value);
        }
    }

    /// Point a sampler uniform at `slot` and bind the texture there.
    ///
    /// An absent texture is a no-op.
    pub fn bind_texture_unit(
        program: &mut Program,
        device: &mut dyn GraphicsDevice,
        texture: Option<&Texture>,
        uniform: &str,
        slot: u32,
    ) {
        let Some(texture) = texture else {
            return;
        };
        program.set_uniform(device, uniform, slot as i32);
        texture.bind_to_slot(device, slot);
    }
}

// ============================================================================
// Basic material
// ============================================================================

/// How the environment map is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvMode {
    #[default]
    Reflection,
    Refraction,
}

/// Unlit material with optional color, alpha and environment maps
#[derive(Debug, Clone)]
pub struct BasicMaterial {
    pub color: Vec4,
    pub color_map: Option<Rc<Texture>>,
    pub alpha_map: Option<Rc<Texture>>,
    pub env_map: Option<Rc<Texture>>,
    pub env_mode: EnvMode,
    pub reflectivity: f32,
    pub refraction_ratio: f32,
    pub flat_shading: bool,
    pub vertex_colors: bool,
}

impl Default for BasicMaterial {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            color_map: None,
            alpha_map: None,
            env_map: None,
            env_mode: EnvMode::Reflection,
            reflectivity: 1.0,
            refraction_ratio: 0.98,
            flat_shading: false,
            vertex_colors: false,
        }
    }
}

impl BasicMaterial {
    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    pub fn with_rgb(self, rgb: Vec3) -> Self {
        self.with_color(rgb.extend(1.0))
    }

    pub fn with_color_map(mut self, texture: Rc<Texture>) -> Self {
        self.color_map = Some(texture);
        self
    }

    /// Wrap into a [`Material`] running the built-in basic program.
    pub fn into_material(self) -> Material {
        Material::from_desc("basic", ProgramDesc::registry("basic_vert", "basic_frag"))
            .with_resources(self)
    }
}

impl MaterialResources for BasicMaterial {
    fn update_defines(&self, program: &mut Program) {
        program.toggle_define(defines::USE_COLORMAP, self.color_map.is_some());
        program.toggle_define(defines::USE_ALPHAMAP, self.alpha_map.is_some());
        program.toggle_define(defines::USE_ENVMAP, self.env_map.is_some());
        program.toggle_define(
            defines::ENVMODE_REFLECTION,
            self.env_mode == EnvMode::Reflection,
        );
        program.toggle_define(defines::USE_FLAT_SHADING, self.flat_shading);
        program.toggle_define(defines::USE_VERTEX_COLOR, self.vertex_colors);
    }

    fn apply(&self, program: &mut Program, device: &mut dyn GraphicsDevice) {
        program.set_uniform(device, "uColor", self.color);
        program.set_uniform(device, "uReflectivity", self.reflectivity);
        program.set_uniform(device, "uRefractionRatio", self.refraction_ratio);

        Material::bind_texture_unit(
            program,
            device,
            self.color_map.as_deref(),
            "uColorMap",
            slots::COLOR_MAP,
        );
        Material::bind_texture_unit(
            program,
            device,
            self.alpha_map.as_deref(),
            "uAlphaMap",
            slots::ALPHA_MAP,
        );
        Material::bind_texture_unit(
            program,
            device,
            self.env_map.as_deref(),
            "uEnvMap",
            slots::ENV_MAP,
        );
    }

    fn clone_box(&self) -> Box<dyn MaterialResources> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Skybox material
// ============================================================================

/// Cube map background drawn behind everything else
#[derive(Debug, Clone)]
pub struct SkyboxMaterial {
    pub cube_map: Option<Rc<Texture>>,
    pub rotation: Mat3,
    pub flip: bool,
    pub intensity: f32,
}

impl Default for SkyboxMaterial {
    fn default() -> Self {
        Self {
            cube_map: None,
            rotation: Mat3::IDENTITY,
            flip: false,
            intensity: 1.0,
        }
    }
}

impl SkyboxMaterial {
    /// Front faces culled, depth tested with `LessEqual`, depth writes off.
    pub fn pipeline() -> PipelineState {
        PipelineState {
            depth_test: true,
            depth_write: false,
            depth_func: CompareFunction::LessEqual,
            blend: false,
            cull_mode: CullMode::Front,
        }
    }

    pub fn into_material(self) -> Material {
        let desc = ProgramDesc::registry("skybox_vert", "skybox_frag");
        Material::from_desc("skybox", desc)
            .with_pipeline(Self::pipeline())
            .with_resources(self)
    }
}

impl MaterialResources for SkyboxMaterial {
    fn apply(&self, program: &mut Program, device: &mut dyn GraphicsDevice) {
        program.set_uniform(device, "uCubeMapRotation", self.rotation);
        let flip = if self.flip { -1.0f32 } else { 1.0 };
        program.set_uniform(device, "uFlipCubeMap", flip);
        program.set_uniform(device, "uIntensity", self.intensity);

        Material::bind_texture_unit(
            program,
            device,
            self.cube_map.as_deref(),
            "uCubeMap",
            slots::CUBE_MAP,
        );
    }

    fn clone_box(&self) -> Box<dyn MaterialResources> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCommand, HeadlessDevice, TextureTarget};
    use defines::*;

    fn built(material: &Material, device: &mut HeadlessDevice) {
        let pre = ShaderPreprocessor::default();
        material.ensure_program(device, &pre).unwrap();
        material.program().borrow().use_program(device);
    }

    #[test]
    fn test_pipeline_defaults() {
        let state = PipelineState::default();
        assert!(state.depth_test);
        assert!(state.depth_write);
        assert!(!state.blend);
        assert_eq!(state.cull_mode, CullMode::Back);
        assert_eq!(state.depth_func, CompareFunction::Less);
    }

    #[test]
    fn test_pipeline_setters_leave_program_alone() {
        let mut material = BasicMaterial::default().into_material();
        material.set_blend(true);
        material.set_cull_face(CullMode::None);
        material.set_depth_write(false);

        assert!(material.pipeline().blend);
        assert_eq!(material.pipeline().cull_mode, CullMode::None);
        assert!(material.program().borrow().needs_rebuild());
        assert_eq!(material.program().borrow().build_count(), 0);
    }

    #[test]
    fn test_clone_shares_program_but_not_values() {
        let mut original = BasicMaterial::default()
            .into_material()
            .with_uniform("uTint", 1.0f32);
        let mut copy = original.clone();

        assert!(Rc::ptr_eq(original.program(), copy.program()));
        copy.set_uniform("uTint", 2.0f32);
        copy.set_depth_test(false);
        original.set_blend(true);

        assert_eq!(original.uniform("uTint"), Some(UniformValue::Float(1.0)));
        assert!(original.pipeline().depth_test);
        assert!(!copy.pipeline().blend);
    }

    #[test]
    fn test_absent_texture_binds_nothing() {
        let mut device = HeadlessDevice::new();
        let material = BasicMaterial::default().into_material();
        built(&material, &mut device);
        device.clear_commands();

        material.apply_uniforms_and_resources(&mut device);
        assert!(!device
            .commands()
            .iter()
            .any(|c| matches!(c, DeviceCommand::BindTexture { .. })));
        assert_eq!(
            device.uniform_uploads("uColor"),
            vec![UniformValue::Vec4(Vec4::ONE)]
        );
    }

    #[test]
    fn test_color_map_sets_define_and_binds_slot() {
        let mut device = HeadlessDevice::new();
        let texture = Rc::new(Texture::create_2d(&mut device, "albedo", 4, 4).unwrap());
        let material = BasicMaterial::default()
            .with_color_map(Rc::clone(&texture))
            .into_material();
        built(&material, &mut device);
        assert!(material.program().borrow().has_define(USE_COLORMAP));
        device.clear_commands();

        material.apply_uniforms_and_resources(&mut device);
        assert!(device.commands().contains(&DeviceCommand::BindTexture {
            unit: slots::COLOR_MAP,
            target: TextureTarget::Texture2D,
            texture: texture.id(),
        }));
        assert_eq!(
            device.uniform_uploads("uColorMap"),
            vec![UniformValue::Int(slots::COLOR_MAP as i32)]
        );
    }

    #[test]
    fn test_clearing_color_map_triggers_rebuild() {
        let mut device = HeadlessDevice::new();
        let pre = ShaderPreprocessor::default();
        let texture = Rc::new(Texture::create_2d(&mut device, "albedo", 4, 4).unwrap());
        let mut material = BasicMaterial::default()
            .with_color_map(texture)
            .into_material();
        material.ensure_program(&mut device, &pre).unwrap();

        let resources = material.resources_mut::<BasicMaterial>().unwrap();
        resources.color_map = None;
        material.ensure_program(&mut device, &pre).unwrap();
        let program = material.program().borrow();
        assert!(!program.has_define(defines::USE_COLORMAP));
        assert_eq!(program.build_count(), 2);
    }

    #[test]
    fn test_differing_clones_do_not_rebuild_every_draw() {
        let mut device = HeadlessDevice::new();
        let pre = ShaderPreprocessor::default();
        let texture = Rc::new(Texture::create_2d(&mut device, "albedo", 4, 4).unwrap());
        let textured = BasicMaterial::default()
            .with_color_map(texture)
            .into_material();
        let mut plain = textured.clone();
        let resources = plain.resources_mut::<BasicMaterial>().unwrap();
        resources.color_map = None;

        for _ in 0..10 {
            textured.ensure_program(&mut device, &pre).unwrap();
            plain.ensure_program(&mut device, &pre).unwrap();
        }
        assert_eq!(textured.program().borrow().build_count(), 2);
    }

    #[test]
    fn test_defines_synced_only_after_resource_change() {
        let mut device = HeadlessDevice::new();
        let pre = ShaderPreprocessor::default();
        let mut material = BasicMaterial::default().into_material();
        material.ensure_program(&mut device, &pre).unwrap();

        // A define set by hand survives draws until the resources change.
        material.set_define(defines::USE_FLAT_SHADING, true);
        material.ensure_program(&mut device, &pre).unwrap();
        assert!(material.program().borrow().has_define(USE_FLAT_SHADING));

        let resources = material.resources_mut::<BasicMaterial>().unwrap();
        resources.vertex_colors = true;
        material.ensure_program(&mut device, &pre).unwrap();
        let program = material.program().borrow();
        assert!(!program.has_define(defines::USE_FLAT_SHADING));
        assert!(program.has_define(defines::USE_VERTEX_COLOR));
        assert_eq!(program.build_count(), 3);
    }

    #[test]
    fn test_material_uniforms_pushed_after_resources() {
        let mut device = HeadlessDevice::new();
        let material = BasicMaterial::default()
            .into_material()
            .with_uniform("uColor", Vec4::new(1.0, 0.0, 0.0, 1.0));
        built(&material, &mut device);
        device.clear_commands();

        material.apply_uniforms_and_resources(&mut device);
        assert_eq!(
            device.uniform_uploads("uColor"),
            vec![
                UniformValue::Vec4(Vec4::ONE),
                UniformValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0)),
            ]
        );
    }

    #[test]
    fn test_skybox_pipeline_and_uniforms() {
        let mut device = HeadlessDevice::new();
        let cube = Rc::new(Texture::create_cube(&mut device, "sky", 16).unwrap());
        let material = SkyboxMaterial {
            cube_map: Some(Rc::clone(&cube)),
            flip: true,
            intensity: 0.5,
            ..Default::default()
        }
        .into_material();

        assert_eq!(material.pipeline(), SkyboxMaterial::pipeline());
        built(&material, &mut device);
        device.clear_commands();

        material.apply_uniforms_and_resources(&mut device);
        assert_eq!(
            device.uniform_uploads("uFlipCubeMap"),
            vec![UniformValue::Float(-1.0)]
        );
        assert_eq!(
            device.uniform_uploads("uIntensity"),
            vec![UniformValue::Float(0.5)]
        );
        assert!(device.commands().contains(&DeviceCommand::BindTexture {
            unit: slots::CUBE_MAP,
            target: TextureTarget::CubeMap,
            texture: cube.id(),
        }));
    }

    #[test]
    fn test_pipeline_apply_writes_everything() {
        let mut device = HeadlessDevice::new();
        PipelineState {
            blend: true,
            ..Default::default()
        }
        .apply(&mut device, true);

        assert_eq!(
            device.commands(),
            &[
                DeviceCommand::SetDepthTest(Some(CompareFunction::Less)),
                DeviceCommand::SetDepthWrite(true),
                DeviceCommand::SetBlend(Some(BlendState::alpha_blending())),
                DeviceCommand::SetCullMode(CullMode::Back),
                DeviceCommand::SetPolygonMode(PolygonMode::Line),
            ]
        );
    }
}

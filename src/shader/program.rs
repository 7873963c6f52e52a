//! Shader programs with deferred builds
//!
//! A [`Program`] describes its stage sources and defines but does not touch the
//! device until it is first needed. Changing the define set moves a built program
//! to [`ProgramState::PendingRebuild`]; the next [`Program::ensure_built`] call
//! recompiles, swaps the handle and drops the uniform location cache.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use thiserror::Error;

use super::preprocessor::{
    IncludeMode, IncludeWarning, PreprocessOptions, ShaderPreprocessor, DEFAULT_GLSL_VERSION,
};
use crate::backend::{
    BackendError, GraphicsDevice, ProgramHandle, ShaderHandle, ShaderStage, UniformLocation,
    UniformValue,
};

pub type SharedProgram = Rc<RefCell<Program>>;

/// Program build error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgramError {
    #[error("Program is missing the required {0} stage")]
    MissingStage(ShaderStage),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// How stage strings are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Stage strings are GLSL text; includes resolve from the registry
    #[default]
    Inline,
    /// Stage strings are registry names
    Registry,
    /// Stage strings are storage paths; includes may resolve from storage
    File,
}

impl SourceKind {
    fn include_mode(&self) -> IncludeMode {
        match self {
            SourceKind::Inline | SourceKind::Registry => IncludeMode::RegistryOnly,
            SourceKind::File => IncludeMode::Mixed,
        }
    }
}

/// Program description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDesc {
    pub vertex: String,
    pub fragment: String,
    pub tess_control: String,
    pub tess_evaluation: String,
    pub defines: Vec<String>,
    pub glsl_version: String,
    pub kind: SourceKind,
}

impl Default for ProgramDesc {
    fn default() -> Self {
        Self {
            vertex: String::new(),
            fragment: String::new(),
            tess_control: String::new(),
            tess_evaluation: String::new(),
            defines: Vec::new(),
            glsl_version: DEFAULT_GLSL_VERSION.to_string(),
            kind: SourceKind::Inline,
        }
    }
}

impl ProgramDesc {
    fn with_stages(kind: SourceKind, vertex: &str, fragment: &str) -> Self {
        Self {
            vertex: vertex.to_string(),
            fragment: fragment.to_string(),
            kind,
            ..Default::default()
        }
    }

    pub fn inline(vertex: &str, fragment: &str) -> Self {
        Self::with_stages(SourceKind::Inline, vertex, fragment)
    }

    pub fn registry(vertex: &str, fragment: &str) -> Self {
        Self::with_stages(SourceKind::Registry, vertex, fragment)
    }

    pub fn files(vertex: &str, fragment: &str) -> Self {
        Self::with_stages(SourceKind::File, vertex, fragment)
    }

    pub fn with_tessellation(mut self, control: &str, evaluation: &str) -> Self {
        self.tess_control = control.to_string();
        self.tess_evaluation = evaluation.to_string();
        self
    }

    pub fn with_define(mut self, define: &str) -> Self {
        self.defines.push(define.to_string());
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.glsl_version = version.to_string();
        self
    }
}

/// Build state of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    /// Never built
    Unbuilt,
    /// Linked and current
    Built(ProgramHandle),
    /// Linked, but the description changed since
    PendingRebuild(ProgramHandle),
    /// Last build failed; stays failed until marked for rebuild
    Failed,
}

/// A shader program
#[derive(Debug)]
pub struct Program {
    stages: [(ShaderStage, String); 4],
    defines: BTreeSet<String>,
    glsl_version: String,
    kind: SourceKind,
    state: ProgramState,
    uniform_cache: HashMap<String, Option<UniformLocation>>,
    build_count: u32,
    last_error: Option<ProgramError>,
    include_warnings: Vec<IncludeWarning>,
}

fn normalize_define(define: &str) -> Option<String> {
    let define = define.trim();
    (!define.is_empty()).then(|| define.to_string())
}

impl Program {
    pub fn new(desc: ProgramDesc) -> Self {
        Self {
            stages: [
                (ShaderStage::Vertex, desc.vertex),
                (ShaderStage::Fragment, desc.fragment),
                (ShaderStage::TessControl, desc.tess_control),
                (ShaderStage::TessEvaluation, desc.tess_evaluation),
            ],
            defines: desc
                .defines
                .iter()
                .filter_map(|d| normalize_define(d))
                .collect(),
            glsl_version: desc.glsl_version,
            kind: desc.kind,
            state: ProgramState::Unbuilt,
            uniform_cache: HashMap::new(),
            build_count: 0,
            last_error: None,
            include_warnings: Vec::new(),
        }
    }

    pub fn shared(desc: ProgramDesc) -> SharedProgram {
        Rc::new(RefCell::new(Self::new(desc)))
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Current device handle, if one exists (possibly stale).
    pub fn handle(&self) -> Option<ProgramHandle> {
        match self.state {
            ProgramState::Built(handle) | ProgramState::PendingRebuild(handle) => Some(handle),
            ProgramState::Unbuilt | ProgramState::Failed => None,
        }
    }

    pub fn needs_rebuild(&self) -> bool {
        matches!(
            self.state,
            ProgramState::Unbuilt | ProgramState::PendingRebuild(_)
        )
    }

    pub fn is_failed(&self) -> bool {
        self.state == ProgramState::Failed
    }

    /// Number of successful builds so far.
    pub fn build_count(&self) -> u32 {
        self.build_count
    }

    pub fn last_error(&self) -> Option<&ProgramError> {
        self.last_error.as_ref()
    }

    /// Include warnings from the most recent build.
    pub fn include_warnings(&self) -> &[IncludeWarning] {
        &self.include_warnings
    }

    /// Request a rebuild on next use. A failed program becomes eligible to retry.
    pub fn mark_needs_rebuild(&mut self) {
        self.state = match self.state {
            ProgramState::Built(handle) => ProgramState::PendingRebuild(handle),
            ProgramState::Failed => ProgramState::Unbuilt,
            other => other,
        };
    }

    // ------------------------------------------------------------------
    // Defines
    // ------------------------------------------------------------------

    pub fn defines(&self) -> impl Iterator<Item = &str> {
        self.defines.iter().map(String::as_str)
    }

    pub fn has_define(&self, define: &str) -> bool {
        self.defines.contains(define.trim())
    }

    /// Add a define. Returns `true` if the set changed.
    pub fn set_define(&mut self, define: &str) -> bool {
        let Some(define) = normalize_define(define) else {
            return false;
        };
        let changed = self.defines.insert(define);
        if changed {
            self.mark_needs_rebuild();
        }
        changed
    }

    /// Remove a define. Returns `true` if the set changed.
    pub fn remove_define(&mut self, define: &str) -> bool {
        let changed = self.defines.remove(define.trim());
        if changed {
            self.mark_needs_rebuild();
        }
        changed
    }

    /// Add or remove a define depending on `enabled`.
    pub fn toggle_define(&mut self, define: &str, enabled: bool) -> bool {
        if enabled {
            self.set_define(define)
        } else {
            self.remove_define(define)
        }
    }

    /// Replace the whole define set. Order and duplicates are irrelevant.
    pub fn set_defines<I, S>(&mut self, defines: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next: BTreeSet<String> = defines
            .into_iter()
            .filter_map(|d| normalize_define(d.as_ref()))
            .collect();
        if next == self.defines {
            return false;
        }
        self.defines = next;
        self.mark_needs_rebuild();
        true
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    /// Build if needed and return the usable handle.
    ///
    /// Returns `None` while the program is failed. Build errors are logged, never
    /// returned.
    pub fn ensure_built(
        &mut self,
        device: &mut dyn GraphicsDevice,
        preprocessor: &ShaderPreprocessor,
    ) -> Option<ProgramHandle> {
        match self.state {
            ProgramState::Built(handle) => return Some(handle),
            ProgramState::Failed => return None,
            ProgramState::Unbuilt | ProgramState::PendingRebuild(_) => {}
        }

        let previous = self.handle();
        let result = self.build(device, preprocessor);
        if let Some(old) = previous {
            device.delete_program(old);
        }
        self.uniform_cache.clear();

        match result {
            Ok(handle) => {
                self.build_count += 1;
                self.last_error = None;
                self.state = ProgramState::Built(handle);
                log::debug!(
                    "Program {:?} built (defines: {:?})",
                    handle,
                    self.defines
                );
                Some(handle)
            }
            Err(err) => {
                match &err {
                    ProgramError::Backend(BackendError::ShaderCompilationFailed {
                        stage,
                        log: diagnostic,
                    }) => log::error!("{} Shader compile error:\n{}", stage, diagnostic),
                    other => log::error!("Program build failed: {}", other),
                }
                self.last_error = Some(err);
                self.state = ProgramState::Failed;
                None
            }
        }
    }

    fn build(
        &mut self,
        device: &mut dyn GraphicsDevice,
        preprocessor: &ShaderPreprocessor,
    ) -> Result<ProgramHandle, ProgramError> {
        self.include_warnings.clear();

        for required in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if self.stage_source(required).is_empty() {
                return Err(ProgramError::MissingStage(required));
            }
        }
        let has_control = !self.stage_source(ShaderStage::TessControl).is_empty();
        let has_evaluation = !self.stage_source(ShaderStage::TessEvaluation).is_empty();
        let use_tessellation = has_control && has_evaluation;
        if has_control != has_evaluation {
            log::warn!("Incomplete tessellation stage pair, skipping both");
        }

        let options = PreprocessOptions {
            glsl_version: self.glsl_version.clone(),
            defines: self.defines.iter().cloned().collect(),
            mode: self.kind.include_mode(),
        };

        let mut shaders: Vec<ShaderHandle> = Vec::with_capacity(4);
        let mut result = Ok(());
        for (stage, source) in &self.stages {
            if source.is_empty() {
                continue;
            }
            let is_tessellation = matches!(
                stage,
                ShaderStage::TessControl | ShaderStage::TessEvaluation
            );
            if is_tessellation && !use_tessellation {
                continue;
            }

            let output = match self.kind {
                SourceKind::Inline => preprocessor.process_source(source, "", &options),
                SourceKind::Registry => preprocessor.process_registry(source, &options),
                SourceKind::File => preprocessor.process_file(source, &options),
            };
            self.include_warnings.extend(output.warnings);

            match device.compile_shader(*stage, &output.source) {
                Ok(shader) => shaders.push(shader),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        let linked = result.and_then(|()| device.link_program(&shaders));
        for shader in shaders {
            device.delete_shader(shader);
        }
        Ok(linked?)
    }

    fn stage_source(&self, stage: ShaderStage) -> &str {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, source)| source.as_str())
            .unwrap_or("")
    }

    /// Release the device program. The program can be built again later.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(handle) = self.handle() {
            device.delete_program(handle);
        }
        self.uniform_cache.clear();
        self.state = ProgramState::Unbuilt;
    }

    // ------------------------------------------------------------------
    // Uniforms
    // ------------------------------------------------------------------

    pub fn use_program(&self, device: &mut dyn GraphicsDevice) {
        if let ProgramState::Built(handle) = self.state {
            device.use_program(handle);
        }
    }

    /// Memoized location lookup. Misses are cached too.
    pub fn uniform_location(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
    ) -> Option<UniformLocation> {
        let ProgramState::Built(handle) = self.state else {
            return None;
        };
        if let Some(cached) = self.uniform_cache.get(name) {
            return *cached;
        }
        let location = device.uniform_location(handle, name);
        self.uniform_cache.insert(name.to_string(), location);
        location
    }

    pub fn cached_uniform_count(&self) -> usize {
        self.uniform_cache.len()
    }

    /// Upload a uniform. Unknown names are ignored.
    pub fn set_uniform(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        value: impl Into<UniformValue>,
    ) {
        if let Some(location) = self.uniform_location(device, name) {
            device.set_uniform(location, &value.into());
        }
    }

    /// Bind a named uniform block to a binding point. Returns `false` when the
    /// block does not exist.
    pub fn link_uniform_block(
        &self,
        device: &mut dyn GraphicsDevice,
        block: &str,
        binding: u32,
    ) -> bool {
        let ProgramState::Built(handle) = self.state else {
            log::warn!("Program not built, cannot link uniform block '{}'", block);
            return false;
        };
        match device.uniform_block_index(handle, block) {
            Some(index) => {
                device.bind_uniform_block(handle, index, binding);
                log::debug!(
                    "Program {:?} link UBO '{}' -> binding={}",
                    handle,
                    block,
                    binding
                );
                true
            }
            None => {
                log::warn!("Program {:?} UBO not found: '{}'", handle, block);
                false
            }
        }
    }
}

//! `#include` expansion over the registry and a storage backend
//!
//! One recursive expansion serves both backends. Each include name is looked up
//! in the registry first; in [`IncludeMode::Mixed`] a registry miss falls back to
//! storage, resolving the name against the including file's directory.
//!
//! Every consumed include is recorded under a namespaced key
//! (`registry://name` or `file://normalized/path`). A second request for the same
//! key is dropped with a warning, which also stops include cycles.

use std::collections::HashSet;

use super::registry::ShaderRegistry;
use super::storage::{join_path, normalize_path, parent_dir, MemoryStorage, ShaderStorage};

const SEEN_REGISTRY_PREFIX: &str = "registry://";
const SEEN_FILE_PREFIX: &str = "file://";

/// Default GLSL version header.
pub const DEFAULT_GLSL_VERSION: &str = "450 core";

/// Where include names may resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeMode {
    /// Registry first, then storage relative to the including file
    #[default]
    Mixed,
    /// Registry only; misses are skipped
    RegistryOnly,
}

/// Header and mode for one expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Emitted as `#version <glsl_version>`; nothing when empty
    pub glsl_version: String,
    /// Emitted as one `#define` line each, in order
    pub defines: Vec<String>,
    pub mode: IncludeMode,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            glsl_version: DEFAULT_GLSL_VERSION.to_string(),
            defines: Vec::new(),
            mode: IncludeMode::default(),
        }
    }
}

impl PreprocessOptions {
    pub fn with_defines<I, S>(mut self, defines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defines = defines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: IncludeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.glsl_version = version.into();
        self
    }
}

/// Non-fatal problem hit during expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeWarning {
    /// Include already consumed in this expansion
    Duplicate(String),
    /// Name not in the registry while in registry-only mode
    NotInRegistry(String),
    /// Storage read failed
    Unreadable { path: String, reason: String },
    /// Top-level registry name or file could not be found
    MissingSource(String),
}

impl std::fmt::Display for IncludeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncludeWarning::Duplicate(key) => {
                write!(f, "include suppressed (already included once): {}", key)
            }
            IncludeWarning::NotInRegistry(name) => {
                write!(f, "include '{}' not found in registry; skipping", name)
            }
            IncludeWarning::Unreadable { path, reason } => {
                write!(f, "include '{}' could not be read: {}", path, reason)
            }
            IncludeWarning::MissingSource(name) => write!(f, "source '{}' not found", name),
        }
    }
}

/// Flattened shader text plus the warnings produced on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessOutput {
    pub source: String,
    pub warnings: Vec<IncludeWarning>,
}

/// Parse `#include "name"`. Lines without two quotes around a non-empty name
/// are not include directives.
fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#include")?;
    let first = rest.find('"')?;
    let after = &rest[first + 1..];
    let last = after.find('"')?;
    if last == 0 {
        return None;
    }
    Some(&after[..last])
}

/// Shader source preprocessor
pub struct ShaderPreprocessor {
    registry: ShaderRegistry,
    storage: Box<dyn ShaderStorage>,
}

impl Default for ShaderPreprocessor {
    fn default() -> Self {
        Self::new(ShaderRegistry::with_builtins(), MemoryStorage::new())
    }
}

impl ShaderPreprocessor {
    pub fn new(registry: ShaderRegistry, storage: impl ShaderStorage + 'static) -> Self {
        Self {
            registry,
            storage: Box::new(storage),
        }
    }

    pub fn registry(&self) -> &ShaderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ShaderRegistry {
        &mut self.registry
    }

    pub fn set_storage(&mut self, storage: impl ShaderStorage + 'static) {
        self.storage = Box::new(storage);
    }

    /// Expand an inline source. Relative file includes resolve against `current_dir`.
    pub fn process_source(
        &self,
        source: &str,
        current_dir: &str,
        options: &PreprocessOptions,
    ) -> PreprocessOutput {
        log::trace!("ShaderPreprocessor processing source");
        let mut expansion = Expansion::new(self, options);
        expansion.write_header();
        expansion.expand(source, current_dir);
        expansion.finish()
    }

    /// Expand a registered source. A missing name yields an empty result.
    pub fn process_registry(&self, name: &str, options: &PreprocessOptions) -> PreprocessOutput {
        log::trace!("ShaderPreprocessor processing registry({})", name);
        let Some(source) = self.registry.find(name) else {
            log::error!("ShaderPreprocessor '{}' not found in registry", name);
            return PreprocessOutput {
                source: String::new(),
                warnings: vec![IncludeWarning::MissingSource(name.to_string())],
            };
        };
        let mut expansion = Expansion::new(self, options);
        expansion
            .seen
            .insert(format!("{}{}", SEEN_REGISTRY_PREFIX, name));
        expansion.write_header();
        expansion.expand(source, "");
        expansion.finish()
    }

    /// Expand a file read from storage. Includes resolve against its directory.
    pub fn process_file(&self, path: &str, options: &PreprocessOptions) -> PreprocessOutput {
        log::trace!("ShaderPreprocessor processing file({})", path);
        let path = normalize_path(path);
        let source = match self.storage.read_text(&path) {
            Ok(source) => source,
            Err(err) => {
                log::error!("ShaderPreprocessor failed to read '{}': {}", path, err);
                return PreprocessOutput {
                    source: String::new(),
                    warnings: vec![IncludeWarning::MissingSource(path)],
                };
            }
        };
        let mut expansion = Expansion::new(self, options);
        expansion
            .seen
            .insert(format!("{}{}", SEEN_FILE_PREFIX, path));
        expansion.write_header();
        expansion.expand(&source, parent_dir(&path));
        expansion.finish()
    }
}

/// State of one top-level expansion.
struct Expansion<'a> {
    preprocessor: &'a ShaderPreprocessor,
    options: &'a PreprocessOptions,
    seen: HashSet<String>,
    warnings: Vec<IncludeWarning>,
    out: String,
}

impl<'a> Expansion<'a> {
    fn new(preprocessor: &'a ShaderPreprocessor, options: &'a PreprocessOptions) -> Self {
        Self {
            preprocessor,
            options,
            seen: HashSet::new(),
            warnings: Vec::new(),
            out: String::new(),
        }
    }

    fn write_header(&mut self) {
        if !self.options.glsl_version.is_empty() {
            self.out.push_str("#version ");
            self.out.push_str(&self.options.glsl_version);
            self.out.push('\n');
        }
        for define in &self.options.defines {
            self.out.push_str("#define ");
            self.out.push_str(define);
            self.out.push('\n');
        }
    }

    fn warn(&mut self, warning: IncludeWarning) {
        log::warn!("Shader {}", warning);
        self.warnings.push(warning);
    }

    fn expand(&mut self, source: &str, current_dir: &str) {
        let preprocessor = self.preprocessor;
        for line in source.lines() {
            let Some(name) = parse_include(line) else {
                self.out.push_str(line);
                self.out.push('\n');
                continue;
            };

            if let Some(included) = preprocessor.registry.find(name) {
                let key = format!("{}{}", SEEN_REGISTRY_PREFIX, name);
                if !self.seen.insert(key.clone()) {
                    self.warn(IncludeWarning::Duplicate(key));
                    continue;
                }
                self.expand(included, "");
                self.out.push('\n');
                continue;
            }

            if self.options.mode == IncludeMode::RegistryOnly {
                self.warn(IncludeWarning::NotInRegistry(name.to_string()));
                continue;
            }

            let path = join_path(current_dir, name);
            let key = format!("{}{}", SEEN_FILE_PREFIX, path);
            if !self.seen.insert(key.clone()) {
                self.warn(IncludeWarning::Duplicate(key));
                continue;
            }
            match preprocessor.storage.read_text(&path) {
                Ok(text) => {
                    self.expand(&text, parent_dir(&path));
                    self.out.push('\n');
                }
                Err(err) => self.warn(IncludeWarning::Unreadable {
                    path,
                    reason: err.to_string(),
                }),
            }
        }
    }

    fn finish(self) -> PreprocessOutput {
        PreprocessOutput {
            source: self.out,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn options() -> PreprocessOptions {
        PreprocessOptions::default().with_version("")
    }

    fn preprocessor() -> ShaderPreprocessor {
        let registry = ShaderRegistry::empty()
            .with_source("common", "float common_fn();")
            .with_source("nested", "#include \"common\"\nfloat nested_fn();");
        let storage = MemoryStorage::new()
            .with_file(
                "shaders/main.frag",
                "#include \"lib/light.glsl\"\nvoid main() {}",
            )
            .with_file(
                "shaders/lib/light.glsl",
                "#include \"../util.glsl\"\nfloat light();",
            )
            .with_file("shaders/util.glsl", "float util();")
            .with_file("shaders/loop_a.glsl", "#include \"loop_b.glsl\"\nA")
            .with_file("shaders/loop_b.glsl", "#include \"loop_a.glsl\"\nB");
        ShaderPreprocessor::new(registry, storage)
    }

    #[rstest]
    #[case("#include \"common\"", Some("common"))]
    #[case("  #include \"a/b.glsl\" // note", Some("a/b.glsl"))]
    #[case("#include <common>", None)]
    #[case("#include \"\"", None)]
    #[case("#include \"open", None)]
    #[case("// #include \"common\"", None)]
    fn test_parse_include(#[case] line: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_include(line), expected);
    }

    #[test]
    fn test_header_written_once() {
        let pre = preprocessor();
        let opts = PreprocessOptions::default()
            .with_defines(["USE_A", "USE_B"])
            .with_mode(IncludeMode::RegistryOnly);
        let out = pre.process_source("#include \"nested\"\nvoid main() {}", "", &opts);

        let header = "#version 450 core\n#define USE_A\n#define USE_B\n";
        assert!(out.source.starts_with(header));
        assert_eq!(out.source.matches("#version").count(), 1);
        assert_eq!(out.source.matches("#define USE_A").count(), 1);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_plain_lines_preserved() {
        let pre = preprocessor();
        let out = pre.process_source("a\n\nb", "", &options());
        assert_eq!(out.source, "a\n\nb\n");
    }

    #[test]
    fn test_registry_include_inlined_with_trailing_newline() {
        let pre = preprocessor();
        let out = pre.process_source("#include \"common\"\nvoid main() {}", "", &options());
        assert_eq!(out.source, "float common_fn();\n\nvoid main() {}\n");
    }

    #[test]
    fn test_duplicate_registry_include_suppressed() {
        let pre = preprocessor();
        let out = pre.process_source(
            "#include \"common\"\n#include \"common\"\nvoid main() {}",
            "",
            &options(),
        );

        assert_eq!(out.source.matches("float common_fn();").count(), 1);
        assert_eq!(
            out.warnings,
            vec![IncludeWarning::Duplicate("registry://common".to_string())]
        );
    }

    #[test]
    fn test_nested_duplicate_suppressed() {
        let pre = preprocessor();
        let out = pre.process_source("#include \"nested\"\n#include \"common\"", "", &options());
        assert_eq!(out.source.matches("float common_fn();").count(), 1);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_registry_only_skips_misses() {
        let pre = preprocessor();
        let opts = options().with_mode(IncludeMode::RegistryOnly);
        let out = pre.process_source("#include \"shaders/util.glsl\"\nx", "", &opts);

        assert_eq!(out.source, "x\n");
        assert_eq!(
            out.warnings,
            vec![IncludeWarning::NotInRegistry("shaders/util.glsl".into())]
        );
    }

    #[test]
    fn test_file_includes_resolve_relative_to_includer() {
        let pre = preprocessor();
        let out = pre.process_file("shaders/main.frag", &options());

        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        let util = out.source.find("float util();").unwrap();
        let light = out.source.find("float light();").unwrap();
        let main = out.source.find("void main()").unwrap();
        assert!(util < light && light < main);
    }

    #[test]
    fn test_different_spellings_same_file() {
        let pre = preprocessor();
        let out = pre.process_source(
            "#include \"util.glsl\"\n#include \"lib/../util.glsl\"\n#include \"./util.glsl\"",
            "shaders",
            &options(),
        );
        assert_eq!(out.source.matches("float util();").count(), 1);
        assert_eq!(out.warnings.len(), 2);
        let duplicate = IncludeWarning::Duplicate("file://shaders/util.glsl".into());
        assert!(out.warnings.iter().all(|w| *w == duplicate));
    }

    #[test]
    fn test_include_cycle_terminates() {
        let pre = preprocessor();
        let out = pre.process_file("shaders/loop_a.glsl", &options());

        assert_eq!(out.source.matches('A').count(), 1);
        assert_eq!(out.source.matches('B').count(), 1);
        let duplicate = IncludeWarning::Duplicate("file://shaders/loop_a.glsl".into());
        assert_eq!(out.warnings, vec![duplicate]);
    }

    #[test]
    fn test_unreadable_include_warns() {
        let pre = preprocessor();
        let out = pre.process_source("#include \"missing.glsl\"\nx", "shaders", &options());
        assert_eq!(out.source, "x\n");
        assert!(matches!(
            out.warnings.as_slice(),
            [IncludeWarning::Unreadable { path, .. }] if path == "shaders/missing.glsl"
        ));
    }

    #[test]
    fn test_missing_top_level_sources() {
        let pre = preprocessor();
        let out = pre.process_registry("nope", &options());
        assert!(out.source.is_empty());
        assert_eq!(
            out.warnings,
            vec![IncludeWarning::MissingSource("nope".into())]
        );

        let out = pre.process_file("shaders/nope.glsl", &options());
        assert!(out.source.is_empty());
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_process_registry_expands_nested() {
        let pre = preprocessor();
        let out = pre.process_registry("nested", &options());
        assert_eq!(out.source, "float common_fn();\n\nfloat nested_fn();\n");
    }
}

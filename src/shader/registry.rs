//! In-memory shader source registry

use std::collections::HashMap;

use super::builtin::BUILTIN_SHADERS;

/// Name → GLSL text map used to resolve includes without touching storage.
#[derive(Debug, Clone, Default)]
pub struct ShaderRegistry {
    sources: HashMap<String, String>,
}

impl ShaderRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with the built-in sources.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for (name, source) in BUILTIN_SHADERS {
            registry.register(*name, *source);
        }
        registry
    }

    /// Register a source, replacing any previous entry with the same name.
    ///
    /// Returns `true` when an entry was replaced.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) -> bool {
        let name = name.into();
        let replaced = self.sources.insert(name.clone(), source.into()).is_some();
        if replaced {
            log::warn!("ShaderRegistry replaced existing shader '{}'", name);
        } else {
            log::debug!("ShaderRegistry registered shader '{}'", name);
        }
        replaced
    }

    /// Add a source (builder pattern).
    pub fn with_source(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.register(name, source);
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn find(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ShaderRegistry::with_builtins();
        assert!(registry.has("common"));
        assert!(registry.has("basic_vert"));
        assert!(registry.has("skybox_frag"));
        assert_eq!(registry.len(), BUILTIN_SHADERS.len());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ShaderRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.find("common").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ShaderRegistry::empty().with_source("a", "one");
        assert!(registry.register("a", "two"));
        assert!(!registry.register("b", "three"));
        assert_eq!(registry.find("a"), Some("two"));
        assert_eq!(registry.names(), ["a", "b"]);
    }
}

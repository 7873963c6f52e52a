//! Storage backends for shader include resolution
//!
//! Paths handed to a [`ShaderStorage`] are already normalized with
//! [`normalize_path`], so two spellings of the same file hit the same entry.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading shader text.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Read-only text source for shader files.
pub trait ShaderStorage {
    fn read_text(&self, path: &str) -> Result<String, StorageError>;
}

/// Normalize a shader path.
///
/// - Replaces backslashes with forward slashes
/// - Collapses redundant separators (`a///b` → `a/b`)
/// - Drops `.` segments
/// - Resolves `..` against the preceding segment; leading `..` of a relative path is kept
/// - Keeps a leading slash for absolute paths
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let absolute = replaced.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in replaced.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Join `name` onto `dir` and normalize the result.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() || name.starts_with('/') {
        normalize_path(name)
    } else {
        normalize_path(&format!("{}/{}", dir, name))
    }
}

/// Directory part of a normalized path (empty for a bare file name).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// File system storage rooted at a directory.
///
/// The root path is joined with the shader path to form the actual filesystem path.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at the given directory.
    ///
    /// The directory does not need to exist yet; it is checked at read time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl ShaderStorage for FileStorage {
    fn read_text(&self, path: &str) -> Result<String, StorageError> {
        if path.is_empty() {
            return Err(StorageError::InvalidPath("empty path".into()));
        }
        let full_path = self.resolve(path);
        std::fs::read_to_string(&full_path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(full_path.display().to_string())
            } else {
                StorageError::Io {
                    path: full_path.display().to_string(),
                    source: err,
                }
            }
        })
    }
}

/// In-memory storage keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, text: impl Into<String>) {
        self.files.insert(normalize_path(path), text.into());
    }

    pub fn with_file(mut self, path: &str, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ShaderStorage for MemoryStorage {
    fn read_text(&self, path: &str) -> Result<String, StorageError> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("shaders/common.glsl", "shaders/common.glsl")]
    #[case("shaders/./common.glsl", "shaders/common.glsl")]
    #[case("shaders/lib/../common.glsl", "shaders/common.glsl")]
    #[case("shaders\\lib\\noise.glsl", "shaders/lib/noise.glsl")]
    #[case("a///b", "a/b")]
    #[case("../up.glsl", "../up.glsl")]
    #[case("/abs/../x.glsl", "/x.glsl")]
    #[case("/../x.glsl", "/x.glsl")]
    fn test_normalize_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }

    #[test]
    fn test_join_path_collapses_spellings() {
        assert_eq!(
            join_path("shaders/lib", "../common.glsl"),
            join_path("shaders", "./common.glsl")
        );
        assert_eq!(join_path("", "a.glsl"), "a.glsl");
        assert_eq!(join_path("shaders", "/abs.glsl"), "/abs.glsl");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("shaders/lib/a.glsl"), "shaders/lib");
        assert_eq!(parent_dir("a.glsl"), "");
        assert_eq!(parent_dir("/a.glsl"), "/");
    }

    #[test]
    fn test_memory_storage_normalizes_keys() {
        let storage = MemoryStorage::new().with_file("shaders/./a.glsl", "x");
        assert_eq!(storage.read_text("shaders/a.glsl").unwrap(), "x");
        assert!(matches!(
            storage.read_text("shaders/b.glsl"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_storage_reads_from_root() {
        let dir_name = format!("scene-renderer-storage-{}", std::process::id());
        let dir = std::env::temp_dir().join(dir_name);
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        let source = "float noise();\n";
        std::fs::write(dir.join("lib/noise.glsl"), source).unwrap();

        let storage = FileStorage::new(&dir);
        assert_eq!(
            storage.read_text("lib/noise.glsl").unwrap(),
            "float noise();\n"
        );
        assert!(matches!(
            storage.read_text("lib/missing.glsl"),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.read_text(""),
            Err(StorageError::InvalidPath(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

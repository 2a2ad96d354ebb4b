//! Lookup of include sources by registry key.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tracing::trace;

use crate::error::CoreError;
use crate::io::{SOURCE_EXTENSION, read_file_fully};

/// Supplies the source bytes of an include unit.
pub trait SourceLoader {
    fn load(&self, key: &str) -> Result<Vec<u8>, CoreError>;
}

/// Searches `<dir>/<key>.nss` in each directory, in order. When the exact
/// name is missing, a case-insensitive match in the same directory is
/// accepted.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    dirs: Vec<PathBuf>,
}

impl FsLoader {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        FsLoader { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn find(&self, key: &str) -> Option<PathBuf> {
        let file_name = format!("{key}.{SOURCE_EXTENSION}");
        for dir in &self.dirs {
            let exact = dir.join(&file_name);
            if exact.is_file() {
                return Some(exact);
            }
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let matched = entries.filter_map(Result::ok).find(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(&file_name))
            });
            if let Some(entry) = matched {
                return Some(entry.path());
            }
        }
        None
    }
}

impl SourceLoader for FsLoader {
    fn load(&self, key: &str) -> Result<Vec<u8>, CoreError> {
        let path = self
            .find(key)
            .ok_or_else(|| CoreError::SourceNotFound(PathBuf::from(format!("{key}.{SOURCE_EXTENSION}"))))?;
        trace!(key, path = %path.display(), "loading include");
        read_file_fully(&path)
    }
}

/// In-memory sources keyed by unit name, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        MemoryLoader::default()
    }

    pub fn with_file(mut self, key: &str, source: impl Into<Vec<u8>>) -> Self {
        self.insert(key, source);
        self
    }

    pub fn insert(&mut self, key: &str, source: impl Into<Vec<u8>>) {
        self.files.insert(key.to_lowercase(), source.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, key: &str) -> Result<Vec<u8>, CoreError> {
        self.files
            .get(&key.to_lowercase())
            .cloned()
            .ok_or_else(|| CoreError::SourceNotFound(PathBuf::from(format!("{key}.{SOURCE_EXTENSION}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn searches_directories_in_order() {
        let first = tempdir().expect("tempdir");
        let second = tempdir().expect("tempdir");
        fs::write(second.path().join("lib.nss"), "int x;").unwrap();
        fs::write(first.path().join("other.nss"), "").unwrap();
        let loader = FsLoader::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(loader.load("lib").unwrap(), b"int x;");
    }

    #[test]
    fn falls_back_to_case_insensitive_names() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("Lib_Util.NSS"), "void f();").unwrap();
        let loader = FsLoader::new(vec![dir.path().to_path_buf()]);
        assert_eq!(loader.load("lib_util").unwrap(), b"void f();");
    }

    #[test]
    fn reports_missing_includes() {
        let loader = FsLoader::new(Vec::new());
        assert!(matches!(loader.load("gone"), Err(CoreError::SourceNotFound(_))));
    }

    #[test]
    fn memory_loader_ignores_case() {
        let loader = MemoryLoader::new().with_file("Inc", "int g;");
        assert_eq!(loader.load("inc").unwrap(), b"int g;");
        assert!(loader.load("other").is_err());
    }
}

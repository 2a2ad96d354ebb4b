//! File helpers: whole-file reads and writes, source and output naming.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::CoreError;

/// Extension of NSS source files.
pub const SOURCE_EXTENSION: &str = "nss";
/// Extension of compiled NCS files.
pub const OUTPUT_EXTENSION: &str = "ncs";

/// Appends `.nss` when the path has no extension.
pub fn resolve_source_path(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(SOURCE_EXTENSION)
    }
}

/// Output file next to `source`: a `.nss` extension (any case) becomes
/// `.ncs`, anything else gets `.ncs` appended.
pub fn output_file_name(source: &Path) -> PathBuf {
    let is_nss = source
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));
    if is_nss {
        source.with_extension(OUTPUT_EXTENSION)
    } else {
        let mut name = source.as_os_str().to_os_string();
        name.push(".");
        name.push(OUTPUT_EXTENSION);
        PathBuf::from(name)
    }
}

pub fn read_file_fully(path: &Path) -> Result<Vec<u8>, CoreError> {
    fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => CoreError::SourceNotFound(path.to_path_buf()),
        _ => CoreError::SourceIo(err),
    })
}

/// Writes `bytes` to `path`. A failed write removes whatever part of
/// the file was created.
pub fn write_file_fully(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    fs::write(path, bytes).map_err(|source| {
        if path.is_file() {
            if let Err(err) = fs::remove_file(path) {
                warn!(path = %path.display(), %err, "could not remove partial output");
            }
        }
        CoreError::OutputIo {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_nss_only_without_extension() {
        assert_eq!(resolve_source_path(Path::new("dir/main")), PathBuf::from("dir/main.nss"));
        assert_eq!(resolve_source_path(Path::new("main.txt")), PathBuf::from("main.txt"));
    }

    #[test]
    fn output_name_replaces_nss_case_insensitively() {
        assert_eq!(output_file_name(Path::new("a/main.nss")), PathBuf::from("a/main.ncs"));
        assert_eq!(output_file_name(Path::new("MAIN.NSS")), PathBuf::from("MAIN.ncs"));
        assert_eq!(output_file_name(Path::new("main.txt")), PathBuf::from("main.txt.ncs"));
        assert_eq!(output_file_name(Path::new("main")), PathBuf::from("main.ncs"));
    }

    #[test]
    fn missing_files_map_to_source_not_found() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.nss");
        assert!(matches!(
            read_file_fully(&missing),
            Err(CoreError::SourceNotFound(path)) if path == missing
        ));
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out.ncs");
        write_file_fully(&path, b"NCS V1.0B").unwrap();
        assert_eq!(read_file_fully(&path).unwrap(), b"NCS V1.0B");
    }

    #[test]
    fn failed_write_reports_output_io() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing-dir").join("out.ncs");
        assert!(matches!(
            write_file_fully(&path, b"x"),
            Err(CoreError::OutputIo { .. })
        ));
        assert!(!path.exists());
    }
}

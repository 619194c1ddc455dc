//! Read-only file access for agents.
//!
//! A [`FileReader`] is rooted at a directory (typically the code executor's
//! working directory) so an evaluator agent can inspect generated artifacts
//! without being able to see anything else on the machine.
//!
//! # Security
//!
//! - Absolute paths are rejected
//! - `..` components that would climb above the root are rejected
//! - Symlinks are resolved and must stay inside the root
//! - An optional extension allow-list limits which files are readable
//!
//! ```ignore
//! use cloudswarm::tools::FileReader;
//!
//! let reader = FileReader::new("coding_output")
//!     .with_allowed_extensions(vec!["txt".into(), "csv".into(), "py".into()]);
//! let report = reader.read_file("results/summary.txt").await?;
//! ```

use std::error::Error;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Errors that can occur while reading inside the sandbox
#[derive(Debug, Clone, PartialEq)]
pub enum FileReadError {
    /// Path escapes the root directory
    PathTraversal(String),
    NotFound(String),
    /// A file operation was attempted on a directory
    IsDirectory(String),
    /// A directory operation was attempted on a file
    NotADirectory(String),
    ExtensionNotAllowed(String),
    /// File is larger than the configured limit
    TooLarge { path: String, size: u64, limit: u64 },
    IOError(String),
    InvalidPath(String),
}

impl fmt::Display for FileReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileReadError::PathTraversal(msg) => {
                write!(f, "Path traversal attempt blocked: {}", msg)
            }
            FileReadError::NotFound(msg) => write!(f, "File not found: {}", msg),
            FileReadError::IsDirectory(msg) => write!(f, "Is a directory: {}", msg),
            FileReadError::NotADirectory(msg) => write!(f, "Not a directory: {}", msg),
            FileReadError::ExtensionNotAllowed(msg) => {
                write!(f, "Extension not allowed: {}", msg)
            }
            FileReadError::TooLarge { path, size, limit } => write!(
                f,
                "File too large: {} is {} bytes (limit {})",
                path, size, limit
            ),
            FileReadError::IOError(msg) => write!(f, "IO error: {}", msg),
            FileReadError::InvalidPath(msg) => write!(f, "Invalid path: {}", msg),
        }
    }
}

impl Error for FileReadError {}

/// One entry returned by [`FileReader::list_directory`]
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DirectoryEntry {
    /// Path relative to the reader's root
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Sandboxed, read-only view of a directory tree
#[derive(Clone, Debug)]
pub struct FileReader {
    root: PathBuf,
    allowed_extensions: Option<Vec<String>>,
    max_file_size: u64,
}

impl FileReader {
    /// Create a reader rooted at `root`. Files larger than 1 MiB are refused.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed_extensions: None,
            max_file_size: 1024 * 1024,
        }
    }

    /// Only allow files with these extensions (without the leading dot).
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = Some(
            extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        );
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a caller-supplied relative path onto the filesystem, refusing
    /// anything that resolves outside the root.
    fn validate_path(&self, path: &str) -> Result<PathBuf, FileReadError> {
        let requested = PathBuf::from(path);
        if requested.is_absolute() {
            return Err(FileReadError::InvalidPath(
                "Absolute paths are not allowed".to_string(),
            ));
        }

        let mut normalized = PathBuf::new();
        for component in requested.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(FileReadError::PathTraversal(path.to_string()));
                    }
                }
                Component::Normal(c) => normalized.push(c),
                Component::CurDir => {}
                _ => return Err(FileReadError::InvalidPath(path.to_string())),
            }
        }

        let effective = self.root.join(&normalized);
        if !effective.exists() {
            return Err(FileReadError::NotFound(path.to_string()));
        }

        // Resolve symlinks on both sides before comparing.
        let root_canonical = self
            .root
            .canonicalize()
            .map_err(|e| FileReadError::IOError(format!("Cannot canonicalize root: {}", e)))?;
        let canonical = effective
            .canonicalize()
            .map_err(|e| FileReadError::IOError(format!("Cannot canonicalize path: {}", e)))?;
        if !canonical.starts_with(&root_canonical) {
            return Err(FileReadError::PathTraversal(format!(
                "Path escapes root directory: {}",
                path
            )));
        }

        Ok(canonical)
    }

    fn check_extension(&self, path: &Path) -> Result<(), FileReadError> {
        let Some(allowed) = &self.allowed_extensions else {
            return Ok(());
        };
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if allowed.iter().any(|a| *a == ext) {
            Ok(())
        } else {
            Err(FileReadError::ExtensionNotAllowed(path.display().to_string()))
        }
    }

    /// Read a UTF-8 (lossy) text file relative to the root.
    pub async fn read_file(&self, path: &str) -> Result<String, FileReadError> {
        let safe_path = self.validate_path(path)?;
        if safe_path.is_dir() {
            return Err(FileReadError::IsDirectory(path.to_string()));
        }
        self.check_extension(&safe_path)?;

        let size = tokio::fs::metadata(&safe_path)
            .await
            .map_err(|e| FileReadError::IOError(e.to_string()))?
            .len();
        if size > self.max_file_size {
            return Err(FileReadError::TooLarge {
                path: path.to_string(),
                size,
                limit: self.max_file_size,
            });
        }

        let bytes = tokio::fs::read(&safe_path)
            .await
            .map_err(|e| FileReadError::IOError(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// List the immediate children of a directory, sorted by path.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileReadError> {
        let safe_path = self.validate_path(path)?;
        if !safe_path.is_dir() {
            return Err(FileReadError::NotADirectory(path.to_string()));
        }
        let root_canonical = self
            .root
            .canonicalize()
            .map_err(|e| FileReadError::IOError(e.to_string()))?;

        let mut reader = tokio::fs::read_dir(&safe_path)
            .await
            .map_err(|e| FileReadError::IOError(e.to_string()))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| FileReadError::IOError(e.to_string()))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| FileReadError::IOError(e.to_string()))?;
            let full = entry.path();
            let relative = full.strip_prefix(&root_canonical).unwrap_or(&full);
            entries.push(DirectoryEntry {
                path: relative.to_string_lossy().into_owned(),
                is_directory: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, FileReader) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        std::fs::write(dir.path().join("out/result.txt"), "42").unwrap();
        std::fs::write(dir.path().join("script.py"), "print(42)").unwrap();
        let reader = FileReader::new(dir.path());
        (dir, reader)
    }

    #[tokio::test]
    async fn test_read_file() {
        let (_dir, reader) = fixture();
        assert_eq!(reader.read_file("out/result.txt").await.unwrap(), "42");
        assert_eq!(reader.read_file("./out/../script.py").await.unwrap(), "print(42)");
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let (_dir, reader) = fixture();
        assert!(matches!(
            reader.read_file("../../etc/passwd").await,
            Err(FileReadError::PathTraversal(_))
        ));
        assert!(matches!(
            reader.read_file("/etc/passwd").await,
            Err(FileReadError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_extension_filtering() {
        let (dir, _) = fixture();
        let reader = FileReader::new(dir.path()).with_allowed_extensions(vec![".txt".into()]);
        assert!(reader.read_file("out/result.txt").await.is_ok());
        assert!(matches!(
            reader.read_file("script.py").await,
            Err(FileReadError::ExtensionNotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_size_limit() {
        let (_dir, reader) = fixture();
        let reader = reader.with_max_file_size(1);
        assert!(matches!(
            reader.read_file("out/result.txt").await,
            Err(FileReadError::TooLarge { size: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_list_directory() {
        let (_dir, reader) = fixture();
        let entries = reader.list_directory(".").await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["out", "script.py"]);
        assert!(entries[0].is_directory);
        assert!(matches!(
            reader.list_directory("script.py").await,
            Err(FileReadError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let (_dir, reader) = fixture();
        assert!(matches!(
            reader.read_file("nope.txt").await,
            Err(FileReadError::NotFound(_))
        ));
    }
}

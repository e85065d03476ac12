//! File System Types
//!
//! Core types and the async trait for the filesystem collaborator. All
//! paths handed to the trait are absolute and normalised; `resolve_path`
//! is the one place joining and normalisation happen.

use async_trait::async_trait;
use thiserror::Error;

/// File system errors
#[derive(Error, Debug, Clone)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, {operation} '{path}'")]
    NotFound { path: String, operation: String },

    #[error("EISDIR: illegal operation on a directory, {operation} '{path}'")]
    IsDirectory { path: String, operation: String },

    #[error("ENOTDIR: not a directory, {operation} '{path}'")]
    NotDirectory { path: String, operation: String },

    #[error("EINVAL: invalid argument, {operation} '{path}'")]
    InvalidArgument { path: String, operation: String },

    #[error("{message}")]
    Other { message: String },
}

impl FsError {
    pub fn not_found(operation: &str, path: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
            operation: operation.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub size: u64,
}

/// Async filesystem collaborator.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read the contents of a file as UTF-8.
    async fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Write content to a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool;

    /// Get file/directory information.
    async fn stat(&self, path: &str) -> Result<FsStat, FsError>;

    /// Create a directory (recursively).
    async fn mkdir(&self, path: &str) -> Result<(), FsError>;

    /// Join `path` against `base` and normalise `.`/`..` segments.
    fn resolve_path(&self, base: &str, path: &str) -> String {
        normalize_path(base, path)
    }
}

/// Join and normalise. Absolute `path` ignores `base`.
pub fn normalize_path(base: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else if base.is_empty() || base == "/" {
        format!("/{}", path)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

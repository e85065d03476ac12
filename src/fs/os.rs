//! OS File System
//!
//! Real filesystem backend for the CLI, via `tokio::fs`.

use async_trait::async_trait;

use super::types::{FileSystem, FsError, FsStat};

#[derive(Debug, Default)]
pub struct OsFs;

impl OsFs {
    pub fn new() -> Self {
        Self
    }
}

fn io_err(operation: &str, path: &str, e: std::io::Error) -> FsError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FsError::not_found(operation, path)
    } else {
        FsError::Other {
            message: format!("{} '{}': {}", operation, path, e),
        }
    }
}

#[async_trait]
impl FileSystem for OsFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_err("open", path, e))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("mkdir", path, e))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| io_err("write", path, e))
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn stat(&self, path: &str) -> Result<FsStat, FsError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_err("stat", path, e))?;
        Ok(FsStat {
            is_file: meta.is_file(),
            is_directory: meta.is_dir(),
            size: meta.len(),
        })
    }

    async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| io_err("mkdir", path, e))
    }
}

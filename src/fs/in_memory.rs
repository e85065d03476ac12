//! In-Memory File System
//!
//! A virtual filesystem backed by a path map. Used by tests and by callers
//! that want hermetic runs; the CLI uses [`crate::fs::OsFs`] instead.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{FileSystem, FsError, FsStat};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    File(String),
    Directory,
}

#[derive(Debug, Default)]
pub struct InMemoryFs {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let fs = Self {
            entries: Mutex::new(HashMap::new()),
        };
        fs.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert("/".to_string(), Entry::Directory);
        fs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_parents(entries: &mut HashMap<String, Entry>, path: &str) {
        let mut current = String::new();
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        for part in &parts[..parts.len().saturating_sub(1)] {
            current.push('/');
            current.push_str(part);
            entries.entry(current.clone()).or_insert(Entry::Directory);
        }
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        match self.lock().get(path) {
            Some(Entry::File(content)) => Ok(content.clone()),
            Some(Entry::Directory) => Err(FsError::IsDirectory {
                path: path.to_string(),
                operation: "open".to_string(),
            }),
            None => Err(FsError::not_found("open", path)),
        }
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let text = String::from_utf8_lossy(content).into_owned();
        let mut entries = self.lock();
        if matches!(entries.get(path), Some(Entry::Directory)) {
            return Err(FsError::IsDirectory {
                path: path.to_string(),
                operation: "write".to_string(),
            });
        }
        Self::ensure_parents(&mut entries, path);
        entries.insert(path.to_string(), Entry::File(text));
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.lock().contains_key(path)
    }

    async fn stat(&self, path: &str) -> Result<FsStat, FsError> {
        match self.lock().get(path) {
            Some(Entry::File(content)) => Ok(FsStat {
                is_file: true,
                is_directory: false,
                size: content.len() as u64,
            }),
            Some(Entry::Directory) => Ok(FsStat {
                is_file: false,
                is_directory: true,
                size: 0,
            }),
            None => Err(FsError::not_found("stat", path)),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let mut entries = self.lock();
        if matches!(entries.get(path), Some(Entry::File(_))) {
            return Err(FsError::NotDirectory {
                path: path.to_string(),
                operation: "mkdir".to_string(),
            });
        }
        Self::ensure_parents(&mut entries, &format!("{}/x", path.trim_end_matches('/')));
        entries.insert(path.to_string(), Entry::Directory);
        Ok(())
    }
}

//! Sync Collaborator Adapters
//!
//! Bridges the async filesystem, resolver, and runtime traits to the sync
//! surfaces the evaluator core consumes. Uses `tokio::task::block_in_place`
//! + `Handle::block_on`, so the evaluator must run on a multi-thread
//! runtime worker.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::fs::FileSystem;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::types::{FileStat, RunOutput, SyncFileSystem, SyncModuleResolver, SyncRunner};
use crate::resolver::{ModuleResolver, ResolveContext, ResolvedModule};
use crate::runtimes::{RuntimeContext, RuntimeRegistry};

fn block_on<F, T>(handle: &tokio::runtime::Handle, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::task::block_in_place(|| handle.block_on(f))
}

/// Sync view over an async [`FileSystem`].
pub struct SyncFsAdapter {
    inner: Arc<dyn FileSystem>,
    handle: tokio::runtime::Handle,
}

impl SyncFsAdapter {
    pub fn new(fs: Arc<dyn FileSystem>, handle: tokio::runtime::Handle) -> Self {
        Self { inner: fs, handle }
    }
}

impl SyncFileSystem for SyncFsAdapter {
    fn read_file(&self, path: &str) -> Result<String, String> {
        block_on(&self.handle, self.inner.read_file(path)).map_err(|e| e.to_string())
    }

    fn write_file(&self, path: &str, content: &str) -> Result<(), String> {
        block_on(&self.handle, self.inner.write_file(path, content.as_bytes()))
            .map_err(|e| e.to_string())
    }

    fn exists(&self, path: &str) -> bool {
        block_on(&self.handle, self.inner.exists(path))
    }

    fn stat(&self, path: &str) -> Result<FileStat, String> {
        let stat = block_on(&self.handle, self.inner.stat(path)).map_err(|e| e.to_string())?;
        Ok(FileStat {
            is_file: stat.is_file,
            is_dir: stat.is_directory,
            size: stat.size,
        })
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        self.inner.resolve_path(base, path)
    }
}

/// Sync view over an async [`ModuleResolver`].
pub struct SyncResolverAdapter {
    inner: Arc<dyn ModuleResolver>,
    handle: tokio::runtime::Handle,
}

impl SyncResolverAdapter {
    pub fn new(resolver: Arc<dyn ModuleResolver>, handle: tokio::runtime::Handle) -> Self {
        Self {
            inner: resolver,
            handle,
        }
    }
}

impl SyncModuleResolver for SyncResolverAdapter {
    fn resolve(&self, reference: &str, context: &ResolveContext) -> Result<ResolvedModule, String> {
        block_on(&self.handle, self.inner.resolve(reference, context))
    }
}

/// Sync view over the [`RuntimeRegistry`].
pub struct SyncRunnerAdapter {
    registry: Arc<RuntimeRegistry>,
    handle: tokio::runtime::Handle,
}

impl SyncRunnerAdapter {
    pub fn new(registry: Arc<RuntimeRegistry>, handle: tokio::runtime::Handle) -> Self {
        Self { registry, handle }
    }
}

impl SyncRunner for SyncRunnerAdapter {
    fn has_language(&self, lang: &str) -> bool {
        self.registry.contains(lang)
    }

    fn execute(
        &self,
        lang: &str,
        code: &str,
        env_vars: &IndexMap<String, String>,
        stdin: &str,
        cwd: &str,
        timeout_ms: u64,
    ) -> Result<RunOutput, MlldError> {
        let runtime = self.registry.get(lang).ok_or_else(|| {
            MlldError::new(ErrorKind::ExecutionFailure {
                lang: lang.to_string(),
                message: format!("no runtime registered for language '{}'", lang),
                exit_code: None,
            })
        })?;
        let span = tracing::debug_span!("runtime", lang = lang);
        let _guard = span.enter();
        let result = block_on(
            &self.handle,
            runtime.execute(RuntimeContext {
                code: code.to_string(),
                env_vars: env_vars.clone(),
                stdin: stdin.to_string(),
                cwd: cwd.to_string(),
                timeout_ms,
            }),
        );
        if result.timed_out {
            return Err(MlldError::new(ErrorKind::ExecutionTimeout {
                lang: lang.to_string(),
                timeout_ms,
            }));
        }
        Ok(RunOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_fs_adapter_read_write() {
        let fs = Arc::new(InMemoryFs::new());
        let handle = tokio::runtime::Handle::current();
        let adapter = SyncFsAdapter::new(fs.clone(), handle);

        adapter.write_file("/t.txt", "hello").unwrap();
        assert_eq!(adapter.read_file("/t.txt").unwrap(), "hello");
        assert!(adapter.exists("/t.txt"));
        assert!(!adapter.exists("/nope"));
        let stat = adapter.stat("/t.txt").unwrap();
        assert!(stat.is_file);
        assert_eq!(stat.size, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_runner_unknown_language() {
        let registry = Arc::new(RuntimeRegistry::new());
        let handle = tokio::runtime::Handle::current();
        let adapter = SyncRunnerAdapter::new(registry, handle);
        let err = adapter
            .execute("cobol", "x", &IndexMap::new(), "", "/", 1000)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ExecutionFailure { .. }));
        assert!(err.to_string().contains("cobol"));
    }
}

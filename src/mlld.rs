//! mlld Environment
//!
//! Main entry point: ties together the parser, interpreter, filesystem,
//! module resolver, and language runtimes. The async collaborators are
//! bridged to the sync evaluator core with `block_in_place`, so `run` must
//! be called on a multi-thread tokio runtime.

use std::sync::Arc;

use crate::fs::{FileSystem, InMemoryFs};
use crate::interpreter::types::{Checkpoint, ExecutionLimits, Interpreter, InterpreterOptions};
use crate::interpreter::{
    interpret_document, root_environment, MlldError, SyncFsAdapter, SyncResolverAdapter,
    SyncRunnerAdapter,
};
use crate::parser::{parse_with_options, ParseOptions};
use crate::resolver::{LocalResolver, ModuleResolver};
use crate::runtimes::RuntimeRegistry;

/// Options for creating an mlld environment.
#[derive(Default)]
pub struct MlldOptions {
    /// Project root; `@base` and relative paths resolve against it.
    pub base_path: Option<String>,
    /// File system instance (defaults to `InMemoryFs`).
    pub fs: Option<Arc<dyn FileSystem>>,
    /// Module resolver (defaults to `LocalResolver` over the same fs).
    pub resolver: Option<Arc<dyn ModuleResolver>>,
    /// Language runtimes (defaults to the standard sh/js/python set).
    pub runtimes: Option<Arc<RuntimeRegistry>>,
    /// Permissive mode: undefined references become empty strings and
    /// recoverable parse failures are skipped.
    pub permissive: bool,
    pub limits: Option<ExecutionLimits>,
}

/// Result of one document run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The assembled Markdown artifact.
    pub output: String,
    pub checkpoints: Vec<Checkpoint>,
}

/// The mlld interpreter environment.
pub struct Mlld {
    pub fs: Arc<dyn FileSystem>,
    resolver: Arc<dyn ModuleResolver>,
    runtimes: Arc<RuntimeRegistry>,
    options: InterpreterOptions,
}

impl Mlld {
    pub fn new(options: MlldOptions) -> Self {
        let base_path = options.base_path.unwrap_or_else(|| "/".to_string());
        let fs: Arc<dyn FileSystem> = options
            .fs
            .unwrap_or_else(|| Arc::new(InMemoryFs::new()));
        let resolver: Arc<dyn ModuleResolver> = options
            .resolver
            .unwrap_or_else(|| Arc::new(LocalResolver::new(fs.clone())));
        let runtimes = options
            .runtimes
            .unwrap_or_else(|| Arc::new(RuntimeRegistry::standard()));
        Self {
            fs,
            resolver,
            runtimes,
            options: InterpreterOptions {
                strict: !options.permissive,
                base_path,
                limits: options.limits.unwrap_or_default(),
            },
        }
    }

    /// Interpret a source document. `file` tags error messages and anchors
    /// relative imports/loads.
    pub async fn run(&self, source: &str, file: Option<&str>) -> Result<RunResult, MlldError> {
        let parsed = parse_with_options(
            source,
            ParseOptions {
                strict: self.options.strict,
                file: file.map(|f| f.to_string()),
                track_locations: true,
            },
        )?;
        for e in &parsed.errors {
            tracing::warn!(error = %e, "recovered parse error");
        }
        let document = parsed.document;

        let handle = tokio::runtime::Handle::current();
        let fs = SyncFsAdapter::new(self.fs.clone(), handle.clone());
        let resolver = SyncResolverAdapter::new(self.resolver.clone(), handle.clone());
        let runner = SyncRunnerAdapter::new(self.runtimes.clone(), handle);

        // Bridge async context with the sync evaluator core.
        tokio::task::block_in_place(|| {
            let interp = Interpreter::new(&fs, &resolver, &runner, self.options.clone());
            let env = root_environment(&document, file.map(|f| f.to_string()));
            let output = interpret_document(&document, &env, &interp)?;
            Ok(RunResult {
                output,
                checkpoints: interp.checkpoints(),
            })
        })
    }

    /// Read a file through the configured filesystem and interpret it.
    pub async fn run_file(&self, path: &str) -> Result<RunResult, MlldError> {
        let resolved = self
            .fs
            .resolve_path(&self.options.base_path, path);
        let source = self
            .fs
            .read_file(&resolved)
            .await
            .map_err(|e| {
                MlldError::new(crate::interpreter::ErrorKind::ImportResolution {
                    reference: path.to_string(),
                    message: e.to_string(),
                })
            })?;
        self.run(&source, Some(&resolved)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

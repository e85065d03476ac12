//! Interpreter Types
//!
//! Shared state, options, limits, and the sync collaborator traits the
//! evaluator core talks to. The evaluator itself is synchronous; async
//! collaborators (filesystem, module resolver, runtimes) are bridged through
//! sync adapters at the run boundary.

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::resolver::{ResolveContext, ResolvedModule};

/// Result of evaluating one directive: output appended to the document plus
/// any environment mutations already applied.
#[derive(Debug, Clone, Default)]
pub struct EvalResult {
    pub output: String,
}

impl EvalResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_output(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Execution limits. These guard against runaway documents, not hostile
/// ones.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub max_directives: usize,
    pub max_iterations: usize,
    pub max_import_depth: usize,
    pub command_timeout_ms: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_directives: 10_000,
            max_iterations: 100_000,
            max_import_depth: 32,
            command_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    /// Strict mode errors on undefined references; permissive mode resolves
    /// them to the empty string.
    pub strict: bool,
    /// Project root; `@base` and relative paths resolve against it.
    pub base_path: String,
    pub limits: ExecutionLimits,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            strict: true,
            base_path: "/".to_string(),
            limits: ExecutionLimits::default(),
        }
    }
}

// =============================================================================
// Sync collaborator traits
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
    pub size: u64,
}

/// Narrow sync filesystem surface used by the evaluator.
pub trait SyncFileSystem {
    fn read_file(&self, path: &str) -> Result<String, String>;
    fn write_file(&self, path: &str, content: &str) -> Result<(), String>;
    fn exists(&self, path: &str) -> bool;
    fn stat(&self, path: &str) -> Result<FileStat, String>;
    /// Join `path` against `base`; absolute paths pass through normalised.
    fn resolve_path(&self, base: &str, path: &str) -> String;
}

/// Narrow sync module-resolution surface.
pub trait SyncModuleResolver {
    fn resolve(&self, reference: &str, context: &ResolveContext) -> Result<ResolvedModule, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Narrow sync command/code runtime surface.
pub trait SyncRunner {
    fn has_language(&self, lang: &str) -> bool;
    fn execute(
        &self,
        lang: &str,
        code: &str,
        env_vars: &IndexMap<String, String>,
        stdin: &str,
        cwd: &str,
        timeout_ms: u64,
    ) -> Result<RunOutput, MlldError>;
}

// =============================================================================
// Run state
// =============================================================================

/// A named point recorded during the run, for later inspection/tooling.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub name: String,
    pub at: DateTime<Utc>,
    pub file: Option<String>,
}

/// A registered guard: a predicate executable consulted before labelled
/// operations.
#[derive(Debug, Clone)]
pub struct GuardEntry {
    pub predicate: String,
    pub env: Environment,
}

#[derive(Default)]
struct RunState {
    checkpoints: Vec<Checkpoint>,
    imports_in_progress: Vec<String>,
    guards: IndexMap<String, GuardEntry>,
    directive_count: usize,
}

/// The interpreter: collaborators plus per-run mutable state. One instance
/// drives one document run (including nested import runs).
pub struct Interpreter<'a> {
    pub fs: &'a dyn SyncFileSystem,
    pub resolver: &'a dyn SyncModuleResolver,
    pub runner: &'a dyn SyncRunner,
    pub options: InterpreterOptions,
    state: RefCell<RunState>,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        fs: &'a dyn SyncFileSystem,
        resolver: &'a dyn SyncModuleResolver,
        runner: &'a dyn SyncRunner,
        options: InterpreterOptions,
    ) -> Self {
        Self {
            fs,
            resolver,
            runner,
            options,
            state: RefCell::new(RunState::default()),
        }
    }

    /// Count a directive against the run limit.
    pub fn count_directive(&self) -> Result<(), MlldError> {
        let mut state = self.state.borrow_mut();
        state.directive_count += 1;
        if state.directive_count > self.options.limits.max_directives {
            return Err(MlldError::internal(format!(
                "maximum directive count ({}) exceeded",
                self.options.limits.max_directives
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    pub fn record_checkpoint(&self, name: &str, file: Option<String>) {
        self.state.borrow_mut().checkpoints.push(Checkpoint {
            name: name.to_string(),
            at: Utc::now(),
            file,
        });
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.state.borrow().checkpoints.clone()
    }

    // ------------------------------------------------------------------
    // Import cycle tracking
    // ------------------------------------------------------------------

    /// Enter a module; repeats in the in-progress set raise `CircularImport`.
    pub fn begin_import(&self, identity: &str) -> Result<(), MlldError> {
        let mut state = self.state.borrow_mut();
        if state.imports_in_progress.iter().any(|m| m == identity) {
            let mut chain = state.imports_in_progress.clone();
            chain.push(identity.to_string());
            return Err(MlldError::new(ErrorKind::CircularImport { chain }));
        }
        if state.imports_in_progress.len() >= self.options.limits.max_import_depth {
            return Err(MlldError::internal(format!(
                "maximum import depth ({}) exceeded",
                self.options.limits.max_import_depth
            )));
        }
        state.imports_in_progress.push(identity.to_string());
        Ok(())
    }

    pub fn end_import(&self, identity: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.imports_in_progress.iter().rposition(|m| m == identity) {
            state.imports_in_progress.remove(pos);
        }
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    pub fn register_guard(&self, label: &str, entry: GuardEntry) {
        self.state.borrow_mut().guards.insert(label.to_string(), entry);
    }

    pub fn guard_for(&self, label: &str) -> Option<GuardEntry> {
        self.state.borrow().guards.get(label).cloned()
    }
}

/// JSON shape handed to guard predicates describing the operation.
pub fn guard_detail(label: &str, detail: &str) -> JsonValue {
    serde_json::json!({ "label": label, "detail": detail })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::test_support::TestWorld;

    #[test]
    fn test_circular_import_detection() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        interp.begin_import("/a.mld").unwrap();
        interp.begin_import("/b.mld").unwrap();
        let err = interp.begin_import("/a.mld").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CircularImport { .. }));
        assert!(err.to_string().contains("/a.mld -> /b.mld -> /a.mld"));
    }

    #[test]
    fn test_import_depth_limit() {
        let world = TestWorld::new();
        let mut interp = world.interpreter();
        interp.options.limits.max_import_depth = 2;
        interp.begin_import("/a.mld").unwrap();
        interp.begin_import("/b.mld").unwrap();
        assert!(interp.begin_import("/c.mld").is_err());
    }

    #[test]
    fn test_end_import_allows_reentry() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        interp.begin_import("/a.mld").unwrap();
        interp.end_import("/a.mld");
        assert!(interp.begin_import("/a.mld").is_ok());
    }

    #[test]
    fn test_directive_limit() {
        let world = TestWorld::new();
        let mut interp = world.interpreter();
        interp.options.limits.max_directives = 2;
        interp.count_directive().unwrap();
        interp.count_directive().unwrap();
        assert!(interp.count_directive().is_err());
    }
}

//! Command & Code Runtimes
//!
//! Pluggable language runtimes. Each runtime registers under one or more
//! language keys (`sh`, `js`, `python`, ...); the core needs exactly stdin,
//! stdout capture, exit code, timeout, and working directory.

pub mod process;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

pub use process::ProcessRuntime;

/// Execution context handed to a runtime.
pub struct RuntimeContext {
    pub code: String,
    pub env_vars: IndexMap<String, String>,
    pub stdin: String,
    pub cwd: String,
    pub timeout_ms: u64,
}

/// Runtime execution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl RuntimeResult {
    pub fn success(stdout: String) -> Self {
        Self {
            stdout,
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
        }
    }

    pub fn error(stderr: String, exit_code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            exit_code,
            timed_out: false,
        }
    }

    pub fn timeout() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 124,
            timed_out: true,
        }
    }
}

/// Runtime trait
#[async_trait]
pub trait Runtime: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, ctx: RuntimeContext) -> RuntimeResult;
}

/// Registry from language key to runtime.
pub struct RuntimeRegistry {
    runtimes: HashMap<String, Arc<dyn Runtime>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self {
            runtimes: HashMap::new(),
        }
    }

    /// The stock set: `sh`/`bash`, `js`/`node`, `python`/`py`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let shell: Arc<dyn Runtime> = Arc::new(ProcessRuntime::shell());
        let node: Arc<dyn Runtime> = Arc::new(ProcessRuntime::node());
        let python: Arc<dyn Runtime> = Arc::new(ProcessRuntime::python());
        registry.register_as("sh", shell.clone());
        registry.register_as("bash", shell);
        registry.register_as("js", node.clone());
        registry.register_as("node", node);
        registry.register_as("python", python.clone());
        registry.register_as("py", python);
        registry
    }

    pub fn register_as(&mut self, key: &str, runtime: Arc<dyn Runtime>) {
        self.runtimes.insert(key.to_string(), runtime);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Runtime>> {
        self.runtimes.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.runtimes.contains_key(key)
    }

    pub fn names(&self) -> Vec<&str> {
        self.runtimes.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_languages() {
        let registry = RuntimeRegistry::standard();
        for lang in ["sh", "bash", "js", "node", "python", "py"] {
            assert!(registry.contains(lang), "missing {}", lang);
        }
        assert!(!registry.contains("cobol"));
    }

    #[test]
    fn test_aliases_share_runtime() {
        let registry = RuntimeRegistry::standard();
        let a = registry.get("js").unwrap();
        let b = registry.get("node").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}

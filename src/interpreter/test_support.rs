//! Test Doubles
//!
//! In-memory sync collaborators for interpreter tests: a path-map
//! filesystem, a resolver over the same map (with the `@local/` prefix
//! registered), and a scripted runner that emulates simple `sh` and routes
//! other languages through an optional handler closure.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::types::{
    Checkpoint, FileStat, Interpreter, InterpreterOptions, RunOutput, SyncFileSystem,
    SyncModuleResolver, SyncRunner,
};
use crate::resolver::{integrity_hash, ResolveContext, ResolvedModule};

type FileMap = Rc<RefCell<HashMap<String, String>>>;

pub struct MemFs {
    files: FileMap,
}

impl SyncFileSystem for MemFs {
    fn read_file(&self, path: &str) -> Result<String, String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| format!("ENOENT: no such file or directory, open '{}'", path))
    }

    fn write_file(&self, path: &str, content: &str) -> Result<(), String> {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn stat(&self, path: &str) -> Result<FileStat, String> {
        let files = self.files.borrow();
        let content = files
            .get(path)
            .ok_or_else(|| format!("ENOENT: no such file or directory, stat '{}'", path))?;
        Ok(FileStat {
            is_file: true,
            is_dir: false,
            size: content.len() as u64,
        })
    }

    fn resolve_path(&self, base: &str, path: &str) -> String {
        crate::fs::normalize_path(base, path)
    }
}

pub struct MemResolver {
    files: FileMap,
    prefixes: HashMap<String, String>,
}

impl SyncModuleResolver for MemResolver {
    fn resolve(&self, reference: &str, context: &ResolveContext) -> Result<ResolvedModule, String> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Err("network resolution is not configured".to_string());
        }
        let path = if let Some(stripped) = reference.strip_prefix('@') {
            let (ns, name) = stripped
                .split_once('/')
                .ok_or_else(|| format!("malformed module reference '@{}'", stripped))?;
            let dir = self
                .prefixes
                .get(ns)
                .ok_or_else(|| format!("no resolver registered for prefix '@{}'", ns))?;
            crate::fs::normalize_path(dir, &format!("{}.mld", name))
        } else {
            let base = context
                .importing_file
                .as_deref()
                .and_then(|f| f.rsplit_once('/').map(|(dir, _)| dir.to_string()))
                .unwrap_or_else(|| context.base_path.clone());
            crate::fs::normalize_path(&base, reference)
        };
        let content = self
            .files
            .borrow()
            .get(&path)
            .cloned()
            .ok_or_else(|| format!("module not found at '{}'", path))?;
        let hash = integrity_hash(&content);
        Ok(ResolvedModule {
            content,
            origin: path,
            integrity_hash: hash,
        })
    }
}

pub type Handler = Box<dyn Fn(&str, &str, &IndexMap<String, String>, &str) -> Option<RunOutput>>;

pub struct ScriptRunner {
    handler: Option<Handler>,
}

impl SyncRunner for ScriptRunner {
    fn has_language(&self, lang: &str) -> bool {
        matches!(lang, "sh" | "bash" | "js" | "node" | "python" | "py" | "test")
    }

    fn execute(
        &self,
        lang: &str,
        code: &str,
        env_vars: &IndexMap<String, String>,
        stdin: &str,
        _cwd: &str,
        _timeout_ms: u64,
    ) -> Result<RunOutput, MlldError> {
        if let Some(handler) = &self.handler {
            if let Some(output) = handler(lang, code, env_vars, stdin) {
                return Ok(output);
            }
        }
        if lang == "sh" || lang == "bash" {
            return Ok(emulate_sh(code));
        }
        Err(MlldError::new(ErrorKind::ExecutionFailure {
            lang: lang.to_string(),
            message: "no scripted response for this code".to_string(),
            exit_code: None,
        }))
    }
}

/// A tiny `sh` emulation covering what tests use: `echo`, `exit`,
/// `true`/`false`, and `name=value` assignments (ignored).
fn emulate_sh(code: &str) -> RunOutput {
    let mut stdout = String::new();
    let mut exit_code = 0;
    for line in code.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("echo ") {
            let rest = rest.trim();
            let rest = rest
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .unwrap_or(rest);
            stdout.push_str(rest);
            stdout.push('\n');
        } else if line == "echo" {
            stdout.push('\n');
        } else if let Some(rest) = line.strip_prefix("exit ") {
            exit_code = rest.trim().parse().unwrap_or(1);
            break;
        } else if line == "true" {
            exit_code = 0;
        } else if line == "false" {
            exit_code = 1;
        } else if is_assignment(line) {
            // prelude bindings from code bodies
        } else {
            let command = line.split_whitespace().next().unwrap_or(line);
            return RunOutput {
                stdout,
                stderr: format!("sh: {}: command not found\n", command),
                exit_code: 127,
            };
        }
    }
    RunOutput {
        stdout,
        stderr: String::new(),
        exit_code,
    }
}

fn is_assignment(line: &str) -> bool {
    match line.split_once('=') {
        Some((lhs, _)) => {
            !lhs.is_empty()
                && lhs
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }
        None => false,
    }
}

/// A complete in-memory collaborator set for interpreter tests.
pub struct TestWorld {
    pub fs: MemFs,
    pub resolver: MemResolver,
    pub runner: ScriptRunner,
}

impl TestWorld {
    pub fn new() -> Self {
        let files: FileMap = Rc::new(RefCell::new(HashMap::new()));
        let mut prefixes = HashMap::new();
        prefixes.insert("local".to_string(), "/modules".to_string());
        Self {
            fs: MemFs {
                files: files.clone(),
            },
            resolver: MemResolver { files, prefixes },
            runner: ScriptRunner { handler: None },
        }
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &str, &IndexMap<String, String>, &str) -> Option<RunOutput> + 'static,
    {
        self.runner.handler = Some(Box::new(handler));
        self
    }

    pub fn add_file(&self, path: &str, content: &str) {
        self.fs
            .files
            .borrow_mut()
            .insert(path.to_string(), content.to_string());
    }

    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(
            &self.fs,
            &self.resolver,
            &self.runner,
            InterpreterOptions::default(),
        )
    }
}

/// Parse and interpret a source string against a fresh root environment.
pub fn run_source(world: &TestWorld, source: &str) -> Result<String, MlldError> {
    run_source_env(world, source).map(|(output, _)| output)
}

/// Like [`run_source`], returning the root environment for inspection.
pub fn run_source_env(
    world: &TestWorld,
    source: &str,
) -> Result<(String, Environment), MlldError> {
    let document = crate::parser::parse(source)?;
    let interp = world.interpreter();
    let env = crate::interpreter::root_environment(&document, None);
    let output = crate::interpreter::interpret_document(&document, &env, &interp)?;
    Ok((output, env))
}

/// Like [`run_source`], returning the recorded checkpoints.
pub fn run_source_checkpoints(
    world: &TestWorld,
    source: &str,
) -> Result<Vec<Checkpoint>, MlldError> {
    let document = crate::parser::parse(source)?;
    let interp = world.interpreter();
    let env = crate::interpreter::root_environment(&document, None);
    crate::interpreter::interpret_document(&document, &env, &interp)?;
    Ok(interp.checkpoints())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulate_sh_echo() {
        let out = emulate_sh("echo hello world");
        assert_eq!(out.stdout, "hello world\n");
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn test_emulate_sh_exit() {
        let out = emulate_sh("echo a\nexit 3\necho b");
        assert_eq!(out.stdout, "a\n");
        assert_eq!(out.exit_code, 3);
    }

    #[test]
    fn test_emulate_sh_unknown_command() {
        let out = emulate_sh("frobnicate --fast");
        assert_eq!(out.exit_code, 127);
        assert!(out.stderr.contains("frobnicate"));
    }

    #[test]
    fn test_emulate_sh_assignments_ignored() {
        let out = emulate_sh("x='1'\necho done");
        assert_eq!(out.stdout, "done\n");
    }
}

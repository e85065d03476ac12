//! `/run` — execute a command, code block, or named executable.
//!
//! `runCommand` and `runCode` execute inline and may produce document
//! output; `runExec` invokes a previously-defined executable. The base
//! execution is re-invocable, so a trailing pipeline gets a retryable
//! source stage.

use indexmap::IndexMap;

use crate::ast::types::{DirectiveNode, DirectiveSubtype, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::eval::pipeline_slot;
use crate::interpreter::executables::{
    enforce_guard, invoke_executable, trim_trailing_newline, wrap_code,
};
use crate::interpreter::interpolation::interpolate;
use crate::interpreter::resolution::evaluate_arg_nodes;
use crate::interpreter::types::{EvalResult, Interpreter};
use crate::pipeline::executor::run_pipeline;

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let base = execute_run_base(directive, env, interp)?;
    let output = match pipeline_slot(directive) {
        Some(stages) => {
            let mut source = || execute_run_base(directive, env, interp);
            run_pipeline(stages, base, Some(&mut source), env, interp)?
        }
        None => base,
    };
    if output.is_empty() {
        Ok(EvalResult::ok())
    } else {
        Ok(EvalResult::with_output(format!("{}\n", output)))
    }
}

/// Execute the directive's base operation, without its pipeline. Also the
/// source function when a retry targets stage 0.
pub fn execute_run_base(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    match directive.subtype {
        DirectiveSubtype::RunCommand => {
            let command_nodes = directive
                .slot("command")
                .ok_or_else(|| MlldError::internal("run directive is missing its command"))?;
            let command = interpolate(command_nodes, env, interp)?;
            enforce_guard("run", &command, interp)?;
            tracing::debug!(command = %command, "running shell command");
            let output = interp.runner.execute(
                "sh",
                &command,
                &IndexMap::new(),
                "",
                &interp.options.base_path,
                interp.options.limits.command_timeout_ms,
            )?;
            if output.exit_code != 0 {
                return Err(MlldError::new(ErrorKind::ExecutionFailure {
                    lang: "sh".to_string(),
                    message: run_failure(&output.stderr, output.exit_code),
                    exit_code: Some(output.exit_code),
                }));
            }
            Ok(trim_trailing_newline(output.stdout))
        }
        DirectiveSubtype::RunCode => {
            let lang = directive.meta_str("language").unwrap_or("sh").to_string();
            let source = directive
                .raw_slot("code")
                .map(|s| s.trim().to_string())
                .ok_or_else(|| MlldError::internal("run directive is missing its code"))?;
            enforce_guard("run", &source, interp)?;
            let code = wrap_code(&lang, &source, &[]);
            let output = interp.runner.execute(
                &lang,
                &code,
                &IndexMap::new(),
                "",
                &interp.options.base_path,
                interp.options.limits.command_timeout_ms,
            )?;
            if output.exit_code != 0 {
                return Err(MlldError::new(ErrorKind::ExecutionFailure {
                    lang,
                    message: run_failure(&output.stderr, output.exit_code),
                    exit_code: Some(output.exit_code),
                }));
            }
            Ok(trim_trailing_newline(output.stdout))
        }
        DirectiveSubtype::RunExec => {
            let reference = match directive.slot("executable") {
                Some([Node::VariableReference(r)]) => r,
                _ => {
                    return Err(MlldError::internal(
                        "run directive is missing its executable reference",
                    ));
                }
            };
            let variable = env.get(&reference.identifier).ok_or_else(|| {
                MlldError::new(ErrorKind::UnknownExecutable {
                    name: reference.identifier.clone(),
                })
            })?;
            let def = variable.value.as_executable().cloned().ok_or_else(|| {
                MlldError::new(ErrorKind::UnknownExecutable {
                    name: reference.identifier.clone(),
                })
            })?;
            let args = match &reference.args {
                Some(args) => evaluate_arg_nodes(args, env, interp)?,
                None => Vec::new(),
            };
            invoke_executable(&reference.identifier, &def, args, env, interp, true)
        }
        other => Err(MlldError::internal(format!(
            "execute_run_base called on {} directive",
            other
        ))),
    }
}

fn run_failure(stderr: &str, exit_code: i32) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("command exited with status {}", exit_code)
    } else {
        stderr.to_string()
    }
}

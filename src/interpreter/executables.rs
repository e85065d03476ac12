//! Executable Invocation
//!
//! Invokes a named executable with an argument list: arity check, a child
//! scope off the captured environment, parameter binding, then body
//! dispatch — command interpolation through the shell runtime, code through
//! the language runtime with a parameter prelude, templates by
//! interpolation in the child scope. A with-clause pipeline wraps the
//! invocation as the pipeline's retryable source stage.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::interpolation::interpolate;
use crate::interpreter::types::{guard_detail, Interpreter};
use crate::interpreter::variables::{ExecutableBody, ExecutableDef, Value, Variable, VariableMetadata};

/// Invoke an executable. `enforce_guards` is false when the invocation *is*
/// a guard predicate, so policies cannot recurse into themselves.
pub fn invoke_executable(
    name: &str,
    def: &ExecutableDef,
    args: Vec<Value>,
    call_env: &Environment,
    interp: &Interpreter,
    enforce_guards: bool,
) -> Result<String, MlldError> {
    if args.len() != def.params.len() {
        return Err(MlldError::new(ErrorKind::ArityMismatch {
            name: name.to_string(),
            expected: def.params.len(),
            got: args.len(),
        }));
    }
    tracing::debug!(executable = name, args = args.len(), "invoking");

    // Parameters bind in a child of the defining environment (lexical
    // scoping); the call site's scope is not visible to the body, except
    // for the reserved pipeline variables.
    let base_env = def.captured.clone().unwrap_or_else(|| call_env.clone());
    let scope = base_env.create_child();
    for reserved in ["input", "ctx", "hint"] {
        if let Some(variable) = call_env.get(reserved) {
            scope.set(variable);
        }
    }
    for (param, value) in def.params.iter().zip(args.iter()) {
        scope.set(Variable::new(
            param.clone(),
            value.clone(),
            VariableMetadata::transform(),
        ));
    }
    let env_vars = param_env_vars(def, &args);
    let bindings: Vec<(String, JsonValue)> = def
        .params
        .iter()
        .zip(args.iter())
        .map(|(p, v)| (p.clone(), v.to_data().unwrap_or(JsonValue::Null)))
        .collect();

    let output = execute_body(def, &scope, &env_vars, &bindings, interp, enforce_guards)?;
    if def.pipeline.is_empty() {
        return Ok(output);
    }
    // The invocation itself is the source stage: a retry targeting stage 0
    // re-runs the body.
    let mut source =
        || execute_body(def, &scope, &env_vars, &bindings, interp, enforce_guards);
    crate::pipeline::executor::run_pipeline(&def.pipeline, output, Some(&mut source), &scope, interp)
}

fn execute_body(
    def: &ExecutableDef,
    scope: &Environment,
    env_vars: &IndexMap<String, String>,
    bindings: &[(String, JsonValue)],
    interp: &Interpreter,
    enforce_guards: bool,
) -> Result<String, MlldError> {
    match &def.body {
        ExecutableBody::Template { nodes, .. } => interpolate(nodes, scope, interp),
        ExecutableBody::Command { command } => {
            let rendered = interpolate(command, scope, interp)?;
            if enforce_guards {
                enforce_guard("run", &rendered, interp)?;
            }
            let output = interp.runner.execute(
                "sh",
                &rendered,
                env_vars,
                "",
                &interp.options.base_path,
                interp.options.limits.command_timeout_ms,
            )?;
            if output.exit_code != 0 {
                return Err(MlldError::new(ErrorKind::ExecutionFailure {
                    lang: "sh".to_string(),
                    message: failure_message(&output.stderr, output.exit_code),
                    exit_code: Some(output.exit_code),
                }));
            }
            Ok(trim_trailing_newline(output.stdout))
        }
        ExecutableBody::Code { lang, source } => {
            if enforce_guards {
                enforce_guard("run", source, interp)?;
            }
            let code = wrap_code(lang, source, bindings);
            let output = interp.runner.execute(
                lang,
                &code,
                env_vars,
                "",
                &interp.options.base_path,
                interp.options.limits.command_timeout_ms,
            )?;
            if output.exit_code != 0 {
                return Err(MlldError::new(ErrorKind::ExecutionFailure {
                    lang: lang.clone(),
                    message: failure_message(&output.stderr, output.exit_code),
                    exit_code: Some(output.exit_code),
                }));
            }
            Ok(trim_trailing_newline(output.stdout))
        }
    }
}

/// Consult the guard registered for `label`, if any. The predicate receives
/// a `{label, detail}` object and denies by returning `false`, `deny`, or
/// `deny: reason`.
pub fn enforce_guard(label: &str, detail: &str, interp: &Interpreter) -> Result<(), MlldError> {
    let Some(entry) = interp.guard_for(label) else {
        return Ok(());
    };
    let variable = entry.env.get(&entry.predicate).ok_or_else(|| {
        MlldError::new(ErrorKind::UnknownExecutable {
            name: entry.predicate.clone(),
        })
    })?;
    let def = variable.value.as_executable().cloned().ok_or_else(|| {
        MlldError::type_mismatch(format!(
            "guard predicate @{} is not an executable",
            entry.predicate
        ))
    })?;
    let args = match def.params.len() {
        0 => Vec::new(),
        1 => vec![Value::Data(guard_detail(label, detail))],
        n => {
            return Err(MlldError::new(ErrorKind::ArityMismatch {
                name: entry.predicate.clone(),
                expected: 1,
                got: n,
            }));
        }
    };
    let verdict = invoke_executable(&entry.predicate, &def, args, &entry.env, interp, false)?;
    let verdict = verdict.trim();
    let denied = verdict.eq_ignore_ascii_case("deny")
        || verdict.eq_ignore_ascii_case("false")
        || verdict.to_ascii_lowercase().starts_with("deny:");
    if denied {
        let reason = verdict
            .split_once(':')
            .map(|(_, r)| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "policy rejected the operation".to_string());
        tracing::warn!(label = label, reason = %reason, "guard denied");
        return Err(MlldError::new(ErrorKind::GuardDenied {
            label: label.to_string(),
            reason,
        }));
    }
    Ok(())
}

/// Parameters are also exported as environment variables for command/code
/// bodies, rendered as text.
fn param_env_vars(def: &ExecutableDef, args: &[Value]) -> IndexMap<String, String> {
    def.params
        .iter()
        .zip(args.iter())
        .map(|(p, v)| {
            (
                format!("MLLD_{}", p.to_uppercase()),
                v.to_display_text().unwrap_or_default(),
            )
        })
        .collect()
}

/// Strip one trailing newline from command output.
pub fn trim_trailing_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}

fn failure_message(stderr: &str, exit_code: i32) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with status {}", exit_code)
    } else {
        stderr.to_string()
    }
}

/// Per-language wrapping: parameters become in-language bindings, and for
/// js the body's return value becomes the output.
pub(crate) fn wrap_code(lang: &str, source: &str, bindings: &[(String, JsonValue)]) -> String {
    match lang {
        "js" | "node" => {
            let mut prelude = String::new();
            for (name, value) in bindings {
                prelude.push_str(&format!(
                    "const {} = {};\n",
                    name,
                    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
                ));
            }
            format!(
                "{}const __result = (function() {{ {} }})();\n\
                 if (__result !== undefined) {{\n\
                   process.stdout.write(typeof __result === \"string\" ? __result : JSON.stringify(__result));\n\
                 }}\n",
                prelude, source
            )
        }
        "python" | "py" => {
            let mut prelude = String::from("import json as __json\n");
            for (name, value) in bindings {
                let encoded = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
                prelude.push_str(&format!(
                    "{} = __json.loads({})\n",
                    name,
                    python_string_literal(&encoded)
                ));
            }
            format!("{}{}", prelude, source)
        }
        "sh" | "bash" => {
            let mut prelude = String::new();
            for (name, value) in bindings {
                let text = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                prelude.push_str(&format!("{}={}\n", name, shell_quote(&text)));
            }
            format!("{}{}", prelude, source)
        }
        _ => source.to_string(),
    }
}

fn python_string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Single-quote a value for POSIX sh.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

//! Pipeline Executor
//!
//! Drives the state machine over a list of stage nodes: builds each stage's
//! child environment (`@input`, `@ctx`, `@hint`), binds parameters, executes
//! the target, interprets the stage's return value, and reports a
//! `StageResult` back to the machine.

use serde_json::Value as JsonValue;

use crate::ast::types::Node;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::executables::invoke_executable;
use crate::interpreter::resolution::evaluate_arg_nodes;
use crate::interpreter::types::Interpreter;
use crate::interpreter::variables::{Value, Variable};
use crate::pipeline::builtins::apply_builtin;
use crate::pipeline::context::StageContext;
use crate::pipeline::state_machine::{Action, PipelineMachine, StageResult};

/// Re-invocable pipeline source, for retries targeting stage 0.
pub type SourceFn<'s> = dyn FnMut() -> Result<String, MlldError> + 's;

/// Run a pipeline to completion. `source` is `Some` when the pipeline
/// originated from a re-invocable call; its presence makes stage 0
/// retryable.
pub fn run_pipeline(
    stages: &[Node],
    base_input: String,
    mut source: Option<&mut SourceFn>,
    env: &Environment,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    let machine_span = tracing::debug_span!("pipeline", stages = stages.len());
    let _guard = machine_span.enter();

    let mut machine = PipelineMachine::new(stages.len() as u32, source.is_some());
    let mut action = machine.start(base_input);
    let mut steps = 0usize;
    loop {
        steps += 1;
        if steps > interp.options.limits.max_iterations {
            return Err(MlldError::internal("pipeline iteration limit exceeded"));
        }
        match action {
            Action::ExecuteStage { stage, input } => {
                let result = if stage == 0 {
                    match source.as_mut() {
                        Some(f) => match f() {
                            Ok(output) => StageResult::Success { output },
                            Err(e) => StageResult::Error {
                                message: e.to_string(),
                            },
                        },
                        None => StageResult::Error {
                            message: "pipeline source is not re-invocable".to_string(),
                        },
                    }
                } else {
                    let node = &stages[(stage - 1) as usize];
                    let context = machine.stage_context(stage);
                    match execute_stage(node, &input, &context, env, interp) {
                        Ok(output) => classify_output(output),
                        Err(e) => StageResult::Error {
                            message: e.to_string(),
                        },
                    }
                };
                action = machine.on_stage_result(stage, result);
            }
            Action::Complete { output } => return Ok(output),
            Action::Abort { reason } => {
                return Err(MlldError::new(ErrorKind::PipelineAbort { reason }));
            }
            Action::Fail { stage, message } => {
                return Err(MlldError::new(ErrorKind::PipelineStageError {
                    stage,
                    message,
                }));
            }
        }
    }
}

/// Interpret a stage's raw output: the retry protocol first, then
/// normalisation.
fn classify_output(output: String) -> StageResult {
    let trimmed = output.trim();
    if trimmed == "retry" {
        return StageResult::Retry {
            from: None,
            hint: None,
        };
    }
    if trimmed.starts_with('{') {
        if let Ok(JsonValue::Object(obj)) = serde_json::from_str::<JsonValue>(trimmed) {
            if obj.get("value").and_then(|v| v.as_str()) == Some("retry") {
                return StageResult::Retry {
                    from: obj.get("from").and_then(|v| v.as_u64()).map(|v| v as u32),
                    hint: obj.get("hint").cloned().filter(|h| !h.is_null()),
                };
            }
            // Content-bearing objects unwrap to their content.
            if let (Some(content), Some(_)) = (
                obj.get("content").and_then(|v| v.as_str()),
                obj.get("filename"),
            ) {
                return StageResult::Success {
                    output: content.to_string(),
                };
            }
        }
    }
    StageResult::Success { output }
}

fn execute_stage(
    node: &Node,
    input: &str,
    context: &StageContext,
    env: &Environment,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    let reference = match node {
        Node::VariableReference(r) => r,
        other => {
            return Err(MlldError::internal(format!(
                "pipeline stage must be a reference, got {}",
                other.kind_name()
            )));
        }
    };
    let stage_span = tracing::debug_span!("stage", target = %reference.identifier, n = context.stage);
    let _guard = stage_span.enter();

    // Per-stage child environment
    let scope = env.create_child();
    scope.set(Variable::text("input", input));
    scope.set(Variable::data("ctx", context.to_json()));
    scope.set(Variable::data(
        "hint",
        context.hint.clone().unwrap_or(JsonValue::Null),
    ));

    // Explicit arguments: `@input` must not be passed, it is implicit.
    let explicit_args = match &reference.args {
        Some(args) => {
            for arg in args {
                if let [Node::VariableReference(r)] = arg.as_slice() {
                    if r.identifier == "input" && r.fields.is_empty() {
                        return Err(MlldError::type_mismatch(
                            "@input is implicit in pipeline stages and cannot be passed explicitly",
                        ));
                    }
                }
            }
            Some(evaluate_arg_nodes(args, &scope, interp)?)
        }
        None => None,
    };

    // A user-defined executable shadows a builtin of the same name.
    let target = scope.get(&reference.identifier);
    match target {
        Some(variable) => {
            let def = variable.value.as_executable().cloned().ok_or_else(|| {
                MlldError::new(ErrorKind::UnknownExecutable {
                    name: reference.identifier.clone(),
                })
            })?;
            let args = match explicit_args {
                Some(args) => args,
                None => bind_smart(&def.params, input),
            };
            invoke_executable(&reference.identifier, &def, args, &scope, interp, true)
        }
        None => match apply_builtin(&reference.identifier, input) {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(MlldError::new(ErrorKind::PipelineStageError {
                stage: context.stage,
                message,
            })),
            None => Err(MlldError::new(ErrorKind::UnknownExecutable {
                name: reference.identifier.clone(),
            })),
        },
    }
}

/// Smart parameter binding for stages invoked without explicit arguments:
/// zero params get none, one gets the input, several destructure a JSON
/// object input by name (or default to input-first).
fn bind_smart(params: &[String], input: &str) -> Vec<Value> {
    match params.len() {
        0 => Vec::new(),
        1 => vec![Value::Text(input.to_string())],
        _ => {
            if let Ok(JsonValue::Object(obj)) = serde_json::from_str::<JsonValue>(input) {
                if params.iter().all(|p| obj.contains_key(p)) {
                    return params
                        .iter()
                        .map(|p| Value::Data(obj[p].clone()))
                        .collect();
                }
            }
            let mut args = vec![Value::Text(input.to_string())];
            args.extend(
                std::iter::repeat_with(|| Value::Text(String::new())).take(params.len() - 1),
            );
            args
        }
    }
}

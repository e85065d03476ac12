//! `/var` — bind a name to the evaluated right-hand side.
//!
//! The bound value preserves its inferred type: text stays text, data stays
//! structured, references keep the referent's type (including executables),
//! and command values run before binding. A trailing pipeline transforms
//! the value; command sources make stage 0 retryable.

use crate::ast::types::{DirectiveNode, Node};
use crate::interpreter::collections::evaluate_collection;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::eval::{identifier_name, pipeline_slot, run};
use crate::interpreter::interpolation::interpolate;
use crate::interpreter::resolution::{resolve_reference, ResolutionContext};
use crate::interpreter::types::{EvalResult, Interpreter};
use crate::interpreter::variables::{Value, Variable, VariableMetadata};
use crate::pipeline::executor::run_pipeline;

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let name = identifier_name(directive, "identifier")?;
    let value_nodes = directive
        .slot("value")
        .ok_or_else(|| MlldError::internal("var directive is missing its value"))?;
    let inferred = directive.meta_str("inferredType").unwrap_or("text");

    let value = match inferred {
        "command" | "code" => {
            let run_directive = match value_nodes {
                [Node::Directive(d)] => d,
                _ => return Err(MlldError::internal("command value is not a run directive")),
            };
            let base = run::execute_run_base(run_directive, env, interp)?;
            let text = match pipeline_slot(directive) {
                Some(stages) => {
                    let mut source = || run::execute_run_base(run_directive, env, interp);
                    run_pipeline(stages, base, Some(&mut source), env, interp)?
                }
                None => base,
            };
            structured_or_text(text)
        }
        "load" => {
            let path = interpolate(value_nodes, env, interp)?;
            let content =
                super::show::load_file(&path, directive.meta_str("section"), env, interp)?;
            apply_value_pipeline(directive, Value::Text(content), env, interp)?
        }
        "reference" => {
            let reference = match value_nodes {
                [Node::VariableReference(r)] => r,
                _ => return Err(MlldError::internal("reference value is not a reference")),
            };
            let value = resolve_reference(reference, env, interp, ResolutionContext::DataStructure)?;
            apply_value_pipeline(directive, value, env, interp)?
        }
        "data" | "number" | "boolean" | "null" => {
            let value = match value_nodes {
                [Node::Object(_)] | [Node::Array(_)] => {
                    Value::Data(evaluate_collection(&value_nodes[0], env, interp)?)
                }
                [Node::Literal(l)] => Value::Data(l.value.clone()),
                _ => return Err(MlldError::internal("malformed data value")),
            };
            apply_value_pipeline(directive, value, env, interp)?
        }
        // "text" | "template"
        _ => {
            let text = interpolate(value_nodes, env, interp)?;
            apply_value_pipeline(directive, Value::Text(text), env, interp)?
        }
    };

    let mut variable = Variable::new(
        name,
        value,
        VariableMetadata::literal(directive.location, env.current_file()),
    );
    let collected = env.collected_security();
    if !collected.is_empty() {
        variable.security = Some(collected);
    }
    env.define(variable)?;
    Ok(EvalResult::ok())
}

/// Command output that parses as a JSON collection keeps both forms: the
/// text for interpolation and the data for field access.
fn structured_or_text(text: String) -> Value {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(data) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if data.is_object() || data.is_array() {
                return Value::Structured(crate::interpreter::variables::StructuredValue {
                    text,
                    data,
                });
            }
        }
    }
    Value::Text(text)
}

/// Apply a trailing pipeline to a non-re-invocable value.
fn apply_value_pipeline(
    directive: &DirectiveNode,
    value: Value,
    env: &Environment,
    interp: &Interpreter,
) -> Result<Value, MlldError> {
    match pipeline_slot(directive) {
        Some(stages) => {
            let input = match value.to_display_text() {
                Some(text) => text,
                None => {
                    return Err(MlldError::type_mismatch(
                        "an executable cannot feed a pipeline",
                    ));
                }
            };
            let output = run_pipeline(stages, input, None, env, interp)?;
            Ok(Value::Text(output))
        }
        None => Ok(value),
    }
}

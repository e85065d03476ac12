//! Value Resolution
//!
//! Turns references and pre-parsed node sequences into values: environment
//! lookup, invocation, field access, and with-clause pipelines, in that
//! order. Resolution is polymorphic over the collaborators on the
//! interpreter, so tests drive it with in-memory doubles.

use chrono::Utc;

use crate::ast::types::{DirectiveKind, Node, VariableReferenceNode};
use crate::interpreter::collections::evaluate_collection;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::executables::invoke_executable;
use crate::interpreter::field_access::apply_field_access;
use crate::interpreter::interpolation::interpolate;
use crate::interpreter::types::Interpreter;
use crate::interpreter::variables::{PathValue, Value};
use crate::pipeline::executor::run_pipeline;

/// Where a resolution request comes from; governs laziness and leniency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionContext {
    PipelineInput,
    FieldAccess,
    DataStructure,
    Interpolation,
}

/// Resolve a reference to a value. Executables without invocation arguments
/// are returned as-is for lazy execution; callers that need text decide what
/// an executable means to them.
pub fn resolve_reference(
    reference: &VariableReferenceNode,
    env: &Environment,
    interp: &Interpreter,
    context: ResolutionContext,
) -> Result<Value, MlldError> {
    let mut value = match env.get(&reference.identifier) {
        Some(variable) => {
            if let Some(security) = &variable.security {
                env.record_security(security.clone());
            }
            variable.value
        }
        None => match reserved_value(&reference.identifier, interp) {
            Some(v) => v,
            None => {
                if interp.options.strict {
                    return Err(
                        MlldError::variable_not_found(&reference.identifier).at(reference.location)
                    );
                }
                Value::Text(String::new())
            }
        },
    };

    if let Some(args) = &reference.args {
        let def = match value.as_executable() {
            Some(def) => def.clone(),
            None => {
                return Err(MlldError::new(ErrorKind::UnknownExecutable {
                    name: reference.identifier.clone(),
                })
                .at(reference.location));
            }
        };
        let arg_values = evaluate_arg_nodes(args, env, interp)?;
        let output = invoke_executable(&reference.identifier, &def, arg_values, env, interp, true)?;
        value = Value::Text(output);
    }

    let value = apply_field_access(value, &reference.fields, env, interp)
        .map_err(|e| e.at(reference.location))?;

    if let Some(with_clause) = &reference.with_clause {
        if !with_clause.pipeline.is_empty() {
            let input = display_or_error(&value, &reference.identifier, context, interp)?;
            let output = run_pipeline(&with_clause.pipeline, input, None, env, interp)?;
            return Ok(Value::Text(output));
        }
    }

    Ok(value)
}

fn display_or_error(
    value: &Value,
    name: &str,
    _context: ResolutionContext,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    match value.to_display_text() {
        Some(text) => Ok(text),
        None if interp.options.strict => Err(MlldError::type_mismatch(format!(
            "@{} is an executable and has no textual form",
            name
        ))),
        None => Ok(String::new()),
    }
}

/// Reserved references available without a binding.
fn reserved_value(name: &str, interp: &Interpreter) -> Option<Value> {
    match name {
        "now" => Some(Value::Text(Utc::now().to_rfc3339())),
        "base" => Some(Value::Path(PathValue {
            resolved: interp.options.base_path.clone(),
            original: "@base".to_string(),
        })),
        _ => None,
    }
}

/// Evaluate a pre-parsed node sequence to a value: single structured nodes
/// keep their shape, anything else interpolates to text.
pub fn evaluate_nodes_to_value(
    nodes: &[Node],
    env: &Environment,
    interp: &Interpreter,
) -> Result<Value, MlldError> {
    match nodes {
        [] => Ok(Value::Text(String::new())),
        [node] => match node {
            Node::Literal(l) => Ok(Value::Data(l.value.clone())),
            Node::Object(_) | Node::Array(_) => {
                Ok(Value::Data(evaluate_collection(node, env, interp)?))
            }
            Node::VariableReference(r) => {
                resolve_reference(r, env, interp, ResolutionContext::DataStructure)
            }
            Node::Directive(d) if d.kind == DirectiveKind::Run => {
                let output = crate::interpreter::eval::run::execute_run_base(d, env, interp)?;
                Ok(Value::Text(output))
            }
            Node::Text(t) => Ok(Value::Text(t.content.clone())),
            _ => Ok(Value::Text(interpolate(nodes, env, interp)?)),
        },
        _ => Ok(Value::Text(interpolate(nodes, env, interp)?)),
    }
}

/// Evaluate invocation arguments left-to-right.
pub fn evaluate_arg_nodes(
    args: &[Vec<Node>],
    env: &Environment,
    interp: &Interpreter,
) -> Result<Vec<Value>, MlldError> {
    args.iter()
        .map(|nodes| evaluate_nodes_to_value(nodes, env, interp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::test_support::TestWorld;
    use crate::interpreter::variables::Variable;
    use serde_json::json;

    fn reference(identifier: &str) -> VariableReferenceNode {
        VariableReferenceNode::bare(identifier, "t0".to_string(), None)
    }

    #[test]
    fn test_resolve_simple_text() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        env.set(Variable::text("greeting", "hi"));
        let value = resolve_reference(
            &reference("greeting"),
            &env,
            &interp,
            ResolutionContext::Interpolation,
        )
        .unwrap();
        assert_eq!(value.to_display_text().as_deref(), Some("hi"));
    }

    #[test]
    fn test_unknown_reference_strict_fails() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let err = resolve_reference(
            &reference("missing"),
            &env,
            &interp,
            ResolutionContext::Interpolation,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::VariableNotFound { .. }));
    }

    #[test]
    fn test_unknown_reference_permissive_is_empty() {
        let world = TestWorld::new();
        let mut interp = world.interpreter();
        interp.options.strict = false;
        let env = Environment::new();
        let value = resolve_reference(
            &reference("missing"),
            &env,
            &interp,
            ResolutionContext::Interpolation,
        )
        .unwrap();
        assert_eq!(value.to_display_text().as_deref(), Some(""));
    }

    #[test]
    fn test_reserved_now_and_base() {
        let world = TestWorld::new();
        let mut interp = world.interpreter();
        interp.options.base_path = "/project".to_string();
        let env = Environment::new();
        let now = resolve_reference(&reference("now"), &env, &interp, ResolutionContext::Interpolation)
            .unwrap();
        assert!(now.to_display_text().unwrap().contains('T'));
        let base = resolve_reference(&reference("base"), &env, &interp, ResolutionContext::Interpolation)
            .unwrap();
        assert_eq!(base.to_display_text().as_deref(), Some("/project"));
    }

    #[test]
    fn test_field_path_resolution_matches_manual_walk() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let data = json!({"a": [{"b": "deep"}]});
        env.set(Variable::data("x", data.clone()));

        let mut r = reference("x");
        r.fields = vec![
            crate::ast::types::FieldAccess::Name("a".into()),
            crate::ast::types::FieldAccess::Index(0),
            crate::ast::types::FieldAccess::Name("b".into()),
        ];
        let resolved = resolve_reference(&r, &env, &interp, ResolutionContext::FieldAccess).unwrap();
        let manual = data["a"][0]["b"].clone();
        assert_eq!(resolved.to_data(), Some(manual));
    }
}

//! `/for` — iterate an array, binding each element in a child scope.
//!
//! The body action (a `show` or `run`) runs once per element; outputs are
//! collected in iteration order.

use crate::ast::types::{DirectiveNode, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::eval::{evaluate_directive, identifier_name};
use crate::interpreter::resolution::evaluate_nodes_to_value;
use crate::interpreter::types::{EvalResult, Interpreter};
use crate::interpreter::variables::Variable;

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let variable_name = identifier_name(directive, "variable")?;
    let iterable_nodes = directive
        .slot("iterable")
        .ok_or_else(|| MlldError::internal("for directive is missing its iterable"))?;
    let body = match directive.slot("body") {
        Some([Node::Directive(d)]) => d,
        _ => return Err(MlldError::internal("for directive is missing its body")),
    };

    let iterable = evaluate_nodes_to_value(iterable_nodes, env, interp)?;
    let items = match iterable.to_data() {
        Some(serde_json::Value::Array(items)) => items,
        Some(other) => {
            return Err(MlldError::type_mismatch(format!(
                "for iterates arrays, got {}",
                match other {
                    serde_json::Value::Object(_) => "an object",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    serde_json::Value::Array(_) => "an array",
                }
            )));
        }
        None => {
            return Err(MlldError::type_mismatch(
                "for iterates arrays, got an executable",
            ));
        }
    };
    if items.len() > interp.options.limits.max_iterations {
        return Err(MlldError::internal(format!(
            "for loop exceeds the iteration limit ({})",
            interp.options.limits.max_iterations
        )));
    }

    let mut output = String::new();
    for item in items {
        let scope = env.create_child();
        scope.set(Variable::data(variable_name.clone(), item));
        let result = evaluate_directive(body, &scope, interp)?;
        output.push_str(&result.output);
    }
    Ok(EvalResult { output })
}

#[cfg(test)]
mod tests {
    use crate::interpreter::errors::ErrorKind;
    use crate::interpreter::test_support::{run_source, run_source_env, TestWorld};

    #[test]
    fn test_for_over_literal_array() {
        let world = TestWorld::new();
        let out = run_source(&world, "/for @x in [\"a\", \"b\", \"c\"] => show @x\n").unwrap();
        assert_eq!(out, "a\nb\nc\n");
    }

    #[test]
    fn test_for_over_bound_array() {
        let world = TestWorld::new();
        let src = "/var @items = [1, 2, 3]\n/for @n in @items => show ::n=@n::\n";
        let out = run_source(&world, src).unwrap();
        assert_eq!(out, "n=1\nn=2\nn=3\n");
    }

    #[test]
    fn test_loop_variable_scoped_to_body() {
        let world = TestWorld::new();
        let src = "/for @x in [1] => show @x\n";
        let (_, env) = run_source_env(&world, src).unwrap();
        assert!(env.get("x").is_none());
    }

    #[test]
    fn test_for_over_object_fields() {
        let world = TestWorld::new();
        let src = "/var @u = {tags: [\"dev\", \"ops\"]}\n/for @t in @u.tags => show @t\n";
        let out = run_source(&world, src).unwrap();
        assert_eq!(out, "dev\nops\n");
    }

    #[test]
    fn test_for_over_non_array_fails() {
        let world = TestWorld::new();
        let err = run_source(&world, "/var @s = \"nope\"\n/for @x in @s => show @x\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_empty_array_produces_nothing() {
        let world = TestWorld::new();
        let out = run_source(&world, "/for @x in [] => show @x\n").unwrap();
        assert_eq!(out, "");
    }
}

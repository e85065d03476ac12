//! Interpolation
//!
//! Walks a node sequence and concatenates: text verbatim, references in
//! their textual form (strings unchanged, data as JSON, paths resolved).
//! Each reference contribution may carry a `SecurityDescriptor`, merged into
//! the environment's collected descriptors during resolution.

use serde_json::Value as JsonValue;

use crate::ast::types::Node;
use crate::interpreter::collections::evaluate_collection;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::resolution::{resolve_reference, ResolutionContext};
use crate::interpreter::types::Interpreter;

/// Interpolate a node sequence into a string.
pub fn interpolate(
    nodes: &[Node],
    env: &Environment,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(&t.content),
            Node::VariableReference(r) => {
                let value = resolve_reference(r, env, interp, ResolutionContext::Interpolation)?;
                match value.to_display_text() {
                    Some(text) => out.push_str(&text),
                    None if interp.options.strict => {
                        return Err(MlldError::type_mismatch(format!(
                            "cannot interpolate executable @{}",
                            r.identifier
                        ))
                        .at(r.location));
                    }
                    None => {}
                }
            }
            Node::Literal(l) => out.push_str(&literal_text(&l.value)),
            Node::PathSeparator(_) => out.push('/'),
            Node::DotSeparator(_) => out.push('.'),
            Node::Object(_) | Node::Array(_) => {
                let data = evaluate_collection(node, env, interp)?;
                out.push_str(&serde_json::to_string(&data).unwrap_or_default());
            }
            other => {
                return Err(MlldError::internal(format!(
                    "{} node cannot appear in an interpolated sequence",
                    other.kind_name()
                ))
                .at(other.location()));
            }
        }
    }
    Ok(out)
}

fn literal_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::test_support::TestWorld;
    use crate::interpreter::variables::Variable;
    use crate::parser::{Parser, ParseOptions};
    use serde_json::json;

    fn template_nodes(src: &str) -> Vec<Node> {
        let mut p = Parser::new(src, ParseOptions::default());
        let spec = p.parse_value().unwrap();
        spec.nodes
    }

    #[test]
    fn test_plain_text_unchanged() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let nodes = template_nodes("`no variables here`");
        assert_eq!(
            interpolate(&nodes, &env, &interp).unwrap(),
            "no variables here"
        );
    }

    #[test]
    fn test_string_variable_unchanged() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        env.set(Variable::text("name", "Ada"));
        let nodes = template_nodes("`hello @name!`");
        assert_eq!(interpolate(&nodes, &env, &interp).unwrap(), "hello Ada!");
    }

    #[test]
    fn test_data_variable_renders_as_json() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        env.set(Variable::data("items", json!([1, 2, 3])));
        let nodes = template_nodes("`got @items`");
        assert_eq!(interpolate(&nodes, &env, &interp).unwrap(), "got [1,2,3]");
    }

    #[test]
    fn test_undefined_strict_fails_permissive_empty() {
        let world = TestWorld::new();
        let env = Environment::new();
        let nodes = template_nodes("`x @gone x`");

        let interp = world.interpreter();
        assert!(interpolate(&nodes, &env, &interp).is_err());

        let mut permissive = world.interpreter();
        permissive.options.strict = false;
        assert_eq!(interpolate(&nodes, &env, &permissive).unwrap(), "x  x");
    }

    #[test]
    fn test_mustache_template_interpolates() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        env.set(Variable::data("items", json!([1, 2, 3])));
        env.set(Variable::text("filter", "active"));
        let nodes = template_nodes(":::Processing {{items}} with filter {{filter}}:::");
        assert_eq!(
            interpolate(&nodes, &env, &interp).unwrap(),
            "Processing [1,2,3] with filter active"
        );
    }

    #[test]
    fn test_security_descriptor_collected() {
        use crate::security::SecurityDescriptor;
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let mut variable = Variable::text("tainted", "v");
        variable.security = Some(SecurityDescriptor::from_source("module:lib"));
        env.set(variable);
        let nodes = template_nodes("`use @tainted`");
        interpolate(&nodes, &env, &interp).unwrap();
        assert!(env.collected_security().sources.contains("module:lib"));
    }
}

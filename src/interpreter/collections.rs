//! Collection Evaluation
//!
//! Recursively evaluates parsed object/array nodes into JSON data. A failure
//! in one property/element is captured inline as a typed error object and
//! evaluation continues for the siblings — this isolation is a contract of
//! data evaluation only, never of top-level expressions.

use serde_json::{json, Value as JsonValue};

use crate::ast::types::Node;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::resolution::evaluate_nodes_to_value;
use crate::interpreter::types::Interpreter;
use crate::interpreter::variables::Value;

/// Evaluate an `Object`/`Array` node to JSON data.
pub fn evaluate_collection(
    node: &Node,
    env: &Environment,
    interp: &Interpreter,
) -> Result<JsonValue, MlldError> {
    match node {
        Node::Object(object) => {
            let mut map = serde_json::Map::new();
            for (key, nodes) in &object.entries {
                match evaluate_slot(nodes, env, interp) {
                    Ok(value) => {
                        map.insert(key.clone(), value);
                    }
                    Err(e) => {
                        map.insert(
                            key.clone(),
                            json!({
                                "__error": true,
                                "__message": e.to_string(),
                                "__property": key,
                            }),
                        );
                    }
                }
            }
            Ok(JsonValue::Object(map))
        }
        Node::Array(array) => {
            let mut items = Vec::with_capacity(array.elements.len());
            for (index, nodes) in array.elements.iter().enumerate() {
                match evaluate_slot(nodes, env, interp) {
                    Ok(value) => items.push(value),
                    Err(e) => items.push(json!({
                        "__error": true,
                        "__message": e.to_string(),
                        "__index": index,
                    })),
                }
            }
            Ok(JsonValue::Array(items))
        }
        other => Err(MlldError::internal(format!(
            "evaluate_collection called on {} node",
            other.kind_name()
        ))),
    }
}

fn evaluate_slot(
    nodes: &[Node],
    env: &Environment,
    interp: &Interpreter,
) -> Result<JsonValue, MlldError> {
    let value = evaluate_nodes_to_value(nodes, env, interp)?;
    Ok(match value {
        // Executables have no JSON form; keep a marker for tooling.
        Value::Executable(_) => JsonValue::String("<executable>".to_string()),
        other => other
            .to_data()
            .unwrap_or_else(|| JsonValue::String(String::new())),
    })
}

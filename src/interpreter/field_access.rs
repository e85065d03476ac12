//! Field Access
//!
//! Applies an ordered field-access tail to a value: `.name` / `["key"]`
//! object access, `[0]` array indexing, and `[@var]` dynamic keys. Dynamic
//! keys resolve their inner variable first, then index with the raw value.

use serde_json::Value as JsonValue;

use crate::ast::types::FieldAccess;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::types::Interpreter;
use crate::interpreter::variables::Value;

pub fn apply_field_access(
    value: Value,
    fields: &[FieldAccess],
    env: &Environment,
    interp: &Interpreter,
) -> Result<Value, MlldError> {
    if fields.is_empty() {
        return Ok(value);
    }
    let mut data = match value.to_data() {
        Some(d) => d,
        None => {
            return Err(MlldError::field_not_found(
                fields[0].to_string(),
                value.type_name(),
            ));
        }
    };
    for field in fields {
        data = step(data, field, env, interp)?;
    }
    Ok(Value::Data(data))
}

fn json_type(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn step(
    data: JsonValue,
    field: &FieldAccess,
    env: &Environment,
    interp: &Interpreter,
) -> Result<JsonValue, MlldError> {
    match field {
        FieldAccess::Name(key) | FieldAccess::StringKey(key) => object_get(data, key, interp),
        FieldAccess::Index(i) => array_get(data, *i, interp),
        FieldAccess::Dynamic(name) => {
            let variable = env
                .get(name)
                .ok_or_else(|| MlldError::variable_not_found(name))?;
            let key = variable.value.to_data().ok_or_else(|| {
                MlldError::type_mismatch(format!("@{} cannot be used as an access key", name))
            })?;
            match key {
                JsonValue::Number(n) => match n.as_i64() {
                    Some(i) => array_get(data, i, interp),
                    None => Err(MlldError::type_mismatch(format!(
                        "@{} is not an integer index",
                        name
                    ))),
                },
                JsonValue::String(s) => {
                    // A numeric string indexes arrays, otherwise it is a key
                    if data.is_array() {
                        match s.parse::<i64>() {
                            Ok(i) => array_get(data, i, interp),
                            Err(_) => Err(MlldError::type_mismatch(format!(
                                "@{} ('{}') cannot index an array",
                                name, s
                            ))),
                        }
                    } else {
                        object_get(data, &s, interp)
                    }
                }
                other => Err(MlldError::type_mismatch(format!(
                    "@{} resolves to {} and cannot be an access key",
                    name,
                    json_type(&other)
                ))),
            }
        }
    }
}

fn object_get(data: JsonValue, key: &str, interp: &Interpreter) -> Result<JsonValue, MlldError> {
    match &data {
        JsonValue::Object(map) => match map.get(key) {
            Some(v) => Ok(v.clone()),
            None if interp.options.strict => {
                Err(MlldError::field_not_found(format!(".{}", key), "object"))
            }
            None => Ok(JsonValue::String(String::new())),
        },
        other if interp.options.strict => {
            Err(MlldError::field_not_found(format!(".{}", key), json_type(other)))
        }
        _ => Ok(JsonValue::String(String::new())),
    }
}

fn array_get(data: JsonValue, index: i64, interp: &Interpreter) -> Result<JsonValue, MlldError> {
    if index < 0 {
        return Err(MlldError::type_mismatch(
            "negative indices are not supported",
        ));
    }
    match &data {
        JsonValue::Array(items) => match items.get(index as usize) {
            Some(v) => Ok(v.clone()),
            None if interp.options.strict => {
                Err(MlldError::field_not_found(format!("[{}]", index), "array"))
            }
            None => Ok(JsonValue::String(String::new())),
        },
        other if interp.options.strict => Err(MlldError::field_not_found(
            format!("[{}]", index),
            json_type(other),
        )),
        _ => Ok(JsonValue::String(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::errors::ErrorKind;
    use crate::interpreter::test_support::TestWorld;
    use crate::interpreter::variables::Variable;
    use serde_json::json;

    fn user() -> Value {
        Value::Data(json!({
            "name": "Alice",
            "contacts": [{"email": "a@x"}, {"email": "b@y"}]
        }))
    }

    #[test]
    fn test_dotted_and_indexed_access() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let fields = vec![
            FieldAccess::Name("contacts".into()),
            FieldAccess::Index(1),
            FieldAccess::Name("email".into()),
        ];
        let result = apply_field_access(user(), &fields, &env, &interp).unwrap();
        assert_eq!(result.to_display_text().as_deref(), Some("b@y"));
    }

    #[test]
    fn test_dynamic_index() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        env.set(Variable::data("i", json!(1)));
        let fields = vec![
            FieldAccess::Name("contacts".into()),
            FieldAccess::Dynamic("i".into()),
            FieldAccess::Name("email".into()),
        ];
        let result = apply_field_access(user(), &fields, &env, &interp).unwrap();
        assert_eq!(result.to_display_text().as_deref(), Some("b@y"));
    }

    #[test]
    fn test_dynamic_string_key() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        env.set(Variable::text("k", "name"));
        let fields = vec![FieldAccess::Dynamic("k".into())];
        let result = apply_field_access(user(), &fields, &env, &interp).unwrap();
        assert_eq!(result.to_display_text().as_deref(), Some("Alice"));
    }

    #[test]
    fn test_missing_field_strict() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let fields = vec![FieldAccess::Name("age".into())];
        let err = apply_field_access(user(), &fields, &env, &interp).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::FieldNotFound { .. }));
    }

    #[test]
    fn test_missing_field_permissive() {
        let world = TestWorld::new();
        let mut interp = world.interpreter();
        interp.options.strict = false;
        let env = Environment::new();
        let fields = vec![FieldAccess::Name("age".into())];
        let result = apply_field_access(user(), &fields, &env, &interp).unwrap();
        assert_eq!(result.to_display_text().as_deref(), Some(""));
    }

    #[test]
    fn test_negative_index_rejected() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let fields = vec![FieldAccess::Name("contacts".into()), FieldAccess::Index(-1)];
        let err = apply_field_access(user(), &fields, &env, &interp).unwrap_err();
        assert!(err.to_string().contains("negative indices"));
    }

    #[test]
    fn test_field_on_non_object() {
        let world = TestWorld::new();
        let interp = world.interpreter();
        let env = Environment::new();
        let fields = vec![FieldAccess::Name("x".into())];
        let err =
            apply_field_access(Value::Data(json!(42)), &fields, &env, &interp).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::FieldNotFound { .. }));
    }
}

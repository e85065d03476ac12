//! Builtin Transformers
//!
//! Stage functions available in every pipeline without a user definition.
//! A user-defined executable of the same name shadows the builtin.

use lazy_static::lazy_static;
use std::collections::HashMap;

type Transformer = fn(&str) -> Result<String, String>;

lazy_static! {
    static ref TRANSFORMERS: HashMap<&'static str, Transformer> = {
        let mut m: HashMap<&'static str, Transformer> = HashMap::new();
        m.insert("upper", |s| Ok(s.to_uppercase()));
        m.insert("lower", |s| Ok(s.to_lowercase()));
        m.insert("trim", |s| Ok(s.trim().to_string()));
        m.insert("json", pretty_json);
        m.insert("lines", lines);
        m
    };
}

fn pretty_json(input: &str) -> Result<String, String> {
    let value: serde_json::Value = serde_json::from_str(input)
        .unwrap_or_else(|_| serde_json::Value::String(input.to_string()));
    serde_json::to_string_pretty(&value).map_err(|e| e.to_string())
}

fn lines(input: &str) -> Result<String, String> {
    let items: Vec<&str> = input.lines().collect();
    serde_json::to_string(&items).map_err(|e| e.to_string())
}

pub fn is_builtin(name: &str) -> bool {
    TRANSFORMERS.contains_key(name)
}

pub fn apply_builtin(name: &str, input: &str) -> Option<Result<String, String>> {
    TRANSFORMERS.get(name).map(|f| f(input))
}

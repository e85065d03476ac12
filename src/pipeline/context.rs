//! Per-Stage Context
//!
//! A fresh context object is built for every stage invocation and exposed to
//! stage code as `@ctx`: attempt counters, retry history, hints, and the
//! outputs of earlier stages.

use std::collections::HashMap;

use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageContext {
    pub stage: u32,
    /// Global execution number of this stage (1 on first run).
    pub attempt: u32,
    /// Attempt number within the active retry context; counts the initial
    /// execution as 1.
    pub context_attempt: u32,
    /// Prior attempt outputs of the retrying stage within the active
    /// context.
    pub history: Vec<String>,
    /// Latest successful output of every stage strictly before this one.
    pub previous_outputs: HashMap<u32, String>,
    /// All outputs so far: 0 is the base input.
    pub outputs: HashMap<u32, String>,
    pub context_id: Option<String>,
    pub hint: Option<JsonValue>,
    pub hints: Vec<JsonValue>,
    pub total_stages: u32,
}

impl StageContext {
    /// JSON shape bound as `@ctx` in the stage scope.
    pub fn to_json(&self) -> JsonValue {
        let key_map = |m: &HashMap<u32, String>| {
            let mut obj = serde_json::Map::new();
            let mut keys: Vec<&u32> = m.keys().collect();
            keys.sort();
            for k in keys {
                obj.insert(k.to_string(), JsonValue::String(m[k].clone()));
            }
            JsonValue::Object(obj)
        };
        json!({
            "stage": self.stage,
            "attempt": self.attempt,
            "contextAttempt": self.context_attempt,
            "history": self.history,
            "previousOutputs": key_map(&self.previous_outputs),
            "outputs": key_map(&self.outputs),
            "contextId": self.context_id,
            "hint": self.hint,
            "hints": self.hints,
            "totalStages": self.total_stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_shape() {
        let mut ctx = StageContext {
            stage: 2,
            attempt: 3,
            context_attempt: 2,
            total_stages: 3,
            ..Default::default()
        };
        ctx.outputs.insert(0, "base".to_string());
        ctx.outputs.insert(1, "one".to_string());
        ctx.previous_outputs.insert(1, "one".to_string());
        ctx.hints.push(json!("try harder"));
        ctx.hint = Some(json!("try harder"));

        let j = ctx.to_json();
        assert_eq!(j["stage"], 2);
        assert_eq!(j["contextAttempt"], 2);
        assert_eq!(j["outputs"]["0"], "base");
        assert_eq!(j["previousOutputs"]["1"], "one");
        assert_eq!(j["hint"], "try harder");
        assert_eq!(j["totalStages"], 3);
    }
}

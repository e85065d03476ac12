//! `/when` — conditional with pattern arms; the first matching arm's
//! action runs.
//!
//! Patterns: literal equality (strings, numbers, booleans), the `*`
//! wildcard, and the bare truthiness form `/when @cond => action`.

use serde_json::Value as JsonValue;

use crate::ast::types::{DirectiveNode, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::eval::evaluate_directive;
use crate::interpreter::resolution::evaluate_nodes_to_value;
use crate::interpreter::types::{EvalResult, Interpreter};

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let subject_nodes = directive
        .slot("subject")
        .ok_or_else(|| MlldError::internal("when directive is missing its subject"))?;
    let actions = directive.slot("actions").unwrap_or(&[]);
    let subject = evaluate_nodes_to_value(subject_nodes, env, interp)?;

    if directive.meta_str("form") == Some("truthy") {
        if subject.is_truthy() {
            if let Some(Node::Directive(action)) = actions.first() {
                return evaluate_directive(action, env, interp);
            }
        }
        return Ok(EvalResult::ok());
    }

    let conditions = directive.slot("conditions").unwrap_or(&[]);
    let subject_data = subject.to_data();
    for (condition, action) in conditions.iter().zip(actions.iter()) {
        if pattern_matches(condition, &subject_data) {
            if let Node::Directive(action) = action {
                return evaluate_directive(action, env, interp);
            }
        }
    }
    Ok(EvalResult::ok())
}

fn pattern_matches(condition: &Node, subject: &Option<JsonValue>) -> bool {
    match condition {
        Node::Text(t) if t.content == "*" => true,
        Node::Literal(l) => subject.as_ref() == Some(&l.value),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::test_support::{run_source, TestWorld};

    #[test]
    fn test_truthy_form_runs_action() {
        let world = TestWorld::new();
        let src = "/var @ready = true\n/when @ready => show \"go\"\n";
        assert_eq!(run_source(&world, src).unwrap(), "go\n");
    }

    #[test]
    fn test_truthy_form_skips_on_false() {
        let world = TestWorld::new();
        let src = "/var @ready = false\n/when @ready => show \"go\"\n";
        assert_eq!(run_source(&world, src).unwrap(), "");
    }

    #[test]
    fn test_first_matching_arm_wins() {
        let world = TestWorld::new();
        let src = "/var @mode = \"fast\"\n\
                   /when @mode [\n\
                   \x20 \"fast\" => show \"F\"\n\
                   \x20 \"slow\" => show \"S\"\n\
                   \x20 * => show \"other\"\n\
                   ]\n";
        assert_eq!(run_source(&world, src).unwrap(), "F\n");
    }

    #[test]
    fn test_wildcard_arm() {
        let world = TestWorld::new();
        let src = "/var @mode = \"weird\"\n\
                   /when @mode [\n\
                   \x20 \"fast\" => show \"F\"\n\
                   \x20 * => show \"other\"\n\
                   ]\n";
        assert_eq!(run_source(&world, src).unwrap(), "other\n");
    }

    #[test]
    fn test_numeric_equality() {
        let world = TestWorld::new();
        let src = "/var @n = 2\n\
                   /when @n [\n\
                   \x20 1 => show \"one\"\n\
                   \x20 2 => show \"two\"\n\
                   ]\n";
        assert_eq!(run_source(&world, src).unwrap(), "two\n");
    }

    #[test]
    fn test_no_match_no_output() {
        let world = TestWorld::new();
        let src = "/var @n = 9\n/when @n [\n\x20 1 => show \"one\"\n]\n";
        assert_eq!(run_source(&world, src).unwrap(), "");
    }

    #[test]
    fn test_only_first_match_runs() {
        let world = TestWorld::new();
        let src = "/var @m = \"x\"\n\
                   /when @m [\n\
                   \x20 \"x\" => show \"first\"\n\
                   \x20 * => show \"second\"\n\
                   ]\n";
        assert_eq!(run_source(&world, src).unwrap(), "first\n");
    }
}

//! `/checkpoint` — record a named point in the run for later inspection.

use crate::ast::types::{DirectiveNode, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::types::{EvalResult, Interpreter};

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let name = match directive.slot("name") {
        Some([Node::Text(t)]) => t.content.clone(),
        _ => return Err(MlldError::internal("checkpoint directive is missing its name")),
    };
    tracing::info!(checkpoint = %name, "checkpoint");
    interp.record_checkpoint(&name, env.current_file());
    Ok(EvalResult::ok())
}

#[cfg(test)]
mod tests {
    use crate::interpreter::test_support::{run_source_checkpoints, TestWorld};

    #[test]
    fn test_checkpoints_recorded_in_order() {
        let world = TestWorld::new();
        let src = "/checkpoint \"start\"\n/var @x = 1\n/checkpoint \"after-x\"\n";
        let checkpoints = run_source_checkpoints(&world, src).unwrap();
        let names: Vec<_> = checkpoints.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["start", "after-x"]);
        assert!(checkpoints[0].at <= checkpoints[1].at);
    }

    #[test]
    fn test_checkpoint_produces_no_output() {
        let world = TestWorld::new();
        let src = "before\n/checkpoint \"mid\"\nafter\n";
        let checkpoints = run_source_checkpoints(&world, src).unwrap();
        assert_eq!(checkpoints.len(), 1);
    }
}

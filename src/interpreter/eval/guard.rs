//! `/guard` — register a policy predicate for a labelled operation.
//!
//! Labelled operations consulted by the core: `run` (command/code
//! execution), `import` (module loading), and `file-read` (`<path>`
//! loads). The predicate receives a `{label, detail}` object and denies by
//! returning `false`, `deny`, or `deny: reason`.

use crate::ast::types::{DirectiveNode, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::types::{EvalResult, GuardEntry, Interpreter};

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let label = match directive.slot("label") {
        Some([Node::Text(t)]) => t.content.clone(),
        _ => return Err(MlldError::internal("guard directive is missing its label")),
    };
    let predicate = match directive.slot("predicate") {
        Some([Node::VariableReference(r)]) => r.identifier.clone(),
        _ => return Err(MlldError::internal("guard directive is missing its predicate")),
    };
    let variable = env
        .get(&predicate)
        .ok_or_else(|| MlldError::variable_not_found(&predicate))?;
    if variable.value.as_executable().is_none() {
        return Err(MlldError::type_mismatch(format!(
            "guard predicate @{} must be an executable",
            predicate
        )));
    }
    tracing::debug!(label = %label, predicate = %predicate, "guard registered");
    interp.register_guard(
        &label,
        GuardEntry {
            predicate,
            env: env.clone(),
        },
    );
    Ok(EvalResult::ok())
}

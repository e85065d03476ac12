//! `/export` — mark bindings as this module's public surface.
//!
//! Selected imports may only name exported bindings once a module declares
//! an export list; modules without one offer every top-level binding. The
//! list may name bindings defined later in the file.

use crate::ast::types::{DirectiveNode, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::types::{EvalResult, Interpreter};

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    _interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let names = directive
        .slot("names")
        .ok_or_else(|| MlldError::internal("export directive is missing its names"))?;
    for node in names {
        if let Node::VariableReference(r) = node {
            env.mark_exported(&r.identifier);
        }
    }
    Ok(EvalResult::ok())
}

//! Interpreter
//!
//! Walks the AST in document order, evaluating directives against a scoped
//! environment and assembling the output document. Text and fenced code
//! flow through verbatim; comments are dropped; each directive contributes
//! whatever output its evaluator produced.

pub mod adapters;
pub mod collections;
pub mod environment;
pub mod errors;
pub mod eval;
pub mod executables;
pub mod field_access;
pub mod interpolation;
pub mod resolution;
pub mod types;
pub mod variables;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapters::{SyncFsAdapter, SyncResolverAdapter, SyncRunnerAdapter};
pub use environment::Environment;
pub use errors::{ErrorKind, MlldError};
pub use types::{
    Checkpoint, EvalResult, ExecutionLimits, Interpreter, InterpreterOptions,
};
pub use variables::{Value, Variable, VariableMetadata};

use crate::ast::types::{Document, Node};

/// Build the root environment for a document run: the current file tag and
/// the reserved `@fm` frontmatter binding.
pub fn root_environment(document: &Document, file: Option<String>) -> Environment {
    let env = Environment::with_file(file);
    if let Some(frontmatter) = &document.frontmatter {
        env.set(Variable::data("fm", frontmatter.clone()));
    }
    env
}

pub fn interpret_document(
    document: &Document,
    env: &Environment,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    interpret_nodes(&document.nodes, env, interp)
}

/// Evaluate a node sequence in document order. Environment mutations are
/// visible to subsequent directives immediately.
pub fn interpret_nodes(
    nodes: &[Node],
    env: &Environment,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    let mut output = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => output.push_str(&t.content),
            Node::CodeFence(f) => output.push_str(&f.raw),
            Node::Comment(_) => {}
            Node::Error(_) => {}
            Node::Directive(directive) => {
                interp.count_directive()?;
                let span = tracing::debug_span!(
                    "directive",
                    kind = directive.kind.as_str(),
                    subtype = directive.subtype.as_str()
                );
                let _guard = span.enter();
                let result = eval::evaluate_directive(directive, env, interp).map_err(|e| {
                    e.at(directive.location)
                        .in_file(env.current_file().as_deref())
                })?;
                output.push_str(&result.output);
            }
            // Remaining kinds only occur inside directive slots.
            _ => {}
        }
    }
    Ok(output)
}

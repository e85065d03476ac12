//! Directive Evaluators
//!
//! One evaluator per directive kind, dispatched through a registry keyed by
//! `(kind, subtype)`. Evaluators share the contract
//! `(node, env) -> EvalResult`: output nodes plus already-applied
//! environment mutations. Collaborator failures map into the central error
//! taxonomy with the directive's location attached by the interpreter loop.

pub mod checkpoint;
pub mod exe;
pub mod export;
pub mod for_directive;
pub mod guard;
pub mod import;
pub mod path;
pub mod run;
pub mod show;
pub mod var;
pub mod when;

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::ast::types::{DirectiveKind, DirectiveNode, DirectiveSubtype, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::types::{EvalResult, Interpreter};

pub type EvalFn = fn(&DirectiveNode, &Environment, &Interpreter) -> Result<EvalResult, MlldError>;

lazy_static! {
    static ref REGISTRY: HashMap<(DirectiveKind, DirectiveSubtype), EvalFn> = {
        use DirectiveKind as K;
        use DirectiveSubtype as S;
        let mut m: HashMap<(K, S), EvalFn> = HashMap::new();
        m.insert((K::Var, S::Var), var::evaluate as EvalFn);
        m.insert((K::Exe, S::ExecCommand), exe::evaluate);
        m.insert((K::Exe, S::ExecCode), exe::evaluate);
        m.insert((K::Exe, S::ExecTemplate), exe::evaluate);
        m.insert((K::Path, S::AddPath), path::evaluate);
        m.insert((K::Show, S::Show), show::evaluate);
        m.insert((K::Run, S::RunCommand), run::evaluate);
        m.insert((K::Run, S::RunCode), run::evaluate);
        m.insert((K::Run, S::RunExec), run::evaluate);
        m.insert((K::Import, S::ImportAll), import::evaluate);
        m.insert((K::Import, S::ImportSelected), import::evaluate);
        m.insert((K::Export, S::ExportSelected), export::evaluate);
        m.insert((K::For, S::ForEach), for_directive::evaluate);
        m.insert((K::When, S::WhenMatch), when::evaluate);
        m.insert((K::Checkpoint, S::Checkpoint), checkpoint::evaluate);
        m.insert((K::Guard, S::Guard), guard::evaluate);
        m
    };
}

pub fn evaluate_directive(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    match REGISTRY.get(&(directive.kind, directive.subtype)) {
        Some(handler) => handler(directive, env, interp),
        None => Err(MlldError::internal(format!(
            "no evaluator registered for {}/{}",
            directive.kind, directive.subtype
        ))),
    }
}

/// Extract the bare identifier from a binding slot.
pub(crate) fn identifier_name(directive: &DirectiveNode, slot: &str) -> Result<String, MlldError> {
    match directive.slot(slot) {
        Some([Node::VariableReference(r)]) => Ok(r.identifier.clone()),
        _ => Err(MlldError::internal(format!(
            "{} directive is missing its '{}' slot",
            directive.kind, slot
        ))),
    }
}

/// Non-empty pipeline slot, if present.
pub(crate) fn pipeline_slot<'a>(directive: &'a DirectiveNode) -> Option<&'a [Node]> {
    directive.slot("pipeline").filter(|s| !s.is_empty())
}

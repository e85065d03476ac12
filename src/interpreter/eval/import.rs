//! `/import` — load a module and copy bindings into the current scope.
//!
//! The module is resolved through the resolver collaborator, interpreted in
//! a child environment, and then either every binding (`*`) or a
//! selected/aliased subset is copied in. Imported variables keep the source
//! variable's full type and metadata. Circular imports are detected by
//! module identity.

use crate::ast::types::{DirectiveNode, DirectiveSubtype, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::executables::enforce_guard;
use crate::interpreter::interpolation::interpolate;
use crate::interpreter::types::{EvalResult, Interpreter};
use crate::interpreter::variables::{Value, Variable, VariableMetadata, VariableOrigin};
use crate::parser::ParseOptions;
use crate::resolver::ResolveContext;
use crate::security::SecurityDescriptor;

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let source_nodes = directive
        .slot("source")
        .ok_or_else(|| MlldError::internal("import directive is missing its source"))?;
    let reference = interpolate(source_nodes, env, interp)?;
    enforce_guard("import", &reference, interp)?;

    let context = ResolveContext {
        importing_file: env.current_file(),
        base_path: interp.options.base_path.clone(),
    };
    let module = interp
        .resolver
        .resolve(&reference, &context)
        .map_err(|message| {
            MlldError::new(ErrorKind::ImportResolution {
                reference: reference.clone(),
                message,
            })
        })?;
    tracing::debug!(module = %module.origin, hash = %module.integrity_hash, "importing");

    interp.begin_import(&module.origin)?;
    let interpreted = interpret_module(&module.content, &module.origin, interp);
    interp.end_import(&module.origin);
    let module_env = interpreted?;

    match directive.subtype {
        DirectiveSubtype::ImportAll => {
            for name in module_env.local_names() {
                copy_binding(env, &module_env, &name, &name, &module.origin)?;
            }
        }
        _ => {
            let importable = module_env.importable_names();
            let aliases = directive.meta.get("aliases");
            let imports = directive.slot("imports").unwrap_or(&[]);
            for node in imports {
                let name = match node {
                    Node::VariableReference(r) => r.identifier.clone(),
                    _ => continue,
                };
                if !importable.iter().any(|n| n == &name) {
                    return Err(MlldError::new(ErrorKind::ImportResolution {
                        reference: reference.clone(),
                        message: format!("module does not export @{}", name),
                    }));
                }
                let alias = aliases
                    .and_then(|a| a.get(&name))
                    .and_then(|v| v.as_str())
                    .unwrap_or(&name)
                    .to_string();
                copy_binding(env, &module_env, &name, &alias, &module.origin)?;
            }
        }
    }
    Ok(EvalResult::ok())
}

/// Parse and interpret a module in a fresh environment; the module's
/// rendered output is discarded, only bindings survive.
fn interpret_module(
    content: &str,
    origin: &str,
    interp: &Interpreter,
) -> Result<Environment, MlldError> {
    let result = crate::parser::parse_with_options(
        content,
        ParseOptions {
            strict: true,
            file: Some(origin.to_string()),
            track_locations: true,
        },
    )?;
    let module_env = crate::interpreter::root_environment(&result.document, Some(origin.to_string()));
    crate::interpreter::interpret_nodes(&result.document.nodes, &module_env, interp)?;
    Ok(module_env)
}

fn copy_binding(
    env: &Environment,
    module_env: &Environment,
    name: &str,
    alias: &str,
    origin: &str,
) -> Result<(), MlldError> {
    let variable = module_env.get(name).ok_or_else(|| {
        MlldError::new(ErrorKind::ImportResolution {
            reference: origin.to_string(),
            message: format!("module exports @{} but never defines it", name),
        })
    })?;
    let mut imported = Variable::new(
        alias,
        Value::Imported {
            inner: Box::new(variable.value),
            module: origin.to_string(),
        },
        VariableMetadata {
            origin: VariableOrigin::Import {
                source: origin.to_string(),
            },
            defined_at: variable.metadata.defined_at,
            source_file: Some(origin.to_string()),
        },
    );
    let mut descriptor =
        SecurityDescriptor::from_source(format!("module:{}", origin)).with_label("imported");
    if let Some(existing) = variable.security {
        descriptor = crate::security::descriptor_merge(&[existing, descriptor]);
    }
    imported.security = Some(descriptor);
    env.define(imported)
}

//! `/exe` — define a named executable closure.
//!
//! The body is stored un-evaluated; free variables are captured lexically
//! by holding the defining environment. Parameters are positional with
//! fixed arity.

use crate::ast::types::{DirectiveNode, DirectiveSubtype, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::eval::{identifier_name, pipeline_slot};
use crate::interpreter::types::{EvalResult, Interpreter};
use crate::interpreter::variables::{
    ExecutableBody, ExecutableDef, Value, Variable, VariableMetadata,
};

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    _interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let name = identifier_name(directive, "identifier")?;
    let params: Vec<String> = directive
        .slot("params")
        .unwrap_or(&[])
        .iter()
        .filter_map(|n| match n {
            Node::VariableReference(r) => Some(r.identifier.clone()),
            _ => None,
        })
        .collect();

    let body = match directive.subtype {
        DirectiveSubtype::ExecCommand => {
            let run_directive = match directive.slot("body") {
                Some([Node::Directive(d)]) => d,
                _ => return Err(MlldError::internal("exe body is not a run directive")),
            };
            let command = run_directive
                .values
                .get("command")
                .cloned()
                .ok_or_else(|| MlldError::internal("exe command body has no command slot"))?;
            ExecutableBody::Command { command }
        }
        DirectiveSubtype::ExecCode => {
            let run_directive = match directive.slot("body") {
                Some([Node::Directive(d)]) => d,
                _ => return Err(MlldError::internal("exe body is not a code directive")),
            };
            let lang = run_directive.meta_str("language").unwrap_or("sh").to_string();
            let source = run_directive
                .raw_slot("code")
                .map(|s| s.trim().to_string())
                .ok_or_else(|| MlldError::internal("exe code body has no code slot"))?;
            ExecutableBody::Code { lang, source }
        }
        _ => {
            let nodes = directive
                .slot("template")
                .ok_or_else(|| MlldError::internal("exe template body is missing"))?
                .to_vec();
            ExecutableBody::Template {
                nodes,
                wrapper: directive
                    .meta_str("wrapperType")
                    .unwrap_or("backtick")
                    .to_string(),
            }
        }
    };

    let mut def = ExecutableDef::new(params, body, Some(env.clone()));
    if let Some(stages) = pipeline_slot(directive) {
        def.pipeline = stages.to_vec();
    }
    env.define(Variable::new(
        name,
        Value::Executable(def),
        VariableMetadata::literal(directive.location, env.current_file()),
    ))?;
    Ok(EvalResult::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::test_support::{run_source, run_source_env, TestWorld};

    #[test]
    fn test_define_template_executable() {
        let world = TestWorld::new();
        let src = "/exe @greet(name) = ::hi @name::\n";
        let (_, env) = run_source_env(&world, src).unwrap();
        let def = env.get("greet").unwrap().value.as_executable().cloned().unwrap();
        assert_eq!(def.params, vec!["name"]);
        assert!(matches!(def.body, ExecutableBody::Template { .. }));
    }

    #[test]
    fn test_params_in_declaration_order() {
        let world = TestWorld::new();
        let src = "/exe @f(alpha, beta, gamma) = ::x::\n";
        let (_, env) = run_source_env(&world, src).unwrap();
        let def = env.get("f").unwrap().value.as_executable().cloned().unwrap();
        assert_eq!(def.params, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_body_is_not_evaluated_at_definition() {
        // @undefined only matters at invocation time.
        let world = TestWorld::new();
        let out = run_source(&world, "/exe @f(x) = ::@x and @undefined::\n").unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_code_body_keeps_language() {
        let world = TestWorld::new();
        let src = "/exe @up(s) = js { return s.toUpperCase() }\n";
        let (_, env) = run_source_env(&world, src).unwrap();
        let def = env.get("up").unwrap().value.as_executable().cloned().unwrap();
        match def.body {
            ExecutableBody::Code { lang, source } => {
                assert_eq!(lang, "js");
                assert_eq!(source, "return s.toUpperCase()");
            }
            other => panic!("expected code body, got {:?}", other),
        }
    }

    #[test]
    fn test_invocation_through_show() {
        let world = TestWorld::new();
        let src = "/exe @wrap(x) = ::[@x]::\n/show @wrap(\"v\")\n";
        let out = run_source(&world, src).unwrap();
        assert_eq!(out, "[v]\n");
    }

    #[test]
    fn test_closure_captures_lexically() {
        let world = TestWorld::new();
        let src = "/var @prefix = \">>\"\n/exe @mark(x) = ::@prefix @x::\n/show @mark(\"a\")\n";
        let out = run_source(&world, src).unwrap();
        assert_eq!(out, ">> a\n");
    }
}

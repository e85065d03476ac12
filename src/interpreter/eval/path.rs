//! `/path` — bind a filesystem-or-URL path variable.
//!
//! Resolves `~`, project-root-relative forms, and embedded variables; the
//! variable keeps both the resolved absolute form and the original token
//! for error display.

use crate::ast::types::DirectiveNode;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::MlldError;
use crate::interpreter::eval::identifier_name;
use crate::interpreter::interpolation::interpolate;
use crate::interpreter::types::{EvalResult, Interpreter};
use crate::interpreter::variables::{PathValue, Value, Variable, VariableMetadata};

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let name = identifier_name(directive, "identifier")?;
    let nodes = directive
        .slot("path")
        .ok_or_else(|| MlldError::internal("path directive is missing its path"))?;
    let original = directive.raw_slot("path").unwrap_or("").to_string();
    let text = interpolate(nodes, env, interp)?;
    let resolved = resolve_user_path(&text, env, interp);

    env.define(Variable::new(
        name,
        Value::Path(PathValue { resolved, original }),
        VariableMetadata::literal(directive.location, env.current_file()),
    ))?;
    Ok(EvalResult::ok())
}

/// `~` expands to the home directory, URLs pass through, everything else
/// joins against the project root.
fn resolve_user_path(path: &str, _env: &Environment, interp: &Interpreter) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if let Some(rest) = path.strip_prefix('~') {
        let home = std::env::var("HOME").unwrap_or_else(|_| interp.options.base_path.clone());
        return interp
            .fs
            .resolve_path(&home, rest.trim_start_matches('/'));
    }
    interp.fs.resolve_path(&interp.options.base_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::test_support::{run_source_env, TestWorld};

    fn path_of(env: &Environment, name: &str) -> PathValue {
        match env.get(name).unwrap().value {
            Value::Path(p) => p,
            other => panic!("expected path, got {:?}", other),
        }
    }

    #[test]
    fn test_absolute_path() {
        let world = TestWorld::new();
        let (_, env) = run_source_env(&world, "/path @cfg = /etc/app.json\n").unwrap();
        let p = path_of(&env, "cfg");
        assert_eq!(p.resolved, "/etc/app.json");
        assert_eq!(p.original, "/etc/app.json");
    }

    #[test]
    fn test_relative_path_joins_base() {
        let world = TestWorld::new();
        let (_, env) = run_source_env(&world, "/path @out = build/out.md\n").unwrap();
        assert_eq!(path_of(&env, "out").resolved, "/build/out.md");
    }

    #[test]
    fn test_path_with_variable() {
        let world = TestWorld::new();
        let src = "/var @dir = \"reports\"\n/path @o = /data/@dir/latest.md\n";
        let (_, env) = run_source_env(&world, src).unwrap();
        assert_eq!(path_of(&env, "o").resolved, "/data/reports/latest.md");
    }

    #[test]
    fn test_url_passes_through() {
        let world = TestWorld::new();
        let (_, env) =
            run_source_env(&world, "/path @remote = \"https://example.com/m.mld\"\n").unwrap();
        assert_eq!(path_of(&env, "remote").resolved, "https://example.com/m.mld");
    }

    #[test]
    fn test_interpolation_in_path_shows_as_display_text() {
        let world = TestWorld::new();
        let src = "/path @p = /a/b.md\n/show @p\n";
        let (out, _) = run_source_env(&world, src).unwrap();
        assert_eq!(out, "/a/b.md\n");
    }
}

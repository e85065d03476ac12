//! `/show` — evaluate an operand and append its rendering to the output.
//!
//! Operands: references, strings/templates, `<path>` loads (optionally a
//! single `# Section`), and inline run values. Supports an `as "##"`
//! header-level shift.
//
// TODO: "under header" relocation is not implemented; the whitespace rules
// around the relocated block need to be pinned down first.

use crate::ast::types::{DirectiveKind, DirectiveNode, Node};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ErrorKind, MlldError};
use crate::interpreter::eval::{pipeline_slot, run};
use crate::interpreter::executables::enforce_guard;
use crate::interpreter::interpolation::interpolate;
use crate::interpreter::resolution::{resolve_reference, ResolutionContext};
use crate::interpreter::types::{EvalResult, Interpreter};
use crate::pipeline::executor::run_pipeline;

pub fn evaluate(
    directive: &DirectiveNode,
    env: &Environment,
    interp: &Interpreter,
) -> Result<EvalResult, MlldError> {
    let operand = directive
        .slot("operand")
        .ok_or_else(|| MlldError::internal("show directive is missing its operand"))?;
    let operand_type = directive.meta_str("operandType").unwrap_or("text");

    let mut text = match operand_type {
        "load" => {
            let path = interpolate(operand, env, interp)?;
            load_file(&path, directive.meta_str("section"), env, interp)?
        }
        "reference" => {
            let reference = match operand {
                [Node::VariableReference(r)] => r,
                _ => return Err(MlldError::internal("reference operand is not a reference")),
            };
            let value = resolve_reference(reference, env, interp, ResolutionContext::Interpolation)?;
            match value.to_display_text() {
                Some(text) => text,
                None => {
                    return Err(MlldError::type_mismatch(format!(
                        "@{} is an executable; invoke it to show its output",
                        reference.identifier
                    ))
                    .at(reference.location));
                }
            }
        }
        "command" | "code" => match operand {
            [Node::Directive(d)] if d.kind == DirectiveKind::Run => {
                run::execute_run_base(d, env, interp)?
            }
            _ => return Err(MlldError::internal("command operand is not a run directive")),
        },
        _ => interpolate(operand, env, interp)?,
    };

    if let Some(stages) = pipeline_slot(directive) {
        text = run_pipeline(stages, text, None, env, interp)?;
    }
    if let Some(level) = directive.meta.get("headerLevel").and_then(|v| v.as_i64()) {
        text = shift_headings(&text, level as usize);
    }
    if text.is_empty() {
        return Ok(EvalResult::ok());
    }
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(EvalResult::with_output(text))
}

/// Load a file for `<path>` operands, relative to the current file's
/// directory (falling back to the project root).
pub fn load_file(
    path: &str,
    section: Option<&str>,
    env: &Environment,
    interp: &Interpreter,
) -> Result<String, MlldError> {
    let base = env
        .current_file()
        .as_deref()
        .and_then(|f| f.rsplit_once('/').map(|(dir, _)| dir.to_string()))
        .unwrap_or_else(|| interp.options.base_path.clone());
    let resolved = interp.fs.resolve_path(&base, path);
    enforce_guard("file-read", &resolved, interp)?;
    let content = interp.fs.read_file(&resolved).map_err(|message| {
        MlldError::new(ErrorKind::ImportResolution {
            reference: path.to_string(),
            message,
        })
    })?;
    match section {
        Some(heading) => extract_section(&content, heading).ok_or_else(|| {
            MlldError::field_not_found(format!("# {}", heading), "document").with_snippet(path)
        }),
        None => Ok(content),
    }
}

/// Extract a Markdown section: the heading line plus everything until the
/// next heading of the same or higher level.
fn extract_section(content: &str, heading: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut level = 0usize;
    let mut inside = false;
    for line in content.lines() {
        let hashes = line.bytes().take_while(|b| *b == b'#').count();
        let is_heading = hashes > 0 && line.as_bytes().get(hashes) == Some(&b' ');
        if inside {
            if is_heading && hashes <= level {
                break;
            }
            lines.push(line);
        } else if is_heading && line[hashes..].trim() == heading {
            inside = true;
            level = hashes;
            lines.push(line);
        }
    }
    if inside {
        let mut out = lines.join("\n");
        out.push('\n');
        Some(out)
    } else {
        None
    }
}

/// Shift all headings so the highest-level one lands at `target_level`.
fn shift_headings(text: &str, target_level: usize) -> String {
    let min_level = text
        .lines()
        .filter_map(|line| {
            let hashes = line.bytes().take_while(|b| *b == b'#').count();
            let is_heading = hashes > 0 && line.as_bytes().get(hashes) == Some(&b' ');
            is_heading.then_some(hashes)
        })
        .min();
    let Some(min_level) = min_level else {
        return text.to_string();
    };
    let delta = target_level as isize - min_level as isize;
    text.lines()
        .map(|line| {
            let hashes = line.bytes().take_while(|b| *b == b'#').count();
            let is_heading = hashes > 0 && line.as_bytes().get(hashes) == Some(&b' ');
            if is_heading {
                let new_level = (hashes as isize + delta).max(1) as usize;
                format!("{} {}", "#".repeat(new_level), line[hashes..].trim_start())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

//! Parser Types and Constants
//!
//! Shared types and limits used across parser modules, plus the pattern
//! matcher that turns raw failure messages into one-line remediation hints.

use std::fmt;

use lazy_static::lazy_static;
use regex_lite::Regex;
use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // 1MB max input
pub const MAX_PARSE_ITERATIONS: usize = 1_000_000; // Max iterations in parsing loops
pub const MAX_NESTING_DEPTH: usize = 64; // Max depth for nested data/templates

/// Options controlling a parse run.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Strict mode fails on the first error; permissive mode emits an
    /// `Error` node and continues at the next line.
    pub strict: bool,
    /// File path used to tag error messages.
    pub file: Option<String>,
    /// Disable span tracking (nodes carry `location: None`).
    pub track_locations: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: true,
            file: None,
            track_locations: true,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub struct ParseException {
    pub message: String,
    pub line: u32,
    pub column: u32,
    /// Offending source fragment, when available.
    pub snippet: Option<String>,
    pub file: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for ParseException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(
                f,
                "Parse error at {}:{}:{}: {}",
                file, self.line, self.column, self.message
            )?,
            None => write!(
                f,
                "Parse error at {}:{}: {}",
                self.line, self.column, self.message
            )?,
        }
        if let Some(snippet) = &self.snippet {
            write!(f, " (near '{}')", snippet)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nhint: {}", hint)?;
        }
        Ok(())
    }
}

impl ParseException {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            snippet: None,
            file: None,
            hint: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        if self.hint.is_none() {
            self.hint = remediation_hint(&self.message, &snippet);
        }
        self.snippet = Some(snippet);
        self
    }

    pub fn in_file(mut self, file: Option<&str>) -> Self {
        self.file = file.map(|f| f.to_string());
        self
    }
}

lazy_static! {
    static ref HINT_PATTERNS: Vec<(Regex, Regex, &'static str)> = vec![
        // (message pattern, snippet pattern, hint)
        (
            Regex::new(r"unexpected|expected").unwrap(),
            Regex::new(r"\{\{").unwrap(),
            "'{{var}}' interpolation only works inside ':::' templates; \
             use @var inside backtick and '::' templates",
        ),
        (
            Regex::new(r"unterminated template").unwrap(),
            Regex::new(r"").unwrap(),
            "close the template with the same delimiter it was opened with \
             (`, '::' or ':::')",
        ),
        (
            Regex::new(r"unknown directive").unwrap(),
            Regex::new(r"").unwrap(),
            "expected a directive or content; directives are /var, /exe, \
             /show, /run, /import, /export, /path, /for, /when, /checkpoint, \
             /guard",
        ),
        (
            Regex::new(r"expected a value").unwrap(),
            Regex::new(r"^[A-Za-z]").unwrap(),
            "strings must be quoted: 'literal', \"interpolated\", or \
             `template`",
        ),
    ];
}

/// Map a failure to a one-line remediation hint, when the situation is
/// recognised. Over-long expectation lists are never produced; intent hints
/// are preferred.
pub fn remediation_hint(message: &str, snippet: &str) -> Option<String> {
    for (msg_pat, snip_pat, hint) in HINT_PATTERNS.iter() {
        if msg_pat.is_match(message) && snip_pat.is_match(snippet) {
            return Some((*hint).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_file_and_hint() {
        let e = ParseException::new("unknown directive 'vra'", 3, 1)
            .with_snippet("/vra @x")
            .in_file(Some("doc.mld"));
        let s = e.to_string();
        assert!(s.contains("doc.mld:3:1"));
        assert!(s.contains("unknown directive"));
        assert!(s.contains("hint:"));
    }

    #[test]
    fn test_mustache_hint() {
        let hint = remediation_hint("unexpected character", "{{name}}");
        assert!(hint.unwrap().contains(":::"));
    }

    #[test]
    fn test_no_hint_for_unrecognised() {
        assert!(remediation_hint("something odd", "???").is_none());
    }
}

//! Interpreter Error Taxonomy
//!
//! Kinded errors with source locations and remediation hints. Directive
//! evaluators map collaborator failures into these kinds and attach the
//! directive's span before propagating; parse errors abort the whole run.

use std::fmt;

use thiserror::Error;

use crate::ast::types::Span;
use crate::parser::types::ParseException;

/// Error kind. Fields carry only what the kind itself knows; location and
/// file tagging live in [`MlldError`].
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error("{0}")]
    Parse(ParseException),

    #[error("variable not found: @{name}")]
    VariableNotFound { name: String },

    #[error("field not found: {field} (on {base})")]
    FieldNotFound { field: String, base: String },

    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("@{name} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("unknown executable: @{name}")]
    UnknownExecutable { name: String },

    #[error("circular import: {}", .chain.join(" -> "))]
    CircularImport { chain: Vec<String> },

    #[error("cannot resolve import '{reference}': {message}")]
    ImportResolution { reference: String, message: String },

    #[error("{lang} execution failed: {message}")]
    ExecutionFailure {
        lang: String,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("{lang} execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { lang: String, timeout_ms: u64 },

    #[error("pipeline aborted: {reason}")]
    PipelineAbort { reason: String },

    #[error("pipeline stage {stage} failed: {message}")]
    PipelineStageError { stage: u32, message: String },

    #[error("guard '{label}' denied operation: {reason}")]
    GuardDenied { label: String, reason: String },

    #[error("internal invariant violated: {message}")]
    InternalInvariant { message: String },
}

impl ErrorKind {
    /// Short kind label shown in user-visible failures.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Parse(_) => "ParseError",
            Self::VariableNotFound { .. } => "VariableNotFound",
            Self::FieldNotFound { .. } => "FieldNotFound",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::ArityMismatch { .. } => "ArityMismatch",
            Self::UnknownExecutable { .. } => "UnknownExecutable",
            Self::CircularImport { .. } => "CircularImport",
            Self::ImportResolution { .. } => "ImportResolution",
            Self::ExecutionFailure { .. } => "ExecutionFailure",
            Self::ExecutionTimeout { .. } => "ExecutionTimeout",
            Self::PipelineAbort { .. } => "PipelineAbort",
            Self::PipelineStageError { .. } => "PipelineStageError",
            Self::GuardDenied { .. } => "GuardDenied",
            Self::InternalInvariant { .. } => "InternalInvariant",
        }
    }
}

/// An interpreter error: a kind plus where it happened.
#[derive(Debug, Clone)]
pub struct MlldError {
    pub kind: ErrorKind,
    pub location: Option<Span>,
    pub file: Option<String>,
    /// Offending source fragment, when available.
    pub snippet: Option<String>,
    pub hint: Option<String>,
}

impl MlldError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
            file: None,
            snippet: None,
            hint: None,
        }
    }

    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::VariableNotFound { name: name.into() })
    }

    pub fn field_not_found(field: impl Into<String>, base: impl Into<String>) -> Self {
        Self::new(ErrorKind::FieldNotFound {
            field: field.into(),
            base: base.into(),
        })
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            message: message.into(),
        })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalInvariant {
            message: message.into(),
        })
    }

    /// Attach a location if none is set yet; the innermost span wins.
    pub fn at(mut self, location: Option<Span>) -> Self {
        if self.location.is_none() {
            self.location = location;
        }
        self
    }

    pub fn in_file(mut self, file: Option<&str>) -> Self {
        if self.file.is_none() {
            self.file = file.map(|f| f.to_string());
        }
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for MlldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.kind)?;
        match (&self.file, &self.location) {
            (Some(file), Some(span)) => write!(f, " at {}:{}", file, span)?,
            (None, Some(span)) => write!(f, " at {}", span)?,
            (Some(file), None) => write!(f, " in {}", file)?,
            (None, None) => {}
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

impl std::error::Error for MlldError {}

impl From<ParseException> for MlldError {
    fn from(e: ParseException) -> Self {
        let location = None; // ParseException carries its own line/column
        let file = e.file.clone();
        let snippet = e.snippet.clone();
        let hint = e.hint.clone();
        Self {
            kind: ErrorKind::Parse(e),
            location,
            file,
            snippet,
            hint,
        }
    }
}

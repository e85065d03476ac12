//! Variable Model
//!
//! Tagged variants of typed values with provenance metadata. Imported
//! variables wrap their source value so the full type survives the import;
//! executables capture their defining environment by reference, so mutation
//! of captured bindings stays visible.

use serde_json::Value as JsonValue;

use crate::ast::types::{Node, Span};
use crate::interpreter::environment::Environment;
use crate::security::SecurityDescriptor;

/// A filesystem-or-URL path: the resolved absolute form plus the original
/// token for error display.
#[derive(Debug, Clone, PartialEq)]
pub struct PathValue {
    pub resolved: String,
    pub original: String,
}

/// A value that is both text and structured data (e.g. command output that
/// parsed as JSON, or a loaded file with known shape).
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredValue {
    pub text: String,
    pub data: JsonValue,
}

/// The body of an executable: a command, a code block, or a template.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutableBody {
    /// Shell command with `@param` interpolation.
    Command { command: Vec<Node> },
    /// Opaque code in a registered language; parameters are injected by the
    /// runtime prelude.
    Code { lang: String, source: String },
    /// Template interpolated in the invocation scope.
    Template { nodes: Vec<Node>, wrapper: String },
}

/// A named, parameterised, lazily-evaluated body.
#[derive(Debug, Clone)]
pub struct ExecutableDef {
    /// Parameter names in declaration order; arity is fixed.
    pub params: Vec<String>,
    pub body: ExecutableBody,
    /// Defining environment, captured by reference.
    pub captured: Option<Environment>,
    /// With-clause pipeline; the invocation wraps itself as the (retryable)
    /// source stage when non-empty.
    pub pipeline: Vec<Node>,
}

impl ExecutableDef {
    pub fn new(params: Vec<String>, body: ExecutableBody, captured: Option<Environment>) -> Self {
        Self {
            params,
            body,
            captured,
            pipeline: Vec::new(),
        }
    }
}

impl PartialEq for ExecutableDef {
    fn eq(&self, other: &Self) -> bool {
        // Captured environments compare by identity and are ignored here.
        self.params == other.params && self.body == other.body && self.pipeline == other.pipeline
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Path(PathValue),
    Data(JsonValue),
    Executable(ExecutableDef),
    /// An imported binding: the source variable's value, preserved whole.
    Imported { inner: Box<Value>, module: String },
    Structured(StructuredValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Path(_) => "path",
            Value::Data(_) => "data",
            Value::Executable(_) => "executable",
            Value::Imported { .. } => "imported",
            Value::Structured(_) => "structured",
        }
    }

    /// Strip `Imported` wrappers.
    pub fn unwrap_imported(&self) -> &Value {
        match self {
            Value::Imported { inner, .. } => inner.unwrap_imported(),
            other => other,
        }
    }

    /// Textual rendering used by interpolation and `show`: strings unchanged,
    /// data as JSON, paths as their resolved form.
    pub fn to_display_text(&self) -> Option<String> {
        match self.unwrap_imported() {
            Value::Text(s) => Some(s.clone()),
            Value::Path(p) => Some(p.resolved.clone()),
            Value::Data(JsonValue::String(s)) => Some(s.clone()),
            Value::Data(v) => serde_json::to_string(v).ok(),
            Value::Structured(s) => Some(s.text.clone()),
            Value::Executable(_) => None,
            Value::Imported { .. } => unreachable!("unwrapped above"),
        }
    }

    /// Structured rendering used by field access and smart binding.
    pub fn to_data(&self) -> Option<JsonValue> {
        match self.unwrap_imported() {
            Value::Text(s) => Some(JsonValue::String(s.clone())),
            Value::Path(p) => Some(JsonValue::String(p.resolved.clone())),
            Value::Data(v) => Some(v.clone()),
            Value::Structured(s) => Some(s.data.clone()),
            Value::Executable(_) => None,
            Value::Imported { .. } => unreachable!("unwrapped above"),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self.unwrap_imported() {
            Value::Text(s) => !s.is_empty() && s != "false",
            Value::Path(_) => true,
            Value::Data(v) => json_truthy(v),
            Value::Executable(_) => true,
            Value::Structured(s) => json_truthy(&s.data),
            Value::Imported { .. } => unreachable!("unwrapped above"),
        }
    }

    pub fn as_executable(&self) -> Option<&ExecutableDef> {
        match self.unwrap_imported() {
            Value::Executable(def) => Some(def),
            _ => None,
        }
    }
}

pub fn json_truthy(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(_) => true,
    }
}

/// Where a variable's value came from.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableOrigin {
    Literal,
    Import { source: String },
    Transform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableMetadata {
    pub origin: VariableOrigin,
    pub defined_at: Option<Span>,
    pub source_file: Option<String>,
}

impl VariableMetadata {
    pub fn literal(defined_at: Option<Span>, source_file: Option<String>) -> Self {
        Self {
            origin: VariableOrigin::Literal,
            defined_at,
            source_file,
        }
    }

    pub fn transform() -> Self {
        Self {
            origin: VariableOrigin::Transform,
            defined_at: None,
            source_file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub metadata: VariableMetadata,
    pub security: Option<SecurityDescriptor>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value, metadata: VariableMetadata) -> Self {
        Self {
            name: name.into(),
            value,
            metadata,
            security: None,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Value::Text(value.into()), VariableMetadata::transform())
    }

    pub fn data(name: impl Into<String>, value: JsonValue) -> Self {
        Self::new(name, Value::Data(value), VariableMetadata::transform())
    }

    pub fn is_imported(&self) -> bool {
        matches!(self.metadata.origin, VariableOrigin::Import { .. })
    }
}

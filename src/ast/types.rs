//! Abstract Syntax Tree (AST) Types for mlld
//!
//! This module defines the AST for executable-markdown documents.
//! A document is a sequence of nodes: plain Markdown text interleaved with
//! directive nodes. Directive sub-parts are pre-parsed into `values` slots,
//! with the verbatim source kept in `raw` and derived flags in `meta`.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

// =============================================================================
// BASE TYPES
// =============================================================================

/// Position information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

/// Span in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

// =============================================================================
// DOCUMENT & NODES
// =============================================================================

/// Root of a parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub nodes: Vec<Node>,
    /// Parsed YAML frontmatter, if the file started with a `---` block.
    pub frontmatter: Option<JsonValue>,
    /// Verbatim frontmatter block (including delimiters), for round-tripping.
    pub frontmatter_raw: Option<String>,
}

/// Union of all node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    VariableReference(VariableReferenceNode),
    Literal(LiteralNode),
    Object(ObjectNode),
    Array(ArrayNode),
    CodeFence(CodeFenceNode),
    Comment(CommentNode),
    PathSeparator(PathSeparatorNode),
    DotSeparator(DotSeparatorNode),
    Error(ErrorNode),
    Directive(DirectiveNode),
}

impl Node {
    pub fn node_id(&self) -> &str {
        match self {
            Node::Text(n) => &n.node_id,
            Node::VariableReference(n) => &n.node_id,
            Node::Literal(n) => &n.node_id,
            Node::Object(n) => &n.node_id,
            Node::Array(n) => &n.node_id,
            Node::CodeFence(n) => &n.node_id,
            Node::Comment(n) => &n.node_id,
            Node::PathSeparator(n) => &n.node_id,
            Node::DotSeparator(n) => &n.node_id,
            Node::Error(n) => &n.node_id,
            Node::Directive(n) => &n.node_id,
        }
    }

    pub fn location(&self) -> Option<Span> {
        match self {
            Node::Text(n) => n.location,
            Node::VariableReference(n) => n.location,
            Node::Literal(n) => n.location,
            Node::Object(n) => n.location,
            Node::Array(n) => n.location,
            Node::CodeFence(n) => n.location,
            Node::Comment(n) => n.location,
            Node::PathSeparator(n) => n.location,
            Node::DotSeparator(n) => n.location,
            Node::Error(n) => n.location,
            Node::Directive(n) => n.location,
        }
    }

    /// Short kind label, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Text(_) => "Text",
            Node::VariableReference(_) => "VariableReference",
            Node::Literal(_) => "Literal",
            Node::Object(_) => "Object",
            Node::Array(_) => "Array",
            Node::CodeFence(_) => "CodeFence",
            Node::Comment(_) => "Comment",
            Node::PathSeparator(_) => "PathSeparator",
            Node::DotSeparator(_) => "DotSeparator",
            Node::Error(_) => "Error",
            Node::Directive(_) => "Directive",
        }
    }
}

/// Verbatim Markdown text between directives.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub content: String,
    pub node_id: String,
    pub location: Option<Span>,
}

/// A primitive literal: number, boolean, null, or a literal string fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode {
    pub value: JsonValue,
    pub node_id: String,
    pub location: Option<Span>,
}

/// Fenced code block. Directives are never recognised inside one.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeFenceNode {
    pub language: Option<String>,
    /// Content between the fences, without the fence lines.
    pub content: String,
    /// Full verbatim block including fence lines.
    pub raw: String,
    pub node_id: String,
    pub location: Option<Span>,
}

/// `>>` comment line, or an inline `<<` comment tail.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub text: String,
    pub raw: String,
    pub node_id: String,
    pub location: Option<Span>,
}

/// `/` between path segments inside a path value.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSeparatorNode {
    pub node_id: String,
    pub location: Option<Span>,
}

/// `.` between identifier segments inside a path value.
#[derive(Debug, Clone, PartialEq)]
pub struct DotSeparatorNode {
    pub node_id: String,
    pub location: Option<Span>,
}

/// Placeholder emitted in permissive mode where parsing failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorNode {
    pub message: String,
    /// Verbatim source that failed to parse.
    pub raw: String,
    pub node_id: String,
    pub location: Option<Span>,
}

// =============================================================================
// VARIABLE REFERENCES
// =============================================================================

/// One step of a field-access tail: `.name`, `[0]`, `["key"]`, `[@var]`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAccess {
    /// `.name`
    Name(String),
    /// `[0]` — negative indices are not supported
    Index(i64),
    /// `["key"]`
    StringKey(String),
    /// `[@var]` — the inner variable resolves to the key
    Dynamic(String),
}

impl fmt::Display for FieldAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldAccess::Name(n) => write!(f, ".{}", n),
            FieldAccess::Index(i) => write!(f, "[{}]", i),
            FieldAccess::StringKey(k) => write!(f, "[\"{}\"]", k),
            FieldAccess::Dynamic(v) => write!(f, "[@{}]", v),
        }
    }
}

/// Trailing modifiers on a reference: a pipeline and an optional format hint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WithClause {
    /// Pipeline stages, each a `VariableReference` node naming an executable
    /// or builtin transformer.
    pub pipeline: Vec<Node>,
    pub format: Option<String>,
}

/// `@name`, optionally with a field-access tail, invocation arguments, and a
/// with-clause (`| @stage` pipeline, format hint).
#[derive(Debug, Clone, PartialEq)]
pub struct VariableReferenceNode {
    pub identifier: String,
    pub fields: Vec<FieldAccess>,
    /// `Some` when written as an invocation: `@f(a, b)`. Each argument is a
    /// node sequence.
    pub args: Option<Vec<Vec<Node>>>,
    pub with_clause: Option<Box<WithClause>>,
    pub node_id: String,
    pub location: Option<Span>,
}

impl VariableReferenceNode {
    /// Bare reference with no tail.
    pub fn bare(identifier: impl Into<String>, node_id: String, location: Option<Span>) -> Self {
        Self {
            identifier: identifier.into(),
            fields: Vec::new(),
            args: None,
            with_clause: None,
            node_id,
            location,
        }
    }
}

// =============================================================================
// DATA COLLECTIONS
// =============================================================================

/// `{ key: value, ... }` — values are pre-parsed node sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub entries: Vec<(String, Vec<Node>)>,
    pub node_id: String,
    pub location: Option<Span>,
}

/// `[ a, b, ... ]` — elements are pre-parsed node sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    pub elements: Vec<Vec<Node>>,
    pub node_id: String,
    pub location: Option<Span>,
}

// =============================================================================
// DIRECTIVES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Var,
    Exe,
    Show,
    Run,
    Import,
    Export,
    Path,
    For,
    When,
    Checkpoint,
    Guard,
}

impl DirectiveKind {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "var" => Some(Self::Var),
            "exe" => Some(Self::Exe),
            "show" | "add" => Some(Self::Show),
            "run" => Some(Self::Run),
            "import" => Some(Self::Import),
            "export" => Some(Self::Export),
            "path" => Some(Self::Path),
            "for" => Some(Self::For),
            "when" => Some(Self::When),
            "checkpoint" => Some(Self::Checkpoint),
            "guard" => Some(Self::Guard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Exe => "exe",
            Self::Show => "show",
            Self::Run => "run",
            Self::Import => "import",
            Self::Export => "export",
            Self::Path => "path",
            Self::For => "for",
            Self::When => "when",
            Self::Checkpoint => "checkpoint",
            Self::Guard => "guard",
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveSubtype {
    Var,
    AddPath,
    ExecCommand,
    ExecCode,
    ExecTemplate,
    Show,
    RunCommand,
    RunCode,
    RunExec,
    ImportAll,
    ImportSelected,
    ExportSelected,
    ForEach,
    WhenMatch,
    Checkpoint,
    Guard,
}

impl DirectiveSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::AddPath => "addPath",
            Self::ExecCommand => "execCommand",
            Self::ExecCode => "execCode",
            Self::ExecTemplate => "execTemplate",
            Self::Show => "show",
            Self::RunCommand => "runCommand",
            Self::RunCode => "runCode",
            Self::RunExec => "runExec",
            Self::ImportAll => "importAll",
            Self::ImportSelected => "importSelected",
            Self::ExportSelected => "exportSelected",
            Self::ForEach => "forEach",
            Self::WhenMatch => "whenMatch",
            Self::Checkpoint => "checkpoint",
            Self::Guard => "guard",
        }
    }
}

impl fmt::Display for DirectiveSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directive occurrence.
///
/// `values` maps each semantic slot to its pre-parsed child nodes; `raw` maps
/// the same slots to the verbatim source substring; `meta` carries derived
/// flags. Slots are addressable by name only — consumers must not rely on
/// positional ordering within `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveNode {
    pub kind: DirectiveKind,
    pub subtype: DirectiveSubtype,
    pub values: IndexMap<String, Vec<Node>>,
    pub raw: IndexMap<String, String>,
    pub meta: IndexMap<String, JsonValue>,
    /// Full verbatim directive text, exactly reproducible.
    pub source_text: String,
    pub node_id: String,
    pub location: Option<Span>,
}

impl DirectiveNode {
    pub fn slot(&self, name: &str) -> Option<&[Node]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    pub fn raw_slot(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(|s| s.as_str())
    }

    pub fn meta_str(&self, name: &str) -> Option<&str> {
        self.meta.get(name).and_then(|v| v.as_str())
    }

    pub fn meta_bool(&self, name: &str) -> bool {
        self.meta.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Every key in `values` must appear in `raw` and vice versa.
    pub fn slots_consistent(&self) -> bool {
        self.values.keys().all(|k| self.raw.contains_key(k))
            && self.raw.keys().all(|k| self.values.contains_key(k))
    }
}

// =============================================================================
// SERIALISATION
// =============================================================================

/// Reassemble the original source from a node sequence. Parsing, serialising,
/// and re-parsing is a fixed point.
pub fn serialize(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(n) => out.push_str(&n.content),
            Node::CodeFence(n) => out.push_str(&n.raw),
            Node::Comment(n) => out.push_str(&n.raw),
            Node::Directive(n) => out.push_str(&n.source_text),
            Node::Error(n) => out.push_str(&n.raw),
            // Remaining kinds only occur inside directive slots.
            _ => {}
        }
    }
    out
}

/// Reassemble a whole document, including frontmatter.
pub fn serialize_document(doc: &Document) -> String {
    let mut out = String::new();
    if let Some(raw) = &doc.frontmatter_raw {
        out.push_str(raw);
    }
    out.push_str(&serialize(&doc.nodes));
    out
}

//! Right-Hand-Side Value Parsing
//!
//! Shared value rules used by every directive: quoted strings, the three
//! template regimes, data collections, references with field-access tails,
//! literals, `run` specs, and `<path>` loaders. Every rule returns pre-parsed
//! nodes; callers capture the verbatim slice for the `raw` slot themselves.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::ast::types::{
    ArrayNode, DirectiveKind, DirectiveNode, DirectiveSubtype, FieldAccess, LiteralNode, Node,
    ObjectNode, TextNode, VariableReferenceNode, WithClause,
};
use crate::parser::types::ParseException;
use crate::parser::Parser;

/// A parsed right-hand side.
#[derive(Debug)]
pub(crate) struct ValueSpec {
    pub nodes: Vec<Node>,
    /// Inferred type: text | template | data | number | boolean | null |
    /// reference | command | code | load
    pub inferred: &'static str,
    /// Wrapper style for string/template values.
    pub wrapper: Option<&'static str>,
    /// `# Section` part of a `<path # Section>` loader.
    pub section: Option<String>,
}

impl ValueSpec {
    fn plain(nodes: Vec<Node>, inferred: &'static str) -> Self {
        Self {
            nodes,
            inferred,
            wrapper: None,
            section: None,
        }
    }
}

impl<'a> Parser<'a> {
    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Parse one right-hand-side value at the cursor.
    pub(crate) fn parse_value(&mut self) -> Result<ValueSpec, ParseException> {
        self.cur.skip_spaces();
        match self.cur.peek() {
            Some(b'\'') => {
                let (node, _) = self.parse_single_quoted()?;
                Ok(ValueSpec {
                    nodes: vec![node],
                    inferred: "text",
                    wrapper: Some("singleQuote"),
                    section: None,
                })
            }
            Some(b'"') => {
                let nodes = self.parse_double_quoted()?;
                Ok(ValueSpec {
                    nodes,
                    inferred: "text",
                    wrapper: Some("doubleQuote"),
                    section: None,
                })
            }
            Some(b'`') => {
                let nodes = self.parse_backtick_template()?;
                Ok(ValueSpec {
                    nodes,
                    inferred: "template",
                    wrapper: Some("backtick"),
                    section: None,
                })
            }
            Some(b':') if self.cur.starts_with(":::") => {
                let nodes = self.parse_colon_template(true)?;
                Ok(ValueSpec {
                    nodes,
                    inferred: "template",
                    wrapper: Some("tripleColon"),
                    section: None,
                })
            }
            Some(b':') if self.cur.starts_with("::") => {
                let nodes = self.parse_colon_template(false)?;
                Ok(ValueSpec {
                    nodes,
                    inferred: "template",
                    wrapper: Some("doubleColon"),
                    section: None,
                })
            }
            Some(b'{') => {
                let node = self.parse_object()?;
                Ok(ValueSpec::plain(vec![node], "data"))
            }
            Some(b'[') => {
                let node = self.parse_array()?;
                Ok(ValueSpec::plain(vec![node], "data"))
            }
            Some(b'@') => {
                let node = self.parse_reference()?;
                Ok(ValueSpec::plain(vec![Node::VariableReference(node)], "reference"))
            }
            Some(b'<') => {
                let (nodes, section) = self.parse_angle_path()?;
                Ok(ValueSpec {
                    nodes,
                    inferred: "load",
                    wrapper: None,
                    section,
                })
            }
            Some(b) if b.is_ascii_digit() || b == b'-' => {
                let node = self.parse_number_literal()?;
                Ok(ValueSpec::plain(vec![node], "number"))
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.parse_word_value(),
            _ => Err(self.fail(self.cur.error("expected a value"))),
        }
    }

    /// Values that begin with a bare word: `true`, `false`, `null`, `run ...`,
    /// or `lang { code }`.
    fn parse_word_value(&mut self) -> Result<ValueSpec, ParseException> {
        let save = self.cur.clone();
        let start = self.cur.position();
        let word = match self.cur.read_identifier() {
            Some(w) => w.to_string(),
            None => return Err(self.fail(self.cur.error("expected a value"))),
        };
        match word.as_str() {
            "true" | "false" => {
                let node = Node::Literal(LiteralNode {
                    value: JsonValue::Bool(word == "true"),
                    node_id: self.id(),
                    location: self.loc(start),
                });
                Ok(ValueSpec::plain(vec![node], "boolean"))
            }
            "null" => {
                let node = Node::Literal(LiteralNode {
                    value: JsonValue::Null,
                    node_id: self.id(),
                    location: self.loc(start),
                });
                Ok(ValueSpec::plain(vec![node], "null"))
            }
            "run" => {
                let directive = self.parse_run_spec(start)?;
                let inferred = match directive.subtype {
                    DirectiveSubtype::RunCode => "code",
                    _ => "command",
                };
                Ok(ValueSpec::plain(vec![Node::Directive(directive)], inferred))
            }
            _ => {
                // `lang { code }` shorthand for a code body
                self.cur.skip_spaces();
                if self.cur.peek() == Some(b'{') {
                    let directive = self.parse_code_block(start, &word)?;
                    Ok(ValueSpec::plain(vec![Node::Directive(directive)], "code"))
                } else {
                    self.cur = save;
                    Err(self.fail(self.cur.error("expected a value")))
                }
            }
        }
    }

    // =========================================================================
    // STRINGS
    // =========================================================================

    /// `'fully literal'` — no interpolation, single line.
    pub(crate) fn parse_single_quoted(&mut self) -> Result<(Node, String), ParseException> {
        let start = self.cur.position();
        self.cur.bump(); // opening quote
        let content_start = self.cur.offset();
        loop {
            match self.cur.peek() {
                None | Some(b'\n') => {
                    return Err(self.fail(self.cur.error("unterminated string")));
                }
                Some(b'\'') => break,
                _ => {
                    self.cur.bump();
                }
            }
        }
        let content = self.cur.slice(content_start, self.cur.offset()).to_string();
        self.cur.bump(); // closing quote
        let node = Node::Text(TextNode {
            content: content.clone(),
            node_id: self.id(),
            location: self.loc(start),
        });
        Ok((node, content))
    }

    /// `"interpolated"` — @var interpolation, single line.
    pub(crate) fn parse_double_quoted(&mut self) -> Result<Vec<Node>, ParseException> {
        self.cur.bump(); // opening quote
        let (nodes, _) = self.parse_atsign_nodes(&["\""], false)?;
        self.cur.bump(); // closing quote
        Ok(nodes)
    }

    // =========================================================================
    // TEMPLATES
    // =========================================================================

    /// `` `interpolated, multiline` ``
    pub(crate) fn parse_backtick_template(&mut self) -> Result<Vec<Node>, ParseException> {
        self.enter_nested()?;
        self.cur.bump(); // opening backtick
        let (nodes, _) = self.parse_atsign_nodes(&["`"], true)?;
        self.cur.bump(); // closing backtick
        self.leave_nested();
        Ok(nodes)
    }

    /// `::@var style::` or `:::{{var}} style:::`.
    pub(crate) fn parse_colon_template(&mut self, mustache: bool) -> Result<Vec<Node>, ParseException> {
        self.enter_nested()?;
        let delim = if mustache { ":::" } else { "::" };
        self.cur.eat_str(delim);
        let nodes = if mustache {
            self.parse_mustache_nodes(delim)?
        } else {
            let (nodes, _) = self.parse_atsign_nodes(&[delim], true)?;
            nodes
        };
        if !self.cur.eat_str(delim) {
            return Err(self.fail(self.cur.error("unterminated template")));
        }
        self.leave_nested();
        Ok(nodes)
    }

    /// Scan text with `@var` interpolation until one of `terminators` appears
    /// at the cursor. The terminator is left unconsumed.
    pub(crate) fn parse_atsign_nodes(
        &mut self,
        terminators: &[&str],
        allow_newline: bool,
    ) -> Result<(Vec<Node>, usize), ParseException> {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut text_start = self.cur.position();
        loop {
            if let Some(idx) = terminators.iter().position(|t| self.cur.starts_with(t)) {
                if !text.is_empty() {
                    nodes.push(Node::Text(TextNode {
                        content: std::mem::take(&mut text),
                        node_id: self.id(),
                        location: self.loc(text_start),
                    }));
                }
                return Ok((nodes, idx));
            }
            match self.cur.peek() {
                None => {
                    return Err(self.fail(self.cur.error(if terminators.contains(&"\"") {
                        "unterminated string"
                    } else {
                        "unterminated template"
                    })));
                }
                Some(b'\n') if !allow_newline => {
                    return Err(self.fail(self.cur.error("unterminated string")));
                }
                Some(b'\\') => {
                    // Escapes for the active delimiters and '@'
                    self.cur.bump();
                    match self.cur.peek() {
                        Some(c @ (b'@' | b'`' | b'"' | b'\\' | b':')) => {
                            text.push(c as char);
                            self.cur.bump();
                        }
                        _ => text.push('\\'),
                    }
                }
                Some(b'@') if self
                    .cur
                    .peek_at(1)
                    .map(|b| b.is_ascii_alphabetic() || b == b'_')
                    .unwrap_or(false) =>
                {
                    if !text.is_empty() {
                        nodes.push(Node::Text(TextNode {
                            content: std::mem::take(&mut text),
                            node_id: self.id(),
                            location: self.loc(text_start),
                        }));
                    }
                    let reference = self.parse_reference()?;
                    nodes.push(Node::VariableReference(reference));
                    text_start = self.cur.position();
                }
                Some(_) => {
                    // Copy one UTF-8 scalar worth of bytes
                    let rest = self.cur.rest();
                    let ch = rest.chars().next().unwrap_or('\u{fffd}');
                    text.push(ch);
                    self.cur.advance_to(self.cur.offset() + ch.len_utf8());
                }
            }
        }
    }

    /// Scan `{{var}}`-regime text until `delim`. `@` has no meaning here.
    fn parse_mustache_nodes(&mut self, delim: &str) -> Result<Vec<Node>, ParseException> {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut text_start = self.cur.position();
        loop {
            if self.cur.starts_with(delim) {
                if !text.is_empty() {
                    nodes.push(Node::Text(TextNode {
                        content: std::mem::take(&mut text),
                        node_id: self.id(),
                        location: self.loc(text_start),
                    }));
                }
                return Ok(nodes);
            }
            if self.cur.starts_with("{{") {
                if !text.is_empty() {
                    nodes.push(Node::Text(TextNode {
                        content: std::mem::take(&mut text),
                        node_id: self.id(),
                        location: self.loc(text_start),
                    }));
                }
                let start = self.cur.position();
                self.cur.eat_str("{{");
                self.cur.skip_spaces();
                let identifier = match self.cur.read_identifier() {
                    Some(w) => w.to_string(),
                    None => return Err(self.fail(self.cur.error("expected identifier in '{{'"))),
                };
                let mut fields = Vec::new();
                while self.cur.eat(b'.') {
                    match self.cur.read_identifier() {
                        Some(w) => fields.push(FieldAccess::Name(w.to_string())),
                        None => {
                            return Err(self.fail(self.cur.error("expected field name after '.'")))
                        }
                    }
                }
                self.cur.skip_spaces();
                if !self.cur.eat_str("}}") {
                    return Err(self.fail(self.cur.error("expected '}}'")));
                }
                nodes.push(Node::VariableReference(VariableReferenceNode {
                    identifier,
                    fields,
                    args: None,
                    with_clause: None,
                    node_id: self.id(),
                    location: self.loc(start),
                }));
                text_start = self.cur.position();
                continue;
            }
            match self.cur.peek() {
                None => return Err(self.fail(self.cur.error("unterminated template"))),
                Some(_) => {
                    let rest = self.cur.rest();
                    let ch = rest.chars().next().unwrap_or('\u{fffd}');
                    text.push(ch);
                    self.cur.advance_to(self.cur.offset() + ch.len_utf8());
                }
            }
        }
    }

    // =========================================================================
    // REFERENCES
    // =========================================================================

    /// `@name` with field tail, optional invocation args. The pipeline tail
    /// (`| @stage`) binds to whole values and is parsed by callers.
    pub(crate) fn parse_reference(&mut self) -> Result<VariableReferenceNode, ParseException> {
        let start = self.cur.position();
        self.cur.bump(); // '@'
        let identifier = match self.cur.read_identifier() {
            Some(w) => w.to_string(),
            None => return Err(self.fail(self.cur.error("expected identifier after '@'"))),
        };
        let fields = self.parse_field_tail()?;
        // Invocation args only when '(' is adjacent
        let args = if self.cur.peek() == Some(b'(') {
            Some(self.parse_args()?)
        } else {
            None
        };
        Ok(VariableReferenceNode {
            identifier,
            fields,
            args,
            with_clause: None,
            node_id: self.id(),
            location: self.loc(start),
        })
    }

    /// Ordered field-access operations: `.name`, `[0]`, `["key"]`, `[@var]`.
    pub(crate) fn parse_field_tail(&mut self) -> Result<Vec<FieldAccess>, ParseException> {
        let mut fields = Vec::new();
        loop {
            match self.cur.peek() {
                // '.' only starts a field when followed by an identifier;
                // otherwise it is prose (a sentence period) or a separator.
                Some(b'.') => {
                    let next = self.cur.peek_at(1);
                    if next.map(|b| b.is_ascii_alphabetic() || b == b'_').unwrap_or(false) {
                        self.cur.bump();
                        let name = self
                            .cur
                            .read_identifier()
                            .map(|w| w.to_string())
                            .unwrap_or_default();
                        fields.push(FieldAccess::Name(name));
                    } else {
                        break;
                    }
                }
                Some(b'[') => {
                    self.cur.bump();
                    self.cur.skip_spaces();
                    match self.cur.peek() {
                        Some(b'@') => {
                            self.cur.bump();
                            let name = match self.cur.read_identifier() {
                                Some(w) => w.to_string(),
                                None => {
                                    return Err(self
                                        .fail(self.cur.error("expected identifier after '@'")))
                                }
                            };
                            fields.push(FieldAccess::Dynamic(name));
                        }
                        Some(b'"') | Some(b'\'') => {
                            let quote = self.cur.peek().unwrap_or(b'"');
                            self.cur.bump();
                            let key_start = self.cur.offset();
                            while let Some(b) = self.cur.peek() {
                                if b == quote || b == b'\n' {
                                    break;
                                }
                                self.cur.bump();
                            }
                            let key = self.cur.slice(key_start, self.cur.offset()).to_string();
                            if !self.cur.eat(quote) {
                                return Err(self.fail(self.cur.error("unterminated string")));
                            }
                            fields.push(FieldAccess::StringKey(key));
                        }
                        Some(b) if b.is_ascii_digit() || b == b'-' => {
                            let num_start = self.cur.offset();
                            if b == b'-' {
                                self.cur.bump();
                            }
                            while self.cur.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                                self.cur.bump();
                            }
                            let text = self.cur.slice(num_start, self.cur.offset());
                            let index = text.parse::<i64>().map_err(|_| {
                                self.fail(self.cur.error("invalid array index"))
                            })?;
                            fields.push(FieldAccess::Index(index));
                        }
                        _ => {
                            return Err(self.fail(
                                self.cur.error("expected index, string key, or '@var' in '[]'"),
                            ))
                        }
                    }
                    self.cur.skip_spaces();
                    if !self.cur.eat(b']') {
                        return Err(self.fail(self.cur.error("expected ']'")));
                    }
                }
                _ => break,
            }
        }
        Ok(fields)
    }

    /// `(arg, arg, ...)` — each argument is a node sequence.
    pub(crate) fn parse_args(&mut self) -> Result<Vec<Vec<Node>>, ParseException> {
        self.cur.bump(); // '('
        let mut args = Vec::new();
        loop {
            self.cur.skip_spaces();
            match self.cur.peek() {
                Some(b')') => {
                    self.cur.bump();
                    return Ok(args);
                }
                None | Some(b'\n') => {
                    return Err(self.fail(self.cur.error("expected ')'")));
                }
                _ => {
                    let spec = self.parse_value()?;
                    args.push(spec.nodes);
                    self.cur.skip_spaces();
                    if self.cur.eat(b',') {
                        continue;
                    }
                }
            }
        }
    }

    /// `| @stage | @stage(arg)` — shorthand pipeline tail. `||` is never a
    /// pipeline.
    pub(crate) fn parse_pipeline_tail(&mut self) -> Result<Vec<Node>, ParseException> {
        let mut stages = Vec::new();
        loop {
            let save = self.cur.clone();
            self.cur.skip_spaces();
            if self.cur.peek() == Some(b'|') && self.cur.peek_at(1) != Some(b'|') {
                self.cur.bump();
                self.cur.skip_spaces();
                if self.cur.peek() != Some(b'@') {
                    return Err(self.fail(self.cur.error("expected '@stage' after '|'")));
                }
                let stage = self.parse_reference()?;
                stages.push(Node::VariableReference(stage));
            } else {
                self.cur = save;
                return Ok(stages);
            }
        }
    }

    /// Longhand `with { pipeline: [@a, @b], format: "json" }`.
    pub(crate) fn parse_with_clause(&mut self) -> Result<WithClause, ParseException> {
        // caller consumed the 'with' word
        self.cur.skip_spaces();
        if !self.cur.eat(b'{') {
            return Err(self.fail(self.cur.error("expected '{' after 'with'")));
        }
        let mut clause = WithClause::default();
        loop {
            self.skip_ws_and_newlines();
            if self.cur.eat(b'}') {
                return Ok(clause);
            }
            let key = match self.cur.read_identifier() {
                Some(w) => w.to_string(),
                None => return Err(self.fail(self.cur.error("expected key in with-clause"))),
            };
            self.cur.skip_spaces();
            if !self.cur.eat(b':') {
                return Err(self.fail(self.cur.error("expected ':'")));
            }
            self.cur.skip_spaces();
            match key.as_str() {
                "pipeline" => {
                    if !self.cur.eat(b'[') {
                        return Err(self.fail(self.cur.error("expected '[' for pipeline list")));
                    }
                    loop {
                        self.skip_ws_and_newlines();
                        if self.cur.eat(b']') {
                            break;
                        }
                        if self.cur.peek() != Some(b'@') {
                            return Err(self.fail(self.cur.error("expected '@stage' in pipeline")));
                        }
                        let stage = self.parse_reference()?;
                        clause.pipeline.push(Node::VariableReference(stage));
                        self.skip_ws_and_newlines();
                        self.cur.eat(b',');
                    }
                }
                "format" => {
                    let content = match self.cur.peek() {
                        Some(b'\'') => self.parse_single_quoted()?.1,
                        Some(b'"') => {
                            let nodes = self.parse_double_quoted()?;
                            nodes
                                .iter()
                                .filter_map(|n| match n {
                                    Node::Text(t) => Some(t.content.clone()),
                                    _ => None,
                                })
                                .collect::<String>()
                        }
                        _ => return Err(self.fail(self.cur.error("expected a string format"))),
                    };
                    clause.format = Some(content);
                }
                other => {
                    return Err(self.fail(
                        self.cur
                            .error(format!("unknown with-clause key '{}'", other)),
                    ))
                }
            }
            self.skip_ws_and_newlines();
            self.cur.eat(b',');
        }
    }

    // =========================================================================
    // DATA COLLECTIONS
    // =========================================================================

    pub(crate) fn skip_ws_and_newlines(&mut self) {
        while matches!(self.cur.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            self.cur.bump();
        }
    }

    /// `{ key: value, ... }`
    pub(crate) fn parse_object(&mut self) -> Result<Node, ParseException> {
        self.enter_nested()?;
        let start = self.cur.position();
        self.cur.bump(); // '{'
        let mut entries = Vec::new();
        loop {
            self.skip_ws_and_newlines();
            if self.cur.eat(b'}') {
                break;
            }
            let key = match self.cur.peek() {
                Some(b'"') | Some(b'\'') => {
                    let quote = self.cur.peek().unwrap_or(b'"');
                    self.cur.bump();
                    let key_start = self.cur.offset();
                    while let Some(b) = self.cur.peek() {
                        if b == quote || b == b'\n' {
                            break;
                        }
                        self.cur.bump();
                    }
                    let key = self.cur.slice(key_start, self.cur.offset()).to_string();
                    if !self.cur.eat(quote) {
                        return Err(self.fail(self.cur.error("unterminated string")));
                    }
                    key
                }
                _ => match self.cur.read_identifier() {
                    Some(w) => w.to_string(),
                    None => return Err(self.fail(self.cur.error("expected object key"))),
                },
            };
            self.cur.skip_spaces();
            if !self.cur.eat(b':') {
                return Err(self.fail(self.cur.error("expected ':' after object key")));
            }
            self.skip_ws_and_newlines();
            let value = self.parse_value()?;
            entries.push((key, value.nodes));
            self.skip_ws_and_newlines();
            if self.cur.eat(b',') {
                continue;
            }
        }
        self.leave_nested();
        Ok(Node::Object(ObjectNode {
            entries,
            node_id: self.id(),
            location: self.loc(start),
        }))
    }

    /// `[ a, b, ... ]`
    pub(crate) fn parse_array(&mut self) -> Result<Node, ParseException> {
        self.enter_nested()?;
        let start = self.cur.position();
        self.cur.bump(); // '['
        let mut elements = Vec::new();
        loop {
            self.skip_ws_and_newlines();
            if self.cur.eat(b']') {
                break;
            }
            let value = self.parse_value()?;
            elements.push(value.nodes);
            self.skip_ws_and_newlines();
            if self.cur.eat(b',') {
                continue;
            }
        }
        self.leave_nested();
        Ok(Node::Array(ArrayNode {
            elements,
            node_id: self.id(),
            location: self.loc(start),
        }))
    }

    // =========================================================================
    // LITERALS & LOADERS
    // =========================================================================

    pub(crate) fn parse_number_literal(&mut self) -> Result<Node, ParseException> {
        let start = self.cur.position();
        let num_start = self.cur.offset();
        if self.cur.peek() == Some(b'-') {
            self.cur.bump();
        }
        let mut saw_digit = false;
        let mut saw_dot = false;
        while let Some(b) = self.cur.peek() {
            if b.is_ascii_digit() {
                saw_digit = true;
                self.cur.bump();
            } else if b == b'.' && !saw_dot
                && self.cur.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false)
            {
                saw_dot = true;
                self.cur.bump();
            } else {
                break;
            }
        }
        if !saw_digit {
            return Err(self.fail(self.cur.error("expected a number")));
        }
        let text = self.cur.slice(num_start, self.cur.offset());
        let value: JsonValue = if saw_dot {
            text.parse::<f64>()
                .ok()
                .and_then(|f| serde_json::Number::from_f64(f).map(JsonValue::Number))
                .ok_or_else(|| self.fail(self.cur.error("invalid number")))?
        } else {
            text.parse::<i64>()
                .map(|i| JsonValue::Number(i.into()))
                .map_err(|_| self.fail(self.cur.error("invalid number")))?
        };
        Ok(Node::Literal(LiteralNode {
            value,
            node_id: self.id(),
            location: self.loc(start),
        }))
    }

    /// `<path/to/file.md>` or `<file.md # Section>` — file loader. The path
    /// may interpolate `@var`.
    pub(crate) fn parse_angle_path(
        &mut self,
    ) -> Result<(Vec<Node>, Option<String>), ParseException> {
        self.cur.bump(); // '<'
        let (nodes, _) = self.parse_atsign_nodes(&[">", "#"], false)?;
        let mut section = None;
        if self.cur.peek() == Some(b'#') {
            self.cur.bump();
            let sec_start = self.cur.offset();
            while let Some(b) = self.cur.peek() {
                if b == b'>' || b == b'\n' {
                    break;
                }
                self.cur.bump();
            }
            section = Some(self.cur.slice(sec_start, self.cur.offset()).trim().to_string());
        }
        if !self.cur.eat(b'>') {
            return Err(self.fail(self.cur.error("expected '>'")));
        }
        // Trim surrounding whitespace inside the brackets
        let nodes = nodes
            .into_iter()
            .map(|n| match n {
                Node::Text(mut t) => {
                    t.content = t.content.trim().to_string();
                    Node::Text(t)
                }
                other => other,
            })
            .collect();
        Ok((nodes, section))
    }

    // =========================================================================
    // RUN SPECS
    // =========================================================================

    /// Body after the `run` keyword: `"command"`, `{command}`, `lang {code}`,
    /// or `@executable(args)`.
    pub(crate) fn parse_run_spec(
        &mut self,
        start: crate::ast::types::Position,
    ) -> Result<DirectiveNode, ParseException> {
        self.cur.skip_spaces();
        let mut values: IndexMap<String, Vec<Node>> = IndexMap::new();
        let mut raw: IndexMap<String, String> = IndexMap::new();
        let mut meta: IndexMap<String, JsonValue> = IndexMap::new();
        let subtype;
        match self.cur.peek() {
            Some(b'"') => {
                let slot_start = self.cur.offset();
                let nodes = self.parse_double_quoted()?;
                subtype = DirectiveSubtype::RunCommand;
                raw.insert(
                    "command".to_string(),
                    self.cur.slice(slot_start, self.cur.offset()).to_string(),
                );
                values.insert("command".to_string(), nodes);
                meta.insert("language".to_string(), JsonValue::from("sh"));
            }
            Some(b'{') => {
                let slot_start = self.cur.offset();
                self.cur.bump();
                let (nodes, _) = self.parse_atsign_nodes(&["}"], true)?;
                self.cur.bump(); // '}'
                subtype = DirectiveSubtype::RunCommand;
                raw.insert(
                    "command".to_string(),
                    self.cur.slice(slot_start, self.cur.offset()).to_string(),
                );
                values.insert("command".to_string(), nodes);
                meta.insert("language".to_string(), JsonValue::from("sh"));
            }
            Some(b'@') => {
                let slot_start = self.cur.offset();
                let reference = self.parse_reference()?;
                subtype = DirectiveSubtype::RunExec;
                raw.insert(
                    "executable".to_string(),
                    self.cur.slice(slot_start, self.cur.offset()).to_string(),
                );
                values.insert(
                    "executable".to_string(),
                    vec![Node::VariableReference(reference)],
                );
            }
            _ => {
                let lang = match self.cur.read_identifier() {
                    Some(w) => w.to_string(),
                    None => {
                        return Err(self.fail(
                            self.cur.error("expected a command, code block, or '@executable'"),
                        ))
                    }
                };
                return self.parse_code_block(start, &lang);
            }
        }
        let source_text = self
            .cur
            .slice(start.offset as usize, self.cur.offset())
            .to_string();
        let span = self.loc(start);
        Ok(DirectiveNode {
            kind: DirectiveKind::Run,
            subtype,
            values,
            raw,
            meta,
            source_text,
            node_id: self.id(),
            location: span,
        })
    }

    /// `lang { raw code }` — the body is opaque; braces are tracked for
    /// nesting but not interpreted.
    pub(crate) fn parse_code_block(
        &mut self,
        start: crate::ast::types::Position,
        lang: &str,
    ) -> Result<DirectiveNode, ParseException> {
        self.cur.skip_spaces();
        if !self.cur.eat(b'{') {
            return Err(self.fail(self.cur.error("expected '{' to open a code block")));
        }
        let code_start = self.cur.offset();
        let mut depth = 1usize;
        loop {
            match self.cur.peek() {
                None => return Err(self.fail(self.cur.error("unterminated code block"))),
                Some(b'{') => {
                    depth += 1;
                    self.cur.bump();
                }
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    self.cur.bump();
                }
                _ => {
                    self.cur.bump();
                }
            }
        }
        let code = self.cur.slice(code_start, self.cur.offset()).to_string();
        self.cur.bump(); // closing '}'

        let mut values: IndexMap<String, Vec<Node>> = IndexMap::new();
        let mut raw: IndexMap<String, String> = IndexMap::new();
        let mut meta: IndexMap<String, JsonValue> = IndexMap::new();
        let code_node = Node::Text(TextNode {
            content: code.trim().to_string(),
            node_id: self.id(),
            location: None,
        });
        values.insert("code".to_string(), vec![code_node]);
        raw.insert("code".to_string(), code);
        meta.insert("language".to_string(), JsonValue::from(lang));
        let source_text = self
            .cur
            .slice(start.offset as usize, self.cur.offset())
            .to_string();
        let span = self.loc(start);
        Ok(DirectiveNode {
            kind: DirectiveKind::Run,
            subtype: DirectiveSubtype::RunCode,
            values,
            raw,
            meta,
            source_text,
            node_id: self.id(),
            location: span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseOptions;

    fn parser(src: &str) -> Parser<'_> {
        Parser::new(src, ParseOptions::default())
    }

    #[test]
    fn test_single_quoted_is_literal() {
        let mut p = parser("'hello @x'");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.inferred, "text");
        assert_eq!(spec.wrapper, Some("singleQuote"));
        match &spec.nodes[0] {
            Node::Text(t) => assert_eq!(t.content, "hello @x"),
            other => panic!("expected text node, got {:?}", other),
        }
    }

    #[test]
    fn test_double_quoted_interpolates() {
        let mut p = parser("\"hello @name!\"");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.nodes.len(), 3);
        assert!(matches!(spec.nodes[1], Node::VariableReference(_)));
    }

    #[test]
    fn test_backtick_template_multiline() {
        let mut p = parser("`line one\nline @two`");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.inferred, "template");
        assert_eq!(spec.wrapper, Some("backtick"));
        assert_eq!(spec.nodes.len(), 2);
    }

    #[test]
    fn test_double_colon_template_uses_atsign() {
        let mut p = parser("::Hello @name::");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.wrapper, Some("doubleColon"));
        assert!(matches!(spec.nodes[1], Node::VariableReference(_)));
    }

    #[test]
    fn test_triple_colon_template_uses_mustache() {
        let mut p = parser(":::Processing {{items}} with {{filter}}:::");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.wrapper, Some("tripleColon"));
        let refs: Vec<_> = spec
            .nodes
            .iter()
            .filter_map(|n| match n {
                Node::VariableReference(r) => Some(r.identifier.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(refs, vec!["items", "filter"]);
    }

    #[test]
    fn test_at_sign_is_plain_in_mustache() {
        let mut p = parser(":::mail me @ home:::");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.nodes.len(), 1);
        assert!(matches!(spec.nodes[0], Node::Text(_)));
    }

    #[test]
    fn test_reference_with_field_tail() {
        let mut p = parser("@user.contacts[1].email");
        let spec = p.parse_value().unwrap();
        match &spec.nodes[0] {
            Node::VariableReference(r) => {
                assert_eq!(r.identifier, "user");
                assert_eq!(
                    r.fields,
                    vec![
                        FieldAccess::Name("contacts".into()),
                        FieldAccess::Index(1),
                        FieldAccess::Name("email".into()),
                    ]
                );
            }
            other => panic!("expected reference, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_with_dynamic_index() {
        let mut p = parser("@user.contacts[@i].email");
        let spec = p.parse_value().unwrap();
        match &spec.nodes[0] {
            Node::VariableReference(r) => {
                assert_eq!(r.fields[1], FieldAccess::Dynamic("i".into()));
            }
            other => panic!("expected reference, got {:?}", other),
        }
    }

    #[test]
    fn test_sentence_period_not_a_field() {
        let mut p = parser("`Hi @name. Bye`");
        let spec = p.parse_value().unwrap();
        match &spec.nodes[1] {
            Node::VariableReference(r) => assert!(r.fields.is_empty()),
            other => panic!("expected reference, got {:?}", other),
        }
        match &spec.nodes[2] {
            Node::Text(t) => assert_eq!(t.content, ". Bye"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_object_value() {
        let mut p = parser("{name: \"Alice\", tags: [1, 2], nested: {ok: true}}");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.inferred, "data");
        match &spec.nodes[0] {
            Node::Object(o) => {
                assert_eq!(o.entries.len(), 3);
                assert_eq!(o.entries[0].0, "name");
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_number_literals() {
        let mut p = parser("-3.5");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.inferred, "number");
        match &spec.nodes[0] {
            Node::Literal(l) => assert_eq!(l.value.as_f64(), Some(-3.5)),
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_run_command_value() {
        let mut p = parser("run \"echo hello\"");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.inferred, "command");
        match &spec.nodes[0] {
            Node::Directive(d) => {
                assert_eq!(d.subtype, DirectiveSubtype::RunCommand);
                assert!(d.slots_consistent());
            }
            other => panic!("expected directive, got {:?}", other),
        }
    }

    #[test]
    fn test_code_block_value() {
        let mut p = parser("js { return input.toUpperCase() }");
        let spec = p.parse_value().unwrap();
        assert_eq!(spec.inferred, "code");
        match &spec.nodes[0] {
            Node::Directive(d) => {
                assert_eq!(d.subtype, DirectiveSubtype::RunCode);
                assert_eq!(d.meta_str("language"), Some("js"));
                assert_eq!(d.raw_slot("code").map(str::trim), Some("return input.toUpperCase()"));
            }
            other => panic!("expected directive, got {:?}", other),
        }
    }

    #[test]
    fn test_code_block_nested_braces() {
        let mut p = parser("js { if (a) { return {x: 1} } }");
        let spec = p.parse_value().unwrap();
        match &spec.nodes[0] {
            Node::Directive(d) => {
                assert!(d.raw_slot("code").unwrap().contains("{x: 1}"));
            }
            other => panic!("expected directive, got {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_tail() {
        let mut p = parser(" | @upper | @trim");
        let stages = p.parse_pipeline_tail().unwrap();
        assert_eq!(stages.len(), 2);
    }

    #[test]
    fn test_pipeline_tail_ignores_logical_or() {
        let mut p = parser(" || @upper");
        let stages = p.parse_pipeline_tail().unwrap();
        assert!(stages.is_empty());
    }

    #[test]
    fn test_angle_path_with_section() {
        let mut p = parser("<docs/readme.md # Install>");
        let (nodes, section) = match p.parse_value().unwrap() {
            ValueSpec {
                nodes, section, inferred: "load", ..
            } => (nodes, section),
            other => panic!("expected load, got {:?}", other),
        };
        match &nodes[0] {
            Node::Text(t) => assert_eq!(t.content, "docs/readme.md"),
            other => panic!("expected text, got {:?}", other),
        }
        assert_eq!(section.as_deref(), Some("Install"));
    }

    #[test]
    fn test_unterminated_string_errors() {
        let mut p = parser("\"no close");
        let err = p.parse_value().unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_with_clause() {
        let mut p = parser("{ pipeline: [@upper, @trim], format: \"json\" }");
        let clause = p.parse_with_clause().unwrap();
        assert_eq!(clause.pipeline.len(), 2);
        assert_eq!(clause.format.as_deref(), Some("json"));
    }
}

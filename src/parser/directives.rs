//! Directive Parsing
//!
//! One parse function per directive kind. Every semantic sub-part lands in a
//! `values` slot as pre-parsed nodes, with the verbatim substring in `raw`
//! and derived flags in `meta`.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::ast::types::{
    DirectiveKind, DirectiveNode, DirectiveSubtype, DotSeparatorNode, LiteralNode, Node,
    PathSeparatorNode, Position, TextNode, VariableReferenceNode,
};
use crate::parser::types::ParseException;
use crate::parser::Parser;

/// Accumulates slots for one directive.
pub(crate) struct DirectiveBuilder {
    kind: DirectiveKind,
    subtype: DirectiveSubtype,
    values: IndexMap<String, Vec<Node>>,
    raw: IndexMap<String, String>,
    meta: IndexMap<String, JsonValue>,
}

impl DirectiveBuilder {
    pub(crate) fn new(kind: DirectiveKind, subtype: DirectiveSubtype) -> Self {
        Self {
            kind,
            subtype,
            values: IndexMap::new(),
            raw: IndexMap::new(),
            meta: IndexMap::new(),
        }
    }

    pub(crate) fn slot(&mut self, name: &str, nodes: Vec<Node>, raw: impl Into<String>) {
        self.values.insert(name.to_string(), nodes);
        self.raw.insert(name.to_string(), raw.into());
    }

    pub(crate) fn meta(&mut self, name: &str, value: impl Into<JsonValue>) {
        self.meta.insert(name.to_string(), value.into());
    }

    pub(crate) fn subtype(&mut self, subtype: DirectiveSubtype) {
        self.subtype = subtype;
    }
}

impl<'a> Parser<'a> {
    /// Parse a directive at the cursor (positioned on `/` or `@`).
    pub(crate) fn parse_directive(&mut self) -> Result<DirectiveNode, ParseException> {
        let start = self.cur.position();
        let sigil = self.cur.bump().unwrap_or(b'/');
        let word = match self.cur.read_identifier() {
            Some(w) => w.to_string(),
            None => return Err(self.fail(self.cur.error("expected a directive name"))),
        };
        let kind = DirectiveKind::from_word(&word)
            .ok_or_else(|| self.fail(self.cur.error(format!("unknown directive '{}'", word))))?;
        self.cur.skip_spaces();
        let mut builder = match kind {
            DirectiveKind::Var => self.parse_var_body()?,
            DirectiveKind::Exe => self.parse_exe_body()?,
            DirectiveKind::Path => self.parse_path_body()?,
            DirectiveKind::Show => self.parse_show_body()?,
            DirectiveKind::Run => self.parse_run_body(start)?,
            DirectiveKind::Import => self.parse_import_body()?,
            DirectiveKind::Export => self.parse_export_body()?,
            DirectiveKind::For => self.parse_for_body()?,
            DirectiveKind::When => self.parse_when_body()?,
            DirectiveKind::Checkpoint => self.parse_checkpoint_body()?,
            DirectiveKind::Guard => self.parse_guard_body()?,
        };
        if sigil == b'@' {
            builder.meta("legacySigil", true);
        }
        self.seal(builder, start)
    }

    /// Consume the directive tail (inline comment, line end) and build the
    /// node. `source_text` covers the exact consumed range including the
    /// trailing newline, so serialisation round-trips.
    fn seal(
        &mut self,
        mut builder: DirectiveBuilder,
        start: Position,
    ) -> Result<DirectiveNode, ParseException> {
        self.cur.skip_spaces();
        if self.cur.starts_with("<<") {
            let comment_start = self.cur.offset();
            self.cur.advance_to(self.cur.line_end());
            let comment = self.cur.slice(comment_start + 2, self.cur.offset()).trim();
            builder.meta("comment", comment);
        }
        match self.cur.peek() {
            None => {}
            Some(b'\n') => {
                self.cur.bump();
            }
            Some(_) => {
                return Err(self.fail(self.cur.error("unexpected content after directive")));
            }
        }
        let source_text = self
            .cur
            .slice(start.offset as usize, self.cur.offset())
            .to_string();
        let node = DirectiveNode {
            kind: builder.kind,
            subtype: builder.subtype,
            values: builder.values,
            raw: builder.raw,
            meta: builder.meta,
            source_text,
            node_id: self.id(),
            location: self.loc(start),
        };
        debug_assert!(node.slots_consistent());
        Ok(node)
    }

    /// `@name` in binding position: no field tail, no args.
    fn parse_binding_identifier(&mut self) -> Result<(Node, String), ParseException> {
        let start = self.cur.position();
        if !self.cur.eat(b'@') {
            return Err(self.fail(self.cur.error("expected '@name'")));
        }
        let name = match self.cur.read_identifier() {
            Some(w) => w.to_string(),
            None => return Err(self.fail(self.cur.error("expected identifier after '@'"))),
        };
        let node = Node::VariableReference(VariableReferenceNode::bare(
            name.clone(),
            self.id(),
            self.loc(start),
        ));
        Ok((node, name))
    }

    /// Shared `value + optional pipeline/with-clause` tail for var/exe/run.
    fn parse_tail_modifiers(&mut self, builder: &mut DirectiveBuilder) -> Result<(), ParseException> {
        let tail_start = self.cur.offset();
        let stages = self.parse_pipeline_tail()?;
        if !stages.is_empty() {
            let raw = self.cur.slice(tail_start, self.cur.offset()).to_string();
            builder.meta("pipelineLength", stages.len() as i64);
            builder.slot("pipeline", stages, raw);
            return Ok(());
        }
        // `with { pipeline: [...], format: ... }` longhand
        let save = self.cur.clone();
        self.cur.skip_spaces();
        let with_start = self.cur.offset();
        if self.cur.eat_str("with")
            && matches!(self.cur.peek(), Some(b' ') | Some(b'\t') | Some(b'{'))
        {
            let clause = self.parse_with_clause()?;
            let raw = self.cur.slice(with_start, self.cur.offset()).to_string();
            if let Some(format) = &clause.format {
                builder.meta("format", format.as_str());
            }
            builder.meta("pipelineLength", clause.pipeline.len() as i64);
            builder.slot("pipeline", clause.pipeline, raw);
        } else {
            self.cur = save;
        }
        Ok(())
    }

    // =========================================================================
    // /var
    // =========================================================================

    fn parse_var_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder = DirectiveBuilder::new(DirectiveKind::Var, DirectiveSubtype::Var);
        let id_start = self.cur.offset();
        let (node, _) = self.parse_binding_identifier()?;
        builder.slot(
            "identifier",
            vec![node],
            self.cur.slice(id_start, self.cur.offset()),
        );
        self.cur.skip_spaces();
        if !self.cur.eat(b'=') {
            return Err(self.fail(self.cur.error("expected '=' in var directive")));
        }
        self.cur.skip_spaces();
        let value_start = self.cur.offset();
        let spec = self.parse_value()?;
        let raw = self.cur.slice(value_start, self.cur.offset()).to_string();
        builder.meta("inferredType", spec.inferred);
        if let Some(wrapper) = spec.wrapper {
            builder.meta("wrapperType", wrapper);
        }
        if let Some(section) = &spec.section {
            builder.meta("section", section.as_str());
        }
        builder.slot("value", spec.nodes, raw);
        self.parse_tail_modifiers(&mut builder)?;
        Ok(builder)
    }

    // =========================================================================
    // /exe
    // =========================================================================

    fn parse_exe_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder = DirectiveBuilder::new(DirectiveKind::Exe, DirectiveSubtype::ExecTemplate);
        let id_start = self.cur.offset();
        let (node, _) = self.parse_binding_identifier()?;
        builder.slot(
            "identifier",
            vec![node],
            self.cur.slice(id_start, self.cur.offset()),
        );
        // Parameter list, in declaration order
        let params_start = self.cur.offset();
        let mut params = Vec::new();
        if self.cur.eat(b'(') {
            loop {
                self.cur.skip_spaces();
                if self.cur.eat(b')') {
                    break;
                }
                let p_start = self.cur.position();
                self.cur.eat(b'@'); // optional sigil on parameter names
                let name = match self.cur.read_identifier() {
                    Some(w) => w.to_string(),
                    None => return Err(self.fail(self.cur.error("expected parameter name"))),
                };
                params.push(Node::VariableReference(VariableReferenceNode::bare(
                    name,
                    self.id(),
                    self.loc(p_start),
                )));
                self.cur.skip_spaces();
                if self.cur.eat(b',') {
                    continue;
                }
            }
        }
        builder.meta("parameterCount", params.len() as i64);
        builder.slot(
            "params",
            params,
            self.cur.slice(params_start, self.cur.offset()),
        );
        self.cur.skip_spaces();
        if !self.cur.eat(b'=') {
            return Err(self.fail(self.cur.error("expected '=' in exe directive")));
        }
        self.cur.skip_spaces();
        let body_start = self.cur.offset();
        let spec = self.parse_value()?;
        let raw = self.cur.slice(body_start, self.cur.offset()).to_string();
        match spec.inferred {
            "command" => {
                builder.subtype(DirectiveSubtype::ExecCommand);
                builder.slot("body", spec.nodes, raw);
            }
            "code" => {
                builder.subtype(DirectiveSubtype::ExecCode);
                if let Some(Node::Directive(d)) = spec.nodes.first() {
                    if let Some(lang) = d.meta_str("language") {
                        builder.meta("language", lang);
                    }
                }
                builder.slot("body", spec.nodes, raw);
            }
            "template" | "text" => {
                builder.subtype(DirectiveSubtype::ExecTemplate);
                if let Some(wrapper) = spec.wrapper {
                    builder.meta("wrapperType", wrapper);
                }
                builder.slot("template", spec.nodes, raw);
            }
            other => {
                return Err(self.fail(self.cur.error(format!(
                    "exe body must be a command, code block, or template (got {})",
                    other
                ))));
            }
        }
        self.parse_tail_modifiers(&mut builder)?;
        Ok(builder)
    }

    // =========================================================================
    // /path
    // =========================================================================

    fn parse_path_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder = DirectiveBuilder::new(DirectiveKind::Path, DirectiveSubtype::AddPath);
        let id_start = self.cur.offset();
        let (node, _) = self.parse_binding_identifier()?;
        builder.slot(
            "identifier",
            vec![node],
            self.cur.slice(id_start, self.cur.offset()),
        );
        self.cur.skip_spaces();
        if !self.cur.eat(b'=') {
            return Err(self.fail(self.cur.error("expected '=' in path directive")));
        }
        self.cur.skip_spaces();
        let path_start = self.cur.offset();
        let nodes = match self.cur.peek() {
            Some(b'\'') => {
                let (n, _) = self.parse_single_quoted()?;
                vec![n]
            }
            Some(b'"') => self.parse_double_quoted()?,
            _ => self.parse_bare_path()?,
        };
        let raw = self.cur.slice(path_start, self.cur.offset()).to_string();
        let has_variables = nodes
            .iter()
            .any(|n| matches!(n, Node::VariableReference(_)));
        let is_absolute = raw.trim_matches(|c| c == '"' || c == '\'').starts_with('/');
        builder.meta("path.isAbsolute", is_absolute);
        builder.meta("path.hasVariables", has_variables);
        builder.slot("path", nodes, raw);
        Ok(builder)
    }

    /// Unquoted path tokens: segments, `@var`, `/` and `.` separators.
    fn parse_bare_path(&mut self) -> Result<Vec<Node>, ParseException> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut text = String::new();
        let mut text_start = self.cur.position();
        let flush = |parser: &mut Self, text: &mut String, start: Position, nodes: &mut Vec<Node>| {
            if !text.is_empty() {
                nodes.push(Node::Text(TextNode {
                    content: std::mem::take(text),
                    node_id: parser.id(),
                    location: parser.loc(start),
                }));
            }
        };
        loop {
            match self.cur.peek() {
                None | Some(b' ') | Some(b'\t') | Some(b'\n') => break,
                Some(b'/') => {
                    flush(self, &mut text, text_start, &mut nodes);
                    let start = self.cur.position();
                    self.cur.bump();
                    nodes.push(Node::PathSeparator(PathSeparatorNode {
                        node_id: self.id(),
                        location: self.loc(start),
                    }));
                    text_start = self.cur.position();
                }
                Some(b'.') => {
                    flush(self, &mut text, text_start, &mut nodes);
                    let start = self.cur.position();
                    self.cur.bump();
                    nodes.push(Node::DotSeparator(DotSeparatorNode {
                        node_id: self.id(),
                        location: self.loc(start),
                    }));
                    text_start = self.cur.position();
                }
                Some(b'@') => {
                    flush(self, &mut text, text_start, &mut nodes);
                    let reference = self.parse_reference()?;
                    nodes.push(Node::VariableReference(reference));
                    text_start = self.cur.position();
                }
                Some(b) => {
                    text.push(b as char);
                    self.cur.bump();
                }
            }
        }
        flush(self, &mut text, text_start, &mut nodes);
        if nodes.is_empty() {
            return Err(self.fail(self.cur.error("expected a path")));
        }
        Ok(nodes)
    }

    // =========================================================================
    // /show
    // =========================================================================

    fn parse_show_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder = DirectiveBuilder::new(DirectiveKind::Show, DirectiveSubtype::Show);
        let op_start = self.cur.offset();
        let spec = self.parse_value()?;
        let raw = self.cur.slice(op_start, self.cur.offset()).to_string();
        builder.meta("operandType", spec.inferred);
        if let Some(wrapper) = spec.wrapper {
            builder.meta("wrapperType", wrapper);
        }
        if let Some(section) = &spec.section {
            builder.meta("section", section.as_str());
        }
        builder.slot("operand", spec.nodes, raw);
        self.parse_tail_modifiers(&mut builder)?;
        // `as "##"` — shift headings in the rendered output
        let save = self.cur.clone();
        self.cur.skip_spaces();
        if self.cur.eat_str("as") && matches!(self.cur.peek(), Some(b' ') | Some(b'\t')) {
            self.cur.skip_spaces();
            let (_, level) = self.parse_single_or_double_literal()?;
            if level.is_empty() || !level.chars().all(|c| c == '#') {
                return Err(self.fail(self.cur.error("expected a heading marker like \"##\"")));
            }
            builder.meta("headerLevel", level.len() as i64);
        } else {
            self.cur = save;
        }
        Ok(builder)
    }

    /// A quoted literal where interpolation is not meaningful (labels, names).
    fn parse_single_or_double_literal(&mut self) -> Result<(Position, String), ParseException> {
        let start = self.cur.position();
        let quote = match self.cur.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.fail(self.cur.error("expected a quoted string"))),
        };
        self.cur.bump();
        let content_start = self.cur.offset();
        while let Some(b) = self.cur.peek() {
            if b == quote || b == b'\n' {
                break;
            }
            self.cur.bump();
        }
        let content = self.cur.slice(content_start, self.cur.offset()).to_string();
        if !self.cur.eat(quote) {
            return Err(self.fail(self.cur.error("unterminated string")));
        }
        Ok((start, content))
    }

    // =========================================================================
    // /run
    // =========================================================================

    fn parse_run_body(&mut self, start: Position) -> Result<DirectiveBuilder, ParseException> {
        let spec = self.parse_run_spec(start)?;
        let mut builder = DirectiveBuilder::new(DirectiveKind::Run, spec.subtype);
        for (name, nodes) in spec.values {
            let raw = spec.raw.get(&name).cloned().unwrap_or_default();
            builder.slot(&name, nodes, raw);
        }
        for (name, value) in spec.meta {
            builder.meta(&name, value);
        }
        self.parse_tail_modifiers(&mut builder)?;
        Ok(builder)
    }

    // =========================================================================
    // /import & /export
    // =========================================================================

    fn parse_import_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder =
            DirectiveBuilder::new(DirectiveKind::Import, DirectiveSubtype::ImportSelected);
        let sel_start = self.cur.offset();
        if self.cur.eat(b'*') {
            builder.subtype(DirectiveSubtype::ImportAll);
            builder.slot("imports", vec![], self.cur.slice(sel_start, self.cur.offset()));
        } else if self.cur.peek() == Some(b'{') {
            self.cur.bump();
            let mut imports = Vec::new();
            let mut aliases = serde_json::Map::new();
            loop {
                self.skip_ws_and_newlines();
                if self.cur.eat(b'}') {
                    break;
                }
                let (node, name) = self.parse_binding_identifier()?;
                self.cur.skip_spaces();
                if self.cur.eat_str("as") {
                    self.cur.skip_spaces();
                    let (_, alias) = self.parse_binding_identifier()?;
                    aliases.insert(name.clone(), JsonValue::from(alias));
                }
                imports.push(node);
                self.skip_ws_and_newlines();
                self.cur.eat(b',');
            }
            if !aliases.is_empty() {
                builder.meta("aliases", JsonValue::Object(aliases));
            }
            builder.slot(
                "imports",
                imports,
                self.cur.slice(sel_start, self.cur.offset()),
            );
        } else {
            return Err(self.fail(self.cur.error("expected '*' or '{ @name, ... }'")));
        }
        self.cur.skip_spaces();
        if !self.cur.eat_str("from") {
            return Err(self.fail(self.cur.error("expected 'from' in import directive")));
        }
        self.cur.skip_spaces();
        let src_start = self.cur.offset();
        let (nodes, source_type) = self.parse_import_source()?;
        builder.meta("sourceType", source_type);
        builder.slot(
            "source",
            nodes,
            self.cur.slice(src_start, self.cur.offset()),
        );
        Ok(builder)
    }

    /// Import sources: a quoted path/URL, `<path>`, or a module reference
    /// like `@org/name`.
    fn parse_import_source(&mut self) -> Result<(Vec<Node>, &'static str), ParseException> {
        match self.cur.peek() {
            Some(b'"') => {
                let nodes = self.parse_double_quoted()?;
                let is_url = nodes.iter().any(|n| match n {
                    Node::Text(t) => t.content.starts_with("http://") || t.content.starts_with("https://"),
                    _ => false,
                });
                Ok((nodes, if is_url { "url" } else { "path" }))
            }
            Some(b'\'') => {
                let (node, content) = self.parse_single_quoted()?;
                let kind = if content.starts_with("http://") || content.starts_with("https://") {
                    "url"
                } else {
                    "path"
                };
                Ok((vec![node], kind))
            }
            Some(b'<') => {
                let (nodes, _) = self.parse_angle_path()?;
                Ok((nodes, "path"))
            }
            Some(b'@') => {
                let start = self.cur.position();
                let token_start = self.cur.offset();
                while let Some(b) = self.cur.peek() {
                    if b == b' ' || b == b'\t' || b == b'\n' {
                        break;
                    }
                    self.cur.bump();
                }
                let token = self.cur.slice(token_start, self.cur.offset()).to_string();
                Ok((
                    vec![Node::Text(TextNode {
                        content: token,
                        node_id: self.id(),
                        location: self.loc(start),
                    })],
                    "module",
                ))
            }
            _ => Err(self.fail(self.cur.error("expected an import source"))),
        }
    }

    fn parse_export_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder =
            DirectiveBuilder::new(DirectiveKind::Export, DirectiveSubtype::ExportSelected);
        let sel_start = self.cur.offset();
        if !self.cur.eat(b'{') {
            return Err(self.fail(self.cur.error("expected '{ @name, ... }'")));
        }
        let mut names = Vec::new();
        loop {
            self.skip_ws_and_newlines();
            if self.cur.eat(b'}') {
                break;
            }
            let (node, _) = self.parse_binding_identifier()?;
            names.push(node);
            self.skip_ws_and_newlines();
            self.cur.eat(b',');
        }
        builder.slot("names", names, self.cur.slice(sel_start, self.cur.offset()));
        Ok(builder)
    }

    // =========================================================================
    // /for & /when
    // =========================================================================

    fn parse_for_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder = DirectiveBuilder::new(DirectiveKind::For, DirectiveSubtype::ForEach);
        let var_start = self.cur.offset();
        let (node, _) = self.parse_binding_identifier()?;
        builder.slot(
            "variable",
            vec![node],
            self.cur.slice(var_start, self.cur.offset()),
        );
        self.cur.skip_spaces();
        if !self.cur.eat_str("in") {
            return Err(self.fail(self.cur.error("expected 'in' in for directive")));
        }
        self.cur.skip_spaces();
        let iter_start = self.cur.offset();
        let spec = self.parse_value()?;
        builder.slot(
            "iterable",
            spec.nodes,
            self.cur.slice(iter_start, self.cur.offset()),
        );
        self.cur.skip_spaces();
        if !self.cur.eat_str("=>") {
            return Err(self.fail(self.cur.error("expected '=>' in for directive")));
        }
        self.cur.skip_spaces();
        let body_start = self.cur.offset();
        let action = self.parse_action()?;
        builder.slot(
            "body",
            vec![Node::Directive(action)],
            self.cur.slice(body_start, self.cur.offset()),
        );
        Ok(builder)
    }

    /// An action on the right of `=>`: a `show` or `run` directive without
    /// the leading slash.
    fn parse_action(&mut self) -> Result<DirectiveNode, ParseException> {
        let start = self.cur.position();
        let word = match self.cur.read_identifier() {
            Some(w) => w.to_string(),
            None => return Err(self.fail(self.cur.error("expected 'show' or 'run' action"))),
        };
        self.cur.skip_spaces();
        let builder = match word.as_str() {
            "show" => self.parse_show_body()?,
            "run" => self.parse_run_body(start)?,
            other => {
                return Err(self.fail(
                    self.cur
                        .error(format!("expected 'show' or 'run' action, got '{}'", other)),
                ))
            }
        };
        let source_text = self
            .cur
            .slice(start.offset as usize, self.cur.offset())
            .to_string();
        let node = DirectiveNode {
            kind: builder.kind,
            subtype: builder.subtype,
            values: builder.values,
            raw: builder.raw,
            meta: builder.meta,
            source_text,
            node_id: self.id(),
            location: self.loc(start),
        };
        Ok(node)
    }

    fn parse_when_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder = DirectiveBuilder::new(DirectiveKind::When, DirectiveSubtype::WhenMatch);
        let subj_start = self.cur.offset();
        let spec = self.parse_value()?;
        builder.slot(
            "subject",
            spec.nodes,
            self.cur.slice(subj_start, self.cur.offset()),
        );
        self.cur.skip_spaces();
        if self.cur.eat_str("=>") {
            // Truthiness form: /when @cond => action
            builder.meta("form", "truthy");
            self.cur.skip_spaces();
            let body_start = self.cur.offset();
            let action = self.parse_action()?;
            builder.slot(
                "conditions",
                vec![],
                "",
            );
            builder.slot(
                "actions",
                vec![Node::Directive(action)],
                self.cur.slice(body_start, self.cur.offset()),
            );
            return Ok(builder);
        }
        // Match form: /when @value [ pattern => action, ... ]
        if !self.cur.eat(b'[') {
            return Err(self.fail(self.cur.error("expected '=>' or '[' in when directive")));
        }
        builder.meta("form", "match");
        let arms_start = self.cur.offset();
        let mut conditions = Vec::new();
        let mut actions = Vec::new();
        loop {
            self.skip_ws_and_newlines();
            if self.cur.eat(b']') {
                break;
            }
            let pattern = self.parse_when_pattern()?;
            conditions.push(pattern);
            self.cur.skip_spaces();
            if !self.cur.eat_str("=>") {
                return Err(self.fail(self.cur.error("expected '=>' in when arm")));
            }
            self.cur.skip_spaces();
            let action = self.parse_action()?;
            actions.push(Node::Directive(action));
            self.skip_ws_and_newlines();
            self.cur.eat(b',');
        }
        let raw = self.cur.slice(arms_start, self.cur.offset()).to_string();
        builder.meta("armCount", conditions.len() as i64);
        builder.slot("conditions", conditions, raw.clone());
        builder.slot("actions", actions, raw);
        Ok(builder)
    }

    /// A when-arm pattern: literal string/number/boolean for equality, or
    /// `*` for the wildcard.
    fn parse_when_pattern(&mut self) -> Result<Node, ParseException> {
        let start = self.cur.position();
        match self.cur.peek() {
            Some(b'*') => {
                self.cur.bump();
                Ok(Node::Text(TextNode {
                    content: "*".to_string(),
                    node_id: self.id(),
                    location: self.loc(start),
                }))
            }
            Some(b'"') | Some(b'\'') => {
                let (_, content) = self.parse_single_or_double_literal()?;
                Ok(Node::Literal(LiteralNode {
                    value: JsonValue::from(content),
                    node_id: self.id(),
                    location: self.loc(start),
                }))
            }
            Some(b) if b.is_ascii_digit() || b == b'-' => self.parse_number_literal(),
            _ => {
                let save = self.cur.clone();
                match self.cur.read_identifier() {
                    Some("true") => Ok(Node::Literal(LiteralNode {
                        value: JsonValue::Bool(true),
                        node_id: self.id(),
                        location: self.loc(start),
                    })),
                    Some("false") => Ok(Node::Literal(LiteralNode {
                        value: JsonValue::Bool(false),
                        node_id: self.id(),
                        location: self.loc(start),
                    })),
                    _ => {
                        self.cur = save;
                        Err(self.fail(self.cur.error("expected a when pattern")))
                    }
                }
            }
        }
    }

    // =========================================================================
    // /checkpoint & /guard
    // =========================================================================

    fn parse_checkpoint_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder =
            DirectiveBuilder::new(DirectiveKind::Checkpoint, DirectiveSubtype::Checkpoint);
        let name_start = self.cur.offset();
        let (pos, name) = self.parse_single_or_double_literal()?;
        builder.slot(
            "name",
            vec![Node::Text(TextNode {
                content: name,
                node_id: self.id(),
                location: self.loc(pos),
            })],
            self.cur.slice(name_start, self.cur.offset()),
        );
        Ok(builder)
    }

    fn parse_guard_body(&mut self) -> Result<DirectiveBuilder, ParseException> {
        let mut builder = DirectiveBuilder::new(DirectiveKind::Guard, DirectiveSubtype::Guard);
        let label_start = self.cur.offset();
        let (pos, label) = self.parse_single_or_double_literal()?;
        builder.slot(
            "label",
            vec![Node::Text(TextNode {
                content: label,
                node_id: self.id(),
                location: self.loc(pos),
            })],
            self.cur.slice(label_start, self.cur.offset()),
        );
        self.cur.skip_spaces();
        let pred_start = self.cur.offset();
        if self.cur.peek() != Some(b'@') {
            return Err(self.fail(self.cur.error("expected '@predicate' in guard directive")));
        }
        let reference = self.parse_reference()?;
        builder.slot(
            "predicate",
            vec![Node::VariableReference(reference)],
            self.cur.slice(pred_start, self.cur.offset()),
        );
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseOptions;

    fn parse_one(src: &str) -> DirectiveNode {
        let mut p = Parser::new(src, ParseOptions::default());
        p.parse_directive().unwrap()
    }

    #[test]
    fn test_var_directive() {
        let d = parse_one("/var @greeting = \"hello @name\"\n");
        assert_eq!(d.kind, DirectiveKind::Var);
        assert_eq!(d.subtype, DirectiveSubtype::Var);
        assert_eq!(d.meta_str("inferredType"), Some("text"));
        assert_eq!(d.raw_slot("value"), Some("\"hello @name\""));
        assert!(d.slots_consistent());
        assert_eq!(d.source_text, "/var @greeting = \"hello @name\"\n");
    }

    #[test]
    fn test_var_with_pipeline() {
        let d = parse_one("/var @r = run \"echo hello world\" | @upper\n");
        assert_eq!(d.meta_str("inferredType"), Some("command"));
        assert_eq!(d.slot("pipeline").map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_exe_command() {
        let d = parse_one("/exe @greet(name) = run \"echo hi @name\"\n");
        assert_eq!(d.subtype, DirectiveSubtype::ExecCommand);
        assert_eq!(d.meta.get("parameterCount").and_then(|v| v.as_i64()), Some(1));
    }

    #[test]
    fn test_exe_code() {
        let d = parse_one("/exe @upper(s) = js { return s.toUpperCase() }\n");
        assert_eq!(d.subtype, DirectiveSubtype::ExecCode);
        assert_eq!(d.meta_str("language"), Some("js"));
    }

    #[test]
    fn test_exe_template() {
        let d = parse_one("/exe @process(items, filter) = :::Processing {{items}} with filter {{filter}}:::\n");
        assert_eq!(d.subtype, DirectiveSubtype::ExecTemplate);
        assert_eq!(d.meta_str("wrapperType"), Some("tripleColon"));
        assert_eq!(d.meta.get("parameterCount").and_then(|v| v.as_i64()), Some(2));
    }

    #[test]
    fn test_path_directive_meta() {
        let d = parse_one("/path @config = /etc/app/config.json\n");
        assert_eq!(d.subtype, DirectiveSubtype::AddPath);
        assert!(d.meta_bool("path.isAbsolute"));
        assert!(!d.meta_bool("path.hasVariables"));
    }

    #[test]
    fn test_path_with_variable() {
        let d = parse_one("/path @out = @base/build/out.md\n");
        assert!(d.meta_bool("path.hasVariables"));
    }

    #[test]
    fn test_show_reference() {
        let d = parse_one("/show @user.name\n");
        assert_eq!(d.kind, DirectiveKind::Show);
        assert_eq!(d.meta_str("operandType"), Some("reference"));
    }

    #[test]
    fn test_show_header_shift() {
        let d = parse_one("/show @doc as \"##\"\n");
        assert_eq!(d.meta.get("headerLevel").and_then(|v| v.as_i64()), Some(2));
    }

    #[test]
    fn test_run_exec() {
        let d = parse_one("/run @greet(\"alice\")\n");
        assert_eq!(d.subtype, DirectiveSubtype::RunExec);
        assert!(d.slot("executable").is_some());
    }

    #[test]
    fn test_import_selected_with_alias() {
        let d = parse_one("/import { @setting as @x } from @local/config\n");
        assert_eq!(d.subtype, DirectiveSubtype::ImportSelected);
        assert_eq!(d.meta_str("sourceType"), Some("module"));
        let aliases = d.meta.get("aliases").unwrap();
        assert_eq!(aliases.get("setting").and_then(|v| v.as_str()), Some("x"));
    }

    #[test]
    fn test_import_all() {
        let d = parse_one("/import * from \"lib/helpers.mld\"\n");
        assert_eq!(d.subtype, DirectiveSubtype::ImportAll);
        assert_eq!(d.meta_str("sourceType"), Some("path"));
    }

    #[test]
    fn test_export() {
        let d = parse_one("/export { @setting, @other }\n");
        assert_eq!(d.subtype, DirectiveSubtype::ExportSelected);
        assert_eq!(d.slot("names").map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_for_directive() {
        let d = parse_one("/for @item in @items => show @item\n");
        assert_eq!(d.subtype, DirectiveSubtype::ForEach);
        let body = d.slot("body").unwrap();
        assert!(matches!(body[0], Node::Directive(_)));
    }

    #[test]
    fn test_when_truthy_form() {
        let d = parse_one("/when @ready => show \"go\"\n");
        assert_eq!(d.meta_str("form"), Some("truthy"));
    }

    #[test]
    fn test_when_match_form() {
        let d = parse_one("/when @status [\n  \"active\" => show \"on\"\n  * => show \"off\"\n]\n");
        assert_eq!(d.meta_str("form"), Some("match"));
        assert_eq!(d.meta.get("armCount").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(d.slot("conditions").map(|s| s.len()), Some(2));
        assert_eq!(d.slot("actions").map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_checkpoint() {
        let d = parse_one("/checkpoint \"after-setup\"\n");
        assert_eq!(d.subtype, DirectiveSubtype::Checkpoint);
    }

    #[test]
    fn test_guard() {
        let d = parse_one("/guard \"run\" @allowRun\n");
        assert_eq!(d.subtype, DirectiveSubtype::Guard);
        assert!(d.slot("predicate").is_some());
    }

    #[test]
    fn test_inline_comment_captured() {
        let d = parse_one("/var @x = 1 << answer\n");
        assert_eq!(d.meta_str("comment"), Some("answer"));
        assert!(d.source_text.contains("<< answer"));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let mut p = Parser::new("/var @x = 1 2\n", ParseOptions::default());
        let err = p.parse_directive().unwrap_err();
        assert!(err.message.contains("unexpected content"));
    }

    #[test]
    fn test_legacy_sigil() {
        let d = parse_one("@var @x = 1\n");
        assert!(d.meta_bool("legacySigil"));
    }
}

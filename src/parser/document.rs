//! Document Scanning
//!
//! Splits a source file into Markdown text, fenced code blocks, comment
//! lines, and directives. Directives are recognised at start-of-line only,
//! outside fenced code, beginning with `/` (canonical) or `@` (legacy).

use serde_json::Value as JsonValue;

use crate::ast::types::{CodeFenceNode, CommentNode, Document, DirectiveKind, ErrorNode, Node, TextNode};
use crate::parser::types::{ParseException, MAX_PARSE_ITERATIONS};
use crate::parser::Parser;

impl<'a> Parser<'a> {
    pub fn parse_document(&mut self) -> Result<Document, ParseException> {
        let (frontmatter, frontmatter_raw) = self.parse_frontmatter()?;
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut text_start = self.cur.position();
        let mut iterations = 0usize;

        macro_rules! flush_text {
            () => {
                if !text.is_empty() {
                    nodes.push(Node::Text(TextNode {
                        content: std::mem::take(&mut text),
                        node_id: self.id(),
                        location: self.loc(text_start),
                    }));
                }
            };
        }

        while !self.cur.eof() {
            iterations += 1;
            if iterations > MAX_PARSE_ITERATIONS {
                return Err(self.fail(self.cur.error("parser iteration limit exceeded")));
            }

            if self.cur.starts_with("```") || self.cur.starts_with("~~~") {
                flush_text!();
                let fence = self.parse_code_fence();
                nodes.push(fence);
                text_start = self.cur.position();
                continue;
            }

            if self.cur.starts_with(">>") {
                flush_text!();
                let start = self.cur.position();
                let raw_start = self.cur.offset();
                self.cur.advance_to(self.cur.line_end());
                self.cur.eat(b'\n');
                let raw = self.cur.slice(raw_start, self.cur.offset()).to_string();
                let comment_text = raw
                    .trim_start_matches('>')
                    .trim()
                    .to_string();
                nodes.push(Node::Comment(CommentNode {
                    text: comment_text,
                    raw,
                    node_id: self.id(),
                    location: self.loc(start),
                }));
                text_start = self.cur.position();
                continue;
            }

            if self.at_directive_start() {
                flush_text!();
                let line_start = self.cur.clone();
                match self.parse_directive() {
                    Ok(directive) => {
                        nodes.push(Node::Directive(directive));
                    }
                    Err(e) if !self.options.strict => {
                        // Recover at the next line
                        self.cur = line_start;
                        let start = self.cur.position();
                        let raw_start = self.cur.offset();
                        self.cur.advance_to(self.cur.line_end());
                        self.cur.eat(b'\n');
                        let raw = self.cur.slice(raw_start, self.cur.offset()).to_string();
                        nodes.push(Node::Error(ErrorNode {
                            message: e.message.clone(),
                            raw,
                            node_id: self.id(),
                            location: self.loc(start),
                        }));
                        self.errors.push(e);
                    }
                    Err(e) => return Err(e),
                }
                text_start = self.cur.position();
                continue;
            }

            // Plain text: consume through the newline
            let line_end = self.cur.line_end();
            let raw_start = self.cur.offset();
            self.cur.advance_to(line_end);
            self.cur.eat(b'\n');
            text.push_str(self.cur.slice(raw_start, self.cur.offset()));
        }
        flush_text!();

        Ok(Document {
            nodes,
            frontmatter,
            frontmatter_raw,
        })
    }

    /// Leading `---` YAML block. The raw form keeps the delimiters so the
    /// document serialises back byte-for-byte.
    fn parse_frontmatter(
        &mut self,
    ) -> Result<(Option<JsonValue>, Option<String>), ParseException> {
        if self.cur.offset() != 0 || !self.cur.starts_with("---\n") {
            return Ok((None, None));
        }
        let rest = self.cur.rest();
        let body_start = 4; // past "---\n"
        let close = match rest[body_start..].find("\n---") {
            Some(i) => body_start + i,
            None => return Ok((None, None)), // not frontmatter, treat as text
        };
        let after_close = close + "\n---".len();
        // Closing delimiter must end its line
        let close_line_ok = rest[after_close..].is_empty() || rest[after_close..].starts_with('\n');
        if !close_line_ok {
            return Ok((None, None));
        }
        let yaml = &rest[body_start..close];
        let parsed: JsonValue = serde_yaml::from_str(yaml).map_err(|e| {
            self.fail(ParseException::new(
                format!("invalid frontmatter: {}", e),
                1,
                1,
            ))
        })?;
        let raw_end = if rest[after_close..].starts_with('\n') {
            after_close + 1
        } else {
            after_close
        };
        let raw = rest[..raw_end].to_string();
        self.cur.advance_to(raw_end);
        Ok((Some(parsed), Some(raw)))
    }

    /// A directive starts with `/` or `@` followed by a known kind word and
    /// a space (or `(`/`{` for structured bodies).
    fn at_directive_start(&self) -> bool {
        let rest = self.cur.rest();
        let mut bytes = rest.bytes();
        match bytes.next() {
            Some(b'/') | Some(b'@') => {}
            _ => return false,
        }
        let word: String = rest[1..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .map(|b| b as char)
            .collect();
        if DirectiveKind::from_word(&word).is_none() {
            return false;
        }
        matches!(
            rest.as_bytes().get(1 + word.len()),
            Some(b' ') | Some(b'\t')
        )
    }

    fn parse_code_fence(&mut self) -> Node {
        let start = self.cur.position();
        let raw_start = self.cur.offset();
        let marker = if self.cur.starts_with("```") { "```" } else { "~~~" };
        // Opening fence line
        self.cur.advance_to(self.cur.line_end());
        let open_line = self.cur.slice(raw_start, self.cur.offset());
        let language = open_line
            .trim_start_matches(|c| c == '`' || c == '~')
            .trim();
        let language = if language.is_empty() {
            None
        } else {
            Some(language.to_string())
        };
        self.cur.eat(b'\n');
        let content_start = self.cur.offset();
        let mut content_end = self.cur.offset();
        loop {
            if self.cur.eof() {
                content_end = self.cur.offset();
                break;
            }
            if self.cur.starts_with(marker) {
                content_end = self.cur.offset();
                self.cur.advance_to(self.cur.line_end());
                self.cur.eat(b'\n');
                break;
            }
            self.cur.advance_to(self.cur.line_end());
            self.cur.eat(b'\n');
        }
        let content = self.cur.slice(content_start, content_end).to_string();
        let raw = self.cur.slice(raw_start, self.cur.offset()).to_string();
        Node::CodeFence(CodeFenceNode {
            language,
            content,
            raw,
            node_id: self.id(),
            location: self.loc(start),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::serialize_document;
    use crate::parser::{parse, parse_with_options, ParseOptions};

    #[test]
    fn test_plain_markdown_is_text() {
        let doc = parse("# Title\n\nSome prose.\n").unwrap();
        assert_eq!(doc.nodes.len(), 1);
        match &doc.nodes[0] {
            Node::Text(t) => assert_eq!(t.content, "# Title\n\nSome prose.\n"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_directive_between_text() {
        let src = "intro\n/var @x = 1\noutro\n";
        let doc = parse(src).unwrap();
        assert_eq!(doc.nodes.len(), 3);
        assert!(matches!(doc.nodes[1], Node::Directive(_)));
    }

    #[test]
    fn test_directives_not_recognised_in_fences() {
        let src = "```\n/var @x = 1\n```\n";
        let doc = parse(src).unwrap();
        assert_eq!(doc.nodes.len(), 1);
        match &doc.nodes[0] {
            Node::CodeFence(f) => {
                assert_eq!(f.content, "/var @x = 1\n");
                assert_eq!(f.raw, src);
            }
            other => panic!("expected fence, got {:?}", other),
        }
    }

    #[test]
    fn test_fence_language_tag() {
        let doc = parse("```rust\nfn main() {}\n```\n").unwrap();
        match &doc.nodes[0] {
            Node::CodeFence(f) => assert_eq!(f.language.as_deref(), Some("rust")),
            other => panic!("expected fence, got {:?}", other),
        }
    }

    #[test]
    fn test_comment_line() {
        let doc = parse(">> just a note\n").unwrap();
        match &doc.nodes[0] {
            Node::Comment(c) => assert_eq!(c.text, "just a note"),
            other => panic!("expected comment, got {:?}", other),
        }
    }

    #[test]
    fn test_slash_path_in_prose_is_text() {
        let doc = parse("/usr/bin is a path\n").unwrap();
        assert!(matches!(doc.nodes[0], Node::Text(_)));
    }

    #[test]
    fn test_email_like_text_is_text() {
        let doc = parse("@alice wrote this\n").unwrap();
        // 'alice' is not a directive kind
        assert!(matches!(doc.nodes[0], Node::Text(_)));
    }

    #[test]
    fn test_frontmatter() {
        let src = "---\ntitle: Test\ncount: 2\n---\n\nBody\n";
        let doc = parse(src).unwrap();
        let fm = doc.frontmatter.unwrap();
        assert_eq!(fm.get("title").and_then(|v| v.as_str()), Some("Test"));
        assert_eq!(fm.get("count").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(doc.frontmatter_raw.as_deref(), Some("---\ntitle: Test\ncount: 2\n---\n"));
    }

    #[test]
    fn test_round_trip_serialisation() {
        let src = "---\na: 1\n---\n# Doc\n\n/var @x = \"hi\"\n>> note\n```sh\nls /\n```\ntail\n/show @x\n";
        let doc = parse(src).unwrap();
        assert_eq!(serialize_document(&doc), src);
    }

    #[test]
    fn test_round_trip_is_fixed_point() {
        let src = "# T\n/var @x = {a: [1, 2], b: \"s\"}\nmid\n/show @x.a[0]\n";
        let doc = parse(src).unwrap();
        let once = serialize_document(&doc);
        assert_eq!(once, src);
        let doc2 = parse(&once).unwrap();
        assert_eq!(serialize_document(&doc2), once);
    }

    #[test]
    fn test_strict_mode_fails_fast() {
        let err = parse("/var @x =\n").unwrap_err();
        assert!(err.message.contains("expected a value"));
    }

    #[test]
    fn test_permissive_mode_collects_errors() {
        let src = "/var @x =\n/var @y = 2\n";
        let result = parse_with_options(
            src,
            ParseOptions {
                strict: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.document.nodes.len(), 2);
        assert!(matches!(result.document.nodes[0], Node::Error(_)));
        assert!(matches!(result.document.nodes[1], Node::Directive(_)));
        // Error nodes keep the raw line, so serialisation still round-trips
        assert_eq!(serialize_document(&result.document), src);
    }

    #[test]
    fn test_error_carries_file_tag() {
        let result = parse_with_options(
            "/var @x =\n",
            ParseOptions {
                file: Some("doc.mld".to_string()),
                ..Default::default()
            },
        );
        let err = result.unwrap_err();
        assert_eq!(err.file.as_deref(), Some("doc.mld"));
    }

    #[test]
    fn test_multiline_when_block() {
        let src = "/when @mode [\n  \"fast\" => show \"F\"\n  * => show \"S\"\n]\n";
        let doc = parse(src).unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(serialize_document(&doc), src);
    }
}

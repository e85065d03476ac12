//! Parser for mlld source files
//!
//! The grammar is organised PEG-style: tokens → identifiers → content
//! patterns → wrapped patterns (strings, templates, collections) → directive
//! cores → directive rules → right-hand-side patterns. Each rule has one
//! canonical implementation and is reused from every directive that needs it.
//!
//! Grammar (simplified):
//!   document   ::= frontmatter? (text | fence | comment | directive)*
//!   directive  ::= ('/' | '@') kind body
//!   rhs        ::= string | template | data | reference | literal | run | load
//!   reference  ::= '@' ident field* args? pipeline?
//!   field      ::= '.' ident | '[' (int | string | '@' ident) ']'
//!   pipeline   ::= ('|' stage)+

pub mod cursor;
pub mod directives;
pub mod document;
pub mod types;
pub mod values;

use crate::ast::types::{Document, Position, Span};
use cursor::Cursor;
pub use types::{ParseException, ParseOptions};

/// Result of a permissive parse: the document plus any collected errors.
#[derive(Debug)]
pub struct ParseResult {
    pub document: Document,
    pub errors: Vec<ParseException>,
}

pub struct Parser<'a> {
    pub(crate) cur: Cursor<'a>,
    pub(crate) options: ParseOptions,
    pub(crate) errors: Vec<ParseException>,
    pub(crate) depth: usize,
    next_id: u32,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, options: ParseOptions) -> Self {
        Self {
            cur: Cursor::new(source),
            options,
            errors: Vec::new(),
            depth: 0,
            next_id: 0,
        }
    }

    /// Unique node id within this parse.
    pub(crate) fn id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("n{}", id)
    }

    pub(crate) fn loc(&self, start: Position) -> Option<Span> {
        if self.options.track_locations {
            Some(self.cur.span_from(start))
        } else {
            None
        }
    }

    pub(crate) fn fail(&self, e: ParseException) -> ParseException {
        e.in_file(self.options.file.as_deref())
    }

    pub(crate) fn enter_nested(&mut self) -> Result<(), ParseException> {
        self.depth += 1;
        if self.depth > types::MAX_NESTING_DEPTH {
            return Err(self.fail(self.cur.error("nesting too deep")));
        }
        Ok(())
    }

    pub(crate) fn leave_nested(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Parse in strict mode, failing on the first error.
pub fn parse(source: &str) -> Result<Document, ParseException> {
    let result = parse_with_options(source, ParseOptions::default())?;
    Ok(result.document)
}

/// Parse with explicit options. In permissive mode, recoverable failures are
/// returned in `ParseResult::errors` alongside `Error` nodes in the AST.
pub fn parse_with_options(
    source: &str,
    options: ParseOptions,
) -> Result<ParseResult, ParseException> {
    if source.len() > types::MAX_INPUT_SIZE {
        return Err(ParseException::new(
            format!("input exceeds maximum size ({} bytes)", types::MAX_INPUT_SIZE),
            1,
            1,
        )
        .in_file(options.file.as_deref()));
    }
    let mut parser = Parser::new(source, options);
    let document = parser.parse_document()?;
    Ok(ParseResult {
        document,
        errors: parser.errors,
    })
}

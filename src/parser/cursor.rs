//! Source Cursor
//!
//! Byte cursor over the source text with line/column/offset tracking.
//! Directive syntax is ASCII; arbitrary UTF-8 appears only inside content
//! slices, which are copied out verbatim.

use crate::ast::types::{Position, Span};
use crate::parser::types::ParseException;

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.pos as u32,
        }
    }

    pub fn span_from(&self, start: Position) -> Span {
        Span {
            start,
            end: self.position(),
        }
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    pub fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + ahead).copied()
    }

    pub fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    /// Advance one byte. Newlines reset the column.
    pub fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    /// Advance to an absolute byte offset, updating line/column.
    pub fn advance_to(&mut self, offset: usize) {
        let offset = offset.min(self.src.len());
        while self.pos < offset {
            self.bump();
        }
    }

    /// Consume `s` if the input starts with it.
    pub fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.advance_to(self.pos + s.len());
            true
        } else {
            false
        }
    }

    pub fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skip spaces and tabs, not newlines.
    pub fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.bump();
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.src[start..end]
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Byte offset of the end of the current line (exclusive of the newline).
    pub fn line_end(&self) -> usize {
        match self.src[self.pos..].find('\n') {
            Some(i) => self.pos + i,
            None => self.src.len(),
        }
    }

    /// Read an identifier: `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn read_identifier(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                self.bump();
            }
            _ => return None,
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        Some(self.slice(start, self.pos))
    }

    /// Error at the current position, with a short snippet of what follows.
    pub fn error(&self, message: impl Into<String>) -> ParseException {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .take_while(|(i, c)| *i < 24 && *c != '\n')
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(0);
        ParseException::new(message, self.line, self.column).with_snippet(&rest[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_tracking() {
        let mut c = Cursor::new("ab\ncd");
        assert_eq!(c.position().line, 1);
        c.bump();
        c.bump();
        c.bump(); // newline
        assert_eq!(c.position().line, 2);
        assert_eq!(c.position().column, 1);
        assert_eq!(c.offset(), 3);
    }

    #[test]
    fn test_eat_str() {
        let mut c = Cursor::new("/var @x");
        assert!(c.eat_str("/var"));
        assert!(!c.eat_str("/var"));
        c.skip_spaces();
        assert_eq!(c.peek(), Some(b'@'));
    }

    #[test]
    fn test_read_identifier() {
        let mut c = Cursor::new("foo_bar1 rest");
        assert_eq!(c.read_identifier(), Some("foo_bar1"));
        assert_eq!(c.read_identifier(), None);
    }

    #[test]
    fn test_line_end() {
        let c = Cursor::new("one\ntwo");
        assert_eq!(c.line_end(), 3);
    }

    #[test]
    fn test_error_snippet_stops_at_newline() {
        let c = Cursor::new("bad stuff\nnext");
        let e = c.error("expected a value");
        assert_eq!(e.snippet.as_deref(), Some("bad stuff"));
    }
}

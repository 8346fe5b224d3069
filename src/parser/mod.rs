//! Source-position tracking types used to annotate the request AST.
//!
//! The lexer and parser that actually produce a [`crate::ast::Document`] from
//! query text are treated as an external collaborator: this crate only
//! consumes the AST and the span information attached to it, it does not
//! implement tokenizing or parsing itself.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A reference to a line and column in an input source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy)]
pub struct SourcePosition {
    index: usize,
    line: usize,
    col: usize,
}

impl SourcePosition {
    /// Creates a new [`SourcePosition`] pointing at `index` (`line`/`col`,
    /// zero-based).
    pub fn new(index: usize, line: usize, col: usize) -> SourcePosition {
        assert!(index >= line + col);
        SourcePosition { index, line, col }
    }

    /// A [`SourcePosition`] pointing at the very start of a source.
    pub fn new_origin() -> SourcePosition {
        SourcePosition {
            index: 0,
            line: 0,
            col: 0,
        }
    }

    /// The zero-based index of the character in the input source.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The zero-based line of the character in the input source.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The zero-based column of the character in the input source.
    pub fn column(&self) -> usize {
        self.col
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl Serialize for SourcePosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_key("line")?;
        map.serialize_value(&(self.line + 1))?;
        map.serialize_key("column")?;
        map.serialize_value(&(self.col + 1))?;
        map.end()
    }
}

/// A range of characters in the input source, starting at `start` and ending
/// just before `end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub struct Span {
    /// Start position of the span.
    pub start: SourcePosition,
    /// Position just after the span.
    pub end: SourcePosition,
}

impl Span {
    pub fn new(start: &SourcePosition, end: &SourcePosition) -> Span {
        Self {
            start: *start,
            end: *end,
        }
    }

    pub fn zero_width(pos: &SourcePosition) -> Span {
        Self::new(pos, pos)
    }

    /// A [`Span`] with no meaningful source location, used for values
    /// constructed outside of parsing (e.g. defaults, test fixtures).
    pub fn unlocated() -> Span {
        Self {
            start: SourcePosition::new_origin(),
            end: SourcePosition::new_origin(),
        }
    }
}

/// Wraps an item together with its start/end position in the input source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub struct Spanning<T> {
    /// The wrapped item.
    pub item: T,
    /// The span.
    pub span: Span,
}

impl<T> Spanning<T> {
    pub fn new(span: Span, item: T) -> Spanning<T> {
        Self { item, span }
    }

    pub fn zero_width(pos: &SourcePosition, item: T) -> Spanning<T> {
        Self::new(Span::zero_width(pos), item)
    }

    pub fn start_end(start: &SourcePosition, end: &SourcePosition, item: T) -> Spanning<T> {
        Self::new(Span::new(start, end), item)
    }

    /// Wraps an unlocated `item`, i.e. one with no meaningful position in
    /// any source document.
    pub fn unlocated(item: T) -> Spanning<T> {
        Self::new(Span::unlocated(), item)
    }

    pub fn start(&self) -> &SourcePosition {
        &self.span.start
    }

    pub fn end(&self) -> &SourcePosition {
        &self.span.end
    }

    /// Modifies the contents of the spanned item.
    pub fn map<O, F: Fn(T) -> O>(self, f: F) -> Spanning<O> {
        Spanning::new(self.span, f(self.item))
    }

    /// Modifies the contents of the spanned item if `f` returns [`Some`], or
    /// returns [`None`] otherwise.
    pub fn and_then<O, F: Fn(T) -> Option<O>>(self, f: F) -> Option<Spanning<O>> {
        f(self.item).map(|item| Spanning::new(self.span, item))
    }
}

impl<T: fmt::Display> fmt::Display for Spanning<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}. At {}", self.item, self.span.start)
    }
}

impl<T: std::error::Error> std::error::Error for Spanning<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlocated_spans_point_at_origin() {
        let s: Spanning<i32> = Spanning::unlocated(42);
        assert_eq!(s.start().index(), 0);
        assert_eq!(s.item, 42);
    }

    #[test]
    fn map_preserves_span() {
        let pos = SourcePosition::new(5, 0, 5);
        let s = Spanning::zero_width(&pos, 1);
        let mapped = s.map(|v| v + 1);
        assert_eq!(mapped.item, 2);
        assert_eq!(*mapped.start(), pos);
    }
}

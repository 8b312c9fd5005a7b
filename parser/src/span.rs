//! Where tokens and nodes came from.
//!
//! The compiler turns a [`Span`] into a source-map mark, and error reports
//! print it as `line:column-line:column`.

use std::fmt;

/// A point between two bytes of the source. Lines and columns start at 1;
/// columns count bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    pub const fn origin() -> Self {
        Self::new(0, 1, 1)
    }
}

impl Default for Pos {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    /// Zero width, at `pos`.
    pub const fn point(pos: Pos) -> Self {
        Self::new(pos, pos)
    }

    /// The smallest span containing both.
    pub fn merge(self, other: Span) -> Span {
        let start = [self.start, other.start]
            .into_iter()
            .min_by_key(|p| p.offset)
            .unwrap_or(self.start);
        let end = [self.end, other.end]
            .into_iter()
            .max_by_key(|p| p.offset)
            .unwrap_or(self.end);
        Span::new(start, end)
    }

    #[inline]
    pub const fn offset(&self) -> usize {
        self.start.offset
    }

    /// Bytes covered.
    #[inline]
    pub const fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both() {
        let a = Span::new(Pos::new(4, 1, 5), Pos::new(7, 1, 8));
        let b = Span::new(Pos::new(0, 1, 1), Pos::new(2, 1, 3));
        let m = a.merge(b);
        assert_eq!(m.offset(), 0);
        assert_eq!(m.len(), 7);
        assert_eq!(m.to_string(), "1:1-1:8");
        assert_eq!(b.merge(a), m);
    }

    #[test]
    fn point_is_empty() {
        assert!(Span::point(Pos::origin()).is_empty());
        assert_eq!(Span::default().start, Pos::origin());
    }
}

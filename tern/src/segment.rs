use std::path::{Path, PathBuf};
use std::rc::Rc;

use bytecode::{Image, SourceMap};

use crate::value::Value;

/// One loaded compile unit.
///
/// Code and data are immutable once registered and shared by reference
/// count, so the interpreter and borrowed strings can hold them without
/// borrowing the segment table.
#[derive(Debug)]
pub struct Segment {
    /// Canonical path of the source file, `None` for text run directly.
    pub path: Option<PathBuf>,
    pub code: Rc<[u8]>,
    pub data: Rc<[u8]>,
    pub source_map: SourceMap,
    pub source: Rc<str>,
    /// The segment's namespace: a permanent dictionary record.
    pub globals: Value,
}

impl Segment {
    pub fn new(
        image: Image,
        path: Option<PathBuf>,
        source: Rc<str>,
        globals: Value,
    ) -> Self {
        Self {
            path,
            code: Rc::from(image.code),
            data: Rc::from(image.data),
            source_map: image.source_map,
            source,
            globals,
        }
    }

    /// Directory that relative imports from this segment resolve against.
    pub fn directory(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    pub fn name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<input>".to_string(),
        }
    }

    /// `name:line:column` of the source behind the instruction at `pc`.
    pub fn location(&self, pc: usize) -> Option<String> {
        let (start, _) = self.source_map.lookup(pc as u32)?;
        let (line, column) = line_column(&self.source, start as usize);
        Some(format!("{}:{line}:{column}", self.name()))
    }
}

/// 1-based line and byte column of `offset` in `source`.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    (line, offset - line_start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_column_counts_from_one() {
        let src = "a\nbc\n\nd";
        assert_eq!(line_column(src, 0), (1, 1));
        assert_eq!(line_column(src, 3), (2, 2));
        assert_eq!(line_column(src, 6), (4, 1));
        assert_eq!(line_column(src, 100), (4, 2));
    }

    #[test]
    fn location_uses_source_map() {
        let source = "x = 1;\ny = x + z;";
        let program = parser::parse(source).unwrap();
        let image = crate::compiler::compile(&program).unwrap();
        let segment = Segment::new(image, None, Rc::from(source), Value::NULL_REF);
        // literals carry no mark of their own
        assert_eq!(segment.location(0), None);
        // PUSH_INT(12) then the ASSIGN of `x = 1`
        assert_eq!(segment.location(12).as_deref(), Some("<input>:1:1"));
        assert!(segment.directory().is_none());
    }
}

use std::collections::HashMap;

use crate::op::{Op, Operand};
use crate::source_map::{SourceMap, SourceMapBuilder};

/// A code block under construction.
///
/// The top level of a compile unit lives in block 0; every function body
/// gets its own block. Blocks are laid out back to back by
/// [`CodeBuilder::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(usize);

/// A jump target that may not be known yet.
///
/// Created by [`CodeBuilder::new_label`] and bound to a position with
/// [`CodeBuilder::bind`]. Any number of jumps may reference a label before
/// or after it is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// A deferred write of a label's absolute address.
#[derive(Debug, Clone, Copy)]
struct Gap {
    block: usize,
    /// Position of the `u32` operand inside the block.
    pos: usize,
    label: Label,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A jump referenced a label that was never bound.
    UnboundLabel(usize),
    /// The laid-out code or data no longer fits a `u32` offset.
    TooLarge { what: &'static str, size: usize },
    /// A constant string contains a NUL byte and cannot be stored
    /// NUL-terminated.
    InteriorNul(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnboundLabel(id) => write!(f, "label {id} was never bound"),
            Self::TooLarge { what, size } => {
                write!(f, "{what} stream too large ({size} bytes)")
            }
            Self::InteriorNul(s) => {
                write!(f, "constant string {s:?} contains a NUL byte")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Builds the code stream of one segment.
///
/// Target operands that are not yet known are emitted as zero placeholders
/// and recorded as gaps; [`finish`](Self::finish) assigns every block its
/// final offset and patches each gap with
/// `offset(label.block) + label.offset_in_block`.
#[derive(Debug)]
pub struct CodeBuilder {
    blocks: Vec<Vec<u8>>,
    current: usize,
    labels: Vec<Option<(usize, usize)>>,
    gaps: Vec<Gap>,
    spans: Vec<(usize, usize, u32, u32)>,
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            blocks: vec![Vec::new()],
            current: 0,
            labels: Vec::new(),
            gaps: Vec::new(),
            spans: Vec::new(),
        }
    }

    pub fn current_block(&self) -> BlockId {
        BlockId(self.current)
    }

    /// Open a fresh, empty block. Emission continues in the current block
    /// until [`switch_to`](Self::switch_to) is called.
    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(Vec::new());
        BlockId(self.blocks.len() - 1)
    }

    /// Redirect emission into `block`, returning the previously active one.
    pub fn switch_to(&mut self, block: BlockId) -> BlockId {
        debug_assert!(block.0 < self.blocks.len());
        std::mem::replace(&mut self.current, block.0).into()
    }

    /// Offset inside the current block.
    pub fn position(&self) -> usize {
        self.blocks[self.current].len()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position of the current block.
    pub fn bind(&mut self, label: Label) {
        debug_assert!(
            self.labels[label.0].is_none(),
            "label {} bound twice",
            label.0
        );
        self.labels[label.0] = Some((self.current, self.position()));
    }

    /// A new label bound to the current position.
    pub fn label_here(&mut self) -> Label {
        let label = self.new_label();
        self.bind(label);
        label
    }

    /// Record that the code emitted from here on belongs to the source
    /// range `start..start + len`.
    pub fn mark(&mut self, start: u32, len: u32) {
        self.spans.push((self.current, self.position(), start, len));
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn buf(&mut self) -> &mut Vec<u8> {
        &mut self.blocks[self.current]
    }

    fn emit_op(&mut self, op: Op) {
        self.buf().extend_from_slice(&(op as u32).to_le_bytes());
    }

    /// Emit an operand-less instruction.
    pub fn emit(&mut self, op: Op) {
        debug_assert_eq!(op.operand(), Operand::None, "{op} takes an operand");
        self.emit_op(op);
    }

    pub fn emit_int(&mut self, op: Op, value: i64) {
        debug_assert_eq!(op.operand(), Operand::Int);
        self.emit_op(op);
        self.buf().extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_float(&mut self, op: Op, value: f64) {
        debug_assert_eq!(op.operand(), Operand::Float);
        self.emit_op(op);
        self.buf().extend_from_slice(&value.to_bits().to_le_bytes());
    }

    /// Emit an instruction whose operand is a data-stream offset.
    pub fn emit_string(&mut self, op: Op, offset: u32) {
        debug_assert_eq!(op.operand(), Operand::String);
        self.emit_op(op);
        self.buf().extend_from_slice(&offset.to_le_bytes());
    }

    /// Emit an instruction whose operand is the address of `label`.
    pub fn emit_label(&mut self, op: Op, label: Label) {
        debug_assert_eq!(op.operand(), Operand::Address);
        self.emit_op(op);
        let pos = self.position();
        self.gaps.push(Gap {
            block: self.current,
            pos,
            label,
        });
        self.buf().extend_from_slice(&0u32.to_le_bytes());
    }

    /// Lay out all blocks and patch every gap.
    pub fn finish(self) -> Result<(Vec<u8>, SourceMap), BuildError> {
        let mut offsets = Vec::with_capacity(self.blocks.len());
        let mut total = 0usize;
        for block in &self.blocks {
            offsets.push(total);
            total += block.len();
        }
        if total > u32::MAX as usize {
            return Err(BuildError::TooLarge {
                what: "code",
                size: total,
            });
        }

        let mut code = Vec::with_capacity(total);
        for block in &self.blocks {
            code.extend_from_slice(block);
        }

        for gap in &self.gaps {
            let (block, offset) = self.labels[gap.label.0]
                .ok_or(BuildError::UnboundLabel(gap.label.0))?;
            let target = (offsets[block] + offset) as u32;
            let at = offsets[gap.block] + gap.pos;
            code[at..at + 4].copy_from_slice(&target.to_le_bytes());
        }

        let mut map = SourceMapBuilder::new();
        for &(block, pos, start, len) in &self.spans {
            map.add((offsets[block] + pos) as u32, start, len);
        }

        Ok((code, map.finish()))
    }
}

impl From<usize> for BlockId {
    fn from(idx: usize) -> Self {
        BlockId(idx)
    }
}

/// Builds the constant-data stream of one segment.
///
/// Each distinct string is appended once, NUL-terminated; instructions
/// refer to it by byte offset.
#[derive(Debug, Default)]
pub struct DataBuilder {
    buf: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl DataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of `s` in the data stream, appending it on first use.
    pub fn intern(&mut self, s: &str) -> Result<u32, BuildError> {
        if let Some(&offset) = self.offsets.get(s) {
            return Ok(offset);
        }
        if s.as_bytes().contains(&0) {
            return Err(BuildError::InteriorNul(s.to_string()));
        }
        let offset = self.buf.len();
        if offset + s.len() + 1 > u32::MAX as usize {
            return Err(BuildError::TooLarge {
                what: "data",
                size: offset + s.len() + 1,
            });
        }
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self.offsets.insert(s.to_string(), offset as u32);
        Ok(offset as u32)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

//! # Bytecode
//!
//! The segment image format shared by the tern compiler and VM.
//!
//! A compiled unit is two byte buffers: **code**, a stream of little-endian
//! `u32` opcodes followed by their operands, and **data**, the concatenated
//! NUL-terminated constant strings that `s` operands point into. There is no
//! header or version; images never leave the process that built them.

mod builder;
mod decoder;
mod instruction;
mod op;
mod source_map;

use std::fmt::Write as _;

pub use builder::{BlockId, BuildError, CodeBuilder, DataBuilder, Label};
pub use decoder::{BytecodeDecoder, DecodeError, read_str};
pub use instruction::Instruction;
pub use op::{Op, Operand};
pub use source_map::{SourceMap, SourceMapBuilder};

/// One compiled unit, ready to be registered as a segment.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    pub source_map: SourceMap,
}

/// Render `code` as one instruction per line, resolving string operands
/// against `data`.
pub fn disassemble(code: &[u8], data: &[u8]) -> String {
    let mut out = String::new();
    for item in BytecodeDecoder::new(code) {
        let (pc, instr) = match item {
            Ok(decoded) => decoded,
            Err(err) => {
                let _ = writeln!(out, "  <{err}>");
                break;
            }
        };
        let _ = write!(out, "{pc:6}  {instr}");
        let string = match instr {
            Instruction::PushString { string: offset }
            | Instruction::PushVariable { name: offset }
            | Instruction::Assign { name: offset }
            | Instruction::SelectAttribute { name: offset }
            | Instruction::InsertAttribute { name: offset }
            | Instruction::SelectAttributeAndRepush { name: offset }
            | Instruction::ImportAs { name: offset } => Some(offset),
            _ => None,
        };
        if let Some(offset) = string {
            match read_str(data, offset) {
                Ok(s) => {
                    let _ = write!(out, "  ; {s:?}");
                }
                Err(err) => {
                    let _ = write!(out, "  ; <{err}>");
                }
            }
        }
        out.push('\n');
    }
    out
}

use core::fmt;

use crate::op::Op;

/// A decoded instruction.
///
/// String operands stay as data-stream offsets; the consumer resolves them
/// against the segment's data buffer (see [`crate::read_str`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Quit,
    Nop,
    Pop,
    Dup,
    Dup2,
    Bury { depth: i64 },
    PushNull,
    PushTrue,
    PushFalse,
    PushInt { value: i64 },
    PushFloat { value: f64 },
    PushString { string: u32 },
    PushVariable { name: u32 },
    PushArray { count: i64 },
    PushDictionary { count: i64 },
    PushFunction { target: u32 },
    Assign { name: u32 },
    Select,
    Insert,
    SelectAttribute { name: u32 },
    InsertAttribute { name: u32 },
    SelectAttributeAndRepush { name: u32 },
    Call { argc: i64 },
    Return,
    Expect { argc: i64 },
    JumpAbsolute { target: u32 },
    JumpIfFalseAndPop { target: u32 },
    VariableMapPush,
    VariableMapPop,
    Import,
    ImportAs { name: u32 },
    /// Any operand-less operator (`ADD` through `DEC`).
    Operator(Op),
}

impl Instruction {
    pub fn op(&self) -> Op {
        match self {
            Self::Quit => Op::Quit,
            Self::Nop => Op::Nop,
            Self::Pop => Op::Pop,
            Self::Dup => Op::Dup,
            Self::Dup2 => Op::Dup2,
            Self::Bury { .. } => Op::Bury,
            Self::PushNull => Op::PushNull,
            Self::PushTrue => Op::PushTrue,
            Self::PushFalse => Op::PushFalse,
            Self::PushInt { .. } => Op::PushInt,
            Self::PushFloat { .. } => Op::PushFloat,
            Self::PushString { .. } => Op::PushString,
            Self::PushVariable { .. } => Op::PushVariable,
            Self::PushArray { .. } => Op::PushArray,
            Self::PushDictionary { .. } => Op::PushDictionary,
            Self::PushFunction { .. } => Op::PushFunction,
            Self::Assign { .. } => Op::Assign,
            Self::Select => Op::Select,
            Self::Insert => Op::Insert,
            Self::SelectAttribute { .. } => Op::SelectAttribute,
            Self::InsertAttribute { .. } => Op::InsertAttribute,
            Self::SelectAttributeAndRepush { .. } => {
                Op::SelectAttributeAndRepush
            }
            Self::Call { .. } => Op::Call,
            Self::Return => Op::Return,
            Self::Expect { .. } => Op::Expect,
            Self::JumpAbsolute { .. } => Op::JumpAbsolute,
            Self::JumpIfFalseAndPop { .. } => Op::JumpIfFalseAndPop,
            Self::VariableMapPush => Op::VariableMapPush,
            Self::VariableMapPop => Op::VariableMapPop,
            Self::Import => Op::Import,
            Self::ImportAs { .. } => Op::ImportAs,
            Self::Operator(op) => *op,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.op();
        match self {
            Self::PushInt { value } => write!(f, "{op} {value}"),
            Self::PushFloat { value } => write!(f, "{op} {value:?}"),
            Self::PushArray { count } | Self::PushDictionary { count } => {
                write!(f, "{op} {count}")
            }
            Self::Call { argc } | Self::Expect { argc } => {
                write!(f, "{op} {argc}")
            }
            Self::Bury { depth } => write!(f, "{op} {depth}"),
            Self::PushString { string: offset }
            | Self::PushVariable { name: offset }
            | Self::Assign { name: offset }
            | Self::SelectAttribute { name: offset }
            | Self::InsertAttribute { name: offset }
            | Self::SelectAttributeAndRepush { name: offset }
            | Self::ImportAs { name: offset } => write!(f, "{op} ${offset}"),
            Self::PushFunction { target }
            | Self::JumpAbsolute { target }
            | Self::JumpIfFalseAndPop { target } => {
                write!(f, "{op} @{target}")
            }
            _ => write!(f, "{op}"),
        }
    }
}

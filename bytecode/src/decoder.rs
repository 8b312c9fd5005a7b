use crate::instruction::Instruction;
use crate::op::Op;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The program counter points outside the code stream.
    OutOfBounds { pc: usize, len: usize },
    /// The instruction's operand runs past the end of the code stream.
    Truncated { pc: usize, op: Op },
    UnknownOpcode { pc: usize, raw: u32 },
    /// A string operand does not name a NUL-terminated UTF-8 string.
    BadString { offset: u32 },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfBounds { pc, len } => {
                write!(f, "program counter {pc} outside code of length {len}")
            }
            Self::Truncated { pc, op } => {
                write!(f, "truncated operand for {op} at {pc}")
            }
            Self::UnknownOpcode { pc, raw } => {
                write!(f, "unknown opcode 0x{raw:08x} at {pc}")
            }
            Self::BadString { offset } => {
                write!(f, "invalid string constant at data offset {offset}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes instructions from a code stream.
///
/// Unlike a trusted decoder this one checks every read: code reaching the
/// VM is well-formed when it comes from the compiler, but a bad jump target
/// must surface as an error rather than undefined behaviour.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Start decoding at an absolute offset.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the instruction at the current offset and advance past it.
    pub fn decode(&mut self) -> Result<Instruction, DecodeError> {
        let start = self.pos;
        if start + Op::WIDTH > self.bytes.len() {
            return Err(DecodeError::OutOfBounds {
                pc: start,
                len: self.bytes.len(),
            });
        }
        let raw = self.read_u32();
        let op = Op::try_from(raw)
            .map_err(|raw| DecodeError::UnknownOpcode { pc: start, raw })?;

        if self.pos + op.operand().width() > self.bytes.len() {
            return Err(DecodeError::Truncated { pc: start, op });
        }

        let instr = match op {
            Op::Quit => Instruction::Quit,
            Op::Nop => Instruction::Nop,
            Op::Pop => Instruction::Pop,
            Op::Dup => Instruction::Dup,
            Op::Dup2 => Instruction::Dup2,
            Op::Bury => Instruction::Bury {
                depth: self.read_i64(),
            },
            Op::PushNull => Instruction::PushNull,
            Op::PushTrue => Instruction::PushTrue,
            Op::PushFalse => Instruction::PushFalse,
            Op::PushInt => Instruction::PushInt {
                value: self.read_i64(),
            },
            Op::PushFloat => Instruction::PushFloat {
                value: f64::from_bits(self.read_u64()),
            },
            Op::PushString => Instruction::PushString {
                string: self.read_u32(),
            },
            Op::PushVariable => Instruction::PushVariable {
                name: self.read_u32(),
            },
            Op::PushArray => Instruction::PushArray {
                count: self.read_i64(),
            },
            Op::PushDictionary => Instruction::PushDictionary {
                count: self.read_i64(),
            },
            Op::PushFunction => Instruction::PushFunction {
                target: self.read_u32(),
            },
            Op::Assign => Instruction::Assign {
                name: self.read_u32(),
            },
            Op::Select => Instruction::Select,
            Op::Insert => Instruction::Insert,
            Op::SelectAttribute => Instruction::SelectAttribute {
                name: self.read_u32(),
            },
            Op::InsertAttribute => Instruction::InsertAttribute {
                name: self.read_u32(),
            },
            Op::SelectAttributeAndRepush => {
                Instruction::SelectAttributeAndRepush {
                    name: self.read_u32(),
                }
            }
            Op::Call => Instruction::Call {
                argc: self.read_i64(),
            },
            Op::Return => Instruction::Return,
            Op::Expect => Instruction::Expect {
                argc: self.read_i64(),
            },
            Op::JumpAbsolute => Instruction::JumpAbsolute {
                target: self.read_u32(),
            },
            Op::JumpIfFalseAndPop => Instruction::JumpIfFalseAndPop {
                target: self.read_u32(),
            },
            Op::VariableMapPush => Instruction::VariableMapPush,
            Op::VariableMapPop => Instruction::VariableMapPop,
            Op::Import => Instruction::Import,
            Op::ImportAs => Instruction::ImportAs {
                name: self.read_u32(),
            },
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Pos
            | Op::Neg
            | Op::Not
            | Op::Inv
            | Op::Eql
            | Op::Nql
            | Op::Lss
            | Op::Grt
            | Op::Leq
            | Op::Geq
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Shl
            | Op::Shr
            | Op::Inc
            | Op::Dec => Instruction::Operator(op),
        };
        Ok(instr)
    }

    // The caller has already checked that the operand fits.

    #[inline(always)]
    fn read_u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(raw)
    }

    #[inline(always)]
    fn read_u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 8]);
        self.pos += 8;
        u64::from_le_bytes(raw)
    }

    #[inline(always)]
    fn read_i64(&mut self) -> i64 {
        self.read_u64() as i64
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        let pc = self.pos;
        let item = self.decode().map(|instr| (pc, instr));
        if item.is_err() {
            // stop after the first malformed instruction
            self.pos = self.bytes.len();
        }
        Some(item)
    }
}

/// Resolve a string operand against a data stream.
pub fn read_str(data: &[u8], offset: u32) -> Result<&str, DecodeError> {
    let start = offset as usize;
    let tail = data
        .get(start..)
        .ok_or(DecodeError::BadString { offset })?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::BadString { offset })?;
    std::str::from_utf8(&tail[..len])
        .map_err(|_| DecodeError::BadString { offset })
}

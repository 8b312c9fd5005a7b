/// Bytecode opcodes.
///
/// Every opcode is stored as a little-endian `u32`. Operands follow the
/// opcode directly and use one of four encodings:
///
/// - `i`: 64-bit signed integer (also used for counts)
/// - `f`: 64-bit float (IEEE-754 bits)
/// - `s`: `u32` byte offset into the segment's data stream, naming a
///   NUL-terminated string
/// - `a`: `u32` absolute byte offset into the segment's code stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Op {
    /// End of the segment's top level. Pops the segment frame.
    Quit = 0,
    Nop,

    /// Discard the top of the evaluation stack.
    Pop,
    /// Duplicate the top of the evaluation stack.
    Dup,
    /// Duplicate the top two entries, preserving their order.
    Dup2,
    /// Move the top of the stack below the `depth` entries under it.
    /// Operands: `depth:i`
    Bury,

    PushNull,
    PushTrue,
    PushFalse,
    /// Operands: `value:i`
    PushInt,
    /// Operands: `value:f`
    PushFloat,
    /// Push a borrowed string from the data stream.
    /// Operands: `string:s`
    PushString,
    /// Resolve a name through scope, segment globals and builtins.
    /// Operands: `name:s`
    PushVariable,
    /// Pop `count` values and push them as a new array.
    /// Operands: `count:i`
    PushArray,
    /// Pop `count` key/value pairs and push them as a new dictionary.
    /// Operands: `count:i`
    PushDictionary,
    /// Push a function bound to the current segment.
    /// Operands: `target:a`
    PushFunction,

    /// Bind the top of the stack to a name without popping it.
    /// Operands: `name:s`
    Assign,
    /// `container index -- value`
    Select,
    /// `container index value -- value`
    Insert,
    /// `receiver -- value`
    /// Operands: `name:s`
    SelectAttribute,
    /// `receiver value -- value`
    /// Operands: `name:s`
    InsertAttribute,
    /// `receiver -- callee receiver`
    ///
    /// When the attribute was found on the instance rather than in the
    /// type's method table, the null reference is pushed in place of the
    /// receiver and [`Call`](Op::Call) drops it.
    /// Operands: `name:s`
    SelectAttributeAndRepush,

    /// `callee arg1 .. argN -- result`
    /// Operands: `argc:i`
    Call,
    /// Leave the current frame, replacing the callee slot with the result.
    Return,
    /// Check the pending argument count set by [`Call`](Op::Call).
    /// Operands: `argc:i`
    Expect,

    /// Operands: `target:a`
    JumpAbsolute,
    /// Pop the condition and jump when it tests false.
    /// Operands: `target:a`
    JumpIfFalseAndPop,

    VariableMapPush,
    VariableMapPop,

    /// `path --` merge the imported namespace into the current namespace.
    Import,
    /// `path --` bind the imported namespace to a single name.
    /// Operands: `name:s`
    ImportAs,

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Unary plus.
    Pos,
    /// Unary minus.
    Neg,
    /// Logical not through the truthiness test. Always yields a boolean.
    Not,
    /// Bitwise inversion.
    Inv,
    Eql,
    Nql,
    Lss,
    Grt,
    Leq,
    Geq,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    Shl,
    Shr,
    Inc,
    Dec,
}

/// Shape of the operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Int,
    Float,
    String,
    Address,
}

impl Operand {
    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Int | Operand::Float => 8,
            Operand::String | Operand::Address => 4,
        }
    }
}

impl Op {
    pub const COUNT: usize = Op::Dec as usize + 1;

    /// Width of the opcode itself.
    pub const WIDTH: usize = 4;

    pub const fn operand(self) -> Operand {
        match self {
            Op::Bury
            | Op::PushInt
            | Op::PushArray
            | Op::PushDictionary
            | Op::Call
            | Op::Expect => Operand::Int,
            Op::PushFloat => Operand::Float,
            Op::PushString
            | Op::PushVariable
            | Op::Assign
            | Op::SelectAttribute
            | Op::InsertAttribute
            | Op::SelectAttributeAndRepush
            | Op::ImportAs => Operand::String,
            Op::PushFunction | Op::JumpAbsolute | Op::JumpIfFalseAndPop => {
                Operand::Address
            }
            _ => Operand::None,
        }
    }

    /// Total encoded size of the instruction.
    pub const fn encoded_len(self) -> usize {
        Self::WIDTH + self.operand().width()
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Op::Quit => "QUIT",
            Op::Nop => "NOP",
            Op::Pop => "POP",
            Op::Dup => "DUP",
            Op::Dup2 => "DUP2",
            Op::Bury => "BURY",
            Op::PushNull => "PUSH_NULL",
            Op::PushTrue => "PUSH_TRUE",
            Op::PushFalse => "PUSH_FALSE",
            Op::PushInt => "PUSH_INT",
            Op::PushFloat => "PUSH_FLOAT",
            Op::PushString => "PUSH_STRING",
            Op::PushVariable => "PUSH_VARIABLE",
            Op::PushArray => "PUSH_ARRAY",
            Op::PushDictionary => "PUSH_DICTIONARY",
            Op::PushFunction => "PUSH_FUNCTION",
            Op::Assign => "ASSIGN",
            Op::Select => "SELECT",
            Op::Insert => "INSERT",
            Op::SelectAttribute => "SELECT_ATTRIBUTE",
            Op::InsertAttribute => "INSERT_ATTRIBUTE",
            Op::SelectAttributeAndRepush => "SELECT_ATTRIBUTE_AND_REPUSH",
            Op::Call => "CALL",
            Op::Return => "RETURN",
            Op::Expect => "EXPECT",
            Op::JumpAbsolute => "JUMP_ABSOLUTE",
            Op::JumpIfFalseAndPop => "JUMP_IF_FALSE_AND_POP",
            Op::VariableMapPush => "VARIABLE_MAP_PUSH",
            Op::VariableMapPop => "VARIABLE_MAP_POP",
            Op::Import => "IMPORT",
            Op::ImportAs => "IMPORT_AS",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Pos => "POS",
            Op::Neg => "NEG",
            Op::Not => "NOT",
            Op::Inv => "INV",
            Op::Eql => "EQL",
            Op::Nql => "NQL",
            Op::Lss => "LSS",
            Op::Grt => "GRT",
            Op::Leq => "LEQ",
            Op::Geq => "GEQ",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Xor => "XOR",
            Op::Shl => "SHL",
            Op::Shr => "SHR",
            Op::Inc => "INC",
            Op::Dec => "DEC",
        }
    }
}

impl TryFrom<u32> for Op {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, u32> {
        if (raw as usize) < Self::COUNT {
            // SAFETY: Op is repr(u32) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u32, Op>(raw) })
        } else {
            Err(raw)
        }
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

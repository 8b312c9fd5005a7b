use std::fmt;
use std::path::PathBuf;

use bytecode::{DecodeError, Op};
use parser::ParseError;

use crate::compiler::CompileError;

/// A fault that terminates the current run.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    StackUnderflow { needed: usize, available: usize },
    ScopeUnderflow,
    UndefinedVariable { name: String },
    /// The receiver's type has no callback for `operation`.
    UndefinedOperation { operation: &'static str, type_name: String },
    TypeMismatch {
        operation: &'static str,
        expected: String,
        found: String,
    },
    IndexOutOfBounds { index: i64, len: usize },
    KeyNotFound { key: String },
    NoAttribute { type_name: String, name: String },
    NotCallable { type_name: String },
    ArgumentCount { expected: usize, got: usize },
    DivisionByZero,
    StackOverflow { depth: usize },
    InvalidJump { target: u32 },
    InvalidOperand { op: Op, value: i64 },
    Decode(DecodeError),
    Import { path: String, reason: String },
    Native { name: &'static str, message: String },
    OutOfMemory,
    /// Raised by a native through [`Vm::fail`](crate::Vm::fail).
    Failed(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow { needed, available } => write!(
                f,
                "stack underflow: needed {needed} values, {available} available"
            ),
            Self::ScopeUnderflow => write!(f, "no variable map to pop"),
            Self::UndefinedVariable { name } => {
                write!(f, "undefined variable `{name}`")
            }
            Self::UndefinedOperation {
                operation,
                type_name,
            } => write!(f, "undefined operation {operation} for type {type_name}"),
            Self::TypeMismatch {
                operation,
                expected,
                found,
            } => write!(
                f,
                "type mismatch in {operation}: expected {expected}, found {found}"
            ),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::KeyNotFound { key } => write!(f, "key {key:?} not found"),
            Self::NoAttribute { type_name, name } => {
                write!(f, "{type_name} has no attribute `{name}`")
            }
            Self::NotCallable { type_name } => {
                write!(f, "value of type {type_name} is not callable")
            }
            Self::ArgumentCount { expected, got } => write!(
                f,
                "argument count mismatch: expected {expected}, got {got}"
            ),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::StackOverflow { depth } => {
                write!(f, "call stack overflow at depth {depth}")
            }
            Self::InvalidJump { target } => {
                write!(f, "jump target {target} outside code")
            }
            Self::InvalidOperand { op, value } => {
                write!(f, "invalid operand {value} for {op}")
            }
            Self::Decode(err) => write!(f, "bad bytecode: {err}"),
            Self::Import { path, reason } => {
                write!(f, "cannot import {path:?}: {reason}")
            }
            Self::Native { name, message } => write!(f, "{name}: {message}"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<DecodeError> for RuntimeError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

/// Everything the host API can fail with.
#[derive(Debug)]
pub enum Error {
    Io { path: PathBuf, source: std::io::Error },
    Settings(&'static str),
    Parse(ParseError),
    Compile(CompileError),
    Runtime {
        error: RuntimeError,
        /// `file:line:column` of the faulting instruction, when known.
        location: Option<String>,
    },
}

impl Error {
    /// The runtime fault behind this error, if it is one.
    pub fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read {}: {source}", path.display())
            }
            Self::Settings(message) => write!(f, "invalid settings: {message}"),
            Self::Parse(err) => write!(f, "parse error: {err}"),
            Self::Compile(err) => write!(f, "compile error: {err}"),
            Self::Runtime {
                error,
                location: Some(at),
            } => write!(f, "runtime error at {at}: {error}"),
            Self::Runtime {
                error,
                location: None,
            } => write!(f, "runtime error: {error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Compile(err) => Some(err),
            Self::Runtime { error, .. } => Some(error),
            Self::Settings(_) => None,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

impl From<RuntimeError> for Error {
    fn from(error: RuntimeError) -> Self {
        Self::Runtime {
            error,
            location: None,
        }
    }
}

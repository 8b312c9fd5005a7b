use std::fmt;
use std::rc::Rc;

use bytecode::{DecodeError, read_str};

use crate::dictionary::Dictionary;
use crate::error::RuntimeError;
use crate::header::Header;
use crate::types::TypeObject;
use crate::value::Value;
use crate::vm::Vm;

/// A host routine callable from tern code.
///
/// For methods the receiver is `args[0]`.
pub type NativeFn = fn(&mut Vm, &[Value]) -> Result<Value, RuntimeError>;

/// One heap record: header plus kind-specific payload.
#[derive(Debug)]
pub struct Record {
    pub header: Header,
    pub body: Body,
}

/// The payload of a record. Which variant a record holds is decided by its
/// type's `init` callback.
#[derive(Debug, Default)]
pub enum Body {
    /// Freshly allocated, relocated away, or torn down.
    #[default]
    Empty,
    Type(Box<TypeObject>),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Str),
    Array(Vec<Value>),
    Dictionary(Dictionary),
    Function(Function),
    NativeFunction(NativeFunction),
}

impl Body {
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// String payload.
///
/// Constants pushed from a segment borrow the segment's data buffer; every
/// string built at run time owns its bytes.
#[derive(Clone)]
pub enum Str {
    Owned(String),
    Borrowed { data: Rc<[u8]>, start: u32, len: u32 },
}

impl Str {
    /// Borrow the NUL-terminated constant at `offset` of `data`.
    pub fn borrowed(data: &Rc<[u8]>, offset: u32) -> Result<Self, DecodeError> {
        let len = read_str(data, offset)?.len() as u32;
        Ok(Self::Borrowed {
            data: Rc::clone(data),
            start: offset,
            len,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Owned(s) => s,
            Self::Borrowed { data, start, len } => {
                let bytes = &data[*start as usize..(*start + *len) as usize];
                // SAFETY: `borrowed` validated this range as UTF-8 and the
                // data buffer is immutable.
                unsafe { std::str::from_utf8_unchecked(bytes) }
            }
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_owned() { "owned" } else { "borrowed" };
        write!(f, "{kind} {:?}", self.as_str())
    }
}

/// A jump target inside a loaded segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Function {
    pub segment: usize,
    pub offset: u32,
}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    /// `None` accepts any number of arguments.
    pub arity: Option<usize>,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

//! The builtins dictionary: natives visible from every segment when no
//! scope or namespace shadows them.

use std::io::Write as _;

use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::object::{Body, NativeFunction};
use crate::types::{SpecialObjects, native_dictionary};
use crate::value::Value;
use crate::vm::Vm;

const BUILTINS: &[NativeFunction] = &[
    NativeFunction {
        name: "print",
        arity: None,
        func: print,
    },
    NativeFunction {
        name: "type",
        arity: Some(1),
        func: type_of,
    },
    NativeFunction {
        name: "int",
        arity: Some(1),
        func: to_int,
    },
    NativeFunction {
        name: "float",
        arity: Some(1),
        func: to_float,
    },
    NativeFunction {
        name: "str",
        arity: Some(1),
        func: to_string,
    },
    NativeFunction {
        name: "len",
        arity: Some(1),
        func: len,
    },
    NativeFunction {
        name: "assert",
        arity: None,
        func: check,
    },
];

/// Build the permanent builtins dictionary.
pub(crate) fn install(
    heap: &mut Heap,
    specials: &SpecialObjects,
) -> Result<Value, RuntimeError> {
    native_dictionary(heap, specials, BUILTINS)
}

fn native_error(name: &'static str, message: impl Into<String>) -> RuntimeError {
    RuntimeError::Native {
        name,
        message: message.into(),
    }
}

/// `print(a, b, ...)`: space-separated, newline-terminated.
fn print(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut line = String::new();
    for (i, &arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        vm.write_value(arg, &mut line, 0);
    }
    line.push('\n');
    let out = vm.output();
    out.write_all(line.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|err| native_error("print", err.to_string()))?;
    Ok(vm.null())
}

fn type_of(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(vm.type_of(args[0]))
}

fn to_int(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let value = args[0];
    let n = match vm.heap.body(value) {
        Body::Integer(_) => return Ok(value),
        Body::Float(x) if x.is_finite() => x.trunc() as i64,
        Body::Float(x) => {
            let message = format!("cannot convert {x} to an integer");
            return Err(native_error("int", message));
        }
        Body::Boolean(b) => i64::from(*b),
        Body::String(s) => s
            .as_str()
            .trim()
            .parse()
            .map_err(|_| native_error("int", format!("invalid integer {:?}", s.as_str())))?,
        _ => {
            return Err(native_error(
                "int",
                format!("cannot convert {} to an integer", vm.type_name(value)),
            ));
        }
    };
    vm.new_integer(n)
}

fn to_float(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let value = args[0];
    let x = match vm.heap.body(value) {
        Body::Float(_) => return Ok(value),
        Body::String(s) => s
            .as_str()
            .trim()
            .parse()
            .map_err(|_| native_error("float", format!("invalid float {:?}", s.as_str())))?,
        _ => match vm.to_float(value) {
            Some(x) => x,
            None => {
                return Err(native_error(
                    "float",
                    format!("cannot convert {} to a float", vm.type_name(value)),
                ));
            }
        },
    };
    vm.new_float(x)
}

fn to_string(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if vm.to_str(args[0]).is_some() {
        return Ok(args[0]);
    }
    let text = vm.display(args[0]);
    vm.new_string(text)
}

fn len(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let value = args[0];
    let n = match vm.heap.body(value) {
        Body::String(s) => s.as_str().chars().count(),
        Body::Array(items) => items.len(),
        Body::Dictionary(dict) => dict.len(),
        _ => {
            return Err(RuntimeError::TypeMismatch {
                operation: "len",
                expected: "string, array or dictionary".to_string(),
                found: vm.type_name(value).to_string(),
            });
        }
    };
    vm.new_integer(n as i64)
}

/// `assert(condition, message?)`: fails the run through the failure sink.
fn check(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.is_empty() || args.len() > 2 {
        return Err(RuntimeError::ArgumentCount {
            expected: 1,
            got: args.len(),
        });
    }
    if !vm.is_truthy(args[0])? {
        let message = match args.get(1) {
            Some(&message) => format!("assertion failed: {}", vm.display(message)),
            None => "assertion failed".to_string(),
        };
        vm.fail(message);
    }
    Ok(vm.null())
}

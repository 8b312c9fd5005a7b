//! `function` and `native_function`: the two callable kinds.

use std::fmt::Write as _;

use crate::error::RuntimeError;
use crate::header::HEADER_SIZE;
use crate::object::Body;
use crate::types::TypeOps;
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const SIZE: u32 = HEADER_SIZE + 16;
pub(crate) const NATIVE_SIZE: u32 = HEADER_SIZE + 32;

pub(crate) fn ops() -> TypeOps {
    TypeOps {
        print: Some(print),
        test: Some(always),
        eql: Some(eql),
        nql: Some(nql),
        ..TypeOps::EMPTY
    }
}

pub(crate) fn native_ops() -> TypeOps {
    TypeOps {
        print: Some(print_native),
        test: Some(always),
        eql: Some(eql),
        nql: Some(nql),
        ..TypeOps::EMPTY
    }
}

fn print(vm: &Vm, value: Value, out: &mut String, _depth: usize) {
    if let Body::Function(f) = vm.heap.body(value) {
        let _ = write!(out, "<function {}@{}>", f.segment, f.offset);
    }
}

fn print_native(vm: &Vm, value: Value, out: &mut String, _depth: usize) {
    if let Body::NativeFunction(native) = vm.heap.body(value) {
        let _ = write!(out, "<native {}>", native.name);
    }
}

fn always(_vm: &Vm, _value: Value) -> bool {
    true
}

/// Two closures over the same code compare equal.
fn same_target(vm: &Vm, lhs: Value, rhs: Value) -> bool {
    match (vm.heap.body(lhs), vm.heap.body(rhs)) {
        (Body::Function(a), Body::Function(b)) => a == b,
        (Body::NativeFunction(a), Body::NativeFunction(b)) => {
            std::ptr::fn_addr_eq(a.func, b.func)
        }
        _ => lhs == rhs,
    }
}

fn eql(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let same = same_target(vm, lhs, rhs);
    Ok(vm.boolean(same))
}

fn nql(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let same = same_target(vm, lhs, rhs);
    Ok(vm.boolean(!same))
}

#[cfg(test)]
mod tests {
    use crate::RuntimeError;
    use crate::testing::{eval, eval_err};

    #[test]
    fn functions_print_and_compare() {
        assert!(eval("function f() {} return f;").starts_with("<function 0@"));
        assert_eq!(eval("return print;"), "<native print>");
        assert_eq!(eval("function f() {} g = f; return f == g;"), "true");
        assert_eq!(eval("return len == print;"), "false");
    }

    #[test]
    fn functions_have_no_arithmetic() {
        assert!(matches!(
            eval_err("function f() {} return f + f;"),
            RuntimeError::UndefinedOperation { operation: "ADD", .. }
        ));
    }
}

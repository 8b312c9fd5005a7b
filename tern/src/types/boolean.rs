//! `boolean`: the two permanent instances `true` and `false`.

use crate::error::RuntimeError;
use crate::header::HEADER_SIZE;
use crate::object::Body;
use crate::types::{TypeOps, mismatch};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const SIZE: u32 = HEADER_SIZE + 8;

pub(crate) fn ops() -> TypeOps {
    TypeOps {
        print: Some(print),
        test: Some(test),
        eql: Some(eql),
        nql: Some(nql),
        and: Some(and),
        or: Some(or),
        xor: Some(xor),
        init: Some(init),
        ..TypeOps::EMPTY
    }
}

fn init(body: &mut Body) {
    *body = Body::Boolean(false);
}

fn get(vm: &Vm, operation: &'static str, value: Value) -> Result<bool, RuntimeError> {
    vm.heap
        .body(value)
        .as_boolean()
        .ok_or_else(|| mismatch(vm, operation, "boolean", value))
}

fn print(vm: &Vm, value: Value, out: &mut String, _depth: usize) {
    out.push_str(if test(vm, value) { "true" } else { "false" });
}

fn test(vm: &Vm, value: Value) -> bool {
    vm.heap.body(value).as_boolean().unwrap_or(false)
}

macro_rules! logic {
    ($($name:ident, $mnemonic:literal, $op:tt;)*) => {$(
        fn $name(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
            let a = get(vm, $mnemonic, lhs)?;
            let b = get(vm, $mnemonic, rhs)?;
            Ok(vm.boolean(a $op b))
        }
    )*};
}

logic! {
    eql, "EQL", ==;
    nql, "NQL", !=;
    and, "AND", &;
    or, "OR", |;
    xor, "XOR", ^;
}

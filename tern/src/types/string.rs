//! `string`: immutable text, owned or borrowed from a segment's data.

use crate::error::RuntimeError;
use crate::header::HEADER_SIZE;
use crate::object::{Body, NativeFunction, Str};
use crate::types::{TypeOps, checked_index, mismatch};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const SIZE: u32 = HEADER_SIZE + 24;

pub(crate) const METHODS: &[NativeFunction] = &[NativeFunction {
    name: "len",
    arity: Some(1),
    func: len,
}];

pub(crate) fn ops() -> TypeOps {
    TypeOps {
        print: Some(print),
        test: Some(test),
        add: Some(add),
        eql: Some(eql),
        nql: Some(nql),
        lss: Some(lss),
        grt: Some(grt),
        leq: Some(leq),
        geq: Some(geq),
        select: Some(select),
        init: Some(init),
        deinit: Some(deinit),
        ..TypeOps::EMPTY
    }
}

fn init(body: &mut Body) {
    *body = Body::String(Str::Owned(String::new()));
}

/// Owned buffers are released here; borrowed ones drop their share of the
/// segment data.
fn deinit(body: &mut Body) {
    *body = Body::Empty;
}

fn get<'v>(
    vm: &'v Vm,
    operation: &'static str,
    value: Value,
) -> Result<&'v str, RuntimeError> {
    vm.heap
        .body(value)
        .as_str()
        .ok_or_else(|| mismatch(vm, operation, "string", value))
}

fn print(vm: &Vm, value: Value, out: &mut String, _depth: usize) {
    if let Some(s) = vm.heap.body(value).as_str() {
        out.push_str(s);
    }
}

fn test(vm: &Vm, value: Value) -> bool {
    vm.heap.body(value).as_str().is_some_and(|s| !s.is_empty())
}

fn add(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let mut joined = get(vm, "ADD", lhs)?.to_string();
    joined.push_str(get(vm, "ADD", rhs)?);
    vm.new_string(joined)
}

macro_rules! comparison {
    ($($name:ident, $mnemonic:literal, $op:tt;)*) => {$(
        fn $name(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
            let result = get(vm, $mnemonic, lhs)? $op get(vm, $mnemonic, rhs)?;
            Ok(vm.boolean(result))
        }
    )*};
}

comparison! {
    eql, "EQL", ==;
    nql, "NQL", !=;
    lss, "LSS", <;
    grt, "GRT", >;
    leq, "LEQ", <=;
    geq, "GEQ", >=;
}

/// `s[i]`: the `i`th character as a new string.
fn select(vm: &mut Vm, container: Value, key: Value) -> Result<Value, RuntimeError> {
    let index = vm
        .heap
        .body(key)
        .as_integer()
        .ok_or_else(|| mismatch(vm, "SELECT", "integer", key))?;
    let s = get(vm, "SELECT", container)?;
    let len = s.chars().count();
    let at = checked_index(index, len)?;
    let ch = s.chars().nth(at).map(String::from).unwrap_or_default();
    vm.new_string(ch)
}

fn len(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let n = get(vm, "len", args[0])?.chars().count();
    vm.new_integer(n as i64)
}

//! `integer`: 64-bit signed with wrapping arithmetic.

use std::fmt::Write as _;

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
        add: Some(add),
        sub: Some(sub),
        mul: Some(mul),
        div: Some(div),
        modulo: Some(modulo),
        pos: Some(pos),
        neg: Some(neg),
        inv: Some(inv),
        eql: Some(eql),
        nql: Some(nql),
        lss: Some(lss),
        grt: Some(grt),
        leq: Some(leq),
        geq: Some(geq),
        and: Some(and),
        or: Some(or),
        xor: Some(xor),
        shl: Some(shl),
        shr: Some(shr),
        inc: Some(inc),
        dec: Some(dec),
        init: Some(init),
        ..TypeOps::EMPTY
    }
}

fn init(body: &mut Body) {
    *body = Body::Integer(0);
}

fn get(vm: &Vm, operation: &'static str, value: Value) -> Result<i64, RuntimeError> {
    vm.heap
        .body(value)
        .as_integer()
        .ok_or_else(|| mismatch(vm, operation, "integer", value))
}

fn print(vm: &Vm, value: Value, out: &mut String, _depth: usize) {
    if let Some(n) = vm.heap.body(value).as_integer() {
        let _ = write!(out, "{n}");
    }
}

fn test(vm: &Vm, value: Value) -> bool {
    vm.heap.body(value).as_integer().is_some_and(|n| n != 0)
}

macro_rules! arithmetic {
    ($($name:ident, $mnemonic:literal, |$a:ident, $b:ident| $result:expr;)*) => {$(
        fn $name(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
            let $a = get(vm, $mnemonic, lhs)?;
            let $b = get(vm, $mnemonic, rhs)?;
            vm.new_integer($result)
        }
    )*};
}

macro_rules! comparison {
    ($($name:ident, $mnemonic:literal, $op:tt;)*) => {$(
        fn $name(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
            let a = get(vm, $mnemonic, lhs)?;
            let b = get(vm, $mnemonic, rhs)?;
            Ok(vm.boolean(a $op b))
        }
    )*};
}

arithmetic! {
    add, "ADD", |a, b| a.wrapping_add(b);
    sub, "SUB", |a, b| a.wrapping_sub(b);
    mul, "MUL", |a, b| a.wrapping_mul(b);
    and, "AND", |a, b| a & b;
    or, "OR", |a, b| a | b;
    xor, "XOR", |a, b| a ^ b;
    // shift amounts are taken mod 64
    shl, "SHL", |a, b| a.wrapping_shl(b as u32);
    shr, "SHR", |a, b| a.wrapping_shr(b as u32);
}

comparison! {
    eql, "EQL", ==;
    nql, "NQL", !=;
    lss, "LSS", <;
    grt, "GRT", >;
    leq, "LEQ", <=;
    geq, "GEQ", >=;
}

fn div(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let a = get(vm, "DIV", lhs)?;
    let b = get(vm, "DIV", rhs)?;
    if b == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    vm.new_integer(a.wrapping_div(b))
}

fn modulo(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let a = get(vm, "MOD", lhs)?;
    let b = get(vm, "MOD", rhs)?;
    if b == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    vm.new_integer(a.wrapping_rem(b))
}

fn pos(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    get(vm, "POS", value)?;
    Ok(value)
}

fn neg(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    let n = get(vm, "NEG", value)?;
    vm.new_integer(n.wrapping_neg())
}

fn inv(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    let n = get(vm, "INV", value)?;
    vm.new_integer(!n)
}

fn inc(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    let n = get(vm, "INC", value)?;
    vm.new_integer(n.wrapping_add(1))
}

fn dec(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    let n = get(vm, "DEC", value)?;
    vm.new_integer(n.wrapping_sub(1))
}

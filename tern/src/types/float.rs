//! `float`: IEEE-754 double.

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
        eql: Some(eql),
        nql: Some(nql),
        lss: Some(lss),
        grt: Some(grt),
        leq: Some(leq),
        geq: Some(geq),
        inc: Some(inc),
        dec: Some(dec),
        init: Some(init),
        ..TypeOps::EMPTY
    }
}

fn init(body: &mut Body) {
    *body = Body::Float(0.0);
}

fn get(vm: &Vm, operation: &'static str, value: Value) -> Result<f64, RuntimeError> {
    vm.heap
        .body(value)
        .as_float()
        .ok_or_else(|| mismatch(vm, operation, "float", value))
}

fn print(vm: &Vm, value: Value, out: &mut String, _depth: usize) {
    if let Some(x) = vm.heap.body(value).as_float() {
        let _ = write!(out, "{x:?}");
    }
}

fn test(vm: &Vm, value: Value) -> bool {
    vm.heap.body(value).as_float().is_some_and(|x| x != 0.0)
}

macro_rules! arithmetic {
    ($($name:ident, $mnemonic:literal, $op:tt;)*) => {$(
        fn $name(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
            let a = get(vm, $mnemonic, lhs)?;
            let b = get(vm, $mnemonic, rhs)?;
            vm.new_float(a $op b)
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
    add, "ADD", +;
    sub, "SUB", -;
    mul, "MUL", *;
    div, "DIV", /;
    modulo, "MOD", %;
}

comparison! {
    eql, "EQL", ==;
    nql, "NQL", !=;
    lss, "LSS", <;
    grt, "GRT", >;
    leq, "LEQ", <=;
    geq, "GEQ", >=;
}

fn pos(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    get(vm, "POS", value)?;
    Ok(value)
}

fn neg(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    let x = get(vm, "NEG", value)?;
    vm.new_float(-x)
}

fn inc(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    let x = get(vm, "INC", value)?;
    vm.new_float(x + 1.0)
}

fn dec(vm: &mut Vm, value: Value) -> Result<Value, RuntimeError> {
    let x = get(vm, "DEC", value)?;
    vm.new_float(x - 1.0)
}

#[cfg(test)]
mod tests {
    use crate::RuntimeError;
    use crate::testing::{eval, eval_err};

    #[test]
    fn ieee_arithmetic() {
        assert_eq!(eval("return 1.5 + 2.25;"), "3.75");
        assert_eq!(eval("return 1.0 / 0.0;"), "inf");
        assert_eq!(eval("return 7.5 % 2.0;"), "1.5");
        assert_eq!(eval("return -2.0 * 3.0;"), "-6.0");
    }

    #[test]
    fn increments_by_one() {
        assert_eq!(eval("x = 0.5; x++; return x;"), "1.5");
        assert_eq!(eval("x = 0.5; return --x;"), "-0.5");
    }

    #[test]
    fn postfix_yields_the_value_before_the_update() {
        assert_eq!(eval("x = 0.1; y = x++; return [y, x];"), "[0.1, 1.1]");
        assert_eq!(
            eval("x = 9007199254740992.0; y = x++; return y;"),
            "9007199254740992.0"
        );
        assert_eq!(eval("a = [0.1]; y = a[0]--; return [y, a];"), "[0.1, [-0.9]]");
        assert_eq!(eval("d = {f: 0.1}; y = d.f++; return [y, d.f];"), "[0.1, 1.1]");
    }

    #[test]
    fn no_implicit_promotion() {
        assert!(matches!(
            eval_err("return 1 + 1.0;"),
            RuntimeError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn bitwise_is_undefined() {
        assert!(matches!(
            eval_err("return 1.0 & 2.0;"),
            RuntimeError::UndefinedOperation { operation: "AND", .. }
        ));
    }
}

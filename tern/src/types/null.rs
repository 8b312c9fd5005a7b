//! `null`: a single permanent instance. Falsy; equal only to itself.

use crate::error::RuntimeError;
use crate::header::HEADER_SIZE;
use crate::types::TypeOps;
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const SIZE: u32 = HEADER_SIZE;

pub(crate) fn ops() -> TypeOps {
    TypeOps {
        print: Some(print),
        test: Some(test),
        eql: Some(eql),
        nql: Some(nql),
        ..TypeOps::EMPTY
    }
}

fn print(_vm: &Vm, _value: Value, out: &mut String, _depth: usize) {
    out.push_str("null");
}

fn test(_vm: &Vm, _value: Value) -> bool {
    false
}

// both operands are already known to be of type null
fn eql(vm: &mut Vm, _lhs: Value, _rhs: Value) -> Result<Value, RuntimeError> {
    Ok(vm.boolean(true))
}

fn nql(vm: &mut Vm, _lhs: Value, _rhs: Value) -> Result<Value, RuntimeError> {
    Ok(vm.boolean(false))
}

#[cfg(test)]
mod tests {
    use crate::RuntimeError;
    use crate::testing::{eval, eval_err};

    #[test]
    fn null_behaviour() {
        assert_eq!(eval("return null;"), "null");
        assert_eq!(eval("return null == null;"), "true");
        assert_eq!(eval("return !null;"), "true");
        assert!(matches!(
            eval_err("return null + null;"),
            RuntimeError::UndefinedOperation { operation: "ADD", .. }
        ));
    }
}

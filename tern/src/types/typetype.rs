//! `type`: the type of every type, including itself.

use crate::error::RuntimeError;
use crate::header::HEADER_SIZE;
use crate::object::Body;
use crate::types::TypeOps;
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const SIZE: u32 = HEADER_SIZE + 240;

pub(crate) fn ops() -> TypeOps {
    TypeOps {
        print: Some(print),
        test: Some(test),
        eql: Some(eql),
        nql: Some(nql),
        select_attr: Some(select_attr),
        walk: Some(walk),
        ..TypeOps::EMPTY
    }
}

fn print(vm: &Vm, value: Value, out: &mut String, _depth: usize) {
    if let Body::Type(t) = vm.heap.body(value) {
        out.push_str("<type ");
        out.push_str(&t.name);
        out.push('>');
    }
}

fn test(_vm: &Vm, _value: Value) -> bool {
    true
}

fn eql(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    Ok(vm.boolean(lhs == rhs))
}

fn nql(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    Ok(vm.boolean(lhs != rhs))
}

/// `t.name` is the type's display name.
fn select_attr(
    vm: &mut Vm,
    value: Value,
    name: &str,
) -> Result<Option<Value>, RuntimeError> {
    if name != "name" {
        return Ok(None);
    }
    let type_name = match vm.heap.body(value) {
        Body::Type(t) => t.name.clone(),
        _ => return Ok(None),
    };
    vm.new_string(type_name).map(Some)
}

fn walk(body: &mut Body, visit: &mut dyn FnMut(&mut Value)) {
    if let Body::Type(t) = body {
        visit(&mut t.methods);
    }
}

//! `array`: a growable sequence of values.

use crate::error::RuntimeError;
use crate::header::HEADER_SIZE;
use crate::object::{Body, NativeFunction};
use crate::types::{MAX_PRINT_DEPTH, TypeOps, checked_index, mismatch};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const SIZE: u32 = HEADER_SIZE + 24;

pub(crate) const METHODS: &[NativeFunction] = &[
    NativeFunction {
        name: "push",
        arity: Some(2),
        func: push,
    },
    NativeFunction {
        name: "pop",
        arity: Some(1),
        func: pop,
    },
    NativeFunction {
        name: "len",
        arity: Some(1),
        func: len,
    },
];

pub(crate) fn ops() -> TypeOps {
    TypeOps {
        print: Some(print),
        test: Some(test),
        add: Some(add),
        select: Some(select),
        insert: Some(insert),
        init: Some(init),
        deinit: Some(deinit),
        walk: Some(walk),
        ..TypeOps::EMPTY
    }
}

fn init(body: &mut Body) {
    *body = Body::Array(Vec::new());
}

fn deinit(body: &mut Body) {
    *body = Body::Empty;
}

fn walk(body: &mut Body, visit: &mut dyn FnMut(&mut Value)) {
    if let Body::Array(items) = body {
        items.iter_mut().for_each(visit);
    }
}

fn items<'v>(
    vm: &'v Vm,
    operation: &'static str,
    value: Value,
) -> Result<&'v Vec<Value>, RuntimeError> {
    match vm.heap.body(value) {
        Body::Array(items) => Ok(items),
        _ => Err(mismatch(vm, operation, "array", value)),
    }
}

fn items_mut<'v>(
    vm: &'v mut Vm,
    operation: &'static str,
    value: Value,
) -> Result<&'v mut Vec<Value>, RuntimeError> {
    if !matches!(vm.heap.body(value), Body::Array(_)) {
        return Err(mismatch(vm, operation, "array", value));
    }
    match vm.heap.body_mut(value) {
        Body::Array(items) => Ok(items),
        _ => unreachable!(),
    }
}

fn index_of(vm: &Vm, operation: &'static str, key: Value) -> Result<i64, RuntimeError> {
    vm.heap
        .body(key)
        .as_integer()
        .ok_or_else(|| mismatch(vm, operation, "integer", key))
}

fn print(vm: &Vm, value: Value, out: &mut String, depth: usize) {
    let Body::Array(items) = vm.heap.body(value) else {
        return;
    };
    if depth >= MAX_PRINT_DEPTH {
        out.push_str("[...]");
        return;
    }
    out.push('[');
    for (i, &item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        vm.write_repr(item, out, depth + 1);
    }
    out.push(']');
}

fn test(vm: &Vm, value: Value) -> bool {
    matches!(vm.heap.body(value), Body::Array(items) if !items.is_empty())
}

fn add(vm: &mut Vm, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let mut joined = items(vm, "ADD", lhs)?.clone();
    joined.extend_from_slice(items(vm, "ADD", rhs)?);
    vm.new_array(joined)
}

fn select(vm: &mut Vm, container: Value, key: Value) -> Result<Value, RuntimeError> {
    let index = index_of(vm, "SELECT", key)?;
    let items = items(vm, "SELECT", container)?;
    Ok(items[checked_index(index, items.len())?])
}

/// Writing one past the end appends.
fn insert(
    vm: &mut Vm,
    container: Value,
    key: Value,
    value: Value,
) -> Result<(), RuntimeError> {
    let index = index_of(vm, "INSERT", key)?;
    let items = items_mut(vm, "INSERT", container)?;
    if usize::try_from(index).is_ok_and(|i| i == items.len()) {
        items.push(value);
    } else {
        let at = checked_index(index, items.len())?;
        items[at] = value;
    }
    Ok(())
}

fn push(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    items_mut(vm, "push", args[0])?.push(args[1]);
    Ok(args[0])
}

fn pop(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match items_mut(vm, "pop", args[0])?.pop() {
        Some(value) => Ok(value),
        None => Err(RuntimeError::Native {
            name: "pop",
            message: "pop from an empty array".to_string(),
        }),
    }
}

fn len(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let n = items(vm, "len", args[0])?.len();
    vm.new_integer(n as i64)
}

#[cfg(test)]
mod tests {
    use crate::RuntimeError;
    use crate::testing::{eval, eval_err};

    #[test]
    fn literal_and_printing() {
        assert_eq!(eval(r#"return [1, "two", [3.0]];"#), r#"[1, "two", [3.0]]"#);
        assert_eq!(eval("return [];"), "[]");
    }

    #[test]
    fn index_read_and_write() {
        assert_eq!(eval("a = [1, 2, 3]; return a[2];"), "3");
        assert_eq!(eval("a = [1, 2]; a[2] = 9; return a;"), "[1, 2, 9]");
        assert_eq!(eval("a = [1, 2]; a[0] += 5; return a;"), "[6, 2]");
        assert!(matches!(
            eval_err("a = [1]; a[3] = 0;"),
            RuntimeError::IndexOutOfBounds { index: 3, len: 1 }
        ));
        assert!(matches!(
            eval_err("return [1][-1];"),
            RuntimeError::IndexOutOfBounds { index: -1, len: 1 }
        ));
    }

    #[test]
    fn methods() {
        assert_eq!(eval("a = []; a.push(1); a.push(2); return a.len();"), "2");
        assert_eq!(eval("a = [1, 2]; x = a.pop(); return [x, a];"), "[2, [1]]");
        assert!(matches!(
            eval_err("[].pop();"),
            RuntimeError::Native { name: "pop", .. }
        ));
    }

    #[test]
    fn concatenation() {
        assert_eq!(eval("return [1] + [2, 3];"), "[1, 2, 3]");
    }

    #[test]
    fn self_reference_prints_with_elision() {
        let out = eval("a = []; a.push(a); return a;");
        assert!(out.starts_with("[[[["));
        assert!(out.contains("[...]"));
    }
}

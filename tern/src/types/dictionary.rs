//! `dictionary`: string-keyed hash map. Keys double as attributes, so
//! `d.k` and `d["k"]` read the same entry.

use std::fmt::Write as _;

use crate::dictionary::Dictionary;
use crate::error::RuntimeError;
use crate::header::HEADER_SIZE;
use crate::object::{Body, NativeFunction};
use crate::types::{MAX_PRINT_DEPTH, TypeOps, mismatch};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const SIZE: u32 = HEADER_SIZE + 48;

pub(crate) const METHODS: &[NativeFunction] = &[
    NativeFunction {
        name: "keys",
        arity: Some(1),
        func: keys,
    },
    NativeFunction {
        name: "len",
        arity: Some(1),
        func: len,
    },
    NativeFunction {
        name: "has",
        arity: Some(2),
        func: has,
    },
];

pub(crate) fn ops() -> TypeOps {
    TypeOps {
        print: Some(print),
        test: Some(test),
        select: Some(select),
        insert: Some(insert),
        select_attr: Some(select_attr),
        insert_attr: Some(insert_attr),
        init: Some(init),
        deinit: Some(deinit),
        walk: Some(walk),
        ..TypeOps::EMPTY
    }
}

fn init(body: &mut Body) {
    *body = Body::Dictionary(Dictionary::new());
}

fn deinit(body: &mut Body) {
    *body = Body::Empty;
}

fn walk(body: &mut Body, visit: &mut dyn FnMut(&mut Value)) {
    if let Body::Dictionary(dict) = body {
        dict.values_mut().for_each(visit);
    }
}

fn dict<'v>(
    vm: &'v Vm,
    operation: &'static str,
    value: Value,
) -> Result<&'v Dictionary, RuntimeError> {
    match vm.heap.body(value) {
        Body::Dictionary(dict) => Ok(dict),
        _ => Err(mismatch(vm, operation, "dictionary", value)),
    }
}

fn dict_mut<'v>(
    vm: &'v mut Vm,
    operation: &'static str,
    value: Value,
) -> Result<&'v mut Dictionary, RuntimeError> {
    if !matches!(vm.heap.body(value), Body::Dictionary(_)) {
        return Err(mismatch(vm, operation, "dictionary", value));
    }
    match vm.heap.body_mut(value) {
        Body::Dictionary(dict) => Ok(dict),
        _ => unreachable!(),
    }
}

fn key_of(vm: &Vm, operation: &'static str, key: Value) -> Result<String, RuntimeError> {
    vm.heap
        .body(key)
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(vm, operation, "string", key))
}

fn print(vm: &Vm, value: Value, out: &mut String, depth: usize) {
    let Body::Dictionary(dict) = vm.heap.body(value) else {
        return;
    };
    if depth >= MAX_PRINT_DEPTH {
        out.push_str("{...}");
        return;
    }
    out.push('{');
    for (i, (key, item)) in dict.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{key:?}: ");
        vm.write_repr(item, out, depth + 1);
    }
    out.push('}');
}

fn test(vm: &Vm, value: Value) -> bool {
    matches!(vm.heap.body(value), Body::Dictionary(dict) if !dict.is_empty())
}

fn select(vm: &mut Vm, container: Value, key: Value) -> Result<Value, RuntimeError> {
    let key = key_of(vm, "SELECT", key)?;
    dict(vm, "SELECT", container)?
        .get(&key)
        .ok_or(RuntimeError::KeyNotFound { key })
}

fn insert(
    vm: &mut Vm,
    container: Value,
    key: Value,
    value: Value,
) -> Result<(), RuntimeError> {
    let key = key_of(vm, "INSERT", key)?;
    dict_mut(vm, "INSERT", container)?.insert(&key, value);
    Ok(())
}

fn select_attr(
    vm: &mut Vm,
    container: Value,
    name: &str,
) -> Result<Option<Value>, RuntimeError> {
    Ok(dict(vm, "SELECT_ATTRIBUTE", container)?.get(name))
}

fn insert_attr(
    vm: &mut Vm,
    container: Value,
    name: &str,
    value: Value,
) -> Result<(), RuntimeError> {
    dict_mut(vm, "INSERT_ATTRIBUTE", container)?.insert(name, value);
    Ok(())
}

fn keys(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let names: Vec<String> = dict(vm, "keys", args[0])?
        .keys()
        .map(str::to_string)
        .collect();
    let mut items = Vec::with_capacity(names.len());
    for name in names {
        items.push(vm.new_string(name)?);
    }
    vm.new_array(items)
}

fn len(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let n = dict(vm, "len", args[0])?.len();
    vm.new_integer(n as i64)
}

fn has(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let key = key_of(vm, "has", args[1])?;
    let found = dict(vm, "has", args[0])?.contains_key(&key);
    Ok(vm.boolean(found))
}

#[cfg(test)]
mod tests {
    use crate::RuntimeError;
    use crate::testing::{eval, eval_err};

    #[test]
    fn literal_and_access() {
        assert_eq!(eval(r#"d = {a: 1, "b c": 2}; return d["b c"];"#), "2");
        assert_eq!(eval("d = {a: 1}; return d.a;"), "1");
        assert_eq!(eval(r#"return {a: "x", b: [1]};"#), r#"{"a": "x", "b": [1]}"#);
    }

    #[test]
    fn writes_through_index_and_attribute() {
        assert_eq!(eval(r#"d = {}; d["k"] = 1; d.j = 2; return d;"#), r#"{"k": 1, "j": 2}"#);
        assert_eq!(eval("d = {n: 1}; d.n += 4; return d.n;"), "5");
    }

    #[test]
    fn missing_keys_and_bad_key_types() {
        assert!(matches!(
            eval_err(r#"return {}["nope"];"#),
            RuntimeError::KeyNotFound { .. }
        ));
        assert!(matches!(
            eval_err("return {}[0];"),
            RuntimeError::TypeMismatch { .. }
        ));
        assert!(matches!(
            eval_err("return {}.nope;"),
            RuntimeError::NoAttribute { .. }
        ));
    }

    #[test]
    fn methods_fall_back_after_keys() {
        assert_eq!(eval("d = {a: 1, b: 2}; return d.len();"), "2");
        assert_eq!(eval(r#"d = {a: 1}; return [d.has("a"), d.has("z")];"#), "[true, false]");
        assert_eq!(eval("return {x: 1, y: 2}.keys();"), r#"["x", "y"]"#);
        // an entry shadows the method of the same name
        assert_eq!(eval("d = {len: 7}; return d.len;"), "7");
    }
}

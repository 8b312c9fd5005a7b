//! Type records and their operation tables.
//!
//! Every record points at a type, and a type is itself a record whose body
//! is a [`TypeObject`]: a name, an instance size, an optional method
//! dictionary and a [`TypeOps`] table. A missing callback means the
//! operation is undefined for that type; the VM reports it instead of
//! coercing.
//!
//! All types are created once by [`bootstrap`], in permanent space. The
//! `type` type is its own type.

use std::fmt;

use bytecode::Op;

use crate::error::RuntimeError;
use crate::header::{Header, HeaderFlags};
use crate::heap::Heap;
use crate::object::{Body, NativeFunction, Record};
use crate::value::Value;
use crate::vm::Vm;

pub mod array;
pub mod boolean;
pub mod dictionary;
pub mod float;
pub mod function;
pub mod integer;
pub mod null;
pub mod string;
pub mod typetype;

// ── callback signatures ───────────────────────────────────────────────

/// Append the printed form of a value. `depth` counts enclosing containers.
pub type PrintFn = fn(&Vm, Value, &mut String, usize);
pub type TestFn = fn(&Vm, Value) -> bool;
pub type BinaryFn = fn(&mut Vm, Value, Value) -> Result<Value, RuntimeError>;
pub type UnaryFn = fn(&mut Vm, Value) -> Result<Value, RuntimeError>;
/// `(container, key)`.
pub type SelectFn = fn(&mut Vm, Value, Value) -> Result<Value, RuntimeError>;
/// `(container, key, value)`.
pub type InsertFn = fn(&mut Vm, Value, Value, Value) -> Result<(), RuntimeError>;
/// `Ok(None)` lets the lookup fall through to the type's methods.
pub type SelectAttrFn =
    fn(&mut Vm, Value, &str) -> Result<Option<Value>, RuntimeError>;
pub type InsertAttrFn =
    fn(&mut Vm, Value, &str, Value) -> Result<(), RuntimeError>;
pub type InitFn = fn(&mut Body);
pub type DeinitFn = fn(&mut Body);
/// Visit every value a body references.
pub type WalkFn = fn(&mut Body, &mut dyn FnMut(&mut Value));

#[derive(Clone, Copy)]
pub struct TypeOps {
    pub print: Option<PrintFn>,
    pub test: Option<TestFn>,
    pub add: Option<BinaryFn>,
    pub sub: Option<BinaryFn>,
    pub mul: Option<BinaryFn>,
    pub div: Option<BinaryFn>,
    pub modulo: Option<BinaryFn>,
    pub pos: Option<UnaryFn>,
    pub neg: Option<UnaryFn>,
    pub inv: Option<UnaryFn>,
    pub eql: Option<BinaryFn>,
    pub nql: Option<BinaryFn>,
    pub lss: Option<BinaryFn>,
    pub grt: Option<BinaryFn>,
    pub leq: Option<BinaryFn>,
    pub geq: Option<BinaryFn>,
    pub and: Option<BinaryFn>,
    pub or: Option<BinaryFn>,
    pub xor: Option<BinaryFn>,
    pub shl: Option<BinaryFn>,
    pub shr: Option<BinaryFn>,
    pub inc: Option<UnaryFn>,
    pub dec: Option<UnaryFn>,
    pub select: Option<SelectFn>,
    pub insert: Option<InsertFn>,
    pub select_attr: Option<SelectAttrFn>,
    pub insert_attr: Option<InsertAttrFn>,
    pub init: Option<InitFn>,
    pub deinit: Option<DeinitFn>,
    pub walk: Option<WalkFn>,
}

impl TypeOps {
    pub const EMPTY: TypeOps = TypeOps {
        print: None,
        test: None,
        add: None,
        sub: None,
        mul: None,
        div: None,
        modulo: None,
        pos: None,
        neg: None,
        inv: None,
        eql: None,
        nql: None,
        lss: None,
        grt: None,
        leq: None,
        geq: None,
        and: None,
        or: None,
        xor: None,
        shl: None,
        shr: None,
        inc: None,
        dec: None,
        select: None,
        insert: None,
        select_attr: None,
        insert_attr: None,
        init: None,
        deinit: None,
        walk: None,
    };

    /// The callback implementing a two-operand opcode.
    pub fn binary(&self, op: Op) -> Option<BinaryFn> {
        match op {
            Op::Add => self.add,
            Op::Sub => self.sub,
            Op::Mul => self.mul,
            Op::Div => self.div,
            Op::Mod => self.modulo,
            Op::Eql => self.eql,
            Op::Nql => self.nql,
            Op::Lss => self.lss,
            Op::Grt => self.grt,
            Op::Leq => self.leq,
            Op::Geq => self.geq,
            Op::And => self.and,
            Op::Or => self.or,
            Op::Xor => self.xor,
            Op::Shl => self.shl,
            Op::Shr => self.shr,
            _ => None,
        }
    }

    /// The callback implementing a one-operand opcode. `NOT` is not here:
    /// it is derived from `test`.
    pub fn unary(&self, op: Op) -> Option<UnaryFn> {
        match op {
            Op::Pos => self.pos,
            Op::Neg => self.neg,
            Op::Inv => self.inv,
            Op::Inc => self.inc,
            Op::Dec => self.dec,
            _ => None,
        }
    }
}

/// The body of a type record.
pub struct TypeObject {
    pub name: String,
    /// Bytes charged per instance, header included.
    pub size: u32,
    /// A dictionary of methods shared by all instances, or `NULL_REF`.
    pub methods: Value,
    pub ops: TypeOps,
}

impl TypeObject {
    pub fn new(name: impl Into<String>, size: u32, ops: TypeOps) -> Self {
        Self {
            name: name.into(),
            size,
            methods: Value::NULL_REF,
            ops,
        }
    }
}

impl fmt::Debug for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeObject")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

// ── Special objects ───────────────────────────────────────────────────

/// Process-wide singletons, created once per VM.
#[derive(Debug, Clone, Copy)]
pub struct SpecialObjects {
    pub type_type: Value,
    pub null_type: Value,
    pub boolean_type: Value,
    pub integer_type: Value,
    pub float_type: Value,
    pub string_type: Value,
    pub array_type: Value,
    pub dictionary_type: Value,
    pub function_type: Value,
    pub native_function_type: Value,
    pub null: Value,
    pub true_value: Value,
    pub false_value: Value,
}

impl SpecialObjects {
    pub fn types(&self) -> [Value; 10] {
        [
            self.type_type,
            self.null_type,
            self.boolean_type,
            self.integer_type,
            self.float_type,
            self.string_type,
            self.array_type,
            self.dictionary_type,
            self.function_type,
            self.native_function_type,
        ]
    }
}

fn new_type(
    heap: &mut Heap,
    type_type: Value,
    name: &str,
    size: u32,
    ops: TypeOps,
) -> Result<Value, RuntimeError> {
    heap.allocate(
        Record {
            header: Header::new(type_type, HeaderFlags::NONE, typetype::SIZE),
            body: Body::Type(Box::new(TypeObject::new(name, size, ops))),
        },
        true,
    )
}

/// Build a permanent dictionary of permanent native-function records.
pub(crate) fn native_dictionary(
    heap: &mut Heap,
    specials: &SpecialObjects,
    natives: &[NativeFunction],
) -> Result<Value, RuntimeError> {
    let dict = heap.instantiate(specials.dictionary_type, true)?;
    for native in natives {
        let value = heap.instantiate(specials.native_function_type, true)?;
        *heap.body_mut(value) = Body::NativeFunction(*native);
        if let Body::Dictionary(d) = heap.body_mut(dict) {
            d.insert(native.name, value);
        }
    }
    Ok(dict)
}

/// Allocate the `type` type, every builtin type, `null`, `true`, `false`
/// and the method tables.
pub fn bootstrap(heap: &mut Heap) -> Result<SpecialObjects, RuntimeError> {
    // `type` is its own type: allocate with a null type, then patch
    let type_type = heap.allocate(
        Record {
            header: Header::new(
                Value::NULL_REF,
                HeaderFlags::NONE,
                typetype::SIZE,
            ),
            body: Body::Type(Box::new(TypeObject::new(
                "type",
                typetype::SIZE,
                typetype::ops(),
            ))),
        },
        true,
    )?;
    heap.record_mut(type_type).header.ty = type_type;

    let null_type = new_type(heap, type_type, "null", null::SIZE, null::ops())?;
    let boolean_type =
        new_type(heap, type_type, "boolean", boolean::SIZE, boolean::ops())?;
    let integer_type =
        new_type(heap, type_type, "integer", integer::SIZE, integer::ops())?;
    let float_type = new_type(heap, type_type, "float", float::SIZE, float::ops())?;
    let string_type =
        new_type(heap, type_type, "string", string::SIZE, string::ops())?;
    let array_type = new_type(heap, type_type, "array", array::SIZE, array::ops())?;
    let dictionary_type = new_type(
        heap,
        type_type,
        "dictionary",
        dictionary::SIZE,
        dictionary::ops(),
    )?;
    let function_type = new_type(
        heap,
        type_type,
        "function",
        function::SIZE,
        function::ops(),
    )?;
    let native_function_type = new_type(
        heap,
        type_type,
        "native_function",
        function::NATIVE_SIZE,
        function::native_ops(),
    )?;

    let null = heap.instantiate(null_type, true)?;
    let true_value = heap.instantiate(boolean_type, true)?;
    *heap.body_mut(true_value) = Body::Boolean(true);
    let false_value = heap.instantiate(boolean_type, true)?;
    *heap.body_mut(false_value) = Body::Boolean(false);

    let specials = SpecialObjects {
        type_type,
        null_type,
        boolean_type,
        integer_type,
        float_type,
        string_type,
        array_type,
        dictionary_type,
        function_type,
        native_function_type,
        null,
        true_value,
        false_value,
    };

    for (ty, methods) in [
        (string_type, string::METHODS),
        (array_type, array::METHODS),
        (dictionary_type, dictionary::METHODS),
    ] {
        let table = native_dictionary(heap, &specials, methods)?;
        heap.type_object_mut(ty).methods = table;
    }

    Ok(specials)
}

// ── helpers shared by the type modules ────────────────────────────────

/// Maximum container nesting printed before eliding with `...`.
pub(crate) const MAX_PRINT_DEPTH: usize = 16;

/// Error for an operand that is not of the expected kind.
pub(crate) fn mismatch(
    vm: &Vm,
    operation: &'static str,
    expected: &str,
    found: Value,
) -> RuntimeError {
    RuntimeError::TypeMismatch {
        operation,
        expected: expected.to_string(),
        found: vm.type_name(found).to_string(),
    }
}

/// Index into a sequence of `len` items.
pub(crate) fn checked_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(RuntimeError::IndexOutOfBounds { index, len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapSettings;

    #[test]
    fn type_type_is_its_own_type() {
        let mut heap = Heap::new(&HeapSettings::default());
        let sp = bootstrap(&mut heap).unwrap();
        assert_eq!(heap.type_of(sp.type_type), sp.type_type);
        for ty in sp.types() {
            assert_eq!(heap.type_of(ty), sp.type_type);
            assert!(!heap.is_collectable(ty));
        }
        assert_eq!(heap.type_object(sp.integer_type).name, "integer");
    }

    #[test]
    fn singletons_are_permanent() {
        let mut heap = Heap::new(&HeapSettings::default());
        let sp = bootstrap(&mut heap).unwrap();
        assert_eq!(heap.body(sp.true_value).as_boolean(), Some(true));
        assert_eq!(heap.body(sp.false_value).as_boolean(), Some(false));
        assert_eq!(heap.type_of(sp.null), sp.null_type);
        assert!(!heap.is_collectable(sp.null));
        assert_eq!(heap.collectable_count(), 0);
    }

    #[test]
    fn method_tables_installed() {
        let mut heap = Heap::new(&HeapSettings::default());
        let sp = bootstrap(&mut heap).unwrap();
        let methods = heap.type_object(sp.array_type).methods;
        let Body::Dictionary(d) = heap.body(methods) else {
            panic!("methods is not a dictionary");
        };
        assert!(d.contains_key("push"));
        assert!(d.contains_key("pop"));
        assert!(heap.type_object(sp.integer_type).methods.is_null_ref());
    }

    #[test]
    fn opcode_dispatch_tables() {
        let ops = integer::ops();
        assert!(ops.binary(Op::Add).is_some());
        assert!(ops.unary(Op::Inc).is_some());
        assert!(ops.binary(Op::Pop).is_none());
        assert!(null::ops().binary(Op::Add).is_none());
    }

    #[test]
    fn checked_index_bounds() {
        assert_eq!(checked_index(0, 1), Ok(0));
        assert!(checked_index(1, 1).is_err());
        assert!(checked_index(-1, 5).is_err());
    }
}

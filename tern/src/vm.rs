//! The virtual machine: owns the heap, the loaded segments, and the
//! evaluation, scope and call stacks. The step loop lives in
//! [`crate::interpreter`], imports in [`crate::import`].

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bytecode::Image;
use log::debug;

use crate::builtins;
use crate::compiler::compile;
use crate::dictionary::Dictionary;
use crate::error::{Error, RuntimeError};
use crate::heap::{GcStats, Heap, HeapSettings, RootProvider};
use crate::object::{Body, NativeFn, NativeFunction, Str};
use crate::segment::Segment;
use crate::types::{SpecialObjects, bootstrap};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSettings {
    pub heap: HeapSettings,
    /// Call depth at which `CALL` faults with a stack overflow.
    pub max_frames: usize,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            max_frames: 1024,
        }
    }
}

impl VmSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        self.heap.validate()?;
        if self.max_frames == 0 {
            return Err("max_frames must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// The top level of a segment; its end finishes a segment run.
    Segment,
    Function,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub segment: usize,
    pub pc: usize,
    pub kind: FrameKind,
    /// Evaluation stack height below the frame. For functions this is the
    /// callee slot, which the return value replaces.
    pub stack_base: usize,
    /// Scopes below this index belong to callers.
    pub scope_base: usize,
}

pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) specials: SpecialObjects,
    pub(crate) builtins: Value,
    /// Namespace shared by all source text run without a file.
    pub(crate) main_globals: Value,
    pub(crate) segments: Vec<Segment>,
    pub(crate) segment_paths: HashMap<PathBuf, usize>,
    pub(crate) stack: Vec<Value>,
    pub(crate) scopes: Vec<Dictionary>,
    pub(crate) frames: Vec<Frame>,
    /// Argument count of the call in flight, consumed by `EXPECT`.
    pub(crate) pending_argc: Option<usize>,
    /// The failure sink: once set, the step loop stops.
    pub(crate) failure: Option<RuntimeError>,
    /// Where the current run failed, set by the innermost step loop.
    pub(crate) error_location: Option<String>,
    pub(crate) libraries: Vec<libloading::Library>,
    output: Box<dyn Write>,
    settings: VmSettings,
}

struct VmRoots<'a> {
    stack: &'a mut Vec<Value>,
    scopes: &'a mut Vec<Dictionary>,
    segments: &'a mut Vec<Segment>,
    specials: &'a mut SpecialObjects,
    builtins: &'a mut Value,
    main_globals: &'a mut Value,
}

impl RootProvider for VmRoots<'_> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for value in self.stack.iter_mut() {
            visitor(value);
        }
        for scope in self.scopes.iter_mut() {
            for value in scope.values_mut() {
                visitor(value);
            }
        }
        for segment in self.segments.iter_mut() {
            visitor(&mut segment.globals);
        }
        visitor(&mut self.specials.null);
        visitor(&mut self.specials.true_value);
        visitor(&mut self.specials.false_value);
        for ty in [
            &mut self.specials.type_type,
            &mut self.specials.null_type,
            &mut self.specials.boolean_type,
            &mut self.specials.integer_type,
            &mut self.specials.float_type,
            &mut self.specials.string_type,
            &mut self.specials.array_type,
            &mut self.specials.dictionary_type,
            &mut self.specials.function_type,
            &mut self.specials.native_function_type,
        ] {
            visitor(ty);
        }
        visitor(self.builtins);
        visitor(self.main_globals);
    }
}

impl Vm {
    pub fn new(settings: VmSettings) -> Result<Self, Error> {
        settings.validate().map_err(Error::Settings)?;
        let mut heap = Heap::new(&settings.heap);
        let specials = bootstrap(&mut heap).map_err(Error::from)?;
        let builtins =
            builtins::install(&mut heap, &specials).map_err(Error::from)?;
        let main_globals = heap
            .instantiate(specials.dictionary_type, true)
            .map_err(Error::from)?;
        Ok(Self {
            heap,
            specials,
            builtins,
            main_globals,
            segments: Vec::new(),
            segment_paths: HashMap::new(),
            stack: Vec::new(),
            scopes: Vec::new(),
            frames: Vec::new(),
            pending_argc: None,
            failure: None,
            error_location: None,
            libraries: Vec::new(),
            output: Box::new(io::stdout()),
            settings,
        })
    }

    pub fn settings(&self) -> &VmSettings {
        &self.settings
    }

    /// Redirect everything `print` writes.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    pub(crate) fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    // ── running code ───────────────────────────────────────────────

    /// Parse and compile `source` without running it.
    pub fn compile_source(&self, source: &str) -> Result<Image, Error> {
        let program = parser::parse(source)?;
        Ok(compile(&program)?)
    }

    /// Run source text as a new segment. Successive runs share one
    /// namespace, and relative imports resolve against the working
    /// directory. The result is the value of a top-level `return`, or
    /// `null`.
    ///
    /// Values returned to the host are not GC roots. Any later run or
    /// [`Vm::collect_garbage`] may collect, after which the handle can name
    /// a different record; keep long-lived values with [`Vm::set_global`].
    pub fn run(&mut self, source: &str) -> Result<Value, Error> {
        self.run_source(Rc::from(source), None)
    }

    /// Run a source file as a new segment.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Value, Error> {
        let path = path.as_ref();
        let io_error = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };
        let source = std::fs::read_to_string(path).map_err(io_error)?;
        let canonical = path.canonicalize().map_err(io_error)?;
        self.run_source(Rc::from(source), Some(canonical))
    }

    fn run_source(
        &mut self,
        source: Rc<str>,
        path: Option<PathBuf>,
    ) -> Result<Value, Error> {
        let image = self.compile_source(&source)?;
        let globals = match path {
            Some(_) => None,
            None => Some(self.main_globals),
        };
        let segment = self.register_segment(image, path, source, globals)?;
        self.failure = None;
        self.error_location = None;
        self.enter_segment(segment);
        match self.execute() {
            Ok(value) => Ok(value),
            Err(error) => {
                self.forget_path(segment);
                self.reset();
                Err(Error::Runtime {
                    error,
                    location: self.error_location.take(),
                })
            }
        }
    }

    /// Unwind everything a failed run left behind.
    fn reset(&mut self) {
        self.stack.clear();
        self.scopes.clear();
        self.frames.clear();
        self.pending_argc = None;
        self.failure = None;
    }

    pub(crate) fn register_segment(
        &mut self,
        image: Image,
        path: Option<PathBuf>,
        source: Rc<str>,
        globals: Option<Value>,
    ) -> Result<usize, RuntimeError> {
        let globals = match globals {
            Some(globals) => globals,
            None => self.heap.instantiate(self.specials.dictionary_type, true)?,
        };
        let index = self.segments.len();
        debug!(
            "segment {index}: {} ({} code bytes, {} data bytes)",
            path.as_deref()
                .map_or_else(|| "<input>".into(), |p| p.display().to_string()),
            image.code.len(),
            image.data.len()
        );
        if let Some(path) = &path {
            self.segment_paths.insert(path.clone(), index);
        }
        self.segments.push(Segment::new(image, path, source, globals));
        Ok(index)
    }

    /// Drop the path cache entry of a segment whose top level failed, so
    /// the next import of that file runs it again.
    pub(crate) fn forget_path(&mut self, segment: usize) {
        let Some(path) = &self.segments[segment].path else {
            return;
        };
        if self.segment_paths.get(path) == Some(&segment) {
            debug!("segment {segment}: failed, dropping {}", path.display());
            self.segment_paths.remove(path);
        }
    }

    /// Push the top-level frame of `segment`; the next `execute` runs it.
    pub(crate) fn enter_segment(&mut self, segment: usize) {
        self.frames.push(Frame {
            segment,
            pc: 0,
            kind: FrameKind::Segment,
            stack_base: self.stack.len(),
            scope_base: self.scopes.len(),
        });
    }

    /// The namespace of a loaded segment.
    pub fn segment_globals(&self, segment: usize) -> Option<Value> {
        self.segments.get(segment).map(|s| s.globals)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Current evaluation stack height.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // ── failure sink ───────────────────────────────────────────────

    /// Report a failure from native code. The run stops after the current
    /// instruction; the first failure wins.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(RuntimeError::Failed(message.into()));
        }
    }

    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    // ── garbage collection ─────────────────────────────────────────

    /// Run a full collection now. Only values reachable from the VM's
    /// stacks, scopes, segment namespaces and builtins survive; any other
    /// collectable handle the host holds is stale afterwards.
    pub fn collect_garbage(&mut self) {
        let mut roots = VmRoots {
            stack: &mut self.stack,
            scopes: &mut self.scopes,
            segments: &mut self.segments,
            specials: &mut self.specials,
            builtins: &mut self.builtins,
            main_globals: &mut self.main_globals,
        };
        self.heap.collect(&mut roots);
    }

    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    // ── value construction ─────────────────────────────────────────

    pub fn null(&self) -> Value {
        self.specials.null
    }

    pub fn boolean(&self, value: bool) -> Value {
        if value {
            self.specials.true_value
        } else {
            self.specials.false_value
        }
    }

    fn new_with(&mut self, ty: Value, body: Body) -> Result<Value, RuntimeError> {
        let value = self.heap.instantiate(ty, false)?;
        *self.heap.body_mut(value) = body;
        Ok(value)
    }

    pub fn new_integer(&mut self, value: i64) -> Result<Value, RuntimeError> {
        self.new_with(self.specials.integer_type, Body::Integer(value))
    }

    pub fn new_float(&mut self, value: f64) -> Result<Value, RuntimeError> {
        self.new_with(self.specials.float_type, Body::Float(value))
    }

    /// An owned string.
    pub fn new_string(
        &mut self,
        value: impl Into<String>,
    ) -> Result<Value, RuntimeError> {
        self.new_with(
            self.specials.string_type,
            Body::String(Str::Owned(value.into())),
        )
    }

    pub(crate) fn new_borrowed_string(
        &mut self,
        data: &Rc<[u8]>,
        offset: u32,
    ) -> Result<Value, RuntimeError> {
        let s = Str::borrowed(data, offset)?;
        self.new_with(self.specials.string_type, Body::String(s))
    }

    pub fn new_array(&mut self, items: Vec<Value>) -> Result<Value, RuntimeError> {
        self.new_with(self.specials.array_type, Body::Array(items))
    }

    pub fn new_dictionary(&mut self) -> Result<Value, RuntimeError> {
        self.heap.instantiate(self.specials.dictionary_type, false)
    }

    pub fn dictionary_insert(
        &mut self,
        dict: Value,
        key: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if let Body::Dictionary(d) = self.heap.body_mut(dict) {
            d.insert(key, value);
            return Ok(());
        }
        Err(RuntimeError::TypeMismatch {
            operation: "dictionary_insert",
            expected: "dictionary".to_string(),
            found: self.type_name(dict).to_string(),
        })
    }

    /// Look up `key` in a dictionary value.
    pub fn dictionary_get(&self, dict: Value, key: &str) -> Option<Value> {
        match self.heap.body(dict) {
            Body::Dictionary(d) => d.get(key),
            _ => None,
        }
    }

    /// The namespace shared by every [`Vm::run`].
    pub fn globals(&self) -> Value {
        self.main_globals
    }

    /// Bind `name` in the shared namespace, e.g. to expose a native.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.dictionary_insert(self.main_globals, name, value)
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.dictionary_get(self.main_globals, name)
    }

    pub(crate) fn new_function(
        &mut self,
        segment: usize,
        offset: u32,
    ) -> Result<Value, RuntimeError> {
        self.new_with(
            self.specials.function_type,
            Body::Function(crate::object::Function { segment, offset }),
        )
    }

    /// Wrap a host routine as a callable value. `arity` of `None` accepts
    /// any number of arguments.
    pub fn new_native(
        &mut self,
        name: &'static str,
        arity: Option<usize>,
        func: NativeFn,
    ) -> Result<Value, RuntimeError> {
        self.new_with(
            self.specials.native_function_type,
            Body::NativeFunction(NativeFunction { name, arity, func }),
        )
    }

    // ── value inspection ───────────────────────────────────────────

    pub fn to_integer(&self, value: Value) -> Option<i64> {
        self.heap.get(value)?.body.as_integer()
    }

    /// Floats, or integers promoted to float.
    pub fn to_float(&self, value: Value) -> Option<f64> {
        let body = &self.heap.get(value)?.body;
        body.as_float().or_else(|| body.as_integer().map(|n| n as f64))
    }

    pub fn to_bool(&self, value: Value) -> Option<bool> {
        self.heap.get(value)?.body.as_boolean()
    }

    pub fn to_str(&self, value: Value) -> Option<&str> {
        self.heap.get(value)?.body.as_str()
    }

    pub fn to_array(&self, value: Value) -> Option<&[Value]> {
        match &self.heap.get(value)?.body {
            Body::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn type_of(&self, value: Value) -> Value {
        self.heap.type_of(value)
    }

    pub fn type_name(&self, value: Value) -> &str {
        match self.heap.get(value) {
            Some(record) => &self.heap.type_object(record.header.ty).name,
            None => "<null-ref>",
        }
    }

    /// Truthiness through the type's test callback.
    pub fn is_truthy(&self, value: Value) -> Result<bool, RuntimeError> {
        let ty = self.heap.type_of(value);
        match self.heap.type_object(ty).ops.test {
            Some(test) => Ok(test(self, value)),
            None => Err(RuntimeError::UndefinedOperation {
                operation: "test",
                type_name: self.type_name(value).to_string(),
            }),
        }
    }

    /// The printed form of a value, as `print` writes it.
    pub fn display(&self, value: Value) -> String {
        let mut out = String::new();
        self.write_value(value, &mut out, 0);
        out
    }

    pub(crate) fn write_value(&self, value: Value, out: &mut String, depth: usize) {
        let Some(record) = self.heap.get(value) else {
            out.push_str("<null-ref>");
            return;
        };
        let ty = self.heap.type_object(record.header.ty);
        match ty.ops.print {
            Some(print) => print(self, value, out, depth),
            None => {
                let _ = write!(out, "<{}>", ty.name);
            }
        }
    }

    /// Like [`write_value`](Self::write_value), but strings are quoted.
    /// Used for container elements.
    pub(crate) fn write_repr(&self, value: Value, out: &mut String, depth: usize) {
        match self.heap.get(value).map(|r| &r.body) {
            Some(Body::String(s)) => {
                let _ = write!(out, "{:?}", s.as_str());
            }
            _ => self.write_value(value, out, depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_are_validated() {
        assert!(VmSettings::default().validate().is_ok());
        let bad = VmSettings {
            max_frames: 0,
            ..VmSettings::default()
        };
        assert!(matches!(Vm::new(bad), Err(Error::Settings(_))));
    }

    #[test]
    fn marshalling_round_trips() {
        let mut vm = Vm::new(VmSettings::default()).unwrap();
        let n = vm.new_integer(-4).unwrap();
        let x = vm.new_float(0.25).unwrap();
        let s = vm.new_string("héllo").unwrap();
        assert_eq!(vm.to_integer(n), Some(-4));
        assert_eq!(vm.to_float(n), Some(-4.0));
        assert_eq!(vm.to_float(x), Some(0.25));
        assert_eq!(vm.to_integer(x), None);
        assert_eq!(vm.to_str(s), Some("héllo"));
        assert_eq!(vm.type_name(s), "string");
        assert_eq!(vm.to_bool(vm.boolean(true)), Some(true));
    }

    #[test]
    fn display_quotes_only_nested_strings() {
        let mut vm = Vm::new(VmSettings::default()).unwrap();
        let s = vm.new_string("a").unwrap();
        let arr = vm.new_array(vec![s, vm.null()]).unwrap();
        assert_eq!(vm.display(s), "a");
        assert_eq!(vm.display(arr), r#"["a", null]"#);
        assert_eq!(vm.display(Value::NULL_REF), "<null-ref>");
    }

    #[test]
    fn dictionaries_from_the_host() {
        let mut vm = Vm::new(VmSettings::default()).unwrap();
        let d = vm.new_dictionary().unwrap();
        let one = vm.new_integer(1).unwrap();
        vm.dictionary_insert(d, "one", one).unwrap();
        assert_eq!(vm.dictionary_get(d, "one"), Some(one));
        assert!(vm.dictionary_insert(one, "x", one).is_err());
    }

    #[test]
    fn fail_keeps_the_first_message() {
        let mut vm = Vm::new(VmSettings::default()).unwrap();
        vm.fail("first");
        vm.fail("second");
        assert_eq!(vm.failure, Some(RuntimeError::Failed("first".into())));
    }
}

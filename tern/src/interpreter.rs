//! The fetch-decode-execute loop.
//!
//! [`Vm::execute`] runs the segment frame on top of the call stack until
//! that segment quits or returns. Imports re-enter it for the imported
//! segment, so one loop runs per segment being executed. After every
//! instruction the loop checks the failure sink, then collects garbage if
//! the arena has spilled into overflow.

use std::rc::Rc;

use bytecode::{BytecodeDecoder, Instruction, Op, read_str};
use log::trace;

use crate::dictionary::Dictionary;
use crate::error::RuntimeError;
use crate::object::Body;
use crate::value::Value;
use crate::vm::{Frame, FrameKind, Vm};

/// What the loop does after an instruction.
enum Flow {
    Next,
    /// The segment frame this loop was started for has ended.
    Exit(Value),
}

impl Vm {
    pub(crate) fn execute(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let Some(&Frame { segment, pc, .. }) = self.frames.last() else {
                return Ok(self.null());
            };
            let decoded = {
                let code = &self.segments[segment].code;
                let mut decoder = BytecodeDecoder::at(code, pc);
                decoder.decode().map(|instr| (instr, decoder.offset()))
            };
            let (instr, next) = match decoded {
                Ok(decoded) => decoded,
                Err(err) => return Err(self.fault(segment, pc, err.into())),
            };
            if let Some(frame) = self.frames.last_mut() {
                frame.pc = next;
            }
            trace!("{segment}:{pc:06} {instr}");

            match self.step(instr, segment) {
                Ok(Flow::Next) => {}
                Ok(Flow::Exit(value)) => return Ok(value),
                Err(err) => return Err(self.fault(segment, pc, err)),
            }
            if let Some(err) = self.failure.take() {
                return Err(self.fault(segment, pc, err));
            }
            if self.heap.needs_collection() {
                self.collect_garbage();
            }
        }
    }

    /// Record where `err` happened, unless a nested run already did.
    fn fault(&mut self, segment: usize, pc: usize, err: RuntimeError) -> RuntimeError {
        if self.error_location.is_none() {
            self.error_location = self.segments[segment].location(pc);
        }
        err
    }

    fn step(&mut self, instr: Instruction, segment: usize) -> Result<Flow, RuntimeError> {
        match instr {
            Instruction::Quit => {
                // ends the whole segment, even from inside a function
                while self.pop_frame()?.kind != FrameKind::Segment {}
                return Ok(Flow::Exit(self.null()));
            }
            Instruction::Nop => {}
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Dup => {
                let top = self.peek(0)?;
                self.stack.push(top);
            }
            Instruction::Dup2 => {
                self.require(2)?;
                let len = self.stack.len();
                self.stack.extend_from_within(len - 2..);
            }
            Instruction::Bury { depth } => {
                let depth = checked_count(Op::Bury, depth)?;
                self.require(depth.saturating_add(1))?;
                let top = self.pop()?;
                let at = self.stack.len() - depth;
                self.stack.insert(at, top);
            }
            Instruction::PushNull => self.stack.push(self.specials.null),
            Instruction::PushTrue => self.stack.push(self.specials.true_value),
            Instruction::PushFalse => self.stack.push(self.specials.false_value),
            Instruction::PushInt { value } => {
                let value = self.new_integer(value)?;
                self.stack.push(value);
            }
            Instruction::PushFloat { value } => {
                let value = self.new_float(value)?;
                self.stack.push(value);
            }
            Instruction::PushString { string } => {
                let data = Rc::clone(&self.segments[segment].data);
                let value = self.new_borrowed_string(&data, string)?;
                self.stack.push(value);
            }
            Instruction::PushVariable { name } => {
                let data = Rc::clone(&self.segments[segment].data);
                let name = read_str(&data, name)?;
                let value = self.lookup(segment, name).ok_or_else(|| {
                    RuntimeError::UndefinedVariable {
                        name: name.to_string(),
                    }
                })?;
                self.stack.push(value);
            }
            Instruction::PushArray { count } => {
                let count = checked_count(Op::PushArray, count)?;
                let items = self.pop_n(count)?;
                let value = self.new_array(items)?;
                self.stack.push(value);
            }
            Instruction::PushDictionary { count } => {
                let count = checked_count(Op::PushDictionary, count)?;
                let pairs = self.pop_n(count.saturating_mul(2))?;
                let mut dict = Dictionary::new();
                for pair in pairs.chunks_exact(2) {
                    let key = self.heap.body(pair[0]).as_str().ok_or_else(|| {
                        RuntimeError::TypeMismatch {
                            operation: "PUSH_DICTIONARY",
                            expected: "string".to_string(),
                            found: self.type_name(pair[0]).to_string(),
                        }
                    })?;
                    dict.insert(key, pair[1]);
                }
                let value = self.new_dictionary()?;
                *self.heap.body_mut(value) = Body::Dictionary(dict);
                self.stack.push(value);
            }
            Instruction::PushFunction { target } => {
                self.check_target(segment, target)?;
                let value = self.new_function(segment, target)?;
                self.stack.push(value);
            }
            Instruction::Assign { name } => {
                let data = Rc::clone(&self.segments[segment].data);
                let name = read_str(&data, name)?;
                let value = self.peek(0)?;
                self.assign(segment, name, value);
            }
            Instruction::Select => {
                let key = self.pop()?;
                let container = self.pop()?;
                let select = self.ops_of(container).select;
                let Some(select) = select else {
                    return Err(self.undefined("SELECT", container));
                };
                let value = select(self, container, key)?;
                self.stack.push(value);
            }
            Instruction::Insert => {
                let value = self.pop()?;
                let key = self.pop()?;
                let container = self.pop()?;
                let insert = self.ops_of(container).insert;
                let Some(insert) = insert else {
                    return Err(self.undefined("INSERT", container));
                };
                insert(self, container, key, value)?;
                self.stack.push(value);
            }
            Instruction::SelectAttribute { name } => {
                let data = Rc::clone(&self.segments[segment].data);
                let name = read_str(&data, name)?;
                let object = self.pop()?;
                let (value, _) = self.select_attribute(object, name)?;
                self.stack.push(value);
            }
            Instruction::InsertAttribute { name } => {
                let data = Rc::clone(&self.segments[segment].data);
                let name = read_str(&data, name)?;
                let value = self.pop()?;
                let object = self.pop()?;
                let insert_attr = self.ops_of(object).insert_attr;
                let Some(insert_attr) = insert_attr else {
                    return Err(self.undefined("INSERT_ATTRIBUTE", object));
                };
                insert_attr(self, object, name, value)?;
                self.stack.push(value);
            }
            Instruction::SelectAttributeAndRepush { name } => {
                let data = Rc::clone(&self.segments[segment].data);
                let name = read_str(&data, name)?;
                let object = self.pop()?;
                let (value, is_method) = self.select_attribute(object, name)?;
                self.stack.push(value);
                // a placeholder tells CALL there is no receiver to pass
                self.stack
                    .push(if is_method { object } else { Value::NULL_REF });
            }
            Instruction::Call { argc } => {
                let argc = checked_count(Op::Call, argc)?;
                self.call(argc)?;
            }
            Instruction::Return => {
                let value = self.pop()?;
                let frame = self.pop_frame()?;
                if frame.kind == FrameKind::Segment {
                    return Ok(Flow::Exit(value));
                }
                self.stack.push(value);
            }
            Instruction::Expect { argc } => {
                let pending = self.pending_argc.take().unwrap_or(0);
                if argc < 0 || pending as i64 != argc {
                    return Err(RuntimeError::ArgumentCount {
                        expected: argc.max(0) as usize,
                        got: pending,
                    });
                }
            }
            Instruction::JumpAbsolute { target } => {
                self.check_target(segment, target)?;
                self.jump(target);
            }
            Instruction::JumpIfFalseAndPop { target } => {
                self.check_target(segment, target)?;
                let condition = self.pop()?;
                if !self.is_truthy(condition)? {
                    self.jump(target);
                }
            }
            Instruction::VariableMapPush => self.scopes.push(Dictionary::new()),
            Instruction::VariableMapPop => {
                if self.scopes.len() <= self.scope_base() {
                    return Err(RuntimeError::ScopeUnderflow);
                }
                self.scopes.pop();
            }
            Instruction::Import => {
                let path = self.pop_path()?;
                let namespace = self.import(&path, segment)?;
                self.merge_namespace(segment, namespace)?;
            }
            Instruction::ImportAs { name } => {
                let data = Rc::clone(&self.segments[segment].data);
                let name = read_str(&data, name)?;
                let path = self.pop_path()?;
                let namespace = self.import(&path, segment)?;
                self.assign(segment, name, namespace);
            }
            Instruction::Operator(op) => self.operator(op)?,
        }
        Ok(Flow::Next)
    }

    // ── stack helpers ──────────────────────────────────────────────

    fn require(&self, needed: usize) -> Result<(), RuntimeError> {
        let available = self.stack.len() - self.stack_base();
        if available < needed {
            return Err(RuntimeError::StackUnderflow { needed, available });
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.require(1)?;
        Ok(self.stack.pop().unwrap_or(Value::NULL_REF))
    }

    fn peek(&self, depth: usize) -> Result<Value, RuntimeError> {
        self.require(depth + 1)?;
        Ok(self.stack[self.stack.len() - 1 - depth])
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, RuntimeError> {
        self.require(count)?;
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }

    fn stack_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.stack_base)
    }

    fn scope_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.scope_base)
    }

    fn pop_frame(&mut self) -> Result<Frame, RuntimeError> {
        let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow {
            needed: 1,
            available: 0,
        })?;
        self.stack.truncate(frame.stack_base);
        self.scopes.truncate(frame.scope_base);
        Ok(frame)
    }

    fn pop_path(&mut self) -> Result<String, RuntimeError> {
        let path = self.pop()?;
        match self.heap.body(path).as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(RuntimeError::TypeMismatch {
                operation: "IMPORT",
                expected: "string".to_string(),
                found: self.type_name(path).to_string(),
            }),
        }
    }

    fn check_target(&self, segment: usize, target: u32) -> Result<(), RuntimeError> {
        if target as usize >= self.segments[segment].code.len() {
            return Err(RuntimeError::InvalidJump { target });
        }
        Ok(())
    }

    fn jump(&mut self, target: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = target as usize;
        }
    }

    // ── variables ──────────────────────────────────────────────────

    /// Innermost scope of the current frame, then the segment's globals,
    /// then the builtins.
    fn lookup(&self, segment: usize, name: &str) -> Option<Value> {
        if self.scopes.len() > self.scope_base() {
            if let Some(value) = self.scopes.last().and_then(|s| s.get(name)) {
                return Some(value);
            }
        }
        let globals = self.segments[segment].globals;
        self.dictionary_get(globals, name)
            .or_else(|| self.dictionary_get(self.builtins, name))
    }

    /// Write to the innermost scope of the current frame, or to the
    /// segment's globals when the frame has none.
    pub(crate) fn assign(&mut self, segment: usize, name: &str, value: Value) {
        if self.scopes.len() > self.scope_base() {
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(name, value);
                return;
            }
        }
        let globals = self.segments[segment].globals;
        if let Body::Dictionary(dict) = self.heap.body_mut(globals) {
            dict.insert(name, value);
        }
    }

    // ── dispatch ───────────────────────────────────────────────────

    fn ops_of(&self, value: Value) -> crate::types::TypeOps {
        let ty = self.heap.type_of(value);
        self.heap.type_object(ty).ops
    }

    fn undefined(&self, operation: &'static str, value: Value) -> RuntimeError {
        RuntimeError::UndefinedOperation {
            operation,
            type_name: self.type_name(value).to_string(),
        }
    }

    /// Resolve `object.name`: the type's attribute hook first, then its
    /// method dictionary. The flag is set when the value is a method.
    fn select_attribute(
        &mut self,
        object: Value,
        name: &str,
    ) -> Result<(Value, bool), RuntimeError> {
        if let Some(select_attr) = self.ops_of(object).select_attr {
            if let Some(value) = select_attr(self, object, name)? {
                return Ok((value, false));
            }
        }
        let ty = self.heap.type_of(object);
        let methods = self.heap.type_object(ty).methods;
        if !methods.is_null_ref() {
            if let Some(method) = self.dictionary_get(methods, name) {
                return Ok((method, true));
            }
        }
        Err(RuntimeError::NoAttribute {
            type_name: self.type_name(object).to_string(),
            name: name.to_string(),
        })
    }

    /// `CALL argc`: the callee sits `argc` slots below the top.
    fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        self.require(argc + 1)?;
        let callee_slot = self.stack.len() - argc - 1;
        let mut argc = argc;
        if argc > 0 && self.stack[callee_slot + 1].is_null_ref() {
            self.stack.remove(callee_slot + 1);
            argc -= 1;
        }
        let callee = self.stack[callee_slot];

        match self.heap.body(callee) {
            Body::Function(function) => {
                let function = *function;
                if self.frames.len() >= self.settings().max_frames {
                    return Err(RuntimeError::StackOverflow {
                        depth: self.frames.len(),
                    });
                }
                self.frames.push(Frame {
                    segment: function.segment,
                    pc: function.offset as usize,
                    kind: FrameKind::Function,
                    stack_base: callee_slot,
                    scope_base: self.scopes.len(),
                });
                self.pending_argc = Some(argc);
            }
            Body::NativeFunction(native) => {
                let native = *native;
                match native.arity {
                    Some(arity) if arity != argc => {
                        return Err(RuntimeError::ArgumentCount {
                            expected: arity,
                            got: argc,
                        });
                    }
                    _ => {}
                }
                let args = self.stack[callee_slot + 1..].to_vec();
                let result = (native.func)(self, &args)?;
                self.stack.truncate(callee_slot);
                self.stack.push(if result.is_null_ref() {
                    self.specials.null
                } else {
                    result
                });
            }
            _ => {
                return Err(RuntimeError::NotCallable {
                    type_name: self.type_name(callee).to_string(),
                });
            }
        }
        Ok(())
    }

    fn operator(&mut self, op: Op) -> Result<(), RuntimeError> {
        match op {
            Op::Not => {
                let value = self.pop()?;
                let truthy = self.is_truthy(value)?;
                self.stack.push(self.boolean(!truthy));
            }
            Op::Pos | Op::Neg | Op::Inv | Op::Inc | Op::Dec => {
                let value = self.pop()?;
                let Some(apply) = self.ops_of(value).unary(op) else {
                    return Err(self.undefined(op.mnemonic(), value));
                };
                let result = apply(self, value)?;
                self.stack.push(result);
            }
            _ => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                if self.heap.type_of(lhs) != self.heap.type_of(rhs) {
                    return Err(RuntimeError::TypeMismatch {
                        operation: op.mnemonic(),
                        expected: self.type_name(lhs).to_string(),
                        found: self.type_name(rhs).to_string(),
                    });
                }
                let Some(apply) = self.ops_of(lhs).binary(op) else {
                    return Err(self.undefined(op.mnemonic(), lhs));
                };
                let result = apply(self, lhs, rhs)?;
                self.stack.push(result);
            }
        }
        Ok(())
    }
}

/// A count operand as a length; negative counts are malformed code.
fn checked_count(op: Op, count: i64) -> Result<usize, RuntimeError> {
    usize::try_from(count).map_err(|_| RuntimeError::InvalidOperand { op, value: count })
}

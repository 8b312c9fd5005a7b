//! AST → segment image.
//!
//! A single pass over the tree. The top level is block 0 of the code
//! builder; every function literal is compiled into a fresh block, so its
//! body is laid out after the code that creates it. Forward targets (loop
//! exits, `else` joins, function bodies) are labels patched by
//! [`CodeBuilder::finish`].

use bytecode::{BuildError, CodeBuilder, DataBuilder, Image, Label, Op};
use parser::{
    Argument, BinaryOp, Expr, ExprKind, IncDecOp, LogicalOp, Program, Span,
    Stmt, StmtKind, UnaryOp,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
}

impl CompileError {
    fn new(msg: impl Into<String>, span: Span) -> Self {
        Self {
            message: msg.into(),
            span: Some(span),
        }
    }

    fn no_span(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            span: None,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(span) = &self.span {
            write!(
                f,
                "{}:{}: {}",
                span.start.line, span.start.column, self.message
            )
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for CompileError {}

impl From<BuildError> for CompileError {
    fn from(err: BuildError) -> Self {
        Self::no_span(err.to_string())
    }
}

/// Compile a whole program into one segment image.
pub fn compile(program: &Program) -> Result<Image, CompileError> {
    let mut compiler = Compiler::new();
    for stmt in &program.body {
        compiler.statement(stmt)?;
    }
    compiler.code.mark(program.span.end.offset as u32, 0);
    compiler.code.emit(Op::Quit);
    compiler.finish()
}

#[derive(Debug, Clone, Copy)]
struct LoopLabels {
    continue_to: Label,
    break_to: Label,
}

struct Compiler {
    code: CodeBuilder,
    data: DataBuilder,
    /// Enclosing loops of the function being compiled, innermost last.
    loops: Vec<LoopLabels>,
    /// Function literals enclosing the current position.
    depth: usize,
}

impl Compiler {
    fn new() -> Self {
        Self {
            code: CodeBuilder::new(),
            data: DataBuilder::new(),
            loops: Vec::new(),
            depth: 0,
        }
    }

    fn finish(self) -> Result<Image, CompileError> {
        let (code, source_map) = self.code.finish()?;
        Ok(Image {
            code,
            data: self.data.into_bytes(),
            source_map,
        })
    }

    fn mark(&mut self, span: Span) {
        self.code.mark(span.offset() as u32, span.len() as u32);
    }

    fn intern(&mut self, s: &str, span: Span) -> Result<u32, CompileError> {
        self.data
            .intern(s)
            .map_err(|err| CompileError::new(err.to_string(), span))
    }

    fn emit_named(
        &mut self,
        op: Op,
        name: &str,
        span: Span,
    ) -> Result<(), CompileError> {
        let offset = self.intern(name, span)?;
        self.code.emit_string(op, offset);
        Ok(())
    }

    // ── statements ─────────────────────────────────────────────────

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Break => {
                let Some(labels) = self.loops.last().copied() else {
                    return Err(CompileError::new("break outside of a loop", stmt.span));
                };
                self.mark(stmt.span);
                self.code.emit_label(Op::JumpAbsolute, labels.break_to);
            }
            StmtKind::Continue => {
                let Some(labels) = self.loops.last().copied() else {
                    return Err(CompileError::new(
                        "continue outside of a loop",
                        stmt.span,
                    ));
                };
                self.mark(stmt.span);
                self.code.emit_label(Op::JumpAbsolute, labels.continue_to);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.expression(expr)?,
                    None => self.code.emit(Op::PushNull),
                }
                self.mark(stmt.span);
                if self.depth > 0 {
                    self.code.emit(Op::VariableMapPop);
                }
                self.code.emit(Op::Return);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition)?;
                let otherwise = self.code.new_label();
                self.mark(condition.span);
                self.code.emit_label(Op::JumpIfFalseAndPop, otherwise);
                self.statement(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let end = self.code.new_label();
                        self.code.emit_label(Op::JumpAbsolute, end);
                        self.code.bind(otherwise);
                        self.statement(else_branch)?;
                        self.code.bind(end);
                    }
                    None => self.code.bind(otherwise),
                }
            }
            StmtKind::While { condition, body } => {
                let top = self.code.label_here();
                let end = self.code.new_label();
                self.expression(condition)?;
                self.mark(condition.span);
                self.code.emit_label(Op::JumpIfFalseAndPop, end);
                self.loops.push(LoopLabels {
                    continue_to: top,
                    break_to: end,
                });
                let body = self.statement(body);
                self.loops.pop();
                body?;
                self.code.emit_label(Op::JumpAbsolute, top);
                self.code.bind(end);
            }
            StmtKind::Import { path, alias } => {
                self.expression(path)?;
                self.mark(stmt.span);
                match alias {
                    Some(alias) => self.emit_named(Op::ImportAs, &alias.name, alias.span)?,
                    None => self.code.emit(Op::Import),
                }
            }
            StmtKind::Compound(body) => {
                for stmt in body {
                    self.statement(stmt)?;
                }
            }
            StmtKind::Expr(expr) => {
                self.expression(expr)?;
                self.code.emit(Op::Pop);
            }
        }
        Ok(())
    }

    // ── expressions ────────────────────────────────────────────────

    fn expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Integer(value) => {
                self.code.emit_int(Op::PushInt, *value);
            }
            ExprKind::Float(value) => {
                self.code.emit_float(Op::PushFloat, *value);
            }
            ExprKind::String(s) => self.emit_named(Op::PushString, s, span)?,
            ExprKind::True => self.code.emit(Op::PushTrue),
            ExprKind::False => self.code.emit(Op::PushFalse),
            ExprKind::Null => self.code.emit(Op::PushNull),
            ExprKind::Ident(name) => {
                self.mark(span);
                self.emit_named(Op::PushVariable, name, span)?;
            }
            ExprKind::Unary { op, operand } => {
                self.expression(operand)?;
                self.mark(span);
                self.code.emit(unary_op(*op));
            }
            ExprKind::Binary { op, left, right } => {
                self.expression(left)?;
                self.expression(right)?;
                self.mark(span);
                self.code.emit(binary_op(*op));
            }
            ExprKind::Logical { op, left, right } => {
                self.logical(*op, left, right)?;
            }
            ExprKind::IncDec { op, prefix, target } => {
                let op = match op {
                    IncDecOp::Inc => Op::Inc,
                    IncDecOp::Dec => Op::Dec,
                };
                let keep = if *prefix { Keep::Stored } else { Keep::Read };
                self.update(target, span, keep, |c| {
                    c.code.emit(op);
                    Ok(())
                })?;
            }
            ExprKind::Assign { op, target, value } => match op.binary() {
                None => self.assign(target, value, span)?,
                Some(binary) => self.update(target, span, Keep::Stored, |c| {
                    c.expression(value)?;
                    c.mark(span);
                    c.code.emit(binary_op(binary));
                    Ok(())
                })?,
            },
            ExprKind::Index { object, index } => {
                self.expression(object)?;
                self.expression(index)?;
                self.mark(span);
                self.code.emit(Op::Select);
            }
            ExprKind::Attribute { object, name } => {
                self.expression(object)?;
                self.mark(span);
                self.emit_named(Op::SelectAttribute, &name.name, name.span)?;
            }
            ExprKind::Call { callee, args } => {
                let mut argc = args.len() as i64;
                if let ExprKind::Attribute { object, name } = &callee.kind {
                    self.expression(object)?;
                    self.mark(callee.span);
                    self.emit_named(
                        Op::SelectAttributeAndRepush,
                        &name.name,
                        name.span,
                    )?;
                    argc += 1;
                } else {
                    self.expression(callee)?;
                }
                for arg in args {
                    self.expression(arg)?;
                }
                self.mark(span);
                self.code.emit_int(Op::Call, argc);
            }
            ExprKind::Array(items) => {
                for item in items {
                    self.expression(item)?;
                }
                self.mark(span);
                self.code.emit_int(Op::PushArray, items.len() as i64);
            }
            ExprKind::Dict(items) => {
                for item in items {
                    self.emit_named(Op::PushString, &item.key, item.span)?;
                    self.expression(&item.value)?;
                }
                self.mark(span);
                self.code.emit_int(Op::PushDictionary, items.len() as i64);
            }
            ExprKind::Function { params, body } => {
                let entry = self.code.new_label();
                self.code.emit_label(Op::PushFunction, entry);

                let block = self.code.new_block();
                let outer = self.code.switch_to(block);
                let outer_loops = std::mem::take(&mut self.loops);
                self.depth += 1;

                let result = self.function_body(entry, params, body, span);

                self.depth -= 1;
                self.loops = outer_loops;
                self.code.switch_to(outer);
                result?;
            }
        }
        Ok(())
    }

    fn function_body(
        &mut self,
        entry: Label,
        params: &[Argument],
        body: &[Stmt],
        span: Span,
    ) -> Result<(), CompileError> {
        self.code.bind(entry);
        self.mark(span);
        self.code.emit_int(Op::Expect, params.len() as i64);
        self.code.emit(Op::VariableMapPush);
        // arguments sit on the stack in order; the last one is on top
        for param in params.iter().rev() {
            self.emit_named(Op::Assign, &param.name, param.span)?;
            self.code.emit(Op::Pop);
        }
        for stmt in body {
            self.statement(stmt)?;
        }
        self.code.mark(span.end.offset as u32, 0);
        self.code.emit(Op::VariableMapPop);
        self.code.emit(Op::PushNull);
        self.code.emit(Op::Return);
        Ok(())
    }

    /// `a && b` and `a || b`, always yielding a boolean.
    fn logical(
        &mut self,
        op: LogicalOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), CompileError> {
        let falsy = self.code.new_label();
        let end = self.code.new_label();
        self.expression(left)?;
        match op {
            LogicalOp::And => {
                self.code.emit_label(Op::JumpIfFalseAndPop, falsy);
            }
            LogicalOp::Or => {
                let next = self.code.new_label();
                self.code.emit_label(Op::JumpIfFalseAndPop, next);
                self.code.emit(Op::PushTrue);
                self.code.emit_label(Op::JumpAbsolute, end);
                self.code.bind(next);
            }
        }
        self.expression(right)?;
        self.code.emit_label(Op::JumpIfFalseAndPop, falsy);
        self.code.emit(Op::PushTrue);
        self.code.emit_label(Op::JumpAbsolute, end);
        self.code.bind(falsy);
        self.code.emit(Op::PushFalse);
        self.code.bind(end);
        Ok(())
    }

    /// `target = value`, leaving the value on the stack.
    fn assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        match &target.kind {
            ExprKind::Ident(name) => {
                self.expression(value)?;
                self.mark(span);
                self.emit_named(Op::Assign, name, target.span)?;
            }
            ExprKind::Index { object, index } => {
                self.expression(object)?;
                self.expression(index)?;
                self.expression(value)?;
                self.mark(span);
                self.code.emit(Op::Insert);
            }
            ExprKind::Attribute { object, name } => {
                self.expression(object)?;
                self.expression(value)?;
                self.mark(span);
                self.emit_named(Op::InsertAttribute, &name.name, name.span)?;
            }
            _ => return Err(CompileError::new("invalid assignment target", target.span)),
        }
        Ok(())
    }

    /// Read `target`, transform the value with `apply`, store it back.
    /// `keep` picks which of the two values is left on the stack.
    fn update(
        &mut self,
        target: &Expr,
        span: Span,
        keep: Keep,
        apply: impl FnOnce(&mut Self) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        // entries under the read value that the store consumes
        let operands = match &target.kind {
            ExprKind::Ident(name) => {
                self.mark(target.span);
                self.emit_named(Op::PushVariable, name, target.span)?;
                0
            }
            ExprKind::Index { object, index } => {
                self.expression(object)?;
                self.expression(index)?;
                self.code.emit(Op::Dup2);
                self.mark(target.span);
                self.code.emit(Op::Select);
                2
            }
            ExprKind::Attribute { object, name } => {
                self.expression(object)?;
                self.code.emit(Op::Dup);
                self.mark(target.span);
                self.emit_named(Op::SelectAttribute, &name.name, name.span)?;
                1
            }
            _ => return Err(CompileError::new("invalid assignment target", target.span)),
        };

        self.mark(span);
        if keep == Keep::Read {
            self.code.emit(Op::Dup);
            if operands > 0 {
                self.code.emit_int(Op::Bury, operands + 1);
            }
        }
        apply(self)?;
        match &target.kind {
            ExprKind::Ident(name) => self.emit_named(Op::Assign, name, target.span)?,
            ExprKind::Index { .. } => self.code.emit(Op::Insert),
            ExprKind::Attribute { name, .. } => {
                self.emit_named(Op::InsertAttribute, &name.name, name.span)?
            }
            _ => unreachable!("target checked above"),
        }
        if keep == Keep::Read {
            self.code.emit(Op::Pop);
        }
        Ok(())
    }
}

/// Result of a read-modify-write: the value read or the value stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keep {
    Read,
    Stored,
}

fn unary_op(op: UnaryOp) -> Op {
    match op {
        UnaryOp::Pos => Op::Pos,
        UnaryOp::Neg => Op::Neg,
        UnaryOp::Not => Op::Not,
        UnaryOp::Inv => Op::Inv,
    }
}

fn binary_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::Eql => Op::Eql,
        BinaryOp::Nql => Op::Nql,
        BinaryOp::Lss => Op::Lss,
        BinaryOp::Grt => Op::Grt,
        BinaryOp::Leq => Op::Leq,
        BinaryOp::Geq => Op::Geq,
        BinaryOp::And => Op::And,
        BinaryOp::Or => Op::Or,
        BinaryOp::Xor => Op::Xor,
        BinaryOp::Shl => Op::Shl,
        BinaryOp::Shr => Op::Shr,
    }
}

#[cfg(test)]
mod tests {
    use bytecode::{BytecodeDecoder, Instruction};

    use super::*;

    fn compile_src(src: &str) -> Image {
        let program = parser::parse(src).expect("parses");
        compile(&program).expect("compiles")
    }

    fn instructions(src: &str) -> Vec<Instruction> {
        let image = compile_src(src);
        BytecodeDecoder::new(&image.code)
            .map(|item| item.expect("decodes").1)
            .collect()
    }

    fn ops(src: &str) -> Vec<Op> {
        instructions(src).iter().map(Instruction::op).collect()
    }

    fn compile_err(src: &str) -> CompileError {
        let program = parser::parse(src).expect("parses");
        compile(&program).expect_err("should not compile")
    }

    #[test]
    fn operators_follow_precedence() {
        assert_eq!(ops("return 1 + 2 * 3;"), vec![
            Op::PushInt,
            Op::PushInt,
            Op::PushInt,
            Op::Mul,
            Op::Add,
            Op::Return,
            Op::Quit,
        ]);
    }

    #[test]
    fn expression_statements_pop() {
        assert_eq!(ops("x = 5;"), vec![
            Op::PushInt,
            Op::Assign,
            Op::Pop,
            Op::Quit
        ]);
    }

    #[test]
    fn compound_assignment_forms() {
        assert_eq!(ops("x += 1;"), vec![
            Op::PushVariable,
            Op::PushInt,
            Op::Add,
            Op::Assign,
            Op::Pop,
            Op::Quit,
        ]);
        assert_eq!(ops("a[0] *= 2;"), vec![
            Op::PushVariable,
            Op::PushInt,
            Op::Dup2,
            Op::Select,
            Op::PushInt,
            Op::Mul,
            Op::Insert,
            Op::Pop,
            Op::Quit,
        ]);
        assert_eq!(ops("a.b -= 2;"), vec![
            Op::PushVariable,
            Op::Dup,
            Op::SelectAttribute,
            Op::PushInt,
            Op::Sub,
            Op::InsertAttribute,
            Op::Pop,
            Op::Quit,
        ]);
    }

    #[test]
    fn postfix_increment_keeps_the_read_value() {
        assert_eq!(ops("x++;"), vec![
            Op::PushVariable,
            Op::Dup,
            Op::Inc,
            Op::Assign,
            Op::Pop,
            Op::Pop,
            Op::Quit,
        ]);
        assert_eq!(ops("a[0]--;"), vec![
            Op::PushVariable,
            Op::PushInt,
            Op::Dup2,
            Op::Select,
            Op::Dup,
            Op::Bury,
            Op::Dec,
            Op::Insert,
            Op::Pop,
            Op::Pop,
            Op::Quit,
        ]);
        assert_eq!(instructions("a[0]--;")[5], Instruction::Bury { depth: 3 });
        assert_eq!(instructions("a.n++;")[4], Instruction::Bury { depth: 2 });
        assert_eq!(ops("--x;"), vec![
            Op::PushVariable,
            Op::Dec,
            Op::Assign,
            Op::Pop,
            Op::Quit,
        ]);
    }

    #[test]
    fn method_calls_repush_the_receiver() {
        let code = instructions("a.b(1);");
        assert_eq!(code[1..4].iter().map(Instruction::op).collect::<Vec<_>>(), vec![
            Op::SelectAttributeAndRepush,
            Op::PushInt,
            Op::Call,
        ]);
        assert_eq!(instructions("a.b(1);")[3], Instruction::Call { argc: 2 });
        assert_eq!(instructions("f(1, 2);")[3], Instruction::Call { argc: 2 });
    }

    #[test]
    fn function_body_is_laid_out_after_top_level() {
        let code = instructions("f = function(a, b) { return a; };");
        assert_eq!(code.iter().map(Instruction::op).collect::<Vec<_>>(), vec![
            Op::PushFunction,
            Op::Assign,
            Op::Pop,
            Op::Quit,
            Op::Expect,
            Op::VariableMapPush,
            Op::Assign,
            Op::Pop,
            Op::Assign,
            Op::Pop,
            Op::PushVariable,
            Op::VariableMapPop,
            Op::Return,
            Op::VariableMapPop,
            Op::PushNull,
            Op::Return,
        ]);
        // PUSH_FUNCTION(8) ASSIGN(8) POP(4) QUIT(4)
        assert_eq!(code[0], Instruction::PushFunction { target: 24 });
        assert_eq!(code[4], Instruction::Expect { argc: 2 });
    }

    #[test]
    fn while_loop_jumps() {
        let code = instructions("while (x) { break; continue; }");
        assert_eq!(code[0], Instruction::PushVariable { name: 0 });
        // PUSH_VARIABLE(8) JIFAP(8) JUMP(8) JUMP(8) JUMP(8) → end at 40
        assert_eq!(code[1], Instruction::JumpIfFalseAndPop { target: 40 });
        assert_eq!(code[2], Instruction::JumpAbsolute { target: 40 });
        assert_eq!(code[3], Instruction::JumpAbsolute { target: 0 });
        assert_eq!(code[4], Instruction::JumpAbsolute { target: 0 });
        assert_eq!(code[5], Instruction::Quit);
    }

    #[test]
    fn logical_operators_yield_booleans() {
        let and = ops("a && b;");
        assert_eq!(and.iter().filter(|&&op| op == Op::JumpIfFalseAndPop).count(), 2);
        assert!(and.contains(&Op::PushTrue) && and.contains(&Op::PushFalse));
        let or = ops("a || b;");
        assert_eq!(or.iter().filter(|&&op| op == Op::PushTrue).count(), 2);
    }

    #[test]
    fn imports_lower_to_import_ops() {
        assert_eq!(ops(r#"import "m.tn";"#), vec![Op::PushString, Op::Import, Op::Quit]);
        assert_eq!(ops(r#"import "m.tn" as m;"#), vec![
            Op::PushString,
            Op::ImportAs,
            Op::Quit
        ]);
    }

    #[test]
    fn dictionary_literal_pushes_key_value_pairs() {
        assert_eq!(instructions("d = {a: 1, b: 2};")[4], Instruction::PushDictionary { count: 2 });
    }

    #[test]
    fn strings_are_interned_once() {
        let image = compile_src(r#"a = "s"; b = "s"; c = "s";"#);
        // the value is compiled before the name it is assigned to
        assert_eq!(bytecode::read_str(&image.data, 0).unwrap(), "s");
        let count = image.data.iter().filter(|&&b| b == 0).count();
        assert_eq!(count, 4, "s, a, b, c");
    }

    #[test]
    fn loop_control_outside_loops_is_rejected() {
        let err = compile_err("break;");
        assert_eq!(err.message, "break outside of a loop");
        assert_eq!(err.to_string(), "1:1: break outside of a loop");
        // loop labels do not leak into nested functions
        let err = compile_err("while (true) { f = function() { continue; }; }");
        assert_eq!(err.message, "continue outside of a loop");
    }

    #[test]
    fn nul_in_string_constant_is_a_compile_error() {
        let err = compile_err(r#"x = "a\0b";"#);
        assert!(err.message.contains("NUL"));
        assert!(err.span.is_some());
    }

    #[test]
    fn source_map_points_at_the_operator() {
        let image = compile_src("x = 1;\ny = x + z;");
        let code: Vec<(usize, Instruction)> = BytecodeDecoder::new(&image.code)
            .map(|item| item.unwrap())
            .collect();
        let (add_pc, _) = code
            .iter()
            .find(|(_, instr)| instr.op() == Op::Add)
            .copied()
            .unwrap();
        let (start, len) = image.source_map.lookup(add_pc as u32).unwrap();
        assert_eq!(&"x = 1;\ny = x + z;"[start as usize..(start + len) as usize], "x + z");
    }
}

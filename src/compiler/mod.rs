//! AST to bytecode.
//!
//! Code generation emits jumps against labels and `Fn` against function-table
//! indices; `link` rewrites both to absolute offsets once every body has been
//! placed. Each expression leaves exactly one value on the stack.

use crate::ast::{BinOp, Branch, Expr, FnLit, Literal, Program, Span, UnaryOp};
use crate::chunk::{Chunk, FunctionInfo, Op};
use crate::object::Library;
use crate::resolver::{self, ResolveError, Resolution};

pub mod function_table;
pub mod labels;
pub mod link;

pub use function_table::FunctionTable;
pub use labels::{Label, LabelTable};
pub use link::link;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("jump at offset {offset} refers to label {label}, which was never placed")]
    UnsetLabel { label: u32, offset: usize },
    #[error("function {index} referenced at offset {offset} has no entry offset")]
    UnlinkedFunction { index: u32, offset: usize },
    #[error("function literal is missing from the function table")]
    UnknownFunction { span: Span },
    #[error("undecodable word {word} at offset {offset}")]
    BadOpcode { word: u32, offset: usize },
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Resolve(e) => e.code(),
            _ => "B-C001",
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Resolve(e) => Some(e.span()),
            CompileError::UnknownFunction { span } => Some(*span),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, CompileError>;

struct Compiler<'a> {
    lib: &'a Library,
    chunk: Chunk,
    labels: LabelTable,
    functions: FunctionTable<'a>,
    resolution: Resolution,
}

impl<'a> Compiler<'a> {
    fn new(program: &'a Program, lib: &'a Library, resolution: Resolution) -> Self {
        Compiler {
            lib,
            chunk: Chunk::new(),
            labels: LabelTable::new(),
            functions: FunctionTable::build(program),
            resolution,
        }
    }

    // ── Emission helpers ──────────────────────────────────────────────

    fn emit(&mut self, op: Op) -> usize {
        self.chunk.emit(op)
    }

    fn emit_at(&mut self, op: Op, span: Span) {
        let offset = self.chunk.emit(op);
        self.chunk.mark(offset, span);
    }

    fn emit_number(&mut self, n: f64) {
        let k = self.chunk.add_const(self.lib.number(n));
        self.chunk.emit_with(Op::Const, k);
    }

    fn emit_string(&mut self, s: &str) {
        let k = self.chunk.add_const(self.lib.string(s));
        self.chunk.emit_with(Op::Const, k);
    }

    fn emit_jump(&mut self, op: Op, label: Label) {
        self.chunk.emit_with(op, label.0);
    }

    fn place(&mut self, label: Label) {
        self.labels.set(label, self.chunk.len());
    }

    // ── Program layout ────────────────────────────────────────────────

    /// Top-level code, `Halt`, then every function body back to back in
    /// function-table order.
    fn program(&mut self, program: &'a Program) -> Result<()> {
        for expr in &program.body {
            self.expr(expr)?;
            self.emit(Op::Discard);
        }
        self.emit(Op::Halt);

        for index in 0..self.functions.len() {
            let Some(f) = self.functions.get(index) else { break };
            let entry = self.chunk.len();
            self.functions.set_offset(index, entry);
            self.function(f)?;
            self.chunk.add_function(FunctionInfo {
                name: f.name.clone(),
                params: f.params.len(),
                locals: self.resolution.locals(f.id).unwrap_or(f.params.len()),
                entry,
            });
        }
        Ok(())
    }

    /// Arity preamble, parameter binding, body, `Return`.
    ///
    /// On entry the stack holds the arguments and then their count. Extra
    /// arguments are dropped from the top and missing ones padded with Null
    /// until exactly `params` remain; the count is discarded and the
    /// parameters are bound last-first.
    fn function(&mut self, f: &'a FnLit) -> Result<()> {
        let params = f.params.len() as f64;
        let drop = self.labels.new_label();
        let pad = self.labels.new_label();
        let bind = self.labels.new_label();

        self.place(drop);
        self.emit(Op::Dup);
        self.emit_number(params);
        self.emit(Op::Gt);
        self.emit_jump(Op::JumpFalsy, pad);
        self.emit(Op::Switch);
        self.emit(Op::Discard);
        self.emit_number(1.0);
        self.emit(Op::Sub);
        self.emit_jump(Op::Jump, drop);

        self.place(pad);
        if !f.params.is_empty() {
            self.emit(Op::Dup);
            self.emit_number(params);
            self.emit(Op::Lt);
            self.emit_jump(Op::JumpFalsy, bind);
            self.emit(Op::Null);
            self.emit(Op::Switch);
            self.emit_number(1.0);
            self.emit(Op::Add);
            self.emit_jump(Op::Jump, pad);
        }

        self.place(bind);
        self.emit(Op::Discard);
        for param in f.params.iter().rev() {
            self.emit_string(&param.name);
            self.emit(Op::CreateVar);
            self.emit(Op::Discard);
        }

        self.block(&f.body)?;
        self.emit(Op::Return);
        Ok(())
    }

    // ── Expressions ───────────────────────────────────────────────────

    fn block(&mut self, body: &'a [Expr]) -> Result<()> {
        self.emit(Op::StartBlock);
        self.sequence(body)?;
        self.emit(Op::EndBlock);
        Ok(())
    }

    /// Value of the last expression, Null when empty.
    fn sequence(&mut self, body: &'a [Expr]) -> Result<()> {
        let Some((last, init)) = body.split_last() else {
            self.emit(Op::Null);
            return Ok(());
        };
        for expr in init {
            self.expr(expr)?;
            self.emit(Op::Discard);
        }
        self.expr(last)
    }

    fn expr(&mut self, expr: &'a Expr) -> Result<()> {
        match expr {
            Expr::Literal(lit) => self.literal(lit)?,
            Expr::Ident(ident) => {
                self.emit_string(&ident.name);
                self.emit(Op::GetVar);
            }
            Expr::Assign { target, value } => {
                self.expr(value)?;
                self.emit_string(&target.name);
                self.emit(Op::SetVar);
            }
            Expr::AssignIndex { object, index, value, span } => {
                self.expr(object)?;
                self.expr(index)?;
                self.expr(value)?;
                self.emit_at(Op::SetProp, *span);
            }
            Expr::AssignMember { object, name, value, span } => {
                self.expr(object)?;
                self.emit_string(name);
                self.expr(value)?;
                self.emit_at(Op::SetProp, *span);
            }
            Expr::Block(body) => self.block(body)?,
            Expr::Call { callee, args, span } => self.call(callee, args, *span)?,
            Expr::If { branches, otherwise } => self.branches(branches, otherwise.as_deref())?,
            Expr::Function(f) => {
                let index = self.functions.index(f).ok_or(CompileError::UnknownFunction { span: f.span })?;
                self.chunk.emit_with(Op::Fn, index as u32);
            }
            Expr::Index { object, index, span } => {
                self.expr(object)?;
                self.expr(index)?;
                self.emit_at(Op::GetProp, *span);
            }
            Expr::Member { object, name, span } => {
                self.expr(object)?;
                self.emit_string(name);
                self.emit_at(Op::GetProp, *span);
            }
            Expr::Binary { op: BinOp::And, left, right, .. } => self.logical(Op::JumpFalsy, left, right)?,
            Expr::Binary { op: BinOp::Or, left, right, .. } => self.logical(Op::JumpTruthy, left, right)?,
            Expr::Binary { op, left, right, span } => {
                self.expr(left)?;
                self.expr(right)?;
                self.emit_at(binary_op(*op), *span);
            }
            Expr::Unary { op, operand, span } => {
                self.expr(operand)?;
                let op = match op {
                    UnaryOp::Negate => Op::Neg,
                    UnaryOp::Not => Op::Not,
                    UnaryOp::Beget => Op::Beget,
                };
                self.emit_at(op, *span);
            }
            Expr::SelfRef { span } => self.emit_at(Op::SelfRef, *span),
            Expr::Var { name, init } => {
                match init {
                    Some(init) => self.expr(init)?,
                    None => {
                        self.emit(Op::Null);
                    }
                }
                self.emit_string(&name.name);
                self.emit(Op::CreateVar);
            }
            Expr::While { guard, body } => {
                let start = self.labels.new_label();
                let end = self.labels.new_label();
                self.place(start);
                self.expr(guard)?;
                self.emit_jump(Op::JumpFalsy, end);
                self.block(body)?;
                self.emit(Op::Discard);
                self.emit_jump(Op::Jump, start);
                self.place(end);
                self.emit(Op::Null);
            }
            Expr::Write(args) => {
                for arg in args {
                    self.expr(arg)?;
                    self.emit(Op::Write);
                }
                self.emit(Op::Null);
            }
        }
        Ok(())
    }

    fn literal(&mut self, lit: &'a Literal) -> Result<()> {
        match lit {
            Literal::Null => {
                self.emit(Op::Null);
            }
            Literal::Bool(true) => {
                self.emit(Op::True);
            }
            Literal::Bool(false) => {
                self.emit(Op::False);
            }
            Literal::Number(n) => self.emit_number(*n),
            Literal::Text(s) => self.emit_string(s),
            Literal::Object(props) => {
                self.emit(Op::New);
                for (key, value) in props {
                    self.emit(Op::Dup);
                    self.emit_string(key);
                    self.expr(value)?;
                    self.emit(Op::SetProp);
                    self.emit(Op::Discard);
                }
            }
        }
        Ok(())
    }

    /// Arguments, their count, then the callee. A member or index callee is
    /// a method call: the object is pushed as receiver and the function is
    /// read off it.
    fn call(&mut self, callee: &'a Expr, args: &'a [Expr], span: Span) -> Result<()> {
        for arg in args {
            self.expr(arg)?;
        }
        self.emit_number(args.len() as f64);
        match callee {
            Expr::Member { object, name, .. } => {
                self.expr(object)?;
                self.emit(Op::Dup);
                self.emit_string(name);
                self.emit(Op::GetProp);
                self.emit_at(Op::CallMthd, span);
            }
            Expr::Index { object, index, .. } => {
                self.expr(object)?;
                self.emit(Op::Dup);
                self.expr(index)?;
                self.emit(Op::GetProp);
                self.emit_at(Op::CallMthd, span);
            }
            _ => {
                self.expr(callee)?;
                self.emit_at(Op::Call, span);
            }
        }
        Ok(())
    }

    /// `&&` and `||`: both sides are normalized to booleans and the right
    /// side only runs when the left does not decide the result.
    fn logical(&mut self, short_circuit: Op, left: &'a Expr, right: &'a Expr) -> Result<()> {
        let end = self.labels.new_label();
        self.expr(left)?;
        self.emit(Op::Truthy);
        self.emit(Op::Dup);
        self.emit_jump(short_circuit, end);
        self.emit(Op::Discard);
        self.expr(right)?;
        self.emit(Op::Truthy);
        self.place(end);
        Ok(())
    }

    fn branches(&mut self, branches: &'a [Branch], otherwise: Option<&'a [Expr]>) -> Result<()> {
        let Some((first, rest)) = branches.split_first() else {
            return match otherwise {
                Some(body) => self.block(body),
                None => {
                    self.emit(Op::Null);
                    Ok(())
                }
            };
        };
        let alternative = self.labels.new_label();
        let end = self.labels.new_label();

        self.expr(&first.condition)?;
        self.emit_jump(Op::JumpFalsy, alternative);
        self.block(&first.body)?;
        self.emit_jump(Op::Jump, end);

        self.place(alternative);
        if rest.is_empty() {
            self.branches(rest, otherwise)?;
        } else {
            self.emit(Op::StartBlock);
            self.branches(rest, otherwise)?;
            self.emit(Op::EndBlock);
        }
        self.place(end);
        Ok(())
    }
}

fn binary_op(op: BinOp) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Subtract => Op::Sub,
        BinOp::Multiply => Op::Mul,
        BinOp::Divide => Op::Div,
        BinOp::Modulo => Op::Mod,
        BinOp::Equals => Op::Eq,
        BinOp::NotEquals => Op::NotEq,
        BinOp::LessThan => Op::Lt,
        BinOp::LessOrEqual => Op::LtEq,
        BinOp::GreaterThan => Op::Gt,
        BinOp::GreaterOrEqual => Op::GtEq,
        // Short-circuit forms never reach here
        BinOp::And | BinOp::Or => Op::Truthy,
    }
}

/// Resolve names, generate code, and link. Constants are created through
/// `lib`, so the VM that runs the chunk must share it.
pub fn compile(program: &Program, lib: &Library) -> Result<Chunk> {
    let resolution = resolver::resolve(program, &Library::GLOBAL_NAMES)?;
    let mut compiler = Compiler::new(program, lib, resolution);
    compiler.program(program)?;

    let Compiler { chunk, labels, functions, .. } = compiler;
    let chunk = link(chunk, &labels, &functions)?;
    tracing::debug!(
        words = chunk.len(),
        constants = chunk.constants.len(),
        functions = chunk.functions().len(),
        labels = labels.len(),
        "compiled program"
    );
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Instr;
    use crate::lexer;
    use crate::object::Value;
    use crate::parser;

    fn parse_program(source: &str) -> Program {
        let tokens = lexer::lex(source).unwrap().into_iter().map(|(t, r)| (t, r.into())).collect();
        parser::parse(tokens).unwrap()
    }

    fn compile_src(source: &str) -> Chunk {
        let lib = Library::new();
        compile(&parse_program(source), &lib).unwrap()
    }

    fn ops(chunk: &Chunk) -> Vec<Op> {
        chunk.instructions().map(|i| i.op).collect()
    }

    fn find(chunk: &Chunk, op: Op) -> Vec<Instr> {
        chunk.instructions().filter(|i| i.op == op).collect()
    }

    #[test]
    fn top_level_discards_then_halts() {
        let chunk = compile_src("1 null");
        assert_eq!(ops(&chunk), vec![Op::Const, Op::Discard, Op::Null, Op::Discard, Op::Halt]);
    }

    #[test]
    fn empty_program_just_halts() {
        assert_eq!(ops(&compile_src("")), vec![Op::Halt]);
    }

    #[test]
    fn while_loop_offsets() {
        let chunk = compile_src("var i = 0 while i < 3 { i = i + 1 }");
        // var i = 0: Const Const CreateVar Discard -> guard starts at 6
        let falsy = find(&chunk, Op::JumpFalsy);
        let jumps = find(&chunk, Op::Jump);
        assert_eq!(falsy.len(), 1);
        assert_eq!(jumps.len(), 1);
        assert_eq!(jumps[0].operand, Some(6));
        assert_eq!(chunk.instr(6).map(|i| i.op), Some(Op::Const));

        let end = falsy[0].operand.unwrap() as usize;
        assert_eq!(end, jumps[0].offset + 2);
        assert_eq!(chunk.instr(end).map(|i| i.op), Some(Op::Null));
    }

    #[test]
    fn fn_operand_is_entry_offset() {
        let chunk = compile_src("var f = fn() { 1 } f()");
        let fns = find(&chunk, Op::Fn);
        assert_eq!(fns.len(), 1);
        let entry = fns[0].operand.unwrap() as usize;
        assert_eq!(chunk.functions()[0].entry, entry);
        assert_eq!(chunk.instr(entry).map(|i| i.op), Some(Op::Dup));
        let halt = find(&chunk, Op::Halt)[0].offset;
        assert_eq!(entry, halt + 1);
    }

    #[test]
    fn nested_functions_placed_in_preorder() {
        let chunk = compile_src("fn outer() { fn inner() { 2 } inner() } outer()");
        let infos = chunk.functions();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name.as_deref(), Some("outer"));
        assert_eq!(infos[1].name.as_deref(), Some("inner"));
        assert!(infos[0].entry < infos[1].entry);
        let inner_ref = find(&chunk, Op::Fn).into_iter().find(|i| i.operand == Some(infos[1].entry as u32));
        assert!(inner_ref.is_some());
    }

    #[test]
    fn code_walks_cleanly_and_targets_are_boundaries() {
        let src = r#"
            var o = { n: 1, greet: fn(x) { write(self.n, x) } }
            var i = 0
            while i < 2 && o.n { i = i + 1 }
            if i == 2 { o.greet("a") } else if i { 1 } else { 2 }
            write(i || null, -i, !i, beget o)
        "#;
        let chunk = compile_src(src);
        let boundaries: Vec<usize> = chunk.instructions().map(|i| i.offset).collect();
        let last = chunk.instructions().last().unwrap();
        assert_eq!(last.offset + last.op.width(), chunk.len());
        for instr in chunk.instructions() {
            if instr.op.is_jump() || instr.op == Op::Fn {
                let target = instr.operand.unwrap() as usize;
                assert!(boundaries.contains(&target), "{:?} targets {target}", instr);
            }
        }
    }

    #[test]
    fn zero_param_preamble_has_no_pad_loop() {
        let chunk = compile_src("fn f() { 1 }");
        let entry = chunk.functions()[0].entry;
        let body: Vec<Op> = chunk.instructions().filter(|i| i.offset >= entry).map(|i| i.op).collect();
        assert_eq!(
            body,
            vec![
                Op::Dup, Op::Const, Op::Gt, Op::JumpFalsy,
                Op::Switch, Op::Discard, Op::Const, Op::Sub, Op::Jump,
                Op::Discard,
                Op::StartBlock, Op::Const, Op::EndBlock, Op::Return,
            ]
        );
    }

    #[test]
    fn params_bound_last_first() {
        let lib = Library::new();
        let chunk = compile(&parse_program("fn f(a, b) { a }"), &lib).unwrap();
        let entry = chunk.functions()[0].entry;
        let bound: Vec<String> = chunk
            .instructions()
            .filter(|i| i.offset >= entry && i.op == Op::Const)
            .filter_map(|i| match chunk.constant(i.operand.unwrap()) {
                Some(Value::Str(s)) => Some(s.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(bound, vec!["b", "a", "a"]);
        assert_eq!(chunk.functions()[0].params, 2);
        assert_eq!(chunk.functions()[0].locals, 2);
    }

    #[test]
    fn method_call_shape() {
        let chunk = compile_src("var o = {} o.m(1)");
        assert_eq!(
            ops(&chunk),
            vec![
                Op::New, Op::Const, Op::CreateVar, Op::Discard,
                Op::Const, Op::Const, Op::Const, Op::GetVar,
                Op::Dup, Op::Const, Op::GetProp, Op::CallMthd,
                Op::Discard, Op::Halt,
            ]
        );
    }

    #[test]
    fn logical_and_shape() {
        let chunk = compile_src("true && false");
        assert_eq!(
            ops(&chunk),
            vec![
                Op::True, Op::Truthy, Op::Dup, Op::JumpFalsy, Op::Discard,
                Op::False, Op::Truthy, Op::Discard, Op::Halt,
            ]
        );
        let jf = find(&chunk, Op::JumpFalsy)[0];
        assert_eq!(chunk.instr(jf.operand.unwrap() as usize).map(|i| i.op), Some(Op::Discard));
    }

    #[test]
    fn if_without_else_yields_null() {
        let chunk = compile_src("if true { 1 }");
        assert_eq!(
            ops(&chunk),
            vec![
                Op::True, Op::JumpFalsy, Op::StartBlock, Op::Const, Op::EndBlock,
                Op::Jump, Op::Null, Op::Discard, Op::Halt,
            ]
        );
    }

    #[test]
    fn constants_shared_across_uses() {
        let chunk = compile_src(r#"write("x") write("x") write(1, 1)"#);
        assert_eq!(chunk.constants.len(), 2);
    }

    #[test]
    fn operator_instructions_carry_spans() {
        let chunk = compile_src("write(1 + null)");
        let add = find(&chunk, Op::Add)[0];
        assert_eq!(chunk.span_at(add.offset), Some(Span::new(8, 9)));
    }

    #[test]
    fn resolve_errors_surface() {
        let lib = Library::new();
        let err = compile(&parse_program("write(nope)"), &lib).unwrap_err();
        assert!(matches!(err, CompileError::Resolve(ResolveError::Undeclared { .. })));
        assert_eq!(err.code(), "B-R001");
        assert_eq!(err.span(), Some(Span::new(6, 10)));
    }

    #[test]
    fn prelude_names_compile() {
        let chunk = compile_src("var n = beget Number");
        assert!(find(&chunk, Op::Beget).len() == 1);
    }
}

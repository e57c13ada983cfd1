use std::collections::HashMap;
use std::io::Write;

use crate::ast::Span;
use crate::chunk::{Chunk, Op};
use crate::object::{Key, Library, Value};

#[derive(Debug, thiserror::Error)]
pub enum VmErrorKind {
    #[error("cannot call {value}: not a function")]
    NotCallable { value: String },
    #[error("{op}: expected numbers, got {left} and {right}")]
    Operands { op: Op, left: String, right: String },
    #[error("{op}: expected a number, got {value}")]
    Operand { op: Op, value: String },
    #[error("'self' used outside of a method call")]
    NoReceiver,
    #[error("cannot set property {key} on {value}: not an object")]
    SetOnPrimitive { key: String, value: String },
    #[error("cannot beget from {value}: not an object")]
    BegetPrimitive { value: String },
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("bad operand {operand} for {op}")]
    BadOperand { op: Op, operand: u32 },
    #[error("undecodable instruction at offset {offset}")]
    BadInstruction { offset: usize },
    #[error("return outside of a function")]
    ReturnOutsideFunction,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct VmError {
    pub kind: VmErrorKind,
    pub span: Option<Span>,
}

impl VmError {
    pub fn code(&self) -> &'static str {
        match self.kind {
            VmErrorKind::NotCallable { .. } => "B-V001",
            VmErrorKind::Operands { .. } | VmErrorKind::Operand { .. } => "B-V002",
            VmErrorKind::NoReceiver => "B-V003",
            VmErrorKind::SetOnPrimitive { .. } => "B-V004",
            VmErrorKind::BegetPrimitive { .. } => "B-V005",
            VmErrorKind::Output(_) => "B-V006",
            VmErrorKind::StackUnderflow
            | VmErrorKind::BadOperand { .. }
            | VmErrorKind::BadInstruction { .. }
            | VmErrorKind::ReturnOutsideFunction => "B-V007",
        }
    }
}

type VmResult<T> = Result<T, VmError>;

type Scope = HashMap<Key, Value>;

/// One activation. The main frame has no scopes of its own: its outermost
/// scope is the global table. A function frame starts with one fresh scope
/// that receives the parameters.
struct Frame {
    ip: usize,
    receiver: Option<Value>,
    scopes: Vec<Scope>,
}

/// Executes a linked chunk. Values are created through the same `Library`
/// the chunk was compiled against; output from `write` goes to `out`.
pub struct Vm<'a, W: Write> {
    chunk: &'a Chunk,
    lib: &'a Library,
    out: W,
    stack: Vec<Value>,
    frame: Frame,
    callers: Vec<Frame>,
    globals: Scope,
    /// Offset of the instruction being executed, for error positions.
    offset: usize,
}

impl<'a, W: Write> Vm<'a, W> {
    pub fn new(chunk: &'a Chunk, lib: &'a Library, out: W) -> Self {
        let globals = lib
            .globals()
            .into_iter()
            .map(|(name, proto)| (Key(lib.string(name)), proto))
            .collect();
        Vm {
            chunk,
            lib,
            out,
            stack: Vec::with_capacity(256),
            frame: Frame { ip: 0, receiver: None, scopes: Vec::new() },
            callers: Vec::with_capacity(64),
            globals,
            offset: 0,
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Read a global by name, mostly for embedding and tests.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(&Key(self.lib.string(name))).cloned()
    }

    fn error(&self, kind: VmErrorKind) -> VmError {
        VmError { kind, span: self.chunk.span_at(self.offset) }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> VmResult<Value> {
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => Err(self.error(VmErrorKind::StackUnderflow)),
        }
    }

    fn peek(&self) -> VmResult<&Value> {
        self.stack.last().ok_or_else(|| self.error(VmErrorKind::StackUnderflow))
    }

    // ── Variables ───────────────────────────────────────────────────

    fn lookup(&self, key: &Key) -> Value {
        self.frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(key))
            .or_else(|| self.globals.get(key))
            .cloned()
            .unwrap_or_else(|| self.lib.null())
    }

    /// Rebind the innermost existing binding. Unbound names are left alone.
    fn assign(&mut self, key: Key, value: Value) {
        let slot = self
            .frame
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(&key))
            .or_else(|| self.globals.get_mut(&key));
        match slot {
            Some(slot) => *slot = value,
            None => tracing::trace!(name = %key.0, "assignment to unbound name ignored"),
        }
    }

    fn declare(&mut self, key: Key, value: Value) {
        let scope = match self.frame.scopes.last_mut() {
            Some(scope) => scope,
            None => &mut self.globals,
        };
        scope.insert(key, value);
    }

    // ── Calls ───────────────────────────────────────────────────────

    fn call(&mut self, callee: Value, receiver: Option<Value>) -> VmResult<()> {
        let Value::Function(func) = &callee else {
            return Err(self.error(VmErrorKind::NotCallable { value: callee.describe() }));
        };
        let frame = Frame { ip: func.entry, receiver, scopes: vec![Scope::new()] };
        let caller = std::mem::replace(&mut self.frame, frame);
        self.callers.push(caller);
        tracing::trace!(entry = func.entry, depth = self.callers.len(), "call");
        Ok(())
    }

    fn ret(&mut self) -> VmResult<()> {
        let caller = self.callers.pop().ok_or_else(|| self.error(VmErrorKind::ReturnOutsideFunction))?;
        self.frame = caller;
        tracing::trace!(depth = self.callers.len(), "return");
        Ok(())
    }

    // ── Operators ───────────────────────────────────────────────────

    fn numbers(&mut self, op: Op) -> VmResult<(f64, f64)> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(self.error(VmErrorKind::Operands { op, left: left.describe(), right: right.describe() })),
        }
    }

    fn arithmetic(&mut self, op: Op, f: fn(f64, f64) -> f64) -> VmResult<()> {
        let (a, b) = self.numbers(op)?;
        self.push(self.lib.number(f(a, b)));
        Ok(())
    }

    fn comparison(&mut self, op: Op, f: fn(&f64, &f64) -> bool) -> VmResult<()> {
        let (a, b) = self.numbers(op)?;
        self.push(self.lib.boolean(f(&a, &b)));
        Ok(())
    }

    fn operand(&self, op: Op, operand: Option<u32>) -> VmResult<u32> {
        operand.ok_or_else(|| self.error(VmErrorKind::BadOperand { op, operand: 0 }))
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Run from offset 0 until `Halt`.
    pub fn run(&mut self) -> VmResult<()> {
        tracing::debug!(words = self.chunk.len(), "vm start");
        loop {
            self.offset = self.frame.ip;
            let Some(instr) = self.chunk.instr(self.offset) else {
                return Err(self.error(VmErrorKind::BadInstruction { offset: self.offset }));
            };
            self.frame.ip = self.offset + instr.op.width();
            tracing::trace!(offset = self.offset, op = %instr.op, stack = self.stack.len());

            match instr.op {
                Op::Const => {
                    let k = self.operand(instr.op, instr.operand)?;
                    let value = self
                        .chunk
                        .constant(k)
                        .cloned()
                        .ok_or_else(|| self.error(VmErrorKind::BadOperand { op: Op::Const, operand: k }))?;
                    self.push(value);
                }
                Op::Fn => {
                    let entry = self.operand(instr.op, instr.operand)? as usize;
                    let name = self.chunk.function_at(entry).and_then(|f| f.name.as_deref());
                    let func = self.lib.function(entry, name);
                    self.push(func);
                }
                Op::Jump => {
                    self.frame.ip = self.operand(instr.op, instr.operand)? as usize;
                }
                Op::JumpTruthy | Op::JumpFalsy => {
                    let target = self.operand(instr.op, instr.operand)? as usize;
                    let jump_when = instr.op == Op::JumpTruthy;
                    if self.pop()?.is_truthy() == jump_when {
                        self.frame.ip = target;
                    }
                }
                Op::Call => {
                    let callee = self.pop()?;
                    self.call(callee, None)?;
                }
                Op::CallMthd => {
                    let callee = self.pop()?;
                    let receiver = self.pop()?;
                    self.call(callee, Some(receiver))?;
                }
                Op::GetVar => {
                    let key = Key(self.pop()?);
                    let value = self.lookup(&key);
                    self.push(value);
                }
                Op::SetVar => {
                    let key = Key(self.pop()?);
                    let value = self.pop()?;
                    self.assign(key, value.clone());
                    self.push(value);
                }
                Op::CreateVar => {
                    let key = Key(self.pop()?);
                    let value = self.pop()?;
                    self.declare(key, value.clone());
                    self.push(value);
                }
                Op::GetProp => {
                    let key = self.pop()?;
                    let target = self.pop()?;
                    self.push(self.lib.get_property(&target, &key));
                }
                Op::SetProp => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let target = self.pop()?;
                    if self.lib.set_property(&target, key.clone(), value.clone()).is_err() {
                        return Err(self.error(VmErrorKind::SetOnPrimitive {
                            key: key.describe(),
                            value: target.describe(),
                        }));
                    }
                    self.push(value);
                }
                Op::Add => self.arithmetic(Op::Add, |a, b| a + b)?,
                Op::Sub => self.arithmetic(Op::Sub, |a, b| a - b)?,
                Op::Mul => self.arithmetic(Op::Mul, |a, b| a * b)?,
                Op::Div => self.arithmetic(Op::Div, |a, b| a / b)?,
                Op::Mod => self.arithmetic(Op::Mod, |a, b| a % b)?,
                Op::Lt => self.comparison(Op::Lt, f64::lt)?,
                Op::LtEq => self.comparison(Op::LtEq, f64::le)?,
                Op::Gt => self.comparison(Op::Gt, f64::gt)?,
                Op::GtEq => self.comparison(Op::GtEq, f64::ge)?,
                Op::Eq | Op::NotEq => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let equal = left == right;
                    self.push(self.lib.boolean(equal == (instr.op == Op::Eq)));
                }
                Op::Neg => match self.pop()? {
                    Value::Number(n) => self.push(self.lib.number(-n)),
                    other => {
                        return Err(self.error(VmErrorKind::Operand { op: Op::Neg, value: other.describe() }));
                    }
                },
                Op::Not => {
                    let v = self.pop()?;
                    self.push(self.lib.boolean(!v.is_truthy()));
                }
                Op::Truthy => {
                    let v = self.pop()?;
                    self.push(self.lib.boolean(v.is_truthy()));
                }
                Op::New => self.push(self.lib.object()),
                Op::Beget => {
                    let proto = self.pop()?;
                    match self.lib.beget(&proto) {
                        Some(obj) => self.push(obj),
                        None => {
                            return Err(self.error(VmErrorKind::BegetPrimitive { value: proto.describe() }));
                        }
                    }
                }
                Op::SelfRef => {
                    let receiver = self.frame.receiver.clone().ok_or_else(|| self.error(VmErrorKind::NoReceiver))?;
                    self.push(receiver);
                }
                Op::Null => self.push(self.lib.null()),
                Op::True => self.push(self.lib.boolean(true)),
                Op::False => self.push(self.lib.boolean(false)),
                Op::Dup => {
                    let top = self.peek()?.clone();
                    self.push(top);
                }
                Op::Discard => {
                    self.pop()?;
                }
                Op::Switch => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(self.error(VmErrorKind::StackUnderflow));
                    }
                    self.stack.swap(len - 1, len - 2);
                }
                Op::StartBlock => self.frame.scopes.push(Scope::new()),
                Op::EndBlock => {
                    self.frame.scopes.pop();
                }
                Op::Write => {
                    let v = self.pop()?;
                    if let Err(e) = write!(self.out, "{v}") {
                        return Err(self.error(VmErrorKind::Output(e)));
                    }
                }
                Op::Return => self.ret()?,
                Op::Halt => {
                    if let Err(e) = self.out.flush() {
                        return Err(self.error(VmErrorKind::Output(e)));
                    }
                    tracing::debug!(stack = self.stack.len(), "vm halt");
                    return Ok(());
                }
            }
        }
    }
}

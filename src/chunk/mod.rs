use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write as _};

use crate::ast::Span;
use crate::object::{Key, Value};

// ── Opcodes ──────────────────────────────────────────────────────────
//
// One word per instruction, plus one operand word for the five
// instructions that carry an index or a target offset.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Op {
    Const,
    Fn,
    Jump,
    JumpTruthy,
    JumpFalsy,
    Call,
    CallMthd,
    GetVar,
    SetVar,
    CreateVar,
    GetProp,
    SetProp,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    Neg,
    Not,
    Truthy,
    New,
    Beget,
    SelfRef,
    Null,
    True,
    False,
    Dup,
    Discard,
    Switch,
    StartBlock,
    EndBlock,
    Write,
    Return,
    Halt,
}

impl Op {
    /// Every opcode, indexed by its encoding.
    pub const ALL: [Op; 40] = [
        Op::Const,
        Op::Fn,
        Op::Jump,
        Op::JumpTruthy,
        Op::JumpFalsy,
        Op::Call,
        Op::CallMthd,
        Op::GetVar,
        Op::SetVar,
        Op::CreateVar,
        Op::GetProp,
        Op::SetProp,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Mod,
        Op::Lt,
        Op::LtEq,
        Op::Gt,
        Op::GtEq,
        Op::Eq,
        Op::NotEq,
        Op::Neg,
        Op::Not,
        Op::Truthy,
        Op::New,
        Op::Beget,
        Op::SelfRef,
        Op::Null,
        Op::True,
        Op::False,
        Op::Dup,
        Op::Discard,
        Op::Switch,
        Op::StartBlock,
        Op::EndBlock,
        Op::Write,
        Op::Return,
        Op::Halt,
    ];

    pub fn from_word(word: u32) -> Option<Op> {
        Op::ALL.get(word as usize).copied()
    }

    /// Instruction width in words, opcode included.
    pub fn width(self) -> usize {
        match self {
            Op::Const | Op::Fn | Op::Jump | Op::JumpTruthy | Op::JumpFalsy => 2,
            _ => 1,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::Jump | Op::JumpTruthy | Op::JumpFalsy)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::SelfRef => "Self",
            Op::Const => "Const",
            Op::Fn => "Fn",
            Op::Jump => "Jump",
            Op::JumpTruthy => "JumpTruthy",
            Op::JumpFalsy => "JumpFalsy",
            Op::Call => "Call",
            Op::CallMthd => "CallMthd",
            Op::GetVar => "GetVar",
            Op::SetVar => "SetVar",
            Op::CreateVar => "CreateVar",
            Op::GetProp => "GetProp",
            Op::SetProp => "SetProp",
            Op::Add => "Add",
            Op::Sub => "Sub",
            Op::Mul => "Mul",
            Op::Div => "Div",
            Op::Mod => "Mod",
            Op::Lt => "Lt",
            Op::LtEq => "LtEq",
            Op::Gt => "Gt",
            Op::GtEq => "GtEq",
            Op::Eq => "Eq",
            Op::NotEq => "NotEq",
            Op::Neg => "Neg",
            Op::Not => "Not",
            Op::Truthy => "Truthy",
            Op::New => "New",
            Op::Beget => "Beget",
            Op::Null => "Null",
            Op::True => "True",
            Op::False => "False",
            Op::Dup => "Dup",
            Op::Discard => "Discard",
            Op::Switch => "Switch",
            Op::StartBlock => "StartBlock",
            Op::EndBlock => "EndBlock",
            Op::Write => "Write",
            Op::Return => "Return",
            Op::Halt => "Halt",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// ── Chunk ────────────────────────────────────────────────────────────

/// Compile-time facts about one function body, kept for disassembly and naming.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: Option<String>,
    pub params: usize,
    pub locals: usize,
    pub entry: usize,
}

/// A decoded instruction: its offset, opcode and operand word if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub offset: usize,
    pub op: Op,
    pub operand: Option<u32>,
}

/// Compiled program: one flat code vector for the top level and every
/// function body, plus the constant pool they share.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u32>,
    pub constants: Vec<Value>,
    const_index: HashMap<Key, u32>,
    spans: BTreeMap<usize, Span>,
    functions: Vec<FunctionInfo>,
}

impl Chunk {
    pub fn new() -> Self {
        Chunk::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Append a one-word instruction and return its offset.
    pub fn emit(&mut self, op: Op) -> usize {
        debug_assert_eq!(op.width(), 1, "{op} takes an operand");
        let offset = self.code.len();
        self.code.push(op as u32);
        offset
    }

    /// Append a two-word instruction and return its offset.
    pub fn emit_with(&mut self, op: Op, operand: u32) -> usize {
        debug_assert_eq!(op.width(), 2, "{op} takes no operand");
        let offset = self.code.len();
        self.code.push(op as u32);
        self.code.push(operand);
        offset
    }

    /// Overwrite the operand word of the instruction at `offset`.
    pub fn patch_operand(&mut self, offset: usize, operand: u32) {
        self.code[offset + 1] = operand;
    }

    /// Pool index for `value`; equal values of the same type share one slot.
    pub fn add_const(&mut self, value: Value) -> u32 {
        let key = Key(value);
        if let Some(&idx) = self.const_index.get(&key) {
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(key.0.clone());
        self.const_index.insert(key, idx);
        idx
    }

    pub fn constant(&self, idx: u32) -> Option<&Value> {
        self.constants.get(idx as usize)
    }

    /// Remember which source range produced the instruction at `offset`.
    pub fn mark(&mut self, offset: usize, span: Span) {
        self.spans.insert(offset, span);
    }

    pub fn span_at(&self, offset: usize) -> Option<Span> {
        self.spans.get(&offset).copied()
    }

    pub fn add_function(&mut self, info: FunctionInfo) {
        self.functions.push(info);
    }

    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    pub fn function_at(&self, entry: usize) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.entry == entry)
    }

    /// Decode the instruction at `offset`.
    pub fn instr(&self, offset: usize) -> Option<Instr> {
        let op = Op::from_word(*self.code.get(offset)?)?;
        let operand = match op.width() {
            2 => Some(*self.code.get(offset + 1)?),
            _ => None,
        };
        Some(Instr { offset, op, operand })
    }

    /// Walk the code instruction by instruction. Stops early at an
    /// undecodable word.
    pub fn instructions(&self) -> impl Iterator<Item = Instr> + '_ {
        let mut offset = 0;
        std::iter::from_fn(move || {
            let instr = self.instr(offset)?;
            offset += instr.op.width();
            Some(instr)
        })
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = self.write_disassembly(&mut out);
        out
    }

    fn write_disassembly(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "== constants ==")?;
        for (i, c) in self.constants.iter().enumerate() {
            writeln!(out, "{i:>4}  {}", c.describe())?;
        }
        writeln!(out, "== code ==")?;
        let mut decoded = 0;
        for instr in self.instructions() {
            if let Some(f) = self.function_at(instr.offset) {
                let name = f.name.as_deref().unwrap_or("<anonymous>");
                writeln!(out, "-- fn {name} (params {}, locals {}) --", f.params, f.locals)?;
            }
            write!(out, "{:04}  {:<11}", instr.offset, instr.op.mnemonic())?;
            match (instr.op, instr.operand) {
                (Op::Const, Some(k)) => match self.constant(k) {
                    Some(v) => write!(out, " {k:<5} ; {}", v.describe())?,
                    None => write!(out, " {k:<5} ; ?")?,
                },
                (Op::Fn, Some(entry)) => {
                    let name = self.function_at(entry as usize).and_then(|f| f.name.as_deref());
                    write!(out, " {entry:04}  ; {}", name.unwrap_or("<anonymous>"))?
                }
                (_, Some(target)) => write!(out, " {target:04}")?,
                (_, None) => {}
            }
            writeln!(out)?;
            decoded = instr.offset + instr.op.width();
        }
        if decoded < self.code.len() {
            writeln!(out, "{decoded:04}  ?? {}", self.code[decoded])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Library;

    #[test]
    fn opcode_table_matches_encoding() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(*op as u32, i as u32);
            assert_eq!(Op::from_word(i as u32), Some(*op));
        }
        assert_eq!(Op::from_word(Op::ALL.len() as u32), None);
    }

    #[test]
    fn operand_widths() {
        assert_eq!(Op::Const.width(), 2);
        assert_eq!(Op::Fn.width(), 2);
        assert_eq!(Op::JumpFalsy.width(), 2);
        assert_eq!(Op::Add.width(), 1);
        assert_eq!(Op::Halt.width(), 1);
        assert_eq!(Op::SelfRef.to_string(), "Self");
    }

    #[test]
    fn constants_are_deduplicated() {
        let lib = Library::new();
        let mut chunk = Chunk::new();
        let x1 = chunk.add_const(lib.string("x"));
        let one = chunk.add_const(lib.number(1.0));
        let x2 = chunk.add_const(lib.string("x"));
        let one_again = chunk.add_const(lib.number(1.0));
        assert_eq!(x1, x2);
        assert_eq!(one, one_again);
        assert_ne!(x1, one);
        assert_eq!(chunk.constants.len(), 2);
    }

    #[test]
    fn constants_of_different_types_stay_apart() {
        let lib = Library::new();
        let mut chunk = Chunk::new();
        let a = chunk.add_const(lib.number(1.0));
        let b = chunk.add_const(lib.string("1"));
        let c = chunk.add_const(lib.boolean(true));
        assert_eq!(chunk.constants.len(), 3);
        assert!(a != b && b != c);
    }

    #[test]
    fn emit_returns_offsets() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.emit_with(Op::Const, 0), 0);
        assert_eq!(chunk.emit(Op::Dup), 2);
        assert_eq!(chunk.emit_with(Op::Jump, 0), 3);
        chunk.patch_operand(3, 9);
        assert_eq!(chunk.code, vec![Op::Const as u32, 0, Op::Dup as u32, Op::Jump as u32, 9]);
        assert_eq!(chunk.len(), 5);
    }

    #[test]
    fn instructions_step_by_width() {
        let mut chunk = Chunk::new();
        chunk.emit_with(Op::Const, 0);
        chunk.emit(Op::Write);
        chunk.emit(Op::Halt);
        let offsets: Vec<_> = chunk.instructions().map(|i| (i.offset, i.op)).collect();
        assert_eq!(offsets, vec![(0, Op::Const), (2, Op::Write), (3, Op::Halt)]);
    }

    #[test]
    fn spans_are_sparse() {
        let mut chunk = Chunk::new();
        chunk.emit(Op::Null);
        let at = chunk.emit(Op::Add);
        chunk.mark(at, Span::new(4, 5));
        assert_eq!(chunk.span_at(at), Some(Span::new(4, 5)));
        assert_eq!(chunk.span_at(0), None);
    }

    #[test]
    fn disassembly_lists_constants_and_code() {
        let lib = Library::new();
        let mut chunk = Chunk::new();
        let k = chunk.add_const(lib.string("hi"));
        chunk.emit_with(Op::Const, k);
        chunk.emit(Op::Write);
        chunk.emit(Op::Halt);
        let text = chunk.disassemble();
        assert!(text.contains("\"hi\""));
        assert!(text.contains("0000  Const"));
        assert!(text.contains("0002  Write"));
        assert!(text.contains("0003  Halt"));
    }

    #[test]
    fn disassembly_names_function_entries() {
        let mut chunk = Chunk::new();
        chunk.emit_with(Op::Fn, 3);
        chunk.emit(Op::Halt);
        chunk.emit(Op::Null);
        chunk.emit(Op::Return);
        chunk.add_function(FunctionInfo { name: Some("f".into()), params: 0, locals: 0, entry: 3 });
        let text = chunk.disassemble();
        assert!(text.contains("-- fn f (params 0, locals 0) --"));
        assert!(text.contains("0000  Fn          0003  ; f"));
    }
}

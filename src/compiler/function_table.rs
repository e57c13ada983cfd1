use std::collections::HashMap;

use crate::ast::{Expr, FnLit, Literal, NodeId, Program};

/// Every function literal in a program, numbered in pre-order: an enclosing
/// function comes before the functions nested in its body. Entry offsets are
/// filled in as bodies are emitted.
#[derive(Debug, Default)]
pub struct FunctionTable<'a> {
    functions: Vec<&'a FnLit>,
    index: HashMap<NodeId, usize>,
    offsets: Vec<Option<usize>>,
}

impl<'a> FunctionTable<'a> {
    pub fn build(program: &'a Program) -> Self {
        let mut table = FunctionTable::default();
        for expr in &program.body {
            table.scan(expr);
        }
        table
    }

    fn scan(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Function(f) => {
                self.index.insert(f.id, self.functions.len());
                self.functions.push(f);
                self.offsets.push(None);
                self.scan_all(&f.body);
            }
            Expr::Literal(Literal::Object(props)) => {
                for (_, value) in props {
                    self.scan(value);
                }
            }
            Expr::Literal(_) | Expr::Ident(_) | Expr::SelfRef { .. } => {}
            Expr::Assign { value, .. } => self.scan(value),
            Expr::AssignIndex { object, index, value, .. } => {
                self.scan(object);
                self.scan(index);
                self.scan(value);
            }
            Expr::AssignMember { object, value, .. } => {
                self.scan(object);
                self.scan(value);
            }
            Expr::Block(body) | Expr::Write(body) => self.scan_all(body),
            Expr::Call { callee, args, .. } => {
                self.scan(callee);
                self.scan_all(args);
            }
            Expr::If { branches, otherwise } => {
                for branch in branches {
                    self.scan(&branch.condition);
                    self.scan_all(&branch.body);
                }
                if let Some(body) = otherwise {
                    self.scan_all(body);
                }
            }
            Expr::Index { object, index, .. } => {
                self.scan(object);
                self.scan(index);
            }
            Expr::Binary { left, right, .. } => {
                self.scan(left);
                self.scan(right);
            }
            Expr::Unary { operand, .. } => self.scan(operand),
            Expr::Member { object, .. } => self.scan(object),
            Expr::Var { init, .. } => {
                if let Some(init) = init {
                    self.scan(init);
                }
            }
            Expr::While { guard, body } => {
                self.scan(guard);
                self.scan_all(body);
            }
        }
    }

    fn scan_all(&mut self, exprs: &'a [Expr]) {
        for expr in exprs {
            self.scan(expr);
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a FnLit> {
        self.functions.get(index).copied()
    }

    /// Table index of a function literal from the scanned program.
    pub fn index(&self, function: &FnLit) -> Option<usize> {
        self.index.get(&function.id).copied()
    }

    pub fn set_offset(&mut self, index: usize, offset: usize) {
        self.offsets[index] = Some(offset);
    }

    /// Entry offset of a function body, once emitted.
    pub fn offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied().flatten()
    }
}

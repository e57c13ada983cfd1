//! Static name resolution.
//!
//! Every identifier occurrence is bound to a global or local slot before any
//! code is generated. Top-level code is resolved first, in source order;
//! function bodies are deferred until the whole enclosing program has been
//! seen, so a body may refer to any global, including ones declared after the
//! function itself. A body sees the globals and its own parameters and
//! locals, never the locals of the frame it was written in.

use std::collections::{HashMap, VecDeque};

use crate::ast::{Branch, Expr, FnLit, Ident, Literal, NodeId, Program, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub kind: BindingKind,
    pub slot: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("undeclared variable '{name}'")]
    Undeclared { name: String, span: Span },
    #[error("'{name}' is already declared in this scope")]
    Redeclared { name: String, span: Span },
}

impl ResolveError {
    pub fn span(&self) -> Span {
        match self {
            ResolveError::Undeclared { span, .. } | ResolveError::Redeclared { span, .. } => *span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::Undeclared { .. } => "B-R001",
            ResolveError::Redeclared { .. } => "B-R002",
        }
    }
}

/// Side tables produced by resolution, keyed by `NodeId`.
#[derive(Debug, Default)]
pub struct Resolution {
    bindings: HashMap<NodeId, Binding>,
    frame_sizes: HashMap<NodeId, usize>,
    pub globals: usize,
    pub main_locals: usize,
}

impl Resolution {
    /// The binding of an identifier occurrence (reference, target, declaration or parameter).
    pub fn binding(&self, id: NodeId) -> Option<Binding> {
        self.bindings.get(&id).copied()
    }

    /// Local slot count of a function, parameters included.
    pub fn locals(&self, function: NodeId) -> Option<usize> {
        self.frame_sizes.get(&function).copied()
    }
}

type Scope = HashMap<String, Binding>;

/// One function activation's worth of scopes. At top level `scopes` starts
/// empty: the outermost scope there is the global table.
#[derive(Default)]
struct Frame {
    scopes: Vec<Scope>,
    next_slot: usize,
}

pub struct Resolver<'a> {
    globals: Scope,
    frame: Frame,
    pending: VecDeque<&'a FnLit>,
    out: Resolution,
}

impl<'a> Resolver<'a> {
    /// A resolver whose global scope already holds `prelude`, in slot order.
    pub fn new(prelude: &[&str]) -> Self {
        let globals = prelude
            .iter()
            .enumerate()
            .map(|(slot, name)| (name.to_string(), Binding { kind: BindingKind::Global, slot }))
            .collect();
        Resolver { globals, frame: Frame::default(), pending: VecDeque::new(), out: Resolution::default() }
    }

    pub fn resolve(mut self, program: &'a Program) -> Result<Resolution, ResolveError> {
        for expr in &program.body {
            self.expr(expr)?;
        }
        self.out.main_locals = self.frame.next_slot;

        while let Some(function) = self.pending.pop_front() {
            self.function(function)?;
        }

        self.out.globals = self.globals.len();
        tracing::debug!(
            globals = self.out.globals,
            functions = self.out.frame_sizes.len(),
            bindings = self.out.bindings.len(),
            "resolved names"
        );
        Ok(self.out)
    }

    fn function(&mut self, f: &'a FnLit) -> Result<(), ResolveError> {
        self.frame = Frame { scopes: vec![Scope::new()], next_slot: 0 };
        for param in &f.params {
            self.declare(param)?;
        }
        self.block(&f.body)?;
        self.out.frame_sizes.insert(f.id, self.frame.next_slot);
        Ok(())
    }

    fn declare(&mut self, ident: &Ident) -> Result<(), ResolveError> {
        let frame = &mut self.frame;
        let (scope, binding) = match frame.scopes.last_mut() {
            Some(scope) => {
                let binding = Binding { kind: BindingKind::Local, slot: frame.next_slot };
                (scope, binding)
            }
            None => {
                let binding = Binding { kind: BindingKind::Global, slot: self.globals.len() };
                (&mut self.globals, binding)
            }
        };
        if scope.contains_key(&ident.name) {
            return Err(ResolveError::Redeclared { name: ident.name.clone(), span: ident.span });
        }
        scope.insert(ident.name.clone(), binding);
        if binding.kind == BindingKind::Local {
            frame.next_slot += 1;
        }
        self.out.bindings.insert(ident.id, binding);
        Ok(())
    }

    fn reference(&mut self, ident: &Ident) -> Result<(), ResolveError> {
        let found = self
            .frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&ident.name))
            .or_else(|| self.globals.get(&ident.name))
            .copied();
        match found {
            Some(binding) => {
                self.out.bindings.insert(ident.id, binding);
                Ok(())
            }
            None => Err(ResolveError::Undeclared { name: ident.name.clone(), span: ident.span }),
        }
    }

    fn block(&mut self, body: &'a [Expr]) -> Result<(), ResolveError> {
        self.frame.scopes.push(Scope::new());
        let result = body.iter().try_for_each(|e| self.expr(e));
        self.frame.scopes.pop();
        result
    }

    /// Every branch after the first, condition included, runs inside its own
    /// block scope, the same nesting the compiler emits.
    fn branches(&mut self, branches: &'a [Branch], otherwise: Option<&'a [Expr]>) -> Result<(), ResolveError> {
        let Some((first, rest)) = branches.split_first() else {
            return otherwise.map_or(Ok(()), |body| self.block(body));
        };
        self.expr(&first.condition)?;
        self.block(&first.body)?;
        if rest.is_empty() {
            return self.branches(rest, otherwise);
        }
        self.frame.scopes.push(Scope::new());
        let result = self.branches(rest, otherwise);
        self.frame.scopes.pop();
        result
    }

    fn expr(&mut self, expr: &'a Expr) -> Result<(), ResolveError> {
        match expr {
            Expr::Literal(Literal::Object(props)) => {
                for (_, value) in props {
                    self.expr(value)?;
                }
            }
            Expr::Literal(_) | Expr::SelfRef { .. } => {}
            Expr::Ident(ident) => self.reference(ident)?,
            Expr::Assign { target, value } => {
                self.expr(value)?;
                self.reference(target)?;
            }
            Expr::AssignIndex { object, index, value, .. } => {
                self.expr(object)?;
                self.expr(index)?;
                self.expr(value)?;
            }
            Expr::AssignMember { object, value, .. } => {
                self.expr(object)?;
                self.expr(value)?;
            }
            Expr::Block(body) => self.block(body)?,
            Expr::Call { callee, args, .. } => {
                for arg in args {
                    self.expr(arg)?;
                }
                self.expr(callee)?;
            }
            Expr::If { branches, otherwise } => self.branches(branches, otherwise.as_deref())?,
            Expr::Function(f) => self.pending.push_back(f),
            Expr::Index { object, index, .. } => {
                self.expr(object)?;
                self.expr(index)?;
            }
            Expr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            Expr::Unary { operand, .. } => self.expr(operand)?,
            Expr::Member { object, .. } => self.expr(object)?,
            Expr::Var { name, init } => {
                if let Some(init) = init {
                    self.expr(init)?;
                }
                self.declare(name)?;
            }
            Expr::While { guard, body } => {
                self.expr(guard)?;
                self.block(body)?;
            }
            Expr::Write(args) => {
                for arg in args {
                    self.expr(arg)?;
                }
            }
        }
        Ok(())
    }
}

/// Resolve `program` against the given prelude names.
pub fn resolve(program: &Program, prelude: &[&str]) -> Result<Resolution, ResolveError> {
    Resolver::new(prelude).resolve(program)
}

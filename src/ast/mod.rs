use serde::{Deserialize, Serialize};

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(r: std::ops::Range<usize>) -> Self {
        Span { start: r.start, end: r.end }
    }
}

/// Identity of a node that later passes need to key side tables on
/// (identifier references and function literals). Assigned by the parser,
/// unique within one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

// ---- Core AST types ----

/// A name occurrence: a reference, an assignment target, a declaration or a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    #[serde(skip)]
    pub id: NodeId,
    #[serde(skip)]
    pub span: Span,
}

/// `fn name(a, b) { body }` or the anonymous `fn(a, b) { body }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnLit {
    #[serde(skip)]
    pub id: NodeId,
    pub name: Option<String>,
    pub params: Vec<Ident>,
    pub body: Vec<Expr>,
    #[serde(skip)]
    pub span: Span,
}

/// One `cond { body }` arm of a conditional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub condition: Expr,
    pub body: Vec<Expr>,
}

/// Everything is an expression; statements are expressions whose value is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),

    /// Variable reference
    Ident(Ident),

    /// `name = value`
    Assign { target: Ident, value: Box<Expr> },

    /// `object[index] = value`
    AssignIndex {
        object: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },

    /// `object.name = value`
    AssignMember {
        object: Box<Expr>,
        name: String,
        value: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },

    /// `{ expr expr ... }`: value of the last expression, Null when empty
    Block(Vec<Expr>),

    /// `callee(args)`; a method call when the callee is an index or member access
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        #[serde(skip)]
        span: Span,
    },

    /// `if c {..} else if c {..} else {..}`
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Expr>>,
    },

    Function(FnLit),

    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },

    /// `object.name` (refinement)
    Member {
        object: Box<Expr>,
        name: String,
        #[serde(skip)]
        span: Span,
    },

    /// `self`
    SelfRef {
        #[serde(skip)]
        span: Span,
    },

    /// `var name = init`
    Var { name: Ident, init: Option<Box<Expr>> },

    /// `while guard { body }`
    While { guard: Box<Expr>, body: Vec<Expr> },

    /// `write(a, b, ...)`
    Write(Vec<Expr>),
}

impl Expr {
    /// Best source position for diagnostics, if the node carries one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Expr::Ident(ident) | Expr::Assign { target: ident, .. } => Some(ident.span),
            Expr::Var { name, .. } => Some(name.span),
            Expr::Function(f) => Some(f.span),
            Expr::AssignIndex { span, .. }
            | Expr::AssignMember { span, .. }
            | Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Member { span, .. }
            | Expr::SelfRef { span } => Some(*span),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// `{ key: value, ... }`
    Object(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    /// `beget obj`: a fresh object whose prototype is `obj`
    Beget,
}

/// A complete program is a sequence of top-level expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Expr>,
    #[serde(skip)]
    pub source: Option<String>,
}

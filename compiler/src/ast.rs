// AST node types for stream graph source files (.str).
//
// Surface syntax only: names are still strings and instantiations still name
// declarations. `elaborate` turns this into the instance tree in `graph`.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;
use serde::Serialize;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete source file: a sequence of stream declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub decls: Vec<StreamDecl>,
    pub span: Span,
}

// ── Declarations ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Filter,
    Pipeline,
    SplitJoin,
    FeedbackLoop,
}

impl StreamKind {
    pub fn keyword(self) -> &'static str {
        match self {
            StreamKind::Filter => "filter",
            StreamKind::Pipeline => "pipeline",
            StreamKind::SplitJoin => "splitjoin",
            StreamKind::FeedbackLoop => "feedbackloop",
        }
    }
}

/// `kind IDENT '(' params ')' '{' item* '}'`
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDecl {
    pub kind: StreamKind,
    pub name: Ident,
    pub params: Vec<ParamDecl>,
    pub items: Vec<StreamItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub ty: Type,
    pub name: Ident,
}

/// A section inside a stream declaration. Order is free; duplicates are
/// rejected during elaboration.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Init(Vec<Stmt>, Span),
    Work(WorkDecl),
    Split(WeightsDecl),
    Join(WeightsDecl),
    Delay(Expr, Span),
}

/// `work (pop|peek|push expr)* block`
#[derive(Debug, Clone, PartialEq)]
pub struct WorkDecl {
    pub rates: Vec<(RateKind, Expr)>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKind {
    Pop,
    Peek,
    Push,
}

/// `duplicate` or `roundrobin` with optional weight list.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightsDecl {
    pub kind: WeightKind,
    pub weights: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeightKind {
    Duplicate,
    RoundRobin,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Decl {
        ty: Type,
        name: Ident,
        init: Option<Expr>,
    },
    Assign {
        name: Ident,
        op: AssignOp,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Block(Vec<Stmt>),
    Push(Expr),
    Expr(Expr),
    /// `add|body|loop IDENT '(' args ')'`
    Instantiate {
        role: ChildRole,
        target: Ident,
        args: Vec<Expr>,
    },
}

/// How an instantiation attaches its target to the enclosing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChildRole {
    Add,
    Body,
    Loop,
}

impl ChildRole {
    pub fn keyword(self) -> &'static str {
        match self {
            ChildRole::Add => "add",
            ChildRole::Body => "body",
            ChildRole::Loop => "loop",
        }
    }
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64, Span),
    Float(f64, Span),
    Bool(bool, Span),
    Var(Ident),
    Unary(UnOp, Box<Expr>, Span),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Pop(Span),
    Peek(Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int(_, s) | Expr::Float(_, s) | Expr::Bool(_, s) => *s,
            Expr::Var(id) => id.span,
            Expr::Unary(_, _, s) | Expr::Pop(s) | Expr::Peek(_, s) => *s,
            Expr::Binary(_, l, r) => {
                let (l, r) = (l.span(), r.span());
                (l.start..r.end).into()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
        }
    }

    /// The binary operator applied by a compound assignment.
    pub fn binop(self) -> Option<BinOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Type {
    Int,
    Float,
    Bool,
}

impl Type {
    pub fn keyword(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::Bool => "bool",
        }
    }
}

// ── Identifier ──

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ir.rs — Statement and expression representation of elaborated stream bodies
//
// Names are gone: variables are `VarId`s and instantiation targets are
// `NodeId`s. Every body the constant-propagation pass rewrites is a
// `Vec<Stmt>` in this form.
//
// Preconditions: produced by `elaborate` (or by the pass itself).
// Postconditions: none (types and traversal helpers only).
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use crate::ast::{AssignOp, BinOp, ChildRole, Span, Type, UnOp};
use crate::id::{NodeId, VarId};

// ── Literals ────────────────────────────────────────────────────────────────

/// A fully resolved compile-time value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    pub fn ty(self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Bool(_) => Type::Bool,
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Literal::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            // `{:?}` keeps the trailing `.0` so the text re-lexes as a real.
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Bool(v) => write!(f, "{v}"),
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Lit(Literal),
    Var(VarId),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Pop,
    Peek(Box<Expr>),
}

impl Expr {
    pub fn int(v: i64) -> Self {
        Expr::Lit(Literal::Int(v))
    }

    pub fn as_literal(&self) -> Option<Literal> {
        match self {
            Expr::Lit(lit) => Some(*lit),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Lit(_))
    }

    /// Post-order mutable walk: operands are visited before their operator.
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Expr::Unary(_, inner) | Expr::Peek(inner) => inner.visit_mut(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.visit_mut(f);
                rhs.visit_mut(f);
            }
            Expr::Lit(_) | Expr::Var(_) | Expr::Pop => {}
        }
        f(self);
    }

    /// Pre-order read-only walk.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unary(_, inner) | Expr::Peek(inner) => inner.visit(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Lit(_) | Expr::Var(_) | Expr::Pop => {}
        }
    }

    pub fn reads(&self, var: VarId) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if *e == Expr::Var(var) {
                found = true;
            }
        });
        found
    }
}

// ── Statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub var: VarId,
    pub ty: Type,
    pub init: Option<Expr>,
}

/// `add|body|loop Target(args);` with the target resolved to a node instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instantiation {
    pub role: ChildRole,
    pub target: NodeId,
    pub args: Vec<Expr>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    Decl(VarDecl),
    Assign {
        var: VarId,
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
    Instantiate(Instantiation),
}

impl Stmt {
    /// Expressions owned directly by this statement (not by nested statements).
    pub fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Stmt::Decl(decl) => {
                if let Some(init) = &decl.init {
                    f(init);
                }
            }
            Stmt::Assign { value, .. } | Stmt::Push(value) | Stmt::Expr(value) => f(value),
            Stmt::If { cond, .. } | Stmt::While { cond, .. } => f(cond),
            Stmt::For { cond, .. } => {
                if let Some(cond) = cond {
                    f(cond);
                }
            }
            Stmt::Block(_) => {}
            Stmt::Instantiate(inst) => inst.args.iter().for_each(|a| f(a)),
        }
    }

    pub fn for_each_expr_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Stmt::Decl(decl) => {
                if let Some(init) = &mut decl.init {
                    f(init);
                }
            }
            Stmt::Assign { value, .. } | Stmt::Push(value) | Stmt::Expr(value) => f(value),
            Stmt::If { cond, .. } | Stmt::While { cond, .. } => f(cond),
            Stmt::For { cond, .. } => {
                if let Some(cond) = cond {
                    f(cond);
                }
            }
            Stmt::Block(_) => {}
            Stmt::Instantiate(inst) => inst.args.iter_mut().for_each(|a| f(a)),
        }
    }
}

// ── Block traversal ─────────────────────────────────────────────────────────

/// Pre-order walk over every statement, including `for` headers.
pub fn walk_stmts<'a>(stmts: &'a [Stmt], f: &mut dyn FnMut(&'a Stmt)) {
    for stmt in stmts {
        f(stmt);
        match stmt {
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                walk_stmts(then_body, f);
                if let Some(else_body) = else_body {
                    walk_stmts(else_body, f);
                }
            }
            Stmt::For {
                init, step, body, ..
            } => {
                if let Some(init) = init {
                    walk_stmts(std::slice::from_ref(&**init), f);
                }
                walk_stmts(body, f);
                if let Some(step) = step {
                    walk_stmts(std::slice::from_ref(&**step), f);
                }
            }
            Stmt::While { body, .. } | Stmt::Block(body) => walk_stmts(body, f),
            _ => {}
        }
    }
}

/// Mutable pre-order walk, same order as `walk_stmts`.
pub fn walk_stmts_mut(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Stmt)) {
    for stmt in stmts {
        f(stmt);
        match stmt {
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                walk_stmts_mut(then_body, f);
                if let Some(else_body) = else_body {
                    walk_stmts_mut(else_body, f);
                }
            }
            Stmt::For {
                init, step, body, ..
            } => {
                if let Some(init) = init {
                    walk_stmts_mut(std::slice::from_mut(&mut **init), f);
                }
                walk_stmts_mut(body, f);
                if let Some(step) = step {
                    walk_stmts_mut(std::slice::from_mut(&mut **step), f);
                }
            }
            Stmt::While { body, .. } | Stmt::Block(body) => walk_stmts_mut(body, f),
            _ => {}
        }
    }
}

/// Apply `f` to every expression root in the block.
pub fn walk_exprs_mut(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
    walk_stmts_mut(stmts, &mut |stmt| stmt.for_each_expr_mut(f));
}

/// Variables that are the target of an assignment anywhere in the block.
/// Declarations do not count.
pub fn assigned_vars(stmts: &[Stmt]) -> BTreeSet<VarId> {
    let mut out = BTreeSet::new();
    walk_stmts(stmts, &mut |stmt| {
        if let Stmt::Assign { var, .. } = stmt {
            out.insert(*var);
        }
    });
    out
}

/// Variables declared anywhere in the block, in pre-order.
pub fn declared_vars(stmts: &[Stmt]) -> Vec<VarId> {
    let mut out = Vec::new();
    walk_stmts(stmts, &mut |stmt| {
        if let Stmt::Decl(decl) = stmt {
            out.push(decl.var);
        }
    });
    out
}

/// Instantiation statements in execution (textual) order.
pub fn instantiations(stmts: &[Stmt]) -> Vec<&Instantiation> {
    let mut out = Vec::new();
    walk_stmts(stmts, &mut |stmt| {
        if let Stmt::Instantiate(inst) = stmt {
            out.push(inst);
        }
    });
    out
}

/// Rename variable identities: declarations, assignment targets and reads.
pub fn rename_vars(stmts: &mut [Stmt], map: &HashMap<VarId, VarId>) {
    if map.is_empty() {
        return;
    }
    walk_stmts_mut(stmts, &mut |stmt| {
        match stmt {
            Stmt::Decl(decl) => {
                if let Some(new) = map.get(&decl.var) {
                    decl.var = *new;
                }
            }
            Stmt::Assign { var, .. } => {
                if let Some(new) = map.get(var) {
                    *var = *new;
                }
            }
            _ => {}
        }
        stmt.for_each_expr_mut(&mut |e| rename_in_expr(e, map));
    });
}

pub fn rename_in_expr(expr: &mut Expr, map: &HashMap<VarId, VarId>) {
    expr.visit_mut(&mut |e| {
        if let Expr::Var(var) = e {
            if let Some(new) = map.get(var) {
                *var = *new;
            }
        }
    });
}

/// Point instantiations at different node instances.
pub fn retarget(stmts: &mut [Stmt], map: &HashMap<NodeId, NodeId>) {
    walk_stmts_mut(stmts, &mut |stmt| {
        if let Stmt::Instantiate(inst) = stmt {
            if let Some(new) = map.get(&inst.target) {
                inst.target = *new;
            }
        }
    });
}

// ── Tests ───────────────────────────────────────────────────────────────────

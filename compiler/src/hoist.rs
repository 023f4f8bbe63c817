// hoist.rs — Lift nested local declarations to procedure scope
//
// A declaration nested in a branch, loop body or block moves to the top of
// the procedure as an uninitialized declaration; its initializer stays in
// place as an assignment. Loop headers (`for (int i = ...)`) are left alone:
// the unroller owns induction variables.
//
// Preconditions: every declaration has a distinct `VarId`.
// Postconditions: no declaration remains nested except in `for` headers;
//                 initialization order is preserved; `Cow::Borrowed` iff
//                 nothing moved.
// Failure modes: none.
// Side effects: none.

use std::borrow::Cow;
use std::collections::HashSet;

use crate::ast::AssignOp;
use crate::id::VarId;
use crate::ir::{Stmt, VarDecl};

pub fn hoist_declarations(body: &[Stmt]) -> Cow<'_, [Stmt]> {
    if !body.iter().any(has_nested_decl) {
        return Cow::Borrowed(body);
    }

    let mut hoister = Hoister::default();
    let rest: Vec<Stmt> = body
        .iter()
        .map(|stmt| match stmt {
            Stmt::Decl(_) => stmt.clone(),
            other => hoister.children(other.clone()),
        })
        .collect();

    let mut out = hoister.lifted;
    out.extend(rest);
    Cow::Owned(out)
}

fn block_has_decl(stmts: &[Stmt]) -> bool {
    stmts
        .iter()
        .any(|s| matches!(s, Stmt::Decl(_)) || has_nested_decl(s))
}

fn has_nested_decl(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::If {
            then_body,
            else_body,
            ..
        } => block_has_decl(then_body) || else_body.as_deref().is_some_and(block_has_decl),
        Stmt::For { body, .. } | Stmt::While { body, .. } | Stmt::Block(body) => {
            block_has_decl(body)
        }
        _ => false,
    }
}

#[derive(Default)]
struct Hoister {
    lifted: Vec<Stmt>,
    seen: HashSet<VarId>,
}

impl Hoister {
    /// Hoist out of the blocks nested in `stmt`.
    fn children(&mut self, stmt: Stmt) -> Stmt {
        match stmt {
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => Stmt::If {
                cond,
                then_body: self.block(then_body),
                else_body: else_body.map(|b| self.block(b)),
            },
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => Stmt::For {
                init,
                cond,
                step,
                body: self.block(body),
            },
            Stmt::While { cond, body } => Stmt::While {
                cond,
                body: self.block(body),
            },
            Stmt::Block(body) => Stmt::Block(self.block(body)),
            other => other,
        }
    }

    fn block(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::Decl(VarDecl { var, ty, init }) => {
                    if self.seen.insert(var) {
                        self.lifted.push(Stmt::Decl(VarDecl {
                            var,
                            ty,
                            init: None,
                        }));
                    }
                    if let Some(value) = init {
                        out.push(Stmt::Assign {
                            var,
                            op: AssignOp::Set,
                            value,
                        });
                    }
                }
                other => out.push(self.children(other)),
            }
        }
        out
    }
}

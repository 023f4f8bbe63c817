// unroll.rs — Expand statically bounded loops in a node's `init` body
//
// A `for` loop qualifies when its header is a simple counting loop over an
// integer induction variable:
//
//   init:  `int i = A` or `i = A`
//   cond:  `i < B`, `i <= B`, `i > B`, `i >= B`, `i != B` (or mirrored)
//   step:  `i += K`, `i -= K`, `i++`, `i--`, `i = i + K`, `i = i - K`
//
// where A, B and K fold to integers under the current environment, K != 0,
// the body never assigns `i`, and the trip count is within the limit.
//
// Preconditions: declarations nested in loop bodies have been hoisted.
// Postconditions: each qualifying loop is replaced by one copy of its body
//                 per iteration with `i` substituted and folded; copies after
//                 the first use fresh variable identities and fresh child
//                 instances. Loops inside the copies are left for the next
//                 cycle.
// Failure modes: none; non-qualifying loops are left intact.
// Side effects: clones child subtrees into the graph arena.

use std::collections::HashMap;

use crate::ast::{AssignOp, BinOp, Type};
use crate::fold::fold_deep;
use crate::graph::StreamGraph;
use crate::id::{NodeId, VarId};
use crate::ir::{self, Expr, Literal, Stmt};
use crate::propagate::{eval_const, ConstEnv};

/// Default cap on the number of iterations a loop may be expanded to.
pub const DEFAULT_UNROLL_LIMIT: usize = 1024;

/// Unroll the qualifying loops of `node`'s `init`. Returns how many loops
/// were replaced.
pub fn unroll_loops(graph: &mut StreamGraph, node: NodeId, env: &ConstEnv, limit: usize) -> usize {
    let Some(mut init) = graph.node_mut(node).init.take() else {
        return 0;
    };
    let mut unroller = Unroller {
        graph: &mut *graph,
        node,
        env,
        limit,
        unrolled: 0,
    };
    unroller.block(&mut init);
    let unrolled = unroller.unrolled;
    graph.node_mut(node).init = Some(init);
    unrolled
}

/// A qualifying loop's induction variable and iteration values.
#[derive(Debug, PartialEq)]
struct LoopPlan {
    var: VarId,
    declared_in_header: bool,
    values: Vec<i64>,
    exit: i64,
}

struct Unroller<'g, 'e> {
    graph: &'g mut StreamGraph,
    node: NodeId,
    env: &'e ConstEnv,
    limit: usize,
    unrolled: usize,
}

impl Unroller<'_, '_> {
    fn block(&mut self, stmts: &mut Vec<Stmt>) {
        let mut i = 0;
        while i < stmts.len() {
            if let Some(plan) = self.plan(&stmts[i]) {
                if let Stmt::For { body, .. } = stmts.remove(i) {
                    let copies = self.expand(&plan, body);
                    let n = copies.len();
                    stmts.splice(i..i, copies);
                    self.unrolled += 1;
                    i += n;
                }
                continue;
            }
            match &mut stmts[i] {
                Stmt::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.block(then_body);
                    if let Some(else_body) = else_body {
                        self.block(else_body);
                    }
                }
                Stmt::For { body, .. } | Stmt::While { body, .. } | Stmt::Block(body) => {
                    self.block(body)
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn int(&self, expr: &Expr) -> Option<i64> {
        eval_const(expr, self.env)?.as_int()
    }

    fn plan(&self, stmt: &Stmt) -> Option<LoopPlan> {
        let Stmt::For {
            init: Some(init),
            cond: Some(cond),
            step: Some(step),
            body,
        } = stmt
        else {
            return None;
        };

        let (var, start, declared_in_header) = match &**init {
            Stmt::Decl(decl) if decl.ty == Type::Int => (decl.var, self.int(decl.init.as_ref()?)?, true),
            Stmt::Assign {
                var,
                op: AssignOp::Set,
                value,
            } if self.graph.var(*var).ty == Type::Int => (*var, self.int(value)?, false),
            _ => return None,
        };

        let (op, bound) = match cond {
            Expr::Binary(op, lhs, rhs) if **lhs == Expr::Var(var) => (*op, self.int(rhs)?),
            Expr::Binary(op, lhs, rhs) if **rhs == Expr::Var(var) => (mirror(*op)?, self.int(lhs)?),
            _ => return None,
        };
        if !matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Ne) {
            return None;
        }

        let delta = self.step(step, var)?;
        if delta == 0 || ir::assigned_vars(body).contains(&var) {
            return None;
        }

        let mut values = Vec::new();
        let mut current = start;
        while holds(op, current, bound) {
            if values.len() == self.limit {
                return None;
            }
            values.push(current);
            current = current.checked_add(delta)?;
        }

        Some(LoopPlan {
            var,
            declared_in_header,
            values,
            exit: current,
        })
    }

    /// The constant increment applied by `step` to `var`.
    fn step(&self, step: &Stmt, var: VarId) -> Option<i64> {
        let Stmt::Assign { var: target, op, value } = step else {
            return None;
        };
        if *target != var {
            return None;
        }
        match op {
            AssignOp::Add => self.int(value),
            AssignOp::Sub => self.int(value)?.checked_neg(),
            AssignOp::Set => match value {
                Expr::Binary(BinOp::Add, lhs, rhs) if **lhs == Expr::Var(var) => self.int(rhs),
                Expr::Binary(BinOp::Add, lhs, rhs) if **rhs == Expr::Var(var) => self.int(lhs),
                Expr::Binary(BinOp::Sub, lhs, rhs) if **lhs == Expr::Var(var) => {
                    self.int(rhs)?.checked_neg()
                }
                _ => None,
            },
            AssignOp::Mul => None,
        }
    }

    fn expand(&mut self, plan: &LoopPlan, body: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(body.len() * plan.values.len() + 1);
        for (k, value) in plan.values.iter().enumerate() {
            let mut copy = body.clone();
            if k > 0 {
                self.freshen(&mut copy);
            }
            substitute(&mut copy, plan.var, Literal::Int(*value));
            out.extend(copy);
        }
        if !plan.declared_in_header {
            out.push(Stmt::Assign {
                var: plan.var,
                op: AssignOp::Set,
                value: Expr::int(plan.exit),
            });
        }
        out
    }

    /// Give a body copy its own declarations and child instances.
    fn freshen(&mut self, copy: &mut [Stmt]) {
        let mut var_map = HashMap::new();
        for var in ir::declared_vars(copy) {
            let fresh = self.graph.fresh_var_like(var);
            var_map.insert(var, fresh);
        }
        ir::rename_vars(copy, &var_map);

        let targets: Vec<NodeId> = ir::instantiations(copy).iter().map(|i| i.target).collect();
        let mut node_map = HashMap::new();
        for target in targets {
            let clone = self.graph.clone_subtree(target);
            self.graph.node_mut(clone).parent = Some(self.node);
            node_map.insert(target, clone);
        }
        ir::retarget(copy, &node_map);
    }
}

fn mirror(op: BinOp) -> Option<BinOp> {
    Some(match op {
        BinOp::Lt => BinOp::Gt,
        BinOp::Le => BinOp::Ge,
        BinOp::Gt => BinOp::Lt,
        BinOp::Ge => BinOp::Le,
        BinOp::Ne => BinOp::Ne,
        _ => return None,
    })
}

fn holds(op: BinOp, value: i64, bound: i64) -> bool {
    match op {
        BinOp::Lt => value < bound,
        BinOp::Le => value <= bound,
        BinOp::Gt => value > bound,
        BinOp::Ge => value >= bound,
        BinOp::Ne => value != bound,
        _ => false,
    }
}

/// Replace reads of `var` by `value` and fold what becomes constant.
fn substitute(stmts: &mut [Stmt], var: VarId, value: Literal) {
    ir::walk_exprs_mut(stmts, &mut |root| {
        root.visit_mut(&mut |e| {
            if *e == Expr::Var(var) {
                *e = Expr::Lit(value);
            }
        });
        fold_deep(root);
    });
}

// ── Tests ───────────────────────────────────────────────────────────────────

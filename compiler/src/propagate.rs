// propagate.rs — Constant propagation over one procedure body
//
// Rewrites reads of variables with known literal values and folds literal
// subexpressions bottom-up. Known values come from two places:
//
//   - the node's `ConstEnv`: single-assignment bindings (parameters bound at
//     instantiation, declarations with constant initializers that are never
//     assigned again). Entries are only ever added.
//   - a flow map of straight-line values for variables that are assigned,
//     killed across branches and loops and never exported.
//
// Preconditions: `facts` describes the procedure(s) the body belongs to.
// Postconditions: the returned body is `Cow::Borrowed` iff nothing changed.
// Failure modes: none; non-foldable expressions are left as they are.
// Side effects: adds bindings to the environment; in scan mode, calls the
//               instantiation visitor for each instantiation in order.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::Type;
use crate::fold::{coerce, fold_binary, fold_unary};
use crate::id::VarId;
use crate::ir::{self, Expr, Instantiation, Literal, Stmt, VarDecl};

// ── Environment ─────────────────────────────────────────────────────────────

/// Literal bindings for one node activation, keyed by variable identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstEnv {
    bindings: BTreeMap<VarId, Literal>,
}

impl ConstEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: VarId) -> Option<Literal> {
        self.bindings.get(&var).copied()
    }

    /// Bind `var` unless it is already bound. Returns whether it was added.
    pub fn bind(&mut self, var: VarId, value: Literal) -> bool {
        if self.bindings.contains_key(&var) {
            return false;
        }
        self.bindings.insert(var, value);
        true
    }

    pub fn contains(&self, var: VarId) -> bool {
        self.bindings.contains_key(&var)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.bindings.keys().copied()
    }
}

/// Facts about the procedures of one node that propagation relies on.
#[derive(Debug, Clone, Default)]
pub struct BodyFacts {
    /// Variables assigned anywhere; these never enter the environment.
    pub assigned: BTreeSet<VarId>,
    /// Declared type of every local.
    pub types: HashMap<VarId, Type>,
}

impl BodyFacts {
    pub fn collect(bodies: &[&[Stmt]]) -> Self {
        let mut facts = BodyFacts::default();
        for body in bodies {
            facts.assigned.extend(ir::assigned_vars(body));
            ir::walk_stmts(body, &mut |stmt| {
                if let Stmt::Decl(decl) = stmt {
                    facts.types.insert(decl.var, decl.ty);
                }
            });
        }
        facts
    }
}

// ── Expression rewriting ────────────────────────────────────────────────────

/// Substitute known variables and fold. `None` means unchanged.
fn rewrite(expr: &Expr, lookup: &dyn Fn(VarId) -> Option<Literal>) -> Option<Expr> {
    match expr {
        Expr::Var(var) => lookup(*var).map(Expr::Lit),
        Expr::Lit(_) | Expr::Pop => None,
        Expr::Unary(op, inner) => {
            let new_inner = rewrite(inner, lookup);
            let current = new_inner.as_ref().unwrap_or(inner);
            if let Some(lit) = current.as_literal().and_then(|v| fold_unary(*op, v)) {
                return Some(Expr::Lit(lit));
            }
            new_inner.map(|i| Expr::Unary(*op, Box::new(i)))
        }
        Expr::Binary(op, lhs, rhs) => {
            let new_lhs = rewrite(lhs, lookup);
            let new_rhs = rewrite(rhs, lookup);
            let l = new_lhs.as_ref().unwrap_or(lhs);
            let r = new_rhs.as_ref().unwrap_or(rhs);
            if let (Some(a), Some(b)) = (l.as_literal(), r.as_literal()) {
                if let Some(lit) = fold_binary(*op, a, b) {
                    return Some(Expr::Lit(lit));
                }
            }
            if new_lhs.is_none() && new_rhs.is_none() {
                return None;
            }
            Some(Expr::Binary(
                *op,
                Box::new(new_lhs.unwrap_or_else(|| (**lhs).clone())),
                Box::new(new_rhs.unwrap_or_else(|| (**rhs).clone())),
            ))
        }
        Expr::Peek(index) => rewrite(index, lookup).map(|i| Expr::Peek(Box::new(i))),
    }
}

/// Rewrite `expr` against `lookup`, borrowing when nothing changes.
pub fn rewrite_expr<'a>(expr: &'a Expr, lookup: &dyn Fn(VarId) -> Option<Literal>) -> Cow<'a, Expr> {
    match rewrite(expr, lookup) {
        Some(new) => Cow::Owned(new),
        None => Cow::Borrowed(expr),
    }
}

/// The literal value of `expr` under `env`, if it folds completely.
pub fn eval_const(expr: &Expr, env: &ConstEnv) -> Option<Literal> {
    rewrite_expr(expr, &|v| env.get(v)).as_literal()
}

// ── Scan-mode hook ──────────────────────────────────────────────────────────

/// Receives each instantiation as the propagator reaches it.
pub trait InstantiationVisitor {
    /// `resolved[i]` is the literal value of argument `i` at this point of
    /// the body, if known. Returns replacement arguments when any changed.
    fn instantiate(&mut self, inst: &Instantiation, resolved: &[Option<Literal>]) -> Option<Vec<Expr>>;
}

// ── Propagator ──────────────────────────────────────────────────────────────

pub struct Propagator<'e, 'v> {
    env: &'e mut ConstEnv,
    facts: &'e BodyFacts,
    flow: HashMap<VarId, Literal>,
    visitor: Option<&'v mut dyn InstantiationVisitor>,
    rewrites: usize,
}

impl<'e, 'v> Propagator<'e, 'v> {
    pub fn new(env: &'e mut ConstEnv, facts: &'e BodyFacts) -> Self {
        Propagator {
            env,
            facts,
            flow: HashMap::new(),
            visitor: None,
            rewrites: 0,
        }
    }

    /// Scan mode: report every instantiation to `visitor`.
    pub fn with_visitor(mut self, visitor: &'v mut dyn InstantiationVisitor) -> Self {
        self.visitor = Some(visitor);
        self
    }

    /// Number of expressions rewritten so far.
    pub fn rewrites(&self) -> usize {
        self.rewrites
    }

    /// Propagate through `body` from an empty flow state.
    pub fn run<'b>(&mut self, body: &'b [Stmt]) -> Cow<'b, [Stmt]> {
        self.flow.clear();
        match self.block(body) {
            Some(new) => Cow::Owned(new),
            None => Cow::Borrowed(body),
        }
    }

    fn lookup(&self, var: VarId) -> Option<Literal> {
        self.env.get(var).or_else(|| self.flow.get(&var).copied())
    }

    fn expr(&mut self, expr: &Expr) -> Option<Expr> {
        let new = rewrite(expr, &|v| self.lookup(v));
        if new.is_some() {
            self.rewrites += 1;
        }
        new
    }

    fn kill(&mut self, vars: &BTreeSet<VarId>) {
        for var in vars {
            self.flow.remove(var);
        }
    }

    /// Record the value a statement leaves in `var`.
    fn record(&mut self, var: VarId, value: Option<Literal>) {
        let value = value.and_then(|lit| match self.facts.types.get(&var) {
            Some(ty) => coerce(lit, *ty),
            None => Some(lit),
        });
        match value {
            Some(lit) if !self.facts.assigned.contains(&var) => {
                self.env.bind(var, lit);
            }
            Some(lit) => {
                self.flow.insert(var, lit);
            }
            None => {
                self.flow.remove(&var);
            }
        }
    }

    fn block(&mut self, stmts: &[Stmt]) -> Option<Vec<Stmt>> {
        let mut out: Option<Vec<Stmt>> = None;
        for (i, stmt) in stmts.iter().enumerate() {
            match (self.stmt(stmt), &mut out) {
                (Some(new), Some(out)) => out.push(new),
                (Some(new), None) => {
                    let mut v = stmts[..i].to_vec();
                    v.push(new);
                    out = Some(v);
                }
                (None, Some(out)) => out.push(stmt.clone()),
                (None, None) => {}
            }
        }
        out
    }

    fn stmt(&mut self, stmt: &Stmt) -> Option<Stmt> {
        match stmt {
            Stmt::Decl(decl) => {
                let init = decl.init.as_ref().and_then(|e| self.expr(e));
                let value = init
                    .as_ref()
                    .or(decl.init.as_ref())
                    .and_then(Expr::as_literal)
                    .and_then(|lit| coerce(lit, decl.ty));
                self.record(decl.var, value);
                init.map(|init| {
                    Stmt::Decl(VarDecl {
                        var: decl.var,
                        ty: decl.ty,
                        init: Some(init),
                    })
                })
            }
            Stmt::Assign { var, op, value } => {
                let new_value = self.expr(value);
                let rhs = new_value.as_ref().unwrap_or(value).as_literal();
                let result = match op.binop() {
                    None => rhs,
                    Some(binop) => match (self.flow.get(var).copied(), rhs) {
                        (Some(cur), Some(rhs)) => fold_binary(binop, cur, rhs),
                        _ => None,
                    },
                };
                self.record(*var, result);
                new_value.map(|value| Stmt::Assign {
                    var: *var,
                    op: *op,
                    value,
                })
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let new_cond = self.expr(cond);
                let saved = self.flow.clone();
                let new_then = self.block(then_body);
                self.flow = saved.clone();
                let new_else = else_body.as_ref().and_then(|b| self.block(b));
                self.flow = saved;
                let mut written = ir::assigned_vars(then_body);
                if let Some(b) = else_body {
                    written.extend(ir::assigned_vars(b));
                }
                self.kill(&written);

                if new_cond.is_none() && new_then.is_none() && new_else.is_none() {
                    return None;
                }
                Some(Stmt::If {
                    cond: new_cond.unwrap_or_else(|| cond.clone()),
                    then_body: new_then.unwrap_or_else(|| then_body.clone()),
                    else_body: new_else.or_else(|| else_body.clone()),
                })
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let new_init = init.as_deref().and_then(|s| self.stmt(s));
                let mut written = ir::assigned_vars(body);
                if let Some(step) = step {
                    written.extend(ir::assigned_vars(std::slice::from_ref(&**step)));
                }
                self.kill(&written);
                let new_cond = cond.as_ref().and_then(|c| self.expr(c));
                let new_body = self.block(body);
                let new_step = step.as_deref().and_then(|s| self.stmt(s));
                self.kill(&written);

                if new_init.is_none() && new_cond.is_none() && new_body.is_none() && new_step.is_none() {
                    return None;
                }
                Some(Stmt::For {
                    init: new_init.map(Box::new).or_else(|| init.clone()),
                    cond: new_cond.or_else(|| cond.clone()),
                    step: new_step.map(Box::new).or_else(|| step.clone()),
                    body: new_body.unwrap_or_else(|| body.clone()),
                })
            }
            Stmt::While { cond, body } => {
                let written = ir::assigned_vars(body);
                self.kill(&written);
                let new_cond = self.expr(cond);
                let new_body = self.block(body);
                self.kill(&written);

                if new_cond.is_none() && new_body.is_none() {
                    return None;
                }
                Some(Stmt::While {
                    cond: new_cond.unwrap_or_else(|| cond.clone()),
                    body: new_body.unwrap_or_else(|| body.clone()),
                })
            }
            Stmt::Block(stmts) => self.block(stmts).map(Stmt::Block),
            Stmt::Push(value) => self.expr(value).map(Stmt::Push),
            Stmt::Expr(value) => self.expr(value).map(Stmt::Expr),
            Stmt::Instantiate(inst) => {
                let resolved: Vec<Option<Literal>> = inst
                    .args
                    .iter()
                    .map(|a| rewrite_expr(a, &|v| self.lookup(v)).as_literal())
                    .collect();
                let visitor = self.visitor.as_mut()?;
                let args = visitor.instantiate(inst, &resolved)?;
                Some(Stmt::Instantiate(Instantiation {
                    args,
                    ..inst.clone()
                }))
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;
    use crate::elaborate::elaborate;
    use crate::graph::StreamGraph;
    use crate::id::NodeId;
    use crate::parser;

    fn build(source: &str) -> (StreamGraph, NodeId) {
        let parsed = parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let result = elaborate(&parsed.program.unwrap(), None);
        assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
        let root = result.graph.root.unwrap();
        (result.graph, root)
    }

    fn run_init(g: &StreamGraph, node: NodeId, env: &mut ConstEnv) -> (Vec<Stmt>, usize) {
        let init = g.node(node).init.clone().unwrap_or_default();
        let work = g.node(node).work.clone().unwrap_or_default();
        let facts = BodyFacts::collect(&[&init, &work]);
        let mut p = Propagator::new(env, &facts);
        let out = p.run(&init).into_owned();
        let rewrites = p.rewrites();
        (out, rewrites)
    }

    fn decl_init(stmt: &Stmt) -> Option<&Expr> {
        match stmt {
            Stmt::Decl(d) => d.init.as_ref(),
            _ => None,
        }
    }

    #[test]
    fn constant_decl_binds_and_folds() {
        let (g, root) = build("filter F() { init { int a = 2; int b = a * 3 + 1; } work { } }");
        let mut env = ConstEnv::new();
        let (out, rewrites) = run_init(&g, root, &mut env);
        assert_eq!(decl_init(&out[1]), Some(&Expr::int(7)));
        assert_eq!(env.len(), 2);
        assert_eq!(rewrites, 1);
    }

    #[test]
    fn parameters_come_from_env() {
        let (g, root) = build("filter F(int n) { init { int m = n - 1; } work { } }");
        let mut env = ConstEnv::new();
        env.bind(g.node(root).params[0], Literal::Int(5));
        let (out, _) = run_init(&g, root, &mut env);
        assert_eq!(decl_init(&out[0]), Some(&Expr::int(4)));
    }

    #[test]
    fn unchanged_body_is_borrowed() {
        let (g, root) = build("filter F(int n) { init { int m = n; } work { } }");
        let init = g.node(root).init.clone().unwrap();
        let facts = BodyFacts::collect(&[&init]);
        let mut env = ConstEnv::new();
        let mut p = Propagator::new(&mut env, &facts);
        assert!(matches!(p.run(&init), Cow::Borrowed(_)));
        assert_eq!(p.rewrites(), 0);
    }

    #[test]
    fn reassigned_variable_stays_out_of_env() {
        let (g, root) = build(
            "filter F() { init { int x = 1; int y = x; x = 4; int z = x + 1; } work { } }",
        );
        let mut env = ConstEnv::new();
        let (out, _) = run_init(&g, root, &mut env);
        // Straight-line flow still rewrites both reads.
        assert_eq!(decl_init(&out[1]), Some(&Expr::int(1)));
        assert_eq!(decl_init(&out[3]), Some(&Expr::int(5)));
        let Stmt::Decl(x) = &out[0] else {
            panic!("expected declaration")
        };
        assert!(!env.contains(x.var));
        // y and z are single-assignment.
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn branch_assignments_kill_flow_values() {
        let (g, root) = build(
            "filter F(int c) { init { int x = 1; if (c > 0) { x = 2; } int y = x; } work { } }",
        );
        let mut env = ConstEnv::new();
        let (out, _) = run_init(&g, root, &mut env);
        let Some(Expr::Var(_)) = decl_init(&out[2]) else {
            panic!("x must stay symbolic after the branch")
        };
    }

    #[test]
    fn loop_kills_induction_variable() {
        let (g, root) = build(
            "filter F(int n) { init { int s = 0; for (int i = 0; i < n; i++) { s += i; } int t = s; } work { } }",
        );
        let mut env = ConstEnv::new();
        let (out, _) = run_init(&g, root, &mut env);
        let Stmt::For { body, cond, .. } = &out[1] else {
            panic!("expected loop")
        };
        assert!(matches!(cond, Some(Expr::Binary(BinOp::Lt, _, _))));
        let Stmt::Assign { value, .. } = &body[0] else {
            panic!("expected assignment")
        };
        assert!(matches!(value, Expr::Var(_)));
        assert!(matches!(decl_init(&out[2]), Some(Expr::Var(_))));
    }

    #[test]
    fn env_is_monotone() {
        let mut env = ConstEnv::new();
        assert!(env.bind(VarId(0), Literal::Int(1)));
        assert!(!env.bind(VarId(0), Literal::Int(2)));
        assert_eq!(env.get(VarId(0)), Some(Literal::Int(1)));
    }

    #[test]
    fn declared_float_widens_int_initializer() {
        let (g, root) = build("filter F() { init { float g = 2; float h = g * 1.5; } work { } }");
        let mut env = ConstEnv::new();
        let (out, _) = run_init(&g, root, &mut env);
        assert_eq!(decl_init(&out[1]), Some(&Expr::Lit(Literal::Float(3.0))));
    }

    #[test]
    fn instantiation_args_untouched_without_visitor() {
        let (g, root) = build(
            "filter A(int n) { work { } }
             pipeline P() { init { int k = 3; add A(k); } }",
        );
        let mut env = ConstEnv::new();
        let (out, _) = run_init(&g, root, &mut env);
        let Stmt::Instantiate(inst) = &out[1] else {
            panic!("expected instantiation")
        };
        assert!(matches!(inst.args[0], Expr::Var(_)));
    }

    struct Recorder {
        seen: Vec<Vec<Option<Literal>>>,
    }

    impl InstantiationVisitor for Recorder {
        fn instantiate(&mut self, _inst: &Instantiation, resolved: &[Option<Literal>]) -> Option<Vec<Expr>> {
            self.seen.push(resolved.to_vec());
            let args: Option<Vec<Expr>> = resolved.iter().map(|r| r.map(Expr::Lit)).collect();
            args
        }
    }

    #[test]
    fn visitor_sees_flow_values_in_order() {
        let (g, root) = build(
            "filter A(int n) { work { } }
             pipeline P(int m) { init { int t = 1; add A(t); t = t * 2; add A(t); add A(m); } }",
        );
        let init = g.node(root).init.clone().unwrap();
        let facts = BodyFacts::collect(&[&init]);
        let mut env = ConstEnv::new();
        let mut recorder = Recorder { seen: Vec::new() };
        let out = Propagator::new(&mut env, &facts)
            .with_visitor(&mut recorder)
            .run(&init)
            .into_owned();
        assert_eq!(
            recorder.seen,
            vec![
                vec![Some(Literal::Int(1))],
                vec![Some(Literal::Int(2))],
                vec![None],
            ]
        );
        let args: Vec<Vec<Expr>> = ir::instantiations(&out)
            .iter()
            .map(|i| i.args.clone())
            .collect();
        assert_eq!(args[0], vec![Expr::int(1)]);
        assert_eq!(args[1], vec![Expr::int(2)]);
        assert!(matches!(args[2][0], Expr::Var(_)));
    }
}

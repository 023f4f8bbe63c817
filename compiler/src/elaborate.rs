// elaborate.rs — Build the stream graph instance tree from the AST
//
// Every instantiation statement elaborates a fresh instance of its target
// declaration, so the result is a tree of nodes rooted at the top-level
// stream. Names are resolved to `VarId`s with block scoping.
//
// Preconditions: `program` is a parsed AST.
// Postconditions: `graph.root` is set when a top-level stream exists; every
//                 non-root node has a parent; initial child lists list the
//                 `add` instantiations of `init` in textual order.
// Failure modes: unknown names, duplicate declarations or sections, recursive
//                declarations, misplaced roles, malformed feedback loops and
//                assignments to parameters → `Diagnostic` errors.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::ast::{self, ChildRole, RateKind, Span, StreamDecl, StreamItem, StreamKind, WeightKind};
use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};
use crate::graph::{Child, NodeKind, Rates, StreamGraph, Weights};
use crate::id::{NodeId, VarId};
use crate::ir::{self, Expr, Instantiation, Literal, Stmt, VarDecl};

/// Result of elaboration.
#[derive(Debug)]
pub struct ElaborateResult {
    pub graph: StreamGraph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Elaborate `program`, rooted at `top` if given.
pub fn elaborate(program: &ast::Program, top: Option<&str>) -> ElaborateResult {
    let mut elab = Elaborator {
        decls: HashMap::new(),
        graph: StreamGraph::new(),
        diagnostics: Vec::new(),
        active: Vec::new(),
    };

    for decl in &program.decls {
        if let Some(prev) = elab.decls.get(decl.name.name.as_str()) {
            let diag = Diagnostic::new(
                DiagLevel::Error,
                decl.name.span,
                format!("duplicate declaration of stream '{}'", decl.name.name),
            )
            .with_code(codes::E0202)
            .with_related(prev.name.span, "first declared here");
            elab.diagnostics.push(diag);
            continue;
        }
        elab.decls.insert(decl.name.name.as_str(), decl);
    }

    if let Some(decl) = elab.select_root(program, top) {
        elab.graph.root = elab.instantiate(decl);
    }

    ElaborateResult {
        graph: elab.graph,
        diagnostics: elab.diagnostics,
    }
}

// ── Scopes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Scope {
    frames: Vec<HashMap<String, VarId>>,
}

impl Scope {
    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn push_frame(&mut self, frame: HashMap<String, VarId>) {
        self.frames.push(frame);
    }

    fn pop(&mut self) -> HashMap<String, VarId> {
        self.frames.pop().unwrap_or_default()
    }

    fn lookup(&self, name: &str) -> Option<VarId> {
        self.frames.iter().rev().find_map(|f| f.get(name).copied())
    }

    fn declared_here(&self, name: &str) -> bool {
        self.frames.last().is_some_and(|f| f.contains_key(name))
    }

    fn declare(&mut self, name: &str, var: VarId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), var);
        }
    }
}

/// The node whose body is being lowered.
struct Ctx<'p> {
    node: NodeId,
    kind: StreamKind,
    params: &'p [VarId],
    in_init: bool,
}

// ── Elaborator ──────────────────────────────────────────────────────────────

struct Elaborator<'a> {
    decls: HashMap<&'a str, &'a StreamDecl>,
    graph: StreamGraph,
    diagnostics: Vec<Diagnostic>,
    /// Declarations currently being elaborated, outermost first.
    active: Vec<&'a str>,
}

/// Sections of one declaration after duplicate checking.
#[derive(Default)]
struct Sections<'a> {
    init: Option<&'a [ast::Stmt]>,
    work: Option<&'a ast::WorkDecl>,
    split: Option<&'a ast::WeightsDecl>,
    join: Option<&'a ast::WeightsDecl>,
    delay: Option<&'a ast::Expr>,
}

impl<'a> Elaborator<'a> {
    fn error(&mut self, code: DiagCode, span: Span, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::new(DiagLevel::Error, span, message).with_code(code));
    }

    fn select_root(&mut self, program: &'a ast::Program, top: Option<&str>) -> Option<&'a StreamDecl> {
        if let Some(name) = top {
            let found = self.decls.get(name).copied();
            if found.is_none() {
                self.error(
                    codes::E0200,
                    program.span,
                    format!("top-level stream '{name}' is not declared"),
                );
            }
            return found;
        }

        let mut instantiated = HashSet::new();
        for decl in &program.decls {
            for item in &decl.items {
                if let StreamItem::Init(stmts, _) = item {
                    collect_targets(stmts, &mut instantiated);
                }
            }
        }
        let root = program
            .decls
            .iter()
            .rev()
            .find(|d| !instantiated.contains(d.name.name.as_str()))
            .and_then(|d| self.decls.get(d.name.name.as_str()).copied());
        if root.is_none() {
            self.diagnostics.push(
                Diagnostic::new(DiagLevel::Error, program.span, "no top-level stream declared")
                    .with_code(codes::E0209)
                    .with_hint("declare a stream that no other stream instantiates, or pass --top"),
            );
        }
        root
    }

    fn sections(&mut self, decl: &'a StreamDecl) -> Sections<'a> {
        let mut s = Sections::default();
        for item in &decl.items {
            let (label, span, dup) = match item {
                StreamItem::Init(stmts, span) => ("init", *span, s.init.replace(stmts).is_some()),
                StreamItem::Work(work) => ("work", work.span, s.work.replace(work).is_some()),
                StreamItem::Split(w) => ("split", w.span, s.split.replace(w).is_some()),
                StreamItem::Join(w) => ("join", w.span, s.join.replace(w).is_some()),
                StreamItem::Delay(e, span) => ("delay", *span, s.delay.replace(e).is_some()),
            };
            if dup {
                self.error(
                    codes::E0205,
                    span,
                    format!("duplicate '{label}' section in '{}'", decl.name.name),
                );
            }
            let allowed = match decl.kind {
                StreamKind::Filter => matches!(label, "init" | "work"),
                StreamKind::Pipeline => label == "init",
                StreamKind::SplitJoin => matches!(label, "init" | "split" | "join"),
                StreamKind::FeedbackLoop => matches!(label, "init" | "split" | "join" | "delay"),
            };
            if !allowed {
                self.error(
                    codes::E0205,
                    span,
                    format!(
                        "'{label}' section is not allowed in {} '{}'",
                        decl.kind.keyword(),
                        decl.name.name
                    ),
                );
            }
        }
        s
    }

    /// Elaborate a fresh instance of `decl`. Returns `None` for a recursive
    /// declaration.
    fn instantiate(&mut self, decl: &'a StreamDecl) -> Option<NodeId> {
        let name = decl.name.name.as_str();
        if self.active.contains(&name) {
            let chain = self.active.join(" -> ");
            self.error(
                codes::E0203,
                decl.name.span,
                format!("stream '{name}' instantiates itself ({chain} -> {name})"),
            );
            return None;
        }
        self.active.push(name);

        let sections = self.sections(decl);

        let mut scope = Scope::default();
        scope.push();
        let mut params = Vec::with_capacity(decl.params.len());
        for p in &decl.params {
            if scope.declared_here(&p.name.name) {
                self.error(
                    codes::E0202,
                    p.name.span,
                    format!("duplicate parameter '{}'", p.name.name),
                );
            }
            let var = self.graph.add_var(p.name.name.clone(), p.ty);
            scope.declare(&p.name.name, var);
            params.push(var);
        }

        // Placeholder kind until the init body is lowered.
        let id = self.graph.add_node(
            name,
            decl.span,
            params.clone(),
            NodeKind::Pipeline {
                children: Vec::new(),
            },
        );

        let mut ctx = Ctx {
            node: id,
            kind: decl.kind,
            params: &params,
            in_init: true,
        };

        // `init` keeps its top-level frame: fields and `work` can see it.
        scope.push();
        let init = sections
            .init
            .map(|stmts| self.lower_stmts(stmts, &mut scope, &ctx));
        let init_frame = scope.pop();
        scope.push_frame(init_frame);

        ctx.in_init = false;
        let work = sections.work.map(|w| {
            scope.push();
            let body = self.lower_stmts(&w.body, &mut scope, &ctx);
            scope.pop();
            body
        });

        let instances: Vec<&Instantiation> =
            init.as_ref().map_or(Vec::new(), |b| ir::instantiations(b));

        let kind = match decl.kind {
            StreamKind::Filter => NodeKind::Filter {
                rates: self.lower_rates(sections.work, &scope),
            },
            StreamKind::Pipeline => NodeKind::Pipeline {
                children: add_children(&instances),
            },
            StreamKind::SplitJoin => {
                let splitter = self.lower_weights(sections.split, &scope);
                let joiner = self.lower_weights(sections.join, &scope);
                if let (Some(join), WeightKind::Duplicate) = (sections.join, joiner.kind) {
                    self.error(codes::E0206, join.span, "a joiner cannot duplicate");
                }
                NodeKind::SplitJoin {
                    splitter,
                    joiner,
                    children: add_children(&instances),
                }
            }
            StreamKind::FeedbackLoop => {
                let joiner = self.lower_weights(sections.join, &scope);
                let splitter = self.lower_weights(sections.split, &scope);
                if let (Some(join), WeightKind::Duplicate) = (sections.join, joiner.kind) {
                    self.error(codes::E0206, join.span, "a joiner cannot duplicate");
                }
                let delay = sections
                    .delay
                    .map_or(Expr::int(0), |e| self.lower_expr(e, &scope));
                let body = role_child(&instances, ChildRole::Body);
                let loop_child = role_child(&instances, ChildRole::Loop);
                for (part, missing) in [("body", body.is_none()), ("loop", loop_child.is_none())] {
                    if missing {
                        self.error(
                            codes::E0207,
                            decl.name.span,
                            format!("feedback loop '{name}' has no {part} stream"),
                        );
                    }
                }
                NodeKind::FeedbackLoop {
                    joiner,
                    splitter,
                    delay,
                    body,
                    loop_child,
                }
            }
        };

        let node = self.graph.node_mut(id);
        node.kind = kind;
        node.init = init;
        node.work = work;

        self.active.pop();
        Some(id)
    }

    fn lower_rates(&mut self, work: Option<&'a ast::WorkDecl>, scope: &Scope) -> Rates {
        let (mut pop, mut peek, mut push) = (None, None, None);
        for (kind, expr) in work.map_or(&[][..], |w| &w.rates[..]) {
            let slot = match kind {
                RateKind::Pop => &mut pop,
                RateKind::Peek => &mut peek,
                RateKind::Push => &mut push,
            };
            if slot.is_some() {
                let label = match kind {
                    RateKind::Pop => "pop",
                    RateKind::Peek => "peek",
                    RateKind::Push => "push",
                };
                self.error(codes::E0205, expr.span(), format!("duplicate {label} rate"));
                continue;
            }
            *slot = Some(self.lower_expr(expr, scope));
        }
        let pop = pop.unwrap_or(Expr::int(0));
        let peek = peek.unwrap_or_else(|| pop.clone());
        Rates {
            pop,
            peek,
            push: push.unwrap_or(Expr::int(0)),
        }
    }

    fn lower_weights(&mut self, decl: Option<&'a ast::WeightsDecl>, scope: &Scope) -> Weights {
        match decl {
            Some(w) => Weights {
                kind: w.kind,
                exprs: w.weights.iter().map(|e| self.lower_expr(e, scope)).collect(),
            },
            None => Weights::round_robin(Vec::new()),
        }
    }

    // ── Statements ──

    fn lower_block(&mut self, stmts: &'a [ast::Stmt], scope: &mut Scope, ctx: &Ctx) -> Vec<Stmt> {
        scope.push();
        let out = self.lower_stmts(stmts, scope, ctx);
        scope.pop();
        out
    }

    fn lower_stmts(&mut self, stmts: &'a [ast::Stmt], scope: &mut Scope, ctx: &Ctx) -> Vec<Stmt> {
        stmts
            .iter()
            .filter_map(|s| self.lower_stmt(s, scope, ctx))
            .collect()
    }

    fn lower_stmt(&mut self, stmt: &'a ast::Stmt, scope: &mut Scope, ctx: &Ctx) -> Option<Stmt> {
        use ast::StmtKind as K;
        let lowered = match &stmt.kind {
            K::Decl { ty, name, init } => {
                let init = init.as_ref().map(|e| self.lower_expr(e, scope));
                if scope.declared_here(&name.name) {
                    self.error(
                        codes::E0202,
                        name.span,
                        format!("duplicate declaration of '{}'", name.name),
                    );
                }
                let var = self.graph.add_var(name.name.clone(), *ty);
                scope.declare(&name.name, var);
                Stmt::Decl(VarDecl {
                    var,
                    ty: *ty,
                    init,
                })
            }
            K::Assign { name, op, value } => {
                let value = self.lower_expr(value, scope);
                let var = self.resolve(name, scope)?;
                if ctx.params.contains(&var) {
                    self.error(
                        codes::E0208,
                        name.span,
                        format!("cannot assign to parameter '{}'", name.name),
                    );
                }
                Stmt::Assign { var, op: *op, value }
            }
            K::If {
                cond,
                then_body,
                else_body,
            } => Stmt::If {
                cond: self.lower_expr(cond, scope),
                then_body: self.lower_block(then_body, scope, ctx),
                else_body: else_body
                    .as_ref()
                    .map(|b| self.lower_block(b, scope, ctx)),
            },
            K::For {
                init,
                cond,
                step,
                body,
            } => {
                scope.push();
                let init = init
                    .as_ref()
                    .and_then(|s| self.lower_stmt(s, scope, ctx))
                    .map(Box::new);
                let cond = cond.as_ref().map(|e| self.lower_expr(e, scope));
                let step = step
                    .as_ref()
                    .and_then(|s| self.lower_stmt(s, scope, ctx))
                    .map(Box::new);
                let body = self.lower_block(body, scope, ctx);
                scope.pop();
                Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                }
            }
            K::While { cond, body } => Stmt::While {
                cond: self.lower_expr(cond, scope),
                body: self.lower_block(body, scope, ctx),
            },
            K::Block(stmts) => Stmt::Block(self.lower_block(stmts, scope, ctx)),
            K::Push(value) => Stmt::Push(self.lower_expr(value, scope)),
            K::Expr(value) => Stmt::Expr(self.lower_expr(value, scope)),
            K::Instantiate { role, target, args } => {
                return self.lower_instantiate(stmt.span, *role, target, args, scope, ctx);
            }
        };
        Some(lowered)
    }

    fn lower_instantiate(
        &mut self,
        span: Span,
        role: ChildRole,
        target: &ast::Ident,
        args: &'a [ast::Expr],
        scope: &mut Scope,
        ctx: &Ctx,
    ) -> Option<Stmt> {
        let role_ok = ctx.in_init
            && match ctx.kind {
                StreamKind::Filter => false,
                StreamKind::Pipeline | StreamKind::SplitJoin => role == ChildRole::Add,
                StreamKind::FeedbackLoop => role != ChildRole::Add,
            };
        if !role_ok {
            let place = if ctx.in_init { ctx.kind.keyword() } else { "work body" };
            self.error(
                codes::E0204,
                span,
                format!("'{}' instantiation is not allowed in a {place}", role.keyword()),
            );
            return None;
        }

        let Some(decl) = self.decls.get(target.name.as_str()).copied() else {
            self.error(
                codes::E0200,
                target.span,
                format!("unknown stream '{}'", target.name),
            );
            return None;
        };

        let args: Vec<Expr> = args.iter().map(|a| self.lower_expr(a, scope)).collect();
        let child = self.instantiate(decl)?;
        self.graph.node_mut(child).parent = Some(ctx.node);
        Some(Stmt::Instantiate(Instantiation {
            role,
            target: child,
            args,
            span,
        }))
    }

    // ── Expressions ──

    fn resolve(&mut self, name: &ast::Ident, scope: &Scope) -> Option<VarId> {
        let found = scope.lookup(&name.name);
        if found.is_none() {
            self.error(
                codes::E0201,
                name.span,
                format!("unknown variable '{}'", name.name),
            );
        }
        found
    }

    fn lower_expr(&mut self, expr: &ast::Expr, scope: &Scope) -> Expr {
        use ast::Expr as A;
        match expr {
            A::Int(v, _) => Expr::Lit(Literal::Int(*v)),
            A::Float(v, _) => Expr::Lit(Literal::Float(*v)),
            A::Bool(v, _) => Expr::Lit(Literal::Bool(*v)),
            // Unknown names are reported; the placeholder keeps lowering going.
            A::Var(name) => self.resolve(name, scope).map_or(Expr::int(0), Expr::Var),
            A::Unary(op, inner, _) => Expr::Unary(*op, Box::new(self.lower_expr(inner, scope))),
            A::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(self.lower_expr(lhs, scope)),
                Box::new(self.lower_expr(rhs, scope)),
            ),
            A::Pop(_) => Expr::Pop,
            A::Peek(index, _) => Expr::Peek(Box::new(self.lower_expr(index, scope))),
        }
    }
}

fn add_children(instances: &[&Instantiation]) -> Vec<Child> {
    instances
        .iter()
        .filter(|i| i.role == ChildRole::Add)
        .map(|i| Child {
            node: i.target,
            args: i.args.clone(),
        })
        .collect()
}

fn role_child(instances: &[&Instantiation], role: ChildRole) -> Option<Child> {
    instances.iter().find(|i| i.role == role).map(|i| Child {
        node: i.target,
        args: i.args.clone(),
    })
}

fn collect_targets<'p>(stmts: &'p [ast::Stmt], out: &mut HashSet<&'p str>) {
    use ast::StmtKind as K;
    for stmt in stmts {
        match &stmt.kind {
            K::Instantiate { target, .. } => {
                out.insert(target.name.as_str());
            }
            K::If {
                then_body,
                else_body,
                ..
            } => {
                collect_targets(then_body, out);
                if let Some(b) = else_body {
                    collect_targets(b, out);
                }
            }
            K::For { body, .. } | K::While { body, .. } | K::Block(body) => {
                collect_targets(body, out)
            }
            _ => {}
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

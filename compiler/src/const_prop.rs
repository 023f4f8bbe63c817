// const_prop.rs — Constant propagation and unrolling over the whole graph
//
// Drives the per-node fixpoint (propagate, resolve fields, hoist, propagate
// work, unroll, resync children) and then recurses into children with fresh
// environments seeded only from argument bindings.
//
// Preconditions: `graph` was produced by `elaborate` (or has the same shape):
//                child lists mirror `init`, parameters have types.
// Postconditions: every node reachable from the root has reached its local
//                 fixpoint; literal arguments are bound in children and
//                 back-substituted into the parent; composites' child lists
//                 match their unrolled `init`.
// Failure modes: argument count mismatch (E0100) and cyclic instantiation
//                (E0101) abort the affected subtree; siblings still run.
// Side effects: mutates the graph in place; may add nodes and variables to
//               the arenas; prints per-cycle progress to stderr if verbose.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ast::Span;
use crate::children::sync_children;
use crate::diag::codes;
use crate::diag::{DiagLevel, Diagnostic};
use crate::fields::resolve_fields;
use crate::fold::coerce;
use crate::graph::StreamGraph;
use crate::hoist::hoist_declarations;
use crate::id::NodeId;
use crate::ir::{self, Expr, Instantiation, Literal, Stmt};
use crate::propagate::{eval_const, BodyFacts, ConstEnv, InstantiationVisitor, Propagator};
use crate::unroll::{unroll_loops, DEFAULT_UNROLL_LIMIT};

// ── Configuration ──────────────────────────────────────────────────────────

/// How a composite finds the argument lists of its children once it has
/// reached its fixpoint.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RecursionStrategy {
    /// Re-scan `init` and recurse at each instantiation as it is reached.
    #[default]
    Rescan,
    /// Walk the explicit child list.
    Materialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstPropConfig {
    pub strategy: RecursionStrategy,
    /// Largest trip count a loop may have and still be unrolled.
    pub unroll_limit: usize,
    pub verbose: bool,
}

impl Default for ConstPropConfig {
    fn default() -> Self {
        ConstPropConfig {
            strategy: RecursionStrategy::default(),
            unroll_limit: DEFAULT_UNROLL_LIMIT,
            verbose: false,
        }
    }
}

// ── Result ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstPropStats {
    pub nodes_visited: usize,
    /// Fixpoint cycles summed over all activations.
    pub cycles: usize,
    pub unrolled_loops: usize,
    pub fields_resolved: usize,
    pub rewrites: usize,
    pub children_synced: usize,
}

/// Trace of one node activation: environment size and unroll count at the
/// end of each fixpoint cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub node: NodeId,
    pub env_sizes: Vec<usize>,
    pub unrolled: Vec<usize>,
}

#[derive(Debug)]
pub struct ConstPropResult {
    pub stats: ConstPropStats,
    /// In activation order (pre-order over the instance tree).
    pub activations: Vec<Activation>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the pass from the graph's root with an empty environment.
pub fn propagate_and_unroll(graph: &mut StreamGraph, config: &ConstPropConfig) -> ConstPropResult {
    let mut orch = Orchestrator {
        graph,
        config,
        active: Vec::new(),
        stats: ConstPropStats::default(),
        activations: Vec::new(),
        diagnostics: Vec::new(),
    };
    if let Some(root) = orch.graph.root {
        orch.activate(root, ConstEnv::new());
    }
    ConstPropResult {
        stats: orch.stats,
        activations: orch.activations,
        diagnostics: orch.diagnostics,
    }
}

// ── Orchestrator ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Propagate,
    ResolveFields,
    Hoist,
    PropagateWork,
    Unroll,
    CheckProgress,
    Recurse,
    Done,
}

struct Orchestrator<'g, 'c> {
    graph: &'g mut StreamGraph,
    config: &'c ConstPropConfig,
    /// Nodes whose activation is in progress, outermost first.
    active: Vec<NodeId>,
    stats: ConstPropStats,
    activations: Vec<Activation>,
    diagnostics: Vec<Diagnostic>,
}

fn changed(body: Cow<'_, [Stmt]>) -> Option<Vec<Stmt>> {
    match body {
        Cow::Owned(new) => Some(new),
        Cow::Borrowed(_) => None,
    }
}

impl Orchestrator<'_, '_> {
    fn activate(&mut self, node: NodeId, mut env: ConstEnv) {
        if let Some(pos) = self.active.iter().position(|n| *n == node) {
            self.report_cycle(pos, node);
            return;
        }
        self.active.push(node);
        self.stats.nodes_visited += 1;
        let slot = self.activations.len();
        self.activations.push(Activation {
            node,
            env_sizes: Vec::new(),
            unrolled: Vec::new(),
        });

        let mut phase = Phase::Propagate;
        let mut unrolled = 0;
        while phase != Phase::Done {
            phase = match phase {
                Phase::Propagate => {
                    self.propagate_init(node, &mut env);
                    Phase::ResolveFields
                }
                Phase::ResolveFields => {
                    self.stats.fields_resolved += resolve_fields(self.graph.node_mut(node), &env);
                    Phase::Hoist
                }
                Phase::Hoist => {
                    let n = self.graph.node_mut(node);
                    for body in n.init.iter_mut().chain(n.work.iter_mut()) {
                        if let Some(new) = changed(hoist_declarations(body)) {
                            *body = new;
                        }
                    }
                    Phase::PropagateWork
                }
                Phase::PropagateWork => {
                    self.propagate_work(node, &env);
                    Phase::Unroll
                }
                Phase::Unroll => {
                    unrolled = unroll_loops(self.graph, node, &env, self.config.unroll_limit);
                    self.stats.unrolled_loops += unrolled;
                    Phase::CheckProgress
                }
                Phase::CheckProgress => {
                    self.stats.cycles += 1;
                    let trace = &mut self.activations[slot];
                    trace.env_sizes.push(env.len());
                    trace.unrolled.push(unrolled);
                    if self.config.verbose {
                        eprintln!(
                            "sgc: {} ({}): cycle {}, env={}, unrolled={}",
                            self.graph.node(node).name,
                            node,
                            trace.env_sizes.len(),
                            env.len(),
                            unrolled
                        );
                    }
                    if unrolled == 0 {
                        Phase::Recurse
                    } else {
                        if sync_children(self.graph, node) {
                            self.stats.children_synced += 1;
                        }
                        Phase::Propagate
                    }
                }
                Phase::Recurse => {
                    self.recurse(node, &mut env);
                    Phase::Done
                }
                Phase::Done => Phase::Done,
            };
        }

        self.active.pop();
    }

    fn report_cycle(&mut self, pos: usize, node: NodeId) {
        let path: Vec<&str> = self.active[pos..]
            .iter()
            .chain(std::iter::once(&node))
            .map(|n| self.graph.node(*n).name.as_str())
            .collect();
        let n = self.graph.node(node);
        let diag = Diagnostic::new(
            DiagLevel::Error,
            n.span,
            format!("cyclic instantiation of '{}' ({})", n.name, path.join(" -> ")),
        )
        .with_code(codes::E0101)
        .with_hint("a stream instance may not contain itself");
        let diag = self.with_active_path(diag);
        self.diagnostics.push(diag);
    }

    /// Attach the active instantiation path, innermost first, as causes.
    fn with_active_path(&self, mut diag: Diagnostic) -> Diagnostic {
        for id in self.active.iter().rev() {
            let n = self.graph.node(*id);
            diag = diag.with_cause(format!("in '{}' ({})", n.name, id), Some(n.span));
        }
        diag
    }

    fn propagate_init(&mut self, node: NodeId, env: &mut ConstEnv) {
        let n = self.graph.node(node);
        let Some(init) = n.init.as_deref() else {
            return;
        };
        let facts = BodyFacts::collect(&[init, n.work.as_deref().unwrap_or_default()]);
        let mut prop = Propagator::new(env, &facts);
        let new = changed(prop.run(init));
        self.stats.rewrites += prop.rewrites();
        if let Some(new) = new {
            self.graph.node_mut(node).init = Some(new);
        }
    }

    /// Work sees the environment but its own declarations stay local.
    fn propagate_work(&mut self, node: NodeId, env: &ConstEnv) {
        let n = self.graph.node(node);
        let Some(work) = n.work.as_deref() else {
            return;
        };
        let facts = BodyFacts::collect(&[n.init.as_deref().unwrap_or_default(), work]);
        let mut scratch = env.clone();
        let mut prop = Propagator::new(&mut scratch, &facts);
        let new = changed(prop.run(work));
        self.stats.rewrites += prop.rewrites();
        if let Some(new) = new {
            self.graph.node_mut(node).work = Some(new);
        }
    }

    fn recurse(&mut self, node: NodeId, env: &mut ConstEnv) {
        let n = self.graph.node(node);
        if !n.is_composite() {
            return;
        }
        let has_init = n.init.is_some();
        match self.config.strategy {
            RecursionStrategy::Rescan if has_init => self.recurse_rescan(node, env),
            RecursionStrategy::Rescan | RecursionStrategy::Materialized => {
                self.recurse_materialized(node, env)
            }
        }
    }

    /// Walks the explicit child list. Argument values come from a
    /// non-recursing scan of `init`, so straight-line locals resolve the same
    /// way they do under re-scan; entries the scan never reached fall back to
    /// the environment.
    fn recurse_materialized(&mut self, node: NodeId, env: &ConstEnv) {
        let recorded = self.record_arguments(node, env);
        let children: Vec<(NodeId, Vec<Expr>)> = self
            .graph
            .node(node)
            .kind
            .children()
            .iter()
            .map(|c| (c.node, c.args.clone()))
            .collect();

        for (idx, (child, args)) in children.into_iter().enumerate() {
            let (resolved, span): (Vec<Option<Literal>>, Span) = match recorded.get(&child) {
                Some((values, span)) if values.len() == args.len() => {
                    let resolved = values
                        .iter()
                        .zip(&args)
                        .map(|(v, a)| v.or_else(|| eval_const(a, env)))
                        .collect();
                    (resolved, *span)
                }
                Some((_, span)) => (args.iter().map(|a| eval_const(a, env)).collect(), *span),
                None => (
                    args.iter().map(|a| eval_const(a, env)).collect(),
                    self.graph.node(child).span,
                ),
            };
            let Some(new_args) = self.activate_child(child, &args, &resolved, span) else {
                continue;
            };
            if let Some(entry) = self.graph.node_mut(node).kind.children_mut().into_iter().nth(idx) {
                entry.args = new_args.clone();
            }
            if let Some(init) = self.graph.node_mut(node).init.as_mut() {
                ir::walk_stmts_mut(init, &mut |stmt| {
                    if let Stmt::Instantiate(inst) = stmt {
                        if inst.target == child {
                            inst.args = new_args.clone();
                        }
                    }
                });
            }
        }
    }

    /// Argument values and statement span of every instantiation in `init`,
    /// as seen at that point of the body. `env` is not modified.
    fn record_arguments(&self, node: NodeId, env: &ConstEnv) -> HashMap<NodeId, (Vec<Option<Literal>>, Span)> {
        let n = self.graph.node(node);
        let Some(init) = n.init.as_deref() else {
            return HashMap::new();
        };
        let facts = BodyFacts::collect(&[init, n.work.as_deref().unwrap_or_default()]);
        let mut scratch = env.clone();
        let mut recorder = ArgRecorder::default();
        Propagator::new(&mut scratch, &facts)
            .with_visitor(&mut recorder)
            .run(init);
        recorder.seen
    }

    fn recurse_rescan(&mut self, node: NodeId, env: &mut ConstEnv) {
        let Some(init) = self.graph.node_mut(node).init.take() else {
            return;
        };
        let facts = BodyFacts::collect(&[
            init.as_slice(),
            self.graph.node(node).work.as_deref().unwrap_or_default(),
        ]);
        let mut scan = ScanVisitor {
            orch: &mut *self,
            parent: node,
        };
        let (new, rewrites) = {
            let mut prop = Propagator::new(env, &facts).with_visitor(&mut scan);
            let new = changed(prop.run(&init));
            (new, prop.rewrites())
        };
        self.stats.rewrites += rewrites;
        self.graph.node_mut(node).init = Some(new.unwrap_or(init));
    }

    /// Bind `child`'s parameters from the resolved arguments and activate it.
    /// Returns the argument list with every resolved, non-literal argument
    /// replaced by its literal, if any was replaced.
    fn activate_child(
        &mut self,
        child: NodeId,
        args: &[Expr],
        resolved: &[Option<Literal>],
        span: Span,
    ) -> Option<Vec<Expr>> {
        let target = self.graph.node(child);
        if args.len() != target.params.len() {
            let diag = Diagnostic::new(
                DiagLevel::Error,
                span,
                format!(
                    "'{}' takes {} argument{} but {} {} supplied",
                    target.name,
                    target.params.len(),
                    if target.params.len() == 1 { "" } else { "s" },
                    args.len(),
                    if args.len() == 1 { "was" } else { "were" },
                ),
            )
            .with_code(codes::E0100)
            .with_related(target.span, "parameters declared here");
            let diag = self.with_active_path(diag);
            self.diagnostics.push(diag);
            return None;
        }

        let params = target.params.clone();
        let mut child_env = ConstEnv::new();
        let mut new_args: Option<Vec<Expr>> = None;
        for (i, (param, value)) in params.iter().zip(resolved).enumerate() {
            let Some(value) = *value else {
                continue;
            };
            let Some(bound) = coerce(value, self.graph.var(*param).ty) else {
                continue;
            };
            child_env.bind(*param, bound);
            if !args[i].is_literal() {
                new_args.get_or_insert_with(|| args.to_vec())[i] = Expr::Lit(value);
            }
        }

        self.activate(child, child_env);
        new_args
    }
}

/// Records resolved arguments by target without touching the body.
#[derive(Default)]
struct ArgRecorder {
    seen: HashMap<NodeId, (Vec<Option<Literal>>, Span)>,
}

impl InstantiationVisitor for ArgRecorder {
    fn instantiate(&mut self, inst: &Instantiation, resolved: &[Option<Literal>]) -> Option<Vec<Expr>> {
        self.seen.insert(inst.target, (resolved.to_vec(), inst.span));
        None
    }
}

/// Re-scan hook: recurses into each child as its instantiation is reached.
struct ScanVisitor<'a, 'g, 'c> {
    orch: &'a mut Orchestrator<'g, 'c>,
    parent: NodeId,
}

impl InstantiationVisitor for ScanVisitor<'_, '_, '_> {
    fn instantiate(&mut self, inst: &Instantiation, resolved: &[Option<Literal>]) -> Option<Vec<Expr>> {
        let args = self
            .orch
            .activate_child(inst.target, &inst.args, resolved, inst.span)?;
        let kind = &mut self.orch.graph.node_mut(self.parent).kind;
        if let Some(entry) = kind.children_mut().into_iter().find(|c| c.node == inst.target) {
            entry.args = args.clone();
        }
        Some(args)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

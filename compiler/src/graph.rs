// graph.rs — Stream graph arena: nodes, variables, and structural fields
//
// Holds the hierarchical stream graph produced by `elaborate` and mutated in
// place by the constant-propagation pass. Nodes and variables live in
// arenas indexed by `NodeId` / `VarId`; containment is expressed by child
// lists, instantiation statements in `init`, and parent back-references.
//
// Preconditions: built by `elaborate` (or by tests through `add_node`).
// Postconditions: `clone_subtree` yields a disjoint copy with fresh identities.
// Failure modes: none; lookups index the arena and ids are never invalidated.
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::ast::{Span, Type, WeightKind};
use crate::id::{NodeId, VarId};
use crate::ir::{self, Expr, Stmt};

// ── Structural fields ───────────────────────────────────────────────────────

/// Filter data rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rates {
    pub pop: Expr,
    pub peek: Expr,
    pub push: Expr,
}

/// Splitter or joiner weights. A round-robin with no expressions means
/// uniform weight 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weights {
    pub kind: WeightKind,
    pub exprs: Vec<Expr>,
}

impl Weights {
    pub fn round_robin(exprs: Vec<Expr>) -> Self {
        Weights {
            kind: WeightKind::RoundRobin,
            exprs,
        }
    }

    pub fn duplicate() -> Self {
        Weights {
            kind: WeightKind::Duplicate,
            exprs: Vec::new(),
        }
    }
}

/// A materialized child entry: the child instance plus the argument list it
/// was instantiated with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Child {
    pub node: NodeId,
    pub args: Vec<Expr>,
}

/// Names one structural field of a node, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef {
    Pop,
    Peek,
    Push,
    SplitterWeight(usize),
    JoinerWeight(usize),
    Delay,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Pop => write!(f, "pop rate"),
            FieldRef::Peek => write!(f, "peek rate"),
            FieldRef::Push => write!(f, "push rate"),
            FieldRef::SplitterWeight(i) => write!(f, "splitter weight {i}"),
            FieldRef::JoinerWeight(i) => write!(f, "joiner weight {i}"),
            FieldRef::Delay => write!(f, "delay"),
        }
    }
}

// ── Nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    Filter {
        rates: Rates,
    },
    Pipeline {
        children: Vec<Child>,
    },
    SplitJoin {
        splitter: Weights,
        joiner: Weights,
        children: Vec<Child>,
    },
    FeedbackLoop {
        joiner: Weights,
        splitter: Weights,
        delay: Expr,
        body: Option<Child>,
        loop_child: Option<Child>,
    },
}

impl NodeKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            NodeKind::Filter { .. } => "filter",
            NodeKind::Pipeline { .. } => "pipeline",
            NodeKind::SplitJoin { .. } => "splitjoin",
            NodeKind::FeedbackLoop { .. } => "feedbackloop",
        }
    }

    /// Child entries in appearance order (feedback loop: body, then loop).
    pub fn children(&self) -> Vec<&Child> {
        match self {
            NodeKind::Filter { .. } => Vec::new(),
            NodeKind::Pipeline { children } | NodeKind::SplitJoin { children, .. } => {
                children.iter().collect()
            }
            NodeKind::FeedbackLoop {
                body, loop_child, ..
            } => body.iter().chain(loop_child.iter()).collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Child> {
        match self {
            NodeKind::Filter { .. } => Vec::new(),
            NodeKind::Pipeline { children } | NodeKind::SplitJoin { children, .. } => {
                children.iter_mut().collect()
            }
            NodeKind::FeedbackLoop {
                body, loop_child, ..
            } => body.iter_mut().chain(loop_child.iter_mut()).collect(),
        }
    }

    /// Rate, weight and delay expressions.
    pub fn fields(&self) -> Vec<(FieldRef, &Expr)> {
        match self {
            NodeKind::Filter { rates } => vec![
                (FieldRef::Pop, &rates.pop),
                (FieldRef::Peek, &rates.peek),
                (FieldRef::Push, &rates.push),
            ],
            NodeKind::Pipeline { .. } => Vec::new(),
            NodeKind::SplitJoin {
                splitter, joiner, ..
            } => weight_fields(splitter, joiner),
            NodeKind::FeedbackLoop {
                joiner,
                splitter,
                delay,
                ..
            } => {
                let mut out = weight_fields(splitter, joiner);
                out.push((FieldRef::Delay, delay));
                out
            }
        }
    }

    pub fn fields_mut(&mut self) -> Vec<(FieldRef, &mut Expr)> {
        match self {
            NodeKind::Filter { rates } => vec![
                (FieldRef::Pop, &mut rates.pop),
                (FieldRef::Peek, &mut rates.peek),
                (FieldRef::Push, &mut rates.push),
            ],
            NodeKind::Pipeline { .. } => Vec::new(),
            NodeKind::SplitJoin {
                splitter, joiner, ..
            } => weight_fields_mut(splitter, joiner),
            NodeKind::FeedbackLoop {
                joiner,
                splitter,
                delay,
                ..
            } => {
                let mut out = weight_fields_mut(splitter, joiner);
                out.push((FieldRef::Delay, delay));
                out
            }
        }
    }
}

fn weight_fields<'a>(splitter: &'a Weights, joiner: &'a Weights) -> Vec<(FieldRef, &'a Expr)> {
    let split = splitter
        .exprs
        .iter()
        .enumerate()
        .map(|(i, e)| (FieldRef::SplitterWeight(i), e));
    let join = joiner
        .exprs
        .iter()
        .enumerate()
        .map(|(i, e)| (FieldRef::JoinerWeight(i), e));
    split.chain(join).collect()
}

fn weight_fields_mut<'a>(
    splitter: &'a mut Weights,
    joiner: &'a mut Weights,
) -> Vec<(FieldRef, &'a mut Expr)> {
    let split = splitter
        .exprs
        .iter_mut()
        .enumerate()
        .map(|(i, e)| (FieldRef::SplitterWeight(i), e));
    let join = joiner
        .exprs
        .iter_mut()
        .enumerate()
        .map(|(i, e)| (FieldRef::JoinerWeight(i), e));
    split.chain(join).collect()
}

/// One stream node instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamNode {
    pub id: NodeId,
    pub name: String,
    #[serde(skip)]
    pub span: Span,
    pub parent: Option<NodeId>,
    pub params: Vec<VarId>,
    pub init: Option<Vec<Stmt>>,
    pub work: Option<Vec<Stmt>>,
    pub kind: NodeKind,
}

impl StreamNode {
    pub fn is_composite(&self) -> bool {
        !matches!(self.kind, NodeKind::Filter { .. })
    }
}

/// Source-level information about a variable binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
}

// ── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamGraph {
    pub nodes: Vec<StreamNode>,
    pub vars: Vec<VarInfo>,
    pub root: Option<NodeId>,
}

impl StreamGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, name: impl Into<String>, ty: Type) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo {
            name: name.into(),
            ty,
        });
        id
    }

    /// Allocate a new identity with the same name and type as `var`.
    pub fn fresh_var_like(&mut self, var: VarId) -> VarId {
        let info = self.vars[var.index()].clone();
        let id = VarId(self.vars.len() as u32);
        self.vars.push(info);
        id
    }

    /// Add a node with no parent, no bodies and the given parameters.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        span: Span,
        params: Vec<VarId>,
        kind: NodeKind,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(StreamNode {
            id,
            name: name.into(),
            span,
            parent: None,
            params,
            init: None,
            work: None,
            kind,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &StreamNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut StreamNode {
        &mut self.nodes[id.index()]
    }

    pub fn var(&self, id: VarId) -> &VarInfo {
        &self.vars[id.index()]
    }

    /// Direct successors: child-list entries, then any instantiation target
    /// in `init` not already listed.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let mut out: Vec<NodeId> = node.kind.children().iter().map(|c| c.node).collect();
        if let Some(init) = &node.init {
            for inst in ir::instantiations(init) {
                if !out.contains(&inst.target) {
                    out.push(inst.target);
                }
            }
        }
        out
    }

    /// Nodes reachable from `start` in pre-order, each listed once.
    pub fn subtree(&self, start: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            let succ = self.successors(id);
            stack.extend(succ.into_iter().rev());
        }
        order
    }

    /// Nodes reachable from the root in pre-order.
    pub fn reachable(&self) -> Vec<NodeId> {
        match self.root {
            Some(root) => self.subtree(root),
            None => Vec::new(),
        }
    }

    /// Deep-copy the subtree rooted at `id`. Every copied node gets a fresh
    /// `NodeId`; every parameter and local of every copied node gets a fresh
    /// `VarId`. The copy's root has no parent; the caller attaches it.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let members = self.subtree(id);

        let base = self.nodes.len() as u32;
        let node_map: HashMap<NodeId, NodeId> = members
            .iter()
            .enumerate()
            .map(|(i, old)| (*old, NodeId(base + i as u32)))
            .collect();

        let mut owned_vars = Vec::new();
        for old in &members {
            let node = self.node(*old);
            owned_vars.extend(node.params.iter().copied());
            for body in node.init.iter().chain(node.work.iter()) {
                owned_vars.extend(ir::declared_vars(body));
            }
        }
        let mut var_map = HashMap::new();
        for var in owned_vars {
            if !var_map.contains_key(&var) {
                let fresh = self.fresh_var_like(var);
                var_map.insert(var, fresh);
            }
        }

        for old in &members {
            let mut copy = self.node(*old).clone();
            copy.id = node_map[old];
            copy.parent = copy.parent.and_then(|p| node_map.get(&p).copied());
            if *old == id {
                copy.parent = None;
            }
            copy.params = copy.params.iter().map(|v| var_map[v]).collect();
            for body in copy.init.iter_mut().chain(copy.work.iter_mut()) {
                ir::rename_vars(body, &var_map);
                ir::retarget(body, &node_map);
            }
            for (_, expr) in copy.kind.fields_mut() {
                ir::rename_in_expr(expr, &var_map);
            }
            for child in copy.kind.children_mut() {
                if let Some(new) = node_map.get(&child.node) {
                    child.node = *new;
                }
                for arg in &mut child.args {
                    ir::rename_in_expr(arg, &var_map);
                }
            }
            self.nodes.push(copy);
        }

        node_map[&id]
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

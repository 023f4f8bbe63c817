// verify.rs — Structural postconditions of the propagated stream graph
//
// Checks the obligations downstream phases rely on:
//   C1: every pipeline/splitjoin child list matches the `add` targets of its
//       `init`, in order
//   C2: every reachable node has exactly one container, and its parent
//       back-reference names that container (the root has neither)
//   C3: every feedback loop has both a body and a loop child
// and warns about rate, weight and delay expressions that are still symbolic.
//
// Preconditions: none; works on any graph, before or after the pass.
// Postconditions: `cert` records each obligation; one diagnostic per violation.
// Failure modes: C1/C2/C3 violations are errors; symbolic fields are warnings.
// Side effects: none.

use std::collections::HashMap;

use crate::ast::ChildRole;
use crate::diag::codes;
use crate::diag::{DiagLevel, Diagnostic};
use crate::graph::{NodeKind, StreamGraph};
use crate::id::NodeId;
use crate::ir;
use crate::pass::StageCert;

/// Machine-checkable evidence for graph postconditions (C1-C3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCert {
    /// C1: child lists mirror `init`.
    pub c1_children_in_sync: bool,
    /// C2: containment is a tree with matching parent back-references.
    pub c2_single_container: bool,
    /// C3: feedback loops are complete.
    pub c3_feedback_complete: bool,
}

impl StageCert for GraphCert {
    fn all_pass(&self) -> bool {
        self.c1_children_in_sync && self.c2_single_container && self.c3_feedback_complete
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("C1_children_in_sync", self.c1_children_in_sync),
            ("C2_single_container", self.c2_single_container),
            ("C3_feedback_complete", self.c3_feedback_complete),
        ]
    }
}

#[derive(Debug)]
pub struct VerifyResult {
    pub cert: GraphCert,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn verify_graph(graph: &StreamGraph) -> VerifyResult {
    let mut diagnostics = Vec::new();
    let reachable = graph.reachable();
    let c1 = verify_c1_children_in_sync(graph, &reachable, &mut diagnostics);
    let c2 = verify_c2_single_container(graph, &reachable, &mut diagnostics);
    let c3 = verify_c3_feedback_complete(graph, &reachable, &mut diagnostics);
    warn_symbolic_fields(graph, &reachable, &mut diagnostics);
    VerifyResult {
        cert: GraphCert {
            c1_children_in_sync: c1,
            c2_single_container: c2,
            c3_feedback_complete: c3,
        },
        diagnostics,
    }
}

/// C1: for each pipeline/splitjoin with an `init`, the `add` targets in
/// execution order equal the child list.
fn verify_c1_children_in_sync(
    graph: &StreamGraph,
    reachable: &[NodeId],
    diags: &mut Vec<Diagnostic>,
) -> bool {
    let mut ok = true;
    for &id in reachable {
        let node = graph.node(id);
        if !matches!(node.kind, NodeKind::Pipeline { .. } | NodeKind::SplitJoin { .. }) {
            continue;
        }
        let Some(init) = &node.init else {
            continue;
        };
        let instantiated: Vec<NodeId> = ir::instantiations(init)
            .into_iter()
            .filter(|i| i.role == ChildRole::Add)
            .map(|i| i.target)
            .collect();
        let listed: Vec<NodeId> = node.kind.children().iter().map(|c| c.node).collect();
        if instantiated != listed {
            ok = false;
            diags.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    node.span,
                    format!(
                        "child list of '{}' does not match its init ({} listed, {} instantiated)",
                        node.name,
                        listed.len(),
                        instantiated.len()
                    ),
                )
                .with_code(codes::E0300),
            );
        }
    }
    ok
}

/// C2: each reachable non-root node is listed by exactly one container and
/// points back at it; the root is listed by none and has no parent.
fn verify_c2_single_container(
    graph: &StreamGraph,
    reachable: &[NodeId],
    diags: &mut Vec<Diagnostic>,
) -> bool {
    let mut containers: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &id in reachable {
        for child in graph.node(id).kind.children() {
            containers.entry(child.node).or_default().push(id);
        }
    }

    let mut ok = true;
    for &id in reachable {
        let node = graph.node(id);
        let owners = containers.get(&id).map(Vec::as_slice).unwrap_or_default();
        let expected = match owners {
            [] if Some(id) == graph.root => None,
            [owner] => Some(*owner),
            [] => {
                // Reached only through `init`; C1 reports the list.
                continue;
            }
            [first, second, ..] => {
                ok = false;
                diags.push(
                    Diagnostic::new(
                        DiagLevel::Error,
                        node.span,
                        format!(
                            "'{}' ({}) is contained by both '{}' and '{}'",
                            node.name,
                            id,
                            graph.node(*first).name,
                            graph.node(*second).name
                        ),
                    )
                    .with_code(codes::E0301),
                );
                continue;
            }
        };
        if node.parent != expected {
            ok = false;
            let describe = |p: Option<NodeId>| match p {
                Some(p) => format!("'{}' ({})", graph.node(p).name, p),
                None => "nothing".to_string(),
            };
            diags.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    node.span,
                    format!(
                        "parent of '{}' ({}) is {} but it is contained by {}",
                        node.name,
                        id,
                        describe(node.parent),
                        describe(expected)
                    ),
                )
                .with_code(codes::E0301),
            );
        }
    }
    ok
}

/// C3: both parts of every reachable feedback loop are present.
fn verify_c3_feedback_complete(
    graph: &StreamGraph,
    reachable: &[NodeId],
    diags: &mut Vec<Diagnostic>,
) -> bool {
    let mut ok = true;
    for &id in reachable {
        let node = graph.node(id);
        if let NodeKind::FeedbackLoop {
            body, loop_child, ..
        } = &node.kind
        {
            for (part, present) in [("body", body.is_some()), ("loop", loop_child.is_some())] {
                if !present {
                    ok = false;
                    diags.push(
                        Diagnostic::new(
                            DiagLevel::Error,
                            node.span,
                            format!("feedback loop '{}' has no {} stream", node.name, part),
                        )
                        .with_code(codes::E0302),
                    );
                }
            }
        }
    }
    ok
}

fn warn_symbolic_fields(graph: &StreamGraph, reachable: &[NodeId], diags: &mut Vec<Diagnostic>) {
    for &id in reachable {
        let node = graph.node(id);
        for (field, expr) in node.kind.fields() {
            if expr.is_literal() {
                continue;
            }
            diags.push(
                Diagnostic::new(
                    DiagLevel::Warning,
                    node.span,
                    format!("{} of '{}' ({}) is not a literal", field, node.name, id),
                )
                .with_code(codes::W0300)
                .with_hint("the scheduler requires literal rates, weights and delays"),
            );
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

// children.rs — Rebuild a composite's child list from its `init` body
//
// Preconditions: `node` is a pipeline or split-join whose `init` has just
//                been unrolled.
// Postconditions: the child list is exactly the `add` instantiations of
//                 `init`, in execution order, with their argument lists;
//                 every listed child's parent is `node`.
// Failure modes: none. A residual symbolic-bound loop means the list covers
//                only the instantiations that are textually present.
// Side effects: overwrites the child list and parent back-references.

use crate::ast::ChildRole;
use crate::graph::{Child, NodeKind, StreamGraph};
use crate::id::NodeId;
use crate::ir;

/// Returns whether the installed list differs from the previous one.
/// Filters and feedback loops are left untouched.
pub fn sync_children(graph: &mut StreamGraph, node: NodeId) -> bool {
    let n = graph.node(node);
    if !matches!(n.kind, NodeKind::Pipeline { .. } | NodeKind::SplitJoin { .. }) {
        return false;
    }
    let list: Vec<Child> = n
        .init
        .as_deref()
        .map(ir::instantiations)
        .unwrap_or_default()
        .into_iter()
        .filter(|inst| inst.role == ChildRole::Add)
        .map(|inst| Child {
            node: inst.target,
            args: inst.args.clone(),
        })
        .collect();

    for child in &list {
        graph.node_mut(child.node).parent = Some(node);
    }

    match &mut graph.node_mut(node).kind {
        NodeKind::Pipeline { children } | NodeKind::SplitJoin { children, .. } => {
            let changed = *children != list;
            *children = list;
            changed
        }
        NodeKind::Filter { .. } | NodeKind::FeedbackLoop { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elaborate::elaborate;
    use crate::ir::Expr;
    use crate::parser;
    use crate::propagate::ConstEnv;
    use crate::unroll::{unroll_loops, DEFAULT_UNROLL_LIMIT};

    fn build(source: &str) -> (StreamGraph, NodeId) {
        let parsed = parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let result = elaborate(&parsed.program.unwrap(), None);
        assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
        let root = result.graph.root.unwrap();
        (result.graph, root)
    }

    #[test]
    fn list_follows_unrolled_init() {
        let (mut g, p) = build(
            "filter A(int n) { work { } }
             filter B() { work { } }
             splitjoin S() { split duplicate; join roundrobin;
                 init { add B(); for (int i = 0; i < 2; i++) add A(i); } }",
        );
        assert_eq!(g.node(p).kind.children().len(), 2);
        unroll_loops(&mut g, p, &ConstEnv::new(), DEFAULT_UNROLL_LIMIT);
        assert!(sync_children(&mut g, p));

        let children = g.node(p).kind.children();
        assert_eq!(children.len(), 3);
        assert_eq!(g.node(children[0].node).name, "B");
        assert_eq!(children[1].args, vec![Expr::int(0)]);
        assert_eq!(children[2].args, vec![Expr::int(1)]);
        for c in children {
            assert_eq!(g.node(c.node).parent, Some(p));
        }
    }

    #[test]
    fn unchanged_list_reports_no_change() {
        let (mut g, p) = build(
            "filter A() { work { } }
             pipeline P() { init { add A(); add A(); } }",
        );
        assert!(!sync_children(&mut g, p));
    }

    #[test]
    fn feedback_loop_is_fixed_shape() {
        let (mut g, p) = build(
            "filter A() { work { } }
             feedbackloop L() { join roundrobin; split duplicate; delay 1;
                 init { body A(); loop A(); } }",
        );
        assert!(!sync_children(&mut g, p));
        assert_eq!(g.node(p).kind.children().len(), 2);
    }
}

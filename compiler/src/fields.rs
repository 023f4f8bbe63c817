// fields.rs — Resolve rate, weight and delay expressions of one node
//
// Preconditions: `env` is the environment left by this cycle's `init`
//                propagation.
// Postconditions: every field whose expression changed under `env` holds the
//                 rewritten (folded) expression; unchanged fields keep their
//                 original expression.
// Failure modes: none; fields over unbound parameters stay symbolic.
// Side effects: mutates the node's structural fields.

use std::borrow::Cow;

use crate::graph::StreamNode;
use crate::propagate::{rewrite_expr, ConstEnv};

/// Returns the number of fields replaced.
pub fn resolve_fields(node: &mut StreamNode, env: &ConstEnv) -> usize {
    let mut replaced = 0;
    for (_, expr) in node.kind.fields_mut() {
        let new = match rewrite_expr(expr, &|v| env.get(v)) {
            Cow::Owned(new) => Some(new),
            Cow::Borrowed(_) => None,
        };
        if let Some(new) = new {
            *expr = new;
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elaborate::elaborate;
    use crate::graph::{NodeKind, StreamGraph};
    use crate::id::NodeId;
    use crate::ir::{Expr, Literal, Stmt};
    use crate::parser;
    use crate::propagate::{BodyFacts, Propagator};

    fn build(source: &str) -> (StreamGraph, NodeId) {
        let parsed = parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let result = elaborate(&parsed.program.unwrap(), None);
        assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
        let root = result.graph.root.unwrap();
        (result.graph, root)
    }

    fn env_after_init(g: &StreamGraph, node: NodeId) -> ConstEnv {
        let init: Vec<Stmt> = g.node(node).init.clone().unwrap_or_default();
        let facts = BodyFacts::collect(&[&init]);
        let mut env = ConstEnv::new();
        Propagator::new(&mut env, &facts).run(&init);
        env
    }

    #[test]
    fn push_rate_from_local() {
        let (mut g, root) = build(
            "filter F() { init { int local_var = 2; } work push local_var + 1 { push(1); } }",
        );
        let env = env_after_init(&g, root);
        assert_eq!(resolve_fields(g.node_mut(root), &env), 1);
        let NodeKind::Filter { rates } = &g.node(root).kind else {
            panic!("expected filter")
        };
        assert_eq!(rates.push, Expr::int(3));
    }

    #[test]
    fn delay_from_parameter() {
        let (mut g, root) = build(
            "filter A() { work { } }
             feedbackloop L(int d) { join roundrobin(1, 1); split duplicate; delay d;
                 init { body A(); loop A(); } }",
        );
        let mut env = ConstEnv::new();
        env.bind(g.node(root).params[0], Literal::Int(5));
        resolve_fields(g.node_mut(root), &env);
        let NodeKind::FeedbackLoop { delay, .. } = &g.node(root).kind else {
            panic!("expected feedback loop")
        };
        assert_eq!(*delay, Expr::int(5));
    }

    #[test]
    fn unbound_fields_stay_symbolic() {
        let (mut g, root) = build(
            "filter A() { work { } }
             splitjoin S(int w) { split roundrobin(w, 2 * 2); join roundrobin(w); init { add A(); add A(); } }",
        );
        let env = ConstEnv::new();
        // Only the foldable splitter weight changes.
        assert_eq!(resolve_fields(g.node_mut(root), &env), 1);
        let NodeKind::SplitJoin { splitter, joiner, .. } = &g.node(root).kind else {
            panic!("expected splitjoin")
        };
        assert!(matches!(splitter.exprs[0], Expr::Var(_)));
        assert_eq!(splitter.exprs[1], Expr::int(4));
        assert!(matches!(joiner.exprs[0], Expr::Var(_)));
        assert_eq!(resolve_fields(g.node_mut(root), &env), 0);
    }
}

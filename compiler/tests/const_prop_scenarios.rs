// End-to-end scenarios for constant propagation and unrolling.
//
// Each test parses a sample program, elaborates it and runs the pass through
// the library API, then inspects the resulting graph.

use sgc::const_prop::{propagate_and_unroll, ConstPropConfig, RecursionStrategy};
use sgc::diag::codes;
use sgc::graph::{NodeKind, StreamGraph};
use sgc::id::NodeId;
use sgc::ir::{self, Expr, Stmt};
use sgc::pass::StageCert;

// ── Test helpers ────────────────────────────────────────────────────────────

fn build(source: &str) -> StreamGraph {
    let parsed = sgc::parser::parse(source);
    assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
    let result = sgc::elaborate::elaborate(&parsed.program.unwrap(), None);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
    result.graph
}

fn config(strategy: RecursionStrategy) -> ConstPropConfig {
    ConstPropConfig {
        strategy,
        ..ConstPropConfig::default()
    }
}

fn children(g: &StreamGraph, node: NodeId) -> Vec<(NodeId, Vec<Expr>)> {
    g.node(node)
        .kind
        .children()
        .into_iter()
        .map(|c| (c.node, c.args.clone()))
        .collect()
}

fn rates(g: &StreamGraph, node: NodeId) -> (Expr, Expr, Expr) {
    match &g.node(node).kind {
        NodeKind::Filter { rates } => (rates.pop.clone(), rates.peek.clone(), rates.push.clone()),
        other => panic!("expected filter, got {}", other.keyword()),
    }
}

const COUNTING: &str = include_str!("../../samples/counting.str");
const LOCAL_RATE: &str = include_str!("../../samples/local_rate.str");
const FEEDBACK: &str = include_str!("../../samples/feedback.str");
const RUNTIME_BOUND: &str = include_str!("../../samples/runtime_bound.str");
const FILTERBANK: &str = include_str!("../../samples/filterbank.str");

// ── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn counting_loop_becomes_three_instances() {
    for strategy in [RecursionStrategy::Rescan, RecursionStrategy::Materialized] {
        let mut g = build(COUNTING);
        let result = propagate_and_unroll(&mut g, &config(strategy));
        assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);

        let root = g.root.unwrap();
        let init = g.node(root).init.as_deref().unwrap();
        assert_eq!(init.len(), 3, "{strategy:?}: loop should be replaced by its copies");
        let insts = ir::instantiations(init);
        let args: Vec<Vec<Expr>> = insts.iter().map(|i| i.args.clone()).collect();
        assert_eq!(
            args,
            vec![vec![Expr::int(0)], vec![Expr::int(1)], vec![Expr::int(2)]]
        );

        let listed = children(&g, root);
        let targets: Vec<NodeId> = insts.iter().map(|i| i.target).collect();
        assert_eq!(listed.iter().map(|c| c.0).collect::<Vec<_>>(), targets);
        for (i, (_, args)) in listed.iter().enumerate() {
            assert_eq!(*args, vec![Expr::int(i as i64)]);
        }
    }
}

#[test]
fn push_rate_from_init_local() {
    let mut g = build(LOCAL_RATE);
    let result = propagate_and_unroll(&mut g, &ConstPropConfig::default());
    assert!(result.diagnostics.is_empty());
    let (pop, peek, push) = rates(&g, g.root.unwrap());
    assert_eq!(pop, Expr::int(0));
    assert_eq!(peek, Expr::int(0));
    assert_eq!(push, Expr::int(3));
}

#[test]
fn feedback_delay_from_argument() {
    let mut g = build(FEEDBACK);
    propagate_and_unroll(&mut g, &ConstPropConfig::default());
    let top = g.root.unwrap();
    let echo = children(&g, top)[0].0;
    let NodeKind::FeedbackLoop {
        delay,
        body,
        loop_child,
        ..
    } = &g.node(echo).kind
    else {
        panic!("expected feedback loop");
    };
    assert_eq!(*delay, Expr::int(5));
    assert!(body.is_some() && loop_child.is_some());
}

#[test]
fn runtime_bound_stays_rolled() {
    for strategy in [RecursionStrategy::Rescan, RecursionStrategy::Materialized] {
        let mut g = build(RUNTIME_BOUND);
        let result = propagate_and_unroll(&mut g, &config(strategy));
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.stats.unrolled_loops, 0);
        assert_eq!(result.activations[0].unrolled, vec![0]);

        let root = g.root.unwrap();
        let init = g.node(root).init.as_deref().unwrap();
        assert!(matches!(init[0], Stmt::For { .. }));
        let listed = children(&g, root);
        assert_eq!(listed.len(), 1);
        // The argument is the induction variable; it stays symbolic.
        assert!(!listed[0].1[0].is_literal());
    }
}

#[test]
fn rerun_after_counting_changes_nothing() {
    let mut g = build(COUNTING);
    propagate_and_unroll(&mut g, &ConstPropConfig::default());
    let once = g.clone();
    let again = propagate_and_unroll(&mut g, &ConstPropConfig::default());
    assert_eq!(g, once);
    assert_eq!(again.stats.unrolled_loops, 0);
    assert_eq!(again.stats.rewrites, 0);
    assert_eq!(again.stats.fields_resolved, 0);
    assert_eq!(again.stats.children_synced, 0);
}

// ── Larger programs ─────────────────────────────────────────────────────────

#[test]
fn filterbank_resolves_every_band() {
    for strategy in [RecursionStrategy::Rescan, RecursionStrategy::Materialized] {
        let mut g = build(FILTERBANK);
        let result = propagate_and_unroll(&mut g, &config(strategy));
        assert!(result.diagnostics.is_empty(), "{strategy:?}: {:#?}", result.diagnostics);

        let top = g.root.unwrap();
        let bank = children(&g, top)[0].0;
        let bands = children(&g, bank);
        let args: Vec<Vec<Expr>> = bands.iter().map(|b| b.1.clone()).collect();
        assert_eq!(
            args,
            vec![
                vec![Expr::int(0), Expr::int(4)],
                vec![Expr::int(1), Expr::int(5)],
                vec![Expr::int(4), Expr::int(8)],
                vec![Expr::int(5), Expr::int(9)],
            ],
            "{strategy:?}"
        );
        for (band, _) in &bands {
            assert_eq!(rates(&g, *band), (Expr::int(4), Expr::int(4), Expr::int(1)));
        }

        let verified = sgc::verify::verify_graph(&g);
        assert!(verified.cert.all_pass());
        assert!(verified.diagnostics.is_empty(), "{:#?}", verified.diagnostics);
    }
}

#[test]
fn filterbank_unrolls_one_level_per_cycle() {
    let mut g = build(FILTERBANK);
    let result = propagate_and_unroll(&mut g, &ConstPropConfig::default());
    let bank = result
        .activations
        .iter()
        .find(|a| g.node(a.node).name == "Bank")
        .unwrap();
    assert_eq!(bank.unrolled, vec![1, 2, 0]);
    assert!(bank.env_sizes.windows(2).all(|w| w[0] <= w[1]));
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn argument_count_mismatch_is_reported() {
    let mut g = build(
        "filter A(int k) { work push k { push(k); } }
         filter B(int k) { work push k { push(k); } }
         pipeline P() { init { add A(1, 2); add B(3); } }",
    );
    let result = propagate_and_unroll(&mut g, &ConstPropConfig::default());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].code, Some(codes::E0100));

    // The sibling after the mismatch is still resolved.
    let root = g.root.unwrap();
    let b = children(&g, root)[1].0;
    assert_eq!(rates(&g, b).2, Expr::int(3));
}

#[test]
fn strategies_agree_on_sample_programs() {
    for source in [COUNTING, FEEDBACK, LOCAL_RATE, FILTERBANK] {
        let mut rescan = build(source);
        let mut materialized = build(source);
        propagate_and_unroll(&mut rescan, &config(RecursionStrategy::Rescan));
        propagate_and_unroll(&mut materialized, &config(RecursionStrategy::Materialized));
        assert_eq!(rescan, materialized);
    }
}

// dot.rs — Graphviz DOT output for stream graphs
//
// Transforms a StreamGraph into DOT format suitable for rendering
// with `dot` or other Graphviz layout engines. Composites become clusters,
// filters become boxes labelled with their rates, split-joins and feedback
// loops get explicit splitter/joiner nodes.
//
// Preconditions: none; symbolic rates and weights are printed as expressions.
// Postconditions: returns a valid DOT string with one cluster per composite.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::ast::WeightKind;
use crate::graph::{NodeKind, StreamGraph, Weights};
use crate::id::NodeId;
use crate::print::expr_to_string;

/// Emit the stream graph as a Graphviz DOT string.
pub fn emit_dot(graph: &StreamGraph) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph streams {{").unwrap();
    writeln!(buf, "    rankdir=TB;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    if let Some(root) = graph.root {
        writeln!(buf).unwrap();
        write_node(&mut buf, graph, root, "    ");
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Escape text for use inside a quoted DOT label.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build the DOT node ID: `n<id>` or `n<id>_<suffix>`.
fn dot_node_id(node: NodeId, suffix: &str) -> String {
    if suffix.is_empty() {
        format!("n{}", node.0)
    } else {
        format!("n{}_{}", node.0, sanitize(suffix))
    }
}

fn weights_label(graph: &StreamGraph, w: &Weights) -> String {
    match w.kind {
        WeightKind::Duplicate => "duplicate".to_string(),
        WeightKind::RoundRobin if w.exprs.is_empty() => "roundrobin".to_string(),
        WeightKind::RoundRobin => {
            let parts: Vec<String> = w.exprs.iter().map(|e| expr_to_string(graph, e)).collect();
            format!("roundrobin({})", parts.join(", "))
        }
    }
}

/// Write a node (recursively for composites) and return the DOT ids where
/// data enters and leaves it.
fn write_node(buf: &mut String, graph: &StreamGraph, id: NodeId, indent: &str) -> (String, String) {
    let node = graph.node(id);
    let name = escape(&node.name);

    let NodeKind::Filter { rates } = &node.kind else {
        return write_composite(buf, graph, id, indent);
    };
    let dot_id = dot_node_id(id, "");
    let label = format!(
        "{name}\\npop {} peek {} push {}",
        escape(&expr_to_string(graph, &rates.pop)),
        escape(&expr_to_string(graph, &rates.peek)),
        escape(&expr_to_string(graph, &rates.push)),
    );
    writeln!(
        buf,
        "{indent}{dot_id} [shape=box, style=filled, fillcolor=lightblue, label=\"{label}\"];"
    )
    .unwrap();
    (dot_id.clone(), dot_id)
}

fn write_composite(buf: &mut String, graph: &StreamGraph, id: NodeId, indent: &str) -> (String, String) {
    let node = graph.node(id);
    let inner = format!("{indent}    ");
    writeln!(buf, "{indent}subgraph cluster_{} {{", dot_node_id(id, "")).unwrap();
    writeln!(
        buf,
        "{inner}label=\"{} {}\";",
        node.kind.keyword(),
        escape(&node.name)
    )
    .unwrap();
    writeln!(buf, "{inner}style=rounded;").unwrap();
    writeln!(buf, "{inner}color=gray50;").unwrap();

    let ends = match &node.kind {
        NodeKind::Filter { .. } => unreachable!("filters are written by write_node"),
        NodeKind::Pipeline { children } => {
            let mut ends: Vec<(String, String)> = Vec::new();
            for child in children {
                ends.push(write_node(buf, graph, child.node, &inner));
            }
            for pair in ends.windows(2) {
                writeln!(buf, "{inner}{} -> {};", pair[0].1, pair[1].0).unwrap();
            }
            match (ends.first(), ends.last()) {
                (Some(first), Some(last)) => (first.0.clone(), last.1.clone()),
                _ => {
                    let empty = dot_node_id(id, "empty");
                    writeln!(buf, "{inner}{empty} [shape=point];").unwrap();
                    (empty.clone(), empty)
                }
            }
        }
        NodeKind::SplitJoin {
            splitter,
            joiner,
            children,
        } => {
            let split = dot_node_id(id, "split");
            let join = dot_node_id(id, "join");
            write_router(buf, &inner, &split, "triangle", &weights_label(graph, splitter));
            for child in children {
                let (entry, exit) = write_node(buf, graph, child.node, &inner);
                writeln!(buf, "{inner}{split} -> {entry};").unwrap();
                writeln!(buf, "{inner}{exit} -> {join};").unwrap();
            }
            write_router(buf, &inner, &join, "invtriangle", &weights_label(graph, joiner));
            (split, join)
        }
        NodeKind::FeedbackLoop {
            joiner,
            splitter,
            delay,
            body,
            loop_child,
        } => {
            let join = dot_node_id(id, "join");
            let split = dot_node_id(id, "split");
            write_router(buf, &inner, &join, "invtriangle", &weights_label(graph, joiner));
            if let Some(body) = body {
                let (entry, exit) = write_node(buf, graph, body.node, &inner);
                writeln!(buf, "{inner}{join} -> {entry};").unwrap();
                writeln!(buf, "{inner}{exit} -> {split};").unwrap();
            }
            write_router(buf, &inner, &split, "triangle", &weights_label(graph, splitter));
            if let Some(loop_child) = loop_child {
                let (entry, exit) = write_node(buf, graph, loop_child.node, &inner);
                writeln!(buf, "{inner}{split} -> {entry} [constraint=false];").unwrap();
                writeln!(
                    buf,
                    "{inner}{exit} -> {join} [style=bold, constraint=false, label=\"delay {}\"];",
                    escape(&expr_to_string(graph, delay))
                )
                .unwrap();
            }
            (join, split)
        }
    };

    writeln!(buf, "{indent}}}").unwrap();
    ends
}

fn write_router(buf: &mut String, indent: &str, dot_id: &str, shape: &str, label: &str) {
    writeln!(
        buf,
        "{indent}{dot_id} [shape={shape}, style=filled, fillcolor=lightyellow, label=\"{}\"];",
        escape(label)
    )
    .unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::const_prop::{propagate_and_unroll, ConstPropConfig};
    use crate::elaborate::elaborate;
    use crate::parser;
    use std::collections::HashSet;

    fn build_and_emit(source: &str, propagate: bool) -> String {
        let parsed = parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let mut result = elaborate(&parsed.program.unwrap(), None);
        assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
        if propagate {
            propagate_and_unroll(&mut result.graph, &ConstPropConfig::default());
        }
        emit_dot(&result.graph)
    }

    const SOURCE: &str = "
        filter A(int k) { work pop 1 push k { push(pop()); } }
        splitjoin S() { split duplicate; join roundrobin(1, 2);
            init { for (int i = 1; i <= 2; i++) add A(i); } }
        filter B() { work pop 3 { pop(); } }
        pipeline Top() { init { add S(); add B(); } }";

    #[test]
    fn valid_dot_structure() {
        let dot = build_and_emit(SOURCE, true);
        assert!(dot.starts_with("digraph streams {\n"));
        assert!(dot.ends_with("}\n"));
        let open = dot.matches('{').count();
        let close = dot.matches('}').count();
        assert_eq!(open, close, "unbalanced braces:\n{dot}");
    }

    #[test]
    fn filters_show_resolved_rates() {
        let dot = build_and_emit(SOURCE, true);
        assert!(dot.contains("label=\"A\\npop 1 peek 1 push 1\""), "{dot}");
        assert!(dot.contains("label=\"A\\npop 1 peek 1 push 2\""), "{dot}");
        assert!(dot.contains("label=\"B\\npop 3 peek 3 push 0\""), "{dot}");
    }

    #[test]
    fn splitjoin_routes_through_splitter_and_joiner() {
        let dot = build_and_emit(SOURCE, true);
        assert!(dot.contains("subgraph cluster_n1 {"));
        assert!(dot.contains("n1_split [shape=triangle, style=filled, fillcolor=lightyellow, label=\"duplicate\"];"));
        assert!(dot.contains("label=\"roundrobin(1, 2)\""));
        assert_eq!(dot.matches("n1_split -> ").count(), 2);
        assert_eq!(dot.matches(" -> n1_join;").count(), 2);
        // Pipeline edge from the split-join's joiner to the next stage.
        assert!(dot.contains("n1_join -> n"), "{dot}");
    }

    #[test]
    fn symbolic_rates_before_propagation() {
        let dot = build_and_emit(SOURCE, false);
        assert!(dot.contains("push k\""), "{dot}");
    }

    #[test]
    fn feedback_edge_is_bold_with_delay() {
        let dot = build_and_emit(
            "filter A() { work pop 1 push 1 { push(pop()); } }
             feedbackloop L(int d) { join roundrobin(1, 1); split duplicate; delay d;
                 init { body A(); loop A(); } }
             pipeline Top() { init { add L(4); } }",
            true,
        );
        assert!(dot.contains("subgraph cluster_n1 {"));
        assert!(dot.contains("n1_join -> n2;"));
        assert!(dot.contains("n2 -> n1_split;"));
        assert!(dot.contains("n1_split -> n3 [constraint=false];"));
        assert!(dot.contains("n3 -> n1_join [style=bold, constraint=false, label=\"delay 4\"];"));
    }

    #[test]
    fn unique_node_ids() {
        let dot = build_and_emit(SOURCE, true);
        let mut seen = HashSet::new();
        for line in dot.lines() {
            let trimmed = line.trim();
            if trimmed.contains("[shape=") {
                let id = trimmed.split_whitespace().next().unwrap();
                assert!(seen.insert(id.to_string()), "duplicate node id {id}");
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn empty_pipeline_gets_a_point() {
        let dot = build_and_emit("pipeline P() { }", true);
        assert!(dot.contains("n0_empty [shape=point];"));
    }

    #[test]
    fn deterministic_output() {
        assert_eq!(build_and_emit(SOURCE, true), build_and_emit(SOURCE, true));
    }
}

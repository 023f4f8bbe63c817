// print.rs — Deterministic textual dump of a stream graph
//
// Prints the instance tree from the root, children indented under their
// container. Variables print by their source names (copies made by unrolling
// share the name of the original), nodes as `Name#index`. Each node header
// shows its parameters with the argument it was given by its container.
//
// Preconditions: none.
// Postconditions: output depends only on graph contents.
// Failure modes: none.
// Side effects: none.

use std::fmt::{self, Write};

use crate::ast::{UnOp, WeightKind};
use crate::graph::{NodeKind, StreamGraph, Weights};
use crate::id::NodeId;
use crate::ir::{Expr, Instantiation, Stmt};

/// Render `graph` starting at its root. An empty graph prints nothing.
pub fn print_graph(graph: &StreamGraph) -> String {
    let mut out = String::new();
    if let Some(root) = graph.root {
        let mut p = Printer { graph, out: &mut out };
        // Writing into a String cannot fail.
        let _ = p.node(root, None, 0);
    }
    out
}

impl fmt::Display for StreamGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_graph(self))
    }
}

/// Render one expression with minimal parentheses.
pub fn expr_to_string(graph: &StreamGraph, expr: &Expr) -> String {
    let mut out = String::new();
    let mut p = Printer { graph, out: &mut out };
    let _ = p.expr(expr, 0);
    out
}

struct Printer<'g, 'o> {
    graph: &'g StreamGraph,
    out: &'o mut String,
}

const UNARY_PREC: u8 = 7;

impl Printer<'_, '_> {
    fn indent(&mut self, depth: usize) -> fmt::Result {
        write!(self.out, "{:width$}", "", width = depth * 2)
    }

    fn node(&mut self, id: NodeId, args: Option<&[Expr]>, depth: usize) -> fmt::Result {
        let node = self.graph.node(id);
        self.indent(depth)?;
        write!(self.out, "{} {}#{}(", node.kind.keyword(), node.name, id.0)?;
        for (i, param) in node.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let info = self.graph.var(*param);
            write!(self.out, "{} {}", info.ty.keyword(), info.name)?;
            if let Some(arg) = args.and_then(|a| a.get(i)) {
                self.out.push_str(" = ");
                self.expr(arg, 0)?;
            }
        }
        self.out.push_str(")\n");

        match &node.kind {
            NodeKind::Filter { rates } => {
                self.indent(depth + 1)?;
                self.out.push_str("pop ");
                self.expr(&rates.pop, 0)?;
                self.out.push_str(", peek ");
                self.expr(&rates.peek, 0)?;
                self.out.push_str(", push ");
                self.expr(&rates.push, 0)?;
                self.out.push('\n');
            }
            NodeKind::Pipeline { .. } => {}
            NodeKind::SplitJoin {
                splitter, joiner, ..
            } => {
                self.indent(depth + 1)?;
                self.weights("split", splitter)?;
                self.out.push(' ');
                self.weights("join", joiner)?;
                self.out.push('\n');
            }
            NodeKind::FeedbackLoop {
                joiner,
                splitter,
                delay,
                ..
            } => {
                self.indent(depth + 1)?;
                self.weights("join", joiner)?;
                self.out.push(' ');
                self.weights("split", splitter)?;
                self.out.push_str(" delay ");
                self.expr(delay, 0)?;
                self.out.push_str(";\n");
            }
        }

        if let Some(init) = &node.init {
            self.section("init", init, depth + 1)?;
        }
        if let Some(work) = &node.work {
            self.section("work", work, depth + 1)?;
        }
        for child in node.kind.children() {
            self.node(child.node, Some(&child.args), depth + 1)?;
        }
        Ok(())
    }

    fn weights(&mut self, label: &str, w: &Weights) -> fmt::Result {
        match w.kind {
            WeightKind::Duplicate => write!(self.out, "{label} duplicate;"),
            WeightKind::RoundRobin => {
                write!(self.out, "{label} roundrobin")?;
                if !w.exprs.is_empty() {
                    self.list(&w.exprs)?;
                }
                self.out.push(';');
                Ok(())
            }
        }
    }

    fn section(&mut self, label: &str, body: &[Stmt], depth: usize) -> fmt::Result {
        self.indent(depth)?;
        writeln!(self.out, "{label} {{")?;
        self.block(body, depth + 1)?;
        self.indent(depth)?;
        self.out.push_str("}\n");
        Ok(())
    }

    fn block(&mut self, body: &[Stmt], depth: usize) -> fmt::Result {
        for stmt in body {
            self.indent(depth)?;
            self.stmt(stmt, depth)?;
            self.out.push('\n');
        }
        Ok(())
    }

    fn braced(&mut self, body: &[Stmt], depth: usize) -> fmt::Result {
        self.out.push_str("{\n");
        self.block(body, depth + 1)?;
        self.indent(depth)?;
        self.out.push('}');
        Ok(())
    }

    /// One statement without indentation or trailing newline.
    fn stmt(&mut self, stmt: &Stmt, depth: usize) -> fmt::Result {
        match stmt {
            Stmt::Decl(decl) => {
                let info = self.graph.var(decl.var);
                write!(self.out, "{} {}", decl.ty.keyword(), info.name)?;
                if let Some(init) = &decl.init {
                    self.out.push_str(" = ");
                    self.expr(init, 0)?;
                }
                self.out.push(';');
            }
            Stmt::Assign { .. } => {
                self.header_stmt(stmt)?;
                self.out.push(';');
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.out.push_str("if (");
                self.expr(cond, 0)?;
                self.out.push_str(") ");
                self.braced(then_body, depth)?;
                if let Some(else_body) = else_body {
                    self.out.push_str(" else ");
                    self.braced(else_body, depth)?;
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.out.push_str("for (");
                if let Some(init) = init {
                    self.header_stmt(init)?;
                }
                self.out.push_str("; ");
                if let Some(cond) = cond {
                    self.expr(cond, 0)?;
                }
                self.out.push_str("; ");
                if let Some(step) = step {
                    self.header_stmt(step)?;
                }
                self.out.push_str(") ");
                self.braced(body, depth)?;
            }
            Stmt::While { cond, body } => {
                self.out.push_str("while (");
                self.expr(cond, 0)?;
                self.out.push_str(") ");
                self.braced(body, depth)?;
            }
            Stmt::Block(body) => self.braced(body, depth)?,
            Stmt::Push(value) => {
                self.out.push_str("push(");
                self.expr(value, 0)?;
                self.out.push_str(");");
            }
            Stmt::Expr(value) => {
                self.expr(value, 0)?;
                self.out.push(';');
            }
            Stmt::Instantiate(inst) => self.instantiation(inst)?,
        }
        Ok(())
    }

    /// Declarations and assignments as they appear in a `for` header.
    fn header_stmt(&mut self, stmt: &Stmt) -> fmt::Result {
        match stmt {
            Stmt::Decl(decl) => {
                let info = self.graph.var(decl.var);
                write!(self.out, "{} {}", decl.ty.keyword(), info.name)?;
                if let Some(init) = &decl.init {
                    self.out.push_str(" = ");
                    self.expr(init, 0)?;
                }
                Ok(())
            }
            Stmt::Assign { var, op, value } => {
                write!(self.out, "{} {} ", self.graph.var(*var).name, op.symbol())?;
                self.expr(value, 0)
            }
            other => self.stmt(other, 0),
        }
    }

    fn instantiation(&mut self, inst: &Instantiation) -> fmt::Result {
        let target = self.graph.node(inst.target);
        write!(
            self.out,
            "{} {}#{}",
            inst.role.keyword(),
            target.name,
            inst.target.0
        )?;
        self.list(&inst.args)?;
        self.out.push(';');
        Ok(())
    }

    fn list(&mut self, exprs: &[Expr]) -> fmt::Result {
        self.out.push('(');
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(e, 0)?;
        }
        self.out.push(')');
        Ok(())
    }

    /// `min_prec` is the precedence the context requires; anything binding
    /// looser is parenthesized.
    fn expr(&mut self, expr: &Expr, min_prec: u8) -> fmt::Result {
        match expr {
            Expr::Lit(lit) => write!(self.out, "{lit}"),
            Expr::Var(var) => self.out.write_str(&self.graph.var(*var).name),
            Expr::Pop => self.out.write_str("pop()"),
            Expr::Peek(index) => {
                self.out.push_str("peek(");
                self.expr(index, 0)?;
                self.out.push(')');
                Ok(())
            }
            Expr::Unary(op, inner) => {
                self.out.push(match op {
                    UnOp::Neg => '-',
                    UnOp::Not => '!',
                });
                self.expr(inner, UNARY_PREC)
            }
            Expr::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                let wrap = prec < min_prec;
                if wrap {
                    self.out.push('(');
                }
                self.expr(lhs, prec)?;
                write!(self.out, " {} ", op.symbol())?;
                // Left-associative: an equal-precedence right operand needs
                // parentheses.
                self.expr(rhs, prec + 1)?;
                if wrap {
                    self.out.push(')');
                }
                Ok(())
            }
        }
    }
}

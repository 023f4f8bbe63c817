// sgc — Stream Graph Compiler
//
// Library root. Front end (lexer, parser, elaborate), the constant
// propagation and unrolling pass (propagate, fields, hoist, unroll,
// children, const_prop), and the consumers of its output (verify, print,
// dot, layout).

pub mod ast;
pub mod children;
pub mod const_prop;
pub mod diag;
pub mod dot;
pub mod elaborate;
pub mod fields;
pub mod fold;
pub mod graph;
pub mod hoist;
pub mod id;
pub mod ir;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod print;
pub mod propagate;
pub mod unroll;
pub mod verify;

// fold.rs — Literal evaluation for constant folding
//
// Pure functions from (operator, literal operands) to a literal result, or
// `None` when the operation cannot be folded at compile time.
//
// Preconditions: none.
// Postconditions: a `Some` result is exactly what the target would compute.
// Failure modes: none; overflow, division by zero and non-finite results
//                yield `None` and the expression stays symbolic.
// Side effects: none.

use crate::ast::{BinOp, Type, UnOp};
use crate::ir::{Expr, Literal};

pub fn fold_unary(op: UnOp, operand: Literal) -> Option<Literal> {
    match (op, operand) {
        (UnOp::Neg, Literal::Int(v)) => v.checked_neg().map(Literal::Int),
        (UnOp::Neg, Literal::Float(v)) => Some(Literal::Float(-v)),
        (UnOp::Not, Literal::Bool(v)) => Some(Literal::Bool(!v)),
        _ => None,
    }
}

pub fn fold_binary(op: BinOp, lhs: Literal, rhs: Literal) -> Option<Literal> {
    match (lhs, rhs) {
        (Literal::Int(a), Literal::Int(b)) => fold_int(op, a, b),
        (Literal::Float(a), Literal::Float(b)) => fold_float(op, a, b),
        (Literal::Int(a), Literal::Float(b)) => fold_float(op, a as f64, b),
        (Literal::Float(a), Literal::Int(b)) => fold_float(op, a, b as f64),
        (Literal::Bool(a), Literal::Bool(b)) => match op {
            BinOp::And => Some(Literal::Bool(a && b)),
            BinOp::Or => Some(Literal::Bool(a || b)),
            BinOp::Eq => Some(Literal::Bool(a == b)),
            BinOp::Ne => Some(Literal::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn fold_int(op: BinOp, a: i64, b: i64) -> Option<Literal> {
    Some(match op {
        BinOp::Add => Literal::Int(a.checked_add(b)?),
        BinOp::Sub => Literal::Int(a.checked_sub(b)?),
        BinOp::Mul => Literal::Int(a.checked_mul(b)?),
        BinOp::Div => Literal::Int(a.checked_div(b)?),
        BinOp::Rem => Literal::Int(a.checked_rem(b)?),
        BinOp::Lt => Literal::Bool(a < b),
        BinOp::Le => Literal::Bool(a <= b),
        BinOp::Gt => Literal::Bool(a > b),
        BinOp::Ge => Literal::Bool(a >= b),
        BinOp::Eq => Literal::Bool(a == b),
        BinOp::Ne => Literal::Bool(a != b),
        BinOp::And | BinOp::Or => return None,
    })
}

fn fold_float(op: BinOp, a: f64, b: f64) -> Option<Literal> {
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        BinOp::Lt => return Some(Literal::Bool(a < b)),
        BinOp::Le => return Some(Literal::Bool(a <= b)),
        BinOp::Gt => return Some(Literal::Bool(a > b)),
        BinOp::Ge => return Some(Literal::Bool(a >= b)),
        BinOp::Eq => return Some(Literal::Bool(a == b)),
        BinOp::Ne => return Some(Literal::Bool(a != b)),
        BinOp::And | BinOp::Or => return None,
    };
    v.is_finite().then_some(Literal::Float(v))
}

/// Convert a literal to the declared type of the binding receiving it.
/// Only int → float widening is implicit.
pub fn coerce(lit: Literal, ty: Type) -> Option<Literal> {
    match (lit, ty) {
        (Literal::Int(v), Type::Float) => Some(Literal::Float(v as f64)),
        (lit, ty) if lit.ty() == ty => Some(lit),
        _ => None,
    }
}

/// Fold one node whose operands are already literal. Returns whether the
/// node was replaced.
pub fn fold_shallow(expr: &mut Expr) -> bool {
    let folded = match expr {
        Expr::Unary(op, inner) => inner.as_literal().and_then(|v| fold_unary(*op, v)),
        Expr::Binary(op, lhs, rhs) => match (lhs.as_literal(), rhs.as_literal()) {
            (Some(a), Some(b)) => fold_binary(*op, a, b),
            _ => None,
        },
        _ => None,
    };
    match folded {
        Some(lit) => {
            *expr = Expr::Lit(lit);
            true
        }
        None => false,
    }
}

/// Fold every foldable subexpression, bottom-up.
pub fn fold_deep(expr: &mut Expr) -> bool {
    let mut changed = false;
    expr.visit_mut(&mut |e| changed |= fold_shallow(e));
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::VarId;

    #[test]
    fn integer_arithmetic() {
        assert_eq!(
            fold_binary(BinOp::Add, Literal::Int(2), Literal::Int(1)),
            Some(Literal::Int(3))
        );
        assert_eq!(
            fold_binary(BinOp::Rem, Literal::Int(7), Literal::Int(3)),
            Some(Literal::Int(1))
        );
        assert_eq!(
            fold_binary(BinOp::Le, Literal::Int(3), Literal::Int(3)),
            Some(Literal::Bool(true))
        );
    }

    #[test]
    fn checked_failures_do_not_fold() {
        assert_eq!(fold_binary(BinOp::Div, Literal::Int(1), Literal::Int(0)), None);
        assert_eq!(fold_binary(BinOp::Rem, Literal::Int(1), Literal::Int(0)), None);
        assert_eq!(
            fold_binary(BinOp::Add, Literal::Int(i64::MAX), Literal::Int(1)),
            None
        );
        assert_eq!(fold_unary(UnOp::Neg, Literal::Int(i64::MIN)), None);
        assert_eq!(
            fold_binary(BinOp::Div, Literal::Float(1.0), Literal::Float(0.0)),
            None
        );
    }

    #[test]
    fn mixed_operands_promote_to_float() {
        assert_eq!(
            fold_binary(BinOp::Mul, Literal::Int(2), Literal::Float(1.5)),
            Some(Literal::Float(3.0))
        );
    }

    #[test]
    fn type_mismatches_do_not_fold() {
        assert_eq!(fold_binary(BinOp::Add, Literal::Bool(true), Literal::Int(1)), None);
        assert_eq!(fold_unary(UnOp::Not, Literal::Int(1)), None);
        assert_eq!(fold_binary(BinOp::And, Literal::Int(1), Literal::Int(1)), None);
    }

    #[test]
    fn coerce_widens_int_only() {
        assert_eq!(coerce(Literal::Int(2), Type::Float), Some(Literal::Float(2.0)));
        assert_eq!(coerce(Literal::Float(2.0), Type::Int), None);
        assert_eq!(coerce(Literal::Bool(true), Type::Bool), Some(Literal::Bool(true)));
    }

    #[test]
    fn fold_deep_leaves_symbolic_parts() {
        // (1 + 2) * x
        let mut e = Expr::Binary(
            BinOp::Mul,
            Box::new(Expr::Binary(
                BinOp::Add,
                Box::new(Expr::int(1)),
                Box::new(Expr::int(2)),
            )),
            Box::new(Expr::Var(VarId(0))),
        );
        assert!(fold_deep(&mut e));
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Mul,
                Box::new(Expr::int(3)),
                Box::new(Expr::Var(VarId(0)))
            )
        );
        assert!(!fold_deep(&mut e));
    }
}

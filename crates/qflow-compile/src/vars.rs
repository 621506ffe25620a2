//! Variable usage queries over the typed tree.
//!
//! The linearity analyzer and the lowering pass must agree on which names a
//! loop threads and which names cross into a branch, so both use these
//! helpers.

use std::collections::BTreeSet;

use crate::typed::{TExpr, TExprKind, TStmt, TStmtKind};

/// Collect the names an expression reads.
pub fn expr_reads(expr: &TExpr, out: &mut BTreeSet<String>) {
    match &expr.kind {
        TExprKind::Var(name) => {
            out.insert(name.clone());
        }
        TExprKind::Literal(_) | TExprKind::Lift { .. } => {}
        TExprKind::Call { args, .. } | TExprKind::Tuple(args) => {
            for arg in args {
                expr_reads(arg, out);
            }
        }
        TExprKind::Unary { operand, .. } => expr_reads(operand, out),
        TExprKind::Binary { lhs, rhs, .. } => {
            expr_reads(lhs, out);
            expr_reads(rhs, out);
        }
    }
}

/// Names a block reads or assigns.
///
/// A `break` or `continue` that targets the enclosing loop adds `jumps`,
/// the names that loop threads, because the jump carries all of them.
/// Jumps inside nested loops target those loops instead.
pub fn block_needs(stmts: &[TStmt], jumps: &BTreeSet<String>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_needs(stmts, jumps, &mut out);
    out
}

fn collect_needs(stmts: &[TStmt], jumps: &BTreeSet<String>, out: &mut BTreeSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            TStmtKind::Assign { targets, value } => {
                expr_reads(value, out);
                out.extend(targets.iter().cloned());
            }
            TStmtKind::Expr(value) => expr_reads(value, out),
            TStmtKind::Return(value) => {
                if let Some(value) = value {
                    expr_reads(value, out);
                }
            }
            TStmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                expr_reads(cond, out);
                collect_needs(then_body, jumps, out);
                collect_needs(else_body, jumps, out);
            }
            TStmtKind::While { cond, body, .. } => {
                expr_reads(cond, out);
                out.extend(block_needs(body, &BTreeSet::new()));
            }
            TStmtKind::For { var, count, body } => {
                expr_reads(count, out);
                out.insert(var.clone());
                out.extend(block_needs(body, &BTreeSet::new()));
            }
            TStmtKind::Break | TStmtKind::Continue => out.extend(jumps.iter().cloned()),
        }
    }
}

/// Names a loop reads or assigns in its condition and body.
///
/// Intersected with the names bound before the loop, this is the set of
/// values the loop threads through its iterations.
pub fn loop_needs(cond: Option<&TExpr>, body: &[TStmt]) -> BTreeSet<String> {
    let mut out = block_needs(body, &BTreeSet::new());
    if let Some(cond) = cond {
        expr_reads(cond, &mut out);
    }
    out
}

/// Check whether a block breaks out of its own loop.
pub fn contains_break(stmts: &[TStmt]) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        TStmtKind::Break => true,
        TStmtKind::If {
            then_body,
            else_body,
            ..
        } => contains_break(then_body) || contains_break(else_body),
        _ => false,
    })
}

/// Names assigned anywhere in a block, including nested blocks.
pub fn assigned(stmts: &[TStmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            TStmtKind::Assign { targets, .. } => out.extend(targets.iter().cloned()),
            TStmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                assigned(then_body, out);
                assigned(else_body, out);
            }
            TStmtKind::While { body, .. } => assigned(body, out),
            TStmtKind::For { var, body, .. } => {
                out.insert(var.clone());
                assigned(body, out);
            }
            TStmtKind::Expr(_) | TStmtKind::Break | TStmtKind::Continue | TStmtKind::Return(_) => {}
        }
    }
}

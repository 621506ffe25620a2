//! Typed statement tree produced by the type checker.
//!
//! Mirrors [`crate::ast`] with every expression annotated by its resolved
//! type, every callee resolved, and unreachable statements removed.

use qflow_ir::{Literal, Type};

use crate::ast::{BinOp, Param, Signature, Span, UnOp};
use crate::ops::{OpClass, OpSignature};
use crate::registry::FunctionId;

/// A resolved call target.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A function of the module.
    Function {
        id: FunctionId,
        name: String,
        signature: Signature,
    },
    /// A primitive operation from a loaded extension.
    Op(OpSignature),
}

impl Callee {
    /// Name as written at the call site.
    pub fn name(&self) -> &str {
        match self {
            Callee::Function { name, .. } => name,
            Callee::Op(op) => &op.name,
        }
    }

    /// Check whether the callee is an operation of the given class.
    pub fn is_op(&self, class: OpClass) -> bool {
        matches!(self, Callee::Op(op) if op.class == class)
    }
}

/// A typed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TExpr {
    pub kind: TExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TExprKind {
    Var(String),
    Literal(Literal),
    Lift { source: String, value: f64 },
    Call { callee: Callee, args: Vec<TExpr> },
    Unary { op: UnOp, operand: Box<TExpr> },
    Binary { op: BinOp, lhs: Box<TExpr>, rhs: Box<TExpr> },
    Tuple(Vec<TExpr>),
}

/// A typed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TStmt {
    pub kind: TStmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TStmtKind {
    Assign {
        targets: Vec<String>,
        value: TExpr,
    },
    Expr(TExpr),
    /// A missing else arm is an empty `else_body`.
    If {
        cond: TExpr,
        then_body: Vec<TStmt>,
        else_body: Vec<TStmt>,
    },
    /// `infinite` is set when the condition is the literal `true`.
    While {
        cond: TExpr,
        body: Vec<TStmt>,
        infinite: bool,
    },
    For {
        var: String,
        count: TExpr,
        body: Vec<TStmt>,
    },
    Break,
    Continue,
    Return(Option<TExpr>),
}

/// A function that passed type checking.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<Type>,
    pub body: Vec<TStmt>,
    pub span: Span,
}

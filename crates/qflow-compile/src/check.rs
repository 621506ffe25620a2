//! Flow-sensitive type checking.
//!
//! Walks a function body with a type environment, resolves every variable
//! and callee, and produces the typed tree. Control flow is tracked only as
//! far as typing needs it: a name is usable after a join when every
//! fall-through path defines it with the same type, and code after a jump is
//! unreachable and dropped.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use qflow_ir::{Literal, Type};

use crate::ast::{BinOp, Expr, ExprKind, FunctionDef, Span, Stmt, StmtKind, UnOp};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::lower::HIDDEN;
use crate::ops::OpTable;
use crate::registry::{FunctionId, Registry};
use crate::typed::{Callee, TExpr, TExprKind, TStmt, TStmtKind, TypedFunction};

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Defined(Type),
    /// Defined on some incoming paths only.
    Partial,
    /// Defined with different types on different paths.
    Conflict,
    /// Bound to an expression that already failed to check.
    Unknown,
}

type Env = BTreeMap<String, Binding>;

/// Merge the environments of two paths. `None` is an unreachable path.
fn join(a: Option<Env>, b: Option<Env>) -> Option<Env> {
    match (a, b) {
        (None, env) | (env, None) => env,
        (Some(a), Some(b)) => {
            let mut merged = Env::new();
            for name in a.keys().chain(b.keys()) {
                if merged.contains_key(name) {
                    continue;
                }
                let binding = match (a.get(name), b.get(name)) {
                    (Some(Binding::Defined(x)), Some(Binding::Defined(y))) if x == y => {
                        Binding::Defined(x.clone())
                    }
                    (Some(Binding::Defined(_)), Some(Binding::Defined(_))) => Binding::Conflict,
                    (Some(Binding::Unknown), _) | (_, Some(Binding::Unknown)) => Binding::Unknown,
                    (Some(Binding::Conflict), _) | (_, Some(Binding::Conflict)) => {
                        Binding::Conflict
                    }
                    _ => Binding::Partial,
                };
                merged.insert(name.clone(), binding);
            }
            Some(merged)
        }
    }
}

struct LoopScope {
    /// Environment before the loop.
    outer: Env,
    has_break: bool,
}

struct TypeChecker<'a> {
    registry: &'a Registry,
    ops: &'a OpTable,
    function: &'a str,
    returns: Type,
    loops: Vec<LoopScope>,
    diagnostics: Vec<Diagnostic>,
}

/// Type check one function.
///
/// Returns the typed tree, or every diagnostic found in the function.
#[instrument(skip_all, fields(function = %def.name))]
pub fn check_function(
    registry: &Registry,
    ops: &OpTable,
    id: FunctionId,
    def: &FunctionDef,
) -> Result<TypedFunction, Vec<Diagnostic>> {
    let mut checker = TypeChecker {
        registry,
        ops,
        function: &def.name,
        returns: Type::from_returns(&def.returns),
        loops: vec![],
        diagnostics: vec![],
    };

    let mut env = Env::new();
    for param in &def.params {
        checker.check_name(&param.name, def.span);
        if !param.ty.is_scalar() {
            checker.error(
                DiagnosticKind::Type,
                def.span,
                format!("parameter `{}` has non-scalar type {}", param.name, param.ty),
            );
        }
        if env
            .insert(param.name.clone(), Binding::Defined(param.ty.clone()))
            .is_some()
        {
            checker.error(
                DiagnosticKind::Type,
                def.span,
                format!("parameter `{}` is declared twice", param.name),
            );
        }
    }
    if let Some(bad) = def.returns.iter().find(|t| !t.is_scalar()) {
        checker.error(
            DiagnosticKind::Type,
            def.span,
            format!("return types must be single values, found {bad}"),
        );
    }

    let (body, end) = checker.block(&def.body, Some(env));
    if end.is_some() && !def.returns.is_empty() {
        let span = def.body.last().map_or(def.span, |s| s.span);
        checker.error(
            DiagnosticKind::ControlFlow,
            span,
            format!(
                "`{}` can reach the end of its body without returning {}",
                def.name, checker.returns
            ),
        );
    }

    if checker.diagnostics.is_empty() {
        debug!("Type check passed");
        Ok(TypedFunction {
            id,
            name: def.name.clone(),
            params: def.params.clone(),
            returns: def.returns.clone(),
            body,
            span: def.span,
        })
    } else {
        debug!("Type check found {} problem(s)", checker.diagnostics.len());
        Err(checker.diagnostics)
    }
}

impl TypeChecker<'_> {
    fn error(&mut self, kind: DiagnosticKind, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::new(kind, self.function, span, message));
    }

    /// Reject names in the namespace lowering reserves for itself.
    fn check_name(&mut self, name: &str, span: Span) {
        if name.starts_with(HIDDEN) {
            self.error(
                DiagnosticKind::Type,
                span,
                format!(
                    "`{name}` is not a valid name: names starting with `{HIDDEN}` are reserved"
                ),
            );
        }
    }

    fn block(&mut self, stmts: &[Stmt], mut env: Option<Env>) -> (Vec<TStmt>, Option<Env>) {
        let mut out = Vec::with_capacity(stmts.len());
        for (i, stmt) in stmts.iter().enumerate() {
            let Some(current) = env else {
                debug!(
                    "Dropping {} unreachable statement(s) at {}",
                    stmts.len() - i,
                    stmt.span
                );
                return (out, None);
            };
            env = self.stmt(stmt, current, &mut out);
        }
        (out, env)
    }

    fn stmt(&mut self, stmt: &Stmt, mut env: Env, out: &mut Vec<TStmt>) -> Option<Env> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                let value = self.expr(value, &env);
                self.bind(targets, value.as_ref().map(|v| &v.ty), span, &mut env);
                if let Some(value) = value {
                    out.push(TStmt {
                        kind: TStmtKind::Assign {
                            targets: targets.clone(),
                            value,
                        },
                        span,
                    });
                }
                Some(env)
            }
            StmtKind::Expr { value } => {
                if let Some(value) = self.expr(value, &env) {
                    out.push(TStmt {
                        kind: TStmtKind::Expr(value),
                        span,
                    });
                }
                Some(env)
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.condition(cond, &env);
                let (then_body, then_env) = self.block(then_body, Some(env.clone()));
                let (else_body, else_env) =
                    self.block(else_body.as_deref().unwrap_or_default(), Some(env));
                if let Some(cond) = cond {
                    out.push(TStmt {
                        kind: TStmtKind::If {
                            cond,
                            then_body,
                            else_body,
                        },
                        span,
                    });
                }
                join(then_env, else_env)
            }
            StmtKind::While { cond, body } => {
                let infinite = cond.is_true_literal();
                let cond = self.condition(cond, &env);
                self.loops.push(LoopScope {
                    outer: env.clone(),
                    has_break: false,
                });
                let (body, _) = self.block(body, Some(env.clone()));
                let has_break = self.loops.pop().is_some_and(|scope| scope.has_break);
                if let Some(cond) = cond {
                    out.push(TStmt {
                        kind: TStmtKind::While {
                            cond,
                            body,
                            infinite,
                        },
                        span,
                    });
                }
                if infinite && !has_break { None } else { Some(env) }
            }
            StmtKind::For { var, count, body } => {
                let count = self.expr(count, &env).and_then(|count| {
                    if count.ty == Type::Int {
                        Some(count)
                    } else {
                        self.error(
                            DiagnosticKind::Type,
                            count.span,
                            format!("loop count must be int, found {}", count.ty),
                        );
                        None
                    }
                });
                self.check_name(var, span);
                if env.contains_key(var) {
                    self.error(
                        DiagnosticKind::ControlFlow,
                        span,
                        format!("loop variable `{var}` shadows an existing binding"),
                    );
                }
                let mut body_env = env.clone();
                body_env.insert(var.clone(), Binding::Defined(Type::Int));
                self.loops.push(LoopScope {
                    outer: env.clone(),
                    has_break: false,
                });
                let (body, _) = self.block(body, Some(body_env));
                self.loops.pop();
                if let Some(count) = count {
                    out.push(TStmt {
                        kind: TStmtKind::For {
                            var: var.clone(),
                            count,
                            body,
                        },
                        span,
                    });
                }
                Some(env)
            }
            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(stmt.kind, StmtKind::Break);
                if let Some(scope) = self.loops.last_mut() {
                    scope.has_break |= is_break;
                    out.push(TStmt {
                        kind: if is_break {
                            TStmtKind::Break
                        } else {
                            TStmtKind::Continue
                        },
                        span,
                    });
                } else {
                    let word = if is_break { "break" } else { "continue" };
                    self.error(
                        DiagnosticKind::ControlFlow,
                        span,
                        format!("`{word}` outside of a loop"),
                    );
                }
                None
            }
            StmtKind::Return { value } => {
                match value {
                    Some(value) => {
                        if let Some(value) = self.expr(value, &env) {
                            if value.ty == self.returns {
                                out.push(TStmt {
                                    kind: TStmtKind::Return(Some(value)),
                                    span,
                                });
                            } else if self.returns.is_unit() {
                                self.error(
                                    DiagnosticKind::Type,
                                    value.span,
                                    format!(
                                        "`{}` declares no return value, found {}",
                                        self.function, value.ty
                                    ),
                                );
                            } else {
                                self.error(
                                    DiagnosticKind::Type,
                                    value.span,
                                    format!(
                                        "expected return type {}, found {}",
                                        self.returns, value.ty
                                    ),
                                );
                            }
                        }
                    }
                    None if self.returns.is_unit() => out.push(TStmt {
                        kind: TStmtKind::Return(None),
                        span,
                    }),
                    None => self.error(
                        DiagnosticKind::Type,
                        span,
                        format!("missing return value, expected {}", self.returns),
                    ),
                }
                None
            }
        }
    }

    fn bind(&mut self, targets: &[String], ty: Option<&Type>, span: Span, env: &mut Env) {
        let mut seen = BTreeSet::new();
        for target in targets {
            self.check_name(target, span);
            if !seen.insert(target) {
                self.error(
                    DiagnosticKind::Type,
                    span,
                    format!("`{target}` is assigned twice in one statement"),
                );
            }
        }

        let types = match ty {
            None => None,
            Some(ty) if targets.len() == 1 => {
                if ty.is_scalar() {
                    Some(vec![ty.clone()])
                } else if ty.is_unit() {
                    self.error(
                        DiagnosticKind::Type,
                        span,
                        format!("expression has no value to assign to `{}`", targets[0]),
                    );
                    None
                } else {
                    self.error(
                        DiagnosticKind::Type,
                        span,
                        format!(
                            "cannot assign a value of type {ty} to the single name `{}`",
                            targets[0]
                        ),
                    );
                    None
                }
            }
            Some(Type::Tuple(items)) if items.len() == targets.len() && !items.is_empty() => {
                Some(items.clone())
            }
            Some(ty) => {
                self.error(
                    DiagnosticKind::Type,
                    span,
                    format!(
                        "cannot unpack a value of type {ty} into {} name(s)",
                        targets.len()
                    ),
                );
                None
            }
        };

        let Some(types) = types else {
            for target in targets {
                env.insert(target.clone(), Binding::Unknown);
            }
            return;
        };

        for (target, ty) in targets.iter().zip(types) {
            let changed = self.loops.iter().find_map(|scope| match scope.outer.get(target) {
                Some(Binding::Defined(before)) if *before != ty => Some(before.clone()),
                _ => None,
            });
            if let Some(before) = changed {
                self.error(
                    DiagnosticKind::ControlFlow,
                    span,
                    format!("loop changes the type of `{target}` from {before} to {ty}"),
                );
            }
            env.insert(target.clone(), Binding::Defined(ty));
        }
    }

    fn condition(&mut self, cond: &Expr, env: &Env) -> Option<TExpr> {
        let cond = self.expr(cond, env)?;
        if cond.ty == Type::Bool {
            Some(cond)
        } else {
            self.error(
                DiagnosticKind::Type,
                cond.span,
                format!("condition must be bool, found {}", cond.ty),
            );
            None
        }
    }

    fn expr(&mut self, expr: &Expr, env: &Env) -> Option<TExpr> {
        let span = expr.span;
        let (kind, ty) = match &expr.kind {
            ExprKind::Var { name } => match env.get(name) {
                Some(Binding::Defined(ty)) => (TExprKind::Var(name.clone()), ty.clone()),
                Some(Binding::Partial) => {
                    self.error(
                        DiagnosticKind::ControlFlow,
                        span,
                        format!("`{name}` is not defined on every path reaching this use"),
                    );
                    return None;
                }
                Some(Binding::Conflict) => {
                    self.error(
                        DiagnosticKind::ControlFlow,
                        span,
                        format!("`{name}` has different types on different paths"),
                    );
                    return None;
                }
                Some(Binding::Unknown) => return None,
                None => {
                    self.error(
                        DiagnosticKind::UnboundName,
                        span,
                        format!("name `{name}` is not defined"),
                    );
                    return None;
                }
            },
            ExprKind::Bool { value } => (TExprKind::Literal(Literal::Bool(*value)), Type::Bool),
            ExprKind::Int { value } => (TExprKind::Literal(Literal::Int(*value)), Type::Int),
            ExprKind::Float { value } => {
                (TExprKind::Literal(Literal::Float(*value)), Type::Float)
            }
            ExprKind::Angle { value } => {
                (TExprKind::Literal(Literal::Angle(*value)), Type::Angle)
            }
            ExprKind::Lift { source, value, ty } => {
                let problem = if !ty.is_numeric() {
                    Some(format!("cannot lift host value `{source}` as {ty}"))
                } else if !value.is_finite() {
                    Some(format!("lifted value `{source}` is not finite"))
                } else if *ty == Type::Int && value.fract() != 0.0 {
                    Some(format!("lifted value `{source}` = {value} is not an integer"))
                } else {
                    None
                };
                if let Some(message) = problem {
                    self.error(DiagnosticKind::Type, span, message);
                    return None;
                }
                (
                    TExprKind::Lift {
                        source: source.clone(),
                        value: *value,
                    },
                    ty.clone(),
                )
            }
            ExprKind::Call { func, args } => return self.call(func, args, span, env),
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand, env)?;
                let ty = match (op, &operand.ty) {
                    (UnOp::Not, Type::Bool) => Type::Bool,
                    (UnOp::Neg, ty) if ty.is_numeric() => ty.clone(),
                    (op, ty) => {
                        self.error(
                            DiagnosticKind::Type,
                            span,
                            format!("operator `{}` cannot be applied to {ty}", op.name()),
                        );
                        return None;
                    }
                };
                (
                    TExprKind::Unary {
                        op: *op,
                        operand: Box::new(operand),
                    },
                    ty,
                )
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs, env);
                let rhs = self.expr(rhs, env);
                let (lhs, rhs) = (lhs?, rhs?);
                let ty = self.binary_type(*op, &lhs.ty, &rhs.ty, span)?;
                (
                    TExprKind::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    ty,
                )
            }
            ExprKind::Tuple { items } => {
                let mut typed = Vec::with_capacity(items.len());
                let mut ok = true;
                for item in items {
                    match self.expr(item, env) {
                        Some(item) if item.ty.is_scalar() => typed.push(item),
                        Some(item) => {
                            self.error(
                                DiagnosticKind::Type,
                                item.span,
                                format!("tuple items must be single values, found {}", item.ty),
                            );
                            ok = false;
                        }
                        None => ok = false,
                    }
                }
                if items.len() < 2 {
                    self.error(
                        DiagnosticKind::Type,
                        span,
                        "a tuple needs at least two items".to_string(),
                    );
                    return None;
                }
                if !ok {
                    return None;
                }
                let ty = Type::Tuple(typed.iter().map(|t| t.ty.clone()).collect());
                (TExprKind::Tuple(typed), ty)
            }
        };
        Some(TExpr { kind, ty, span })
    }

    fn binary_type(&mut self, op: BinOp, lhs: &Type, rhs: &Type, span: Span) -> Option<Type> {
        if lhs != rhs {
            self.error(
                DiagnosticKind::Type,
                span,
                format!(
                    "operands of `{}` have different types: {lhs} and {rhs}",
                    op.name()
                ),
            );
            return None;
        }
        let (supported, result) = match op {
            BinOp::Add | BinOp::Sub => (
                matches!(lhs, Type::Int | Type::Float | Type::Angle),
                lhs.clone(),
            ),
            BinOp::Mul | BinOp::Div => (matches!(lhs, Type::Int | Type::Float), lhs.clone()),
            BinOp::Eq | BinOp::Ne => (
                matches!(lhs, Type::Bool | Type::Int | Type::Float | Type::Angle),
                Type::Bool,
            ),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                (matches!(lhs, Type::Int | Type::Float), Type::Bool)
            }
            BinOp::And | BinOp::Or => (*lhs == Type::Bool, Type::Bool),
        };
        if supported {
            Some(result)
        } else {
            self.error(
                DiagnosticKind::Type,
                span,
                format!("operator `{}` is not defined for {lhs}", op.name()),
            );
            None
        }
    }

    fn call(&mut self, func: &str, args: &[Expr], span: Span, env: &Env) -> Option<TExpr> {
        let typed: Vec<Option<TExpr>> = args.iter().map(|arg| self.expr(arg, env)).collect();

        // Module functions shadow operations of the same name.
        let (callee, params, result) = if let Some((id, signature)) = self.registry.lookup(func)
        {
            let params = signature.params.clone();
            let result = signature.result_type();
            (
                Callee::Function {
                    id,
                    name: func.to_string(),
                    signature,
                },
                params,
                result,
            )
        } else if let Some(op) = self.ops.get(func) {
            (Callee::Op(op.clone()), op.inputs.clone(), op.result_type())
        } else {
            self.error(
                DiagnosticKind::UnboundName,
                span,
                format!("unknown function or operation `{func}`"),
            );
            return None;
        };

        if typed.len() != params.len() {
            self.error(
                DiagnosticKind::Type,
                span,
                format!(
                    "`{func}` expects {} argument(s), found {}",
                    params.len(),
                    typed.len()
                ),
            );
            return None;
        }

        let mut ok = true;
        let mut checked = Vec::with_capacity(typed.len());
        for (i, (arg, param)) in typed.into_iter().zip(&params).enumerate() {
            match arg {
                Some(arg) if arg.ty == *param => checked.push(arg),
                Some(arg) => {
                    self.error(
                        DiagnosticKind::Type,
                        arg.span,
                        format!(
                            "argument {} of `{func}` expects {param}, found {}",
                            i + 1,
                            arg.ty
                        ),
                    );
                    ok = false;
                }
                None => ok = false,
            }
        }
        if !ok {
            return None;
        }

        Some(TExpr {
            kind: TExprKind::Call {
                callee,
                args: checked,
            },
            ty: result,
            span,
        })
    }
}

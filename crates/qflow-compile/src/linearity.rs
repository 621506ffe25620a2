//! Linear resource analysis.
//!
//! Every qubit value is a handle that must be consumed exactly once on every
//! path: by a gate, a measurement, a discard, a call or a return. The
//! analysis runs over the typed tree as a structured dataflow problem. Each
//! qubit-typed name is in one of three states (live, consumed, discarded).
//! Branch joins unify live handles by name, and loops check their carried
//! handles on every exit, `break` and `continue` path.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use qflow_ir::Type;

use crate::ast::Span;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::ops::OpClass;
use crate::typed::{TExpr, TExprKind, TStmt, TStmtKind, TypedFunction};
use crate::vars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct HandleId(u32);

#[derive(Debug, Clone)]
struct HandleInfo {
    origin: String,
    site: Span,
    /// Already part of a reported error; further problems are not reported.
    poisoned: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Live(HandleId),
    Consumed {
        handle: HandleId,
        at: Span,
        by: String,
    },
    Discarded {
        handle: HandleId,
        at: Span,
    },
}

/// Lifecycle of every qubit-typed name on one path.
type State = BTreeMap<String, Slot>;

struct LoopFrame {
    label: String,
    threaded: BTreeSet<String>,
    /// State at the loop head.
    outer: State,
}

struct Analyzer<'a> {
    function: &'a TypedFunction,
    handles: Vec<HandleInfo>,
    loops: Vec<LoopFrame>,
    path: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

/// Check that every qubit in a function is consumed exactly once.
///
/// All violations in the function are collected.
#[instrument(skip_all, fields(function = %function.name))]
pub fn check_linearity(function: &TypedFunction) -> Result<(), Vec<Diagnostic>> {
    let mut analyzer = Analyzer {
        function,
        handles: vec![],
        loops: vec![],
        path: vec![],
        diagnostics: vec![],
    };

    let mut state = State::new();
    for param in &function.params {
        if param.ty == Type::Qubit {
            let handle = analyzer.fresh(function.span, "parameter".to_string(), false);
            state.insert(param.name.clone(), Slot::Live(handle));
        }
    }

    if let Some(end) = analyzer.block(&function.body, state) {
        let span = function.body.last().map_or(function.span, |s| s.span);
        analyzer.leak_all(&end, "at the end of the function", span);
    }

    debug!(
        "Tracked {} handle(s), {} problem(s)",
        analyzer.handles.len(),
        analyzer.diagnostics.len()
    );
    if analyzer.diagnostics.is_empty() {
        Ok(())
    } else {
        Err(analyzer.diagnostics)
    }
}

impl Analyzer<'_> {
    #[allow(clippy::cast_possible_truncation)]
    fn fresh(&mut self, site: Span, origin: String, poisoned: bool) -> HandleId {
        let id = HandleId(self.handles.len() as u32);
        self.handles.push(HandleInfo {
            origin,
            site,
            poisoned,
        });
        id
    }

    fn poisoned(&self, handle: HandleId) -> bool {
        self.handles[handle.0 as usize].poisoned
    }

    fn describe(&self, handle: HandleId, name: Option<&str>) -> String {
        let info = &self.handles[handle.0 as usize];
        match name {
            Some(name) => format!("qubit `{name}` ({} at {})", info.origin, info.site),
            None => format!("qubit ({} at {})", info.origin, info.site),
        }
    }

    /// Innermost construct first.
    fn location(&self) -> String {
        if self.path.is_empty() {
            String::new()
        } else {
            let segments: Vec<&str> = self.path.iter().rev().map(String::as_str).collect();
            format!(" (in {})", segments.join(", in "))
        }
    }

    fn error(&mut self, span: Span, message: String) {
        let message = format!("{message}{}", self.location());
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::Linearity,
            &self.function.name,
            span,
            message,
        ));
    }

    fn block(&mut self, stmts: &[TStmt], mut state: State) -> Option<State> {
        for stmt in stmts {
            state = self.stmt(stmt, state)?;
        }
        Some(state)
    }

    fn stmt(&mut self, stmt: &TStmt, mut state: State) -> Option<State> {
        let span = stmt.span;
        match &stmt.kind {
            TStmtKind::Assign { targets, value } => {
                let by = match targets.as_slice() {
                    [single] => format!("assignment to `{single}`"),
                    _ => "assignment".to_string(),
                };
                let values = self.expr(value, &by, &mut state);
                for (target, value) in targets.iter().zip(values) {
                    if let Some(Slot::Live(old)) = state.get(target) {
                        let old = *old;
                        if !self.poisoned(old) {
                            let message = format!(
                                "{} is overwritten while still live",
                                self.describe(old, Some(target))
                            );
                            self.error(span, message);
                        }
                    }
                    match value {
                        Some(handle) => {
                            state.insert(target.clone(), Slot::Live(handle));
                        }
                        None => {
                            state.remove(target);
                        }
                    }
                }
                Some(state)
            }
            TStmtKind::Expr(value) => {
                for handle in self.expr(value, "expression statement", &mut state).into_iter().flatten() {
                    if !self.poisoned(handle) {
                        let message = format!(
                            "{} is dropped by an expression statement; bind it or call `discard`",
                            self.describe(handle, None)
                        );
                        self.error(span, message);
                    }
                }
                Some(state)
            }
            TStmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.expr(cond, "condition", &mut state);
                let label = format!("`if` at {span}");

                self.path.push(format!("then-branch of {label}"));
                let then_state = self.block(then_body, state.clone());
                self.path.pop();

                self.path.push(format!("else-branch of {label}"));
                let else_state = self.block(else_body, state);
                self.path.pop();

                self.join(then_state, else_state, &label, span)
            }
            TStmtKind::While {
                cond,
                body,
                infinite,
            } => self.lower_loop("while", Some(cond), body, *infinite, span, state),
            TStmtKind::For { count, body, .. } => {
                self.expr(count, "loop count", &mut state);
                self.lower_loop("for", None, body, false, span, state)
            }
            TStmtKind::Break => {
                self.check_jump(&state, "`break`", span);
                None
            }
            TStmtKind::Continue => {
                self.check_jump(&state, "`continue`", span);
                None
            }
            TStmtKind::Return(value) => {
                if let Some(value) = value {
                    // Returned handles leave the function; they are consumed.
                    self.expr(value, "return", &mut state);
                }
                self.leak_all(&state, &format!("at the `return` at {span}"), span);
                None
            }
        }
    }

    /// Evaluate an expression. Returns one entry per flattened result value,
    /// `Some` for qubit results.
    fn expr(&mut self, expr: &TExpr, by: &str, state: &mut State) -> Vec<Option<HandleId>> {
        match &expr.kind {
            TExprKind::Var(name) => {
                if expr.ty == Type::Qubit {
                    vec![Some(self.consume(name, expr.span, by, state))]
                } else {
                    vec![None]
                }
            }
            TExprKind::Literal(_) | TExprKind::Lift { .. } => vec![None],
            TExprKind::Call { callee, args } => {
                let callee_name = callee.name();
                let discard = callee.is_op(OpClass::Discard);
                for arg in args {
                    self.expr(arg, callee_name, state);
                    if discard && arg.ty == Type::Qubit {
                        if let TExprKind::Var(name) = &arg.kind {
                            if let Some(Slot::Consumed { handle, .. }) = state.get(name) {
                                let handle = *handle;
                                state.insert(
                                    name.clone(),
                                    Slot::Discarded {
                                        handle,
                                        at: expr.span,
                                    },
                                );
                            }
                        }
                    }
                }
                expr.ty
                    .flatten()
                    .iter()
                    .map(|ty| {
                        (*ty == Type::Qubit).then(|| {
                            self.fresh(expr.span, format!("result of `{callee_name}`"), false)
                        })
                    })
                    .collect()
            }
            TExprKind::Unary { operand, .. } => {
                self.expr(operand, by, state);
                vec![None]
            }
            TExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs, by, state);
                self.expr(rhs, by, state);
                vec![None]
            }
            TExprKind::Tuple(items) => items
                .iter()
                .flat_map(|item| self.expr(item, by, state))
                .collect(),
        }
    }

    fn consume(&mut self, name: &str, at: Span, by: &str, state: &mut State) -> HandleId {
        match state.get(name).cloned() {
            Some(Slot::Live(handle)) => {
                state.insert(
                    name.to_string(),
                    Slot::Consumed {
                        handle,
                        at,
                        by: by.to_string(),
                    },
                );
                handle
            }
            Some(Slot::Consumed {
                handle,
                at: first,
                by: first_by,
            }) => {
                if !self.poisoned(handle) {
                    let message = format!(
                        "{} is consumed twice: by `{first_by}` at {first} and again by `{by}`",
                        self.describe(handle, Some(name))
                    );
                    self.error(at, message);
                }
                self.fresh(at, "invalid use".to_string(), true)
            }
            Some(Slot::Discarded { handle, at: first }) => {
                if !self.poisoned(handle) {
                    let message = format!(
                        "{} is used by `{by}` after it was discarded at {first}",
                        self.describe(handle, Some(name))
                    );
                    self.error(at, message);
                }
                self.fresh(at, "invalid use".to_string(), true)
            }
            // Unknown names were already reported by the type checker.
            None => self.fresh(at, "invalid use".to_string(), true),
        }
    }

    fn join(
        &mut self,
        then_state: Option<State>,
        else_state: Option<State>,
        label: &str,
        span: Span,
    ) -> Option<State> {
        let (then_state, else_state) = match (then_state, else_state) {
            (None, state) | (state, None) => return state,
            (Some(a), Some(b)) => (a, b),
        };

        let names: BTreeSet<&String> = then_state.keys().chain(else_state.keys()).collect();
        let mut joined = State::new();
        for name in names {
            let slot = match (then_state.get(name), else_state.get(name)) {
                (Some(Slot::Live(a)), Some(Slot::Live(b))) => {
                    if a == b {
                        Some(Slot::Live(*a))
                    } else {
                        let poisoned = self.poisoned(*a) || self.poisoned(*b);
                        Some(Slot::Live(self.fresh(
                            span,
                            format!("merged after {label}"),
                            poisoned,
                        )))
                    }
                }
                (Some(Slot::Live(handle)), other) => {
                    self.mismatch(name, *handle, ("then", "else"), other, label, span)
                }
                (other, Some(Slot::Live(handle))) => {
                    self.mismatch(name, *handle, ("else", "then"), other, label, span)
                }
                (Some(slot), _) | (None, Some(slot)) => Some(slot.clone()),
                (None, None) => None,
            };
            if let Some(slot) = slot {
                joined.insert(name.clone(), slot);
            }
        }
        Some(joined)
    }

    /// A handle live on one branch but not on the other.
    fn mismatch(
        &mut self,
        name: &str,
        handle: HandleId,
        (live_arm, other_arm): (&str, &str),
        other: Option<&Slot>,
        label: &str,
        span: Span,
    ) -> Option<Slot> {
        let report = !self.poisoned(handle);
        let subject = self.describe(handle, Some(name));
        match other {
            None | Some(Slot::Live(_)) => {
                if report {
                    self.error(
                        span,
                        format!(
                            "{subject} is bound only on the {live_arm}-branch of {label} and is never consumed"
                        ),
                    );
                }
                None
            }
            Some(Slot::Consumed { at, by, .. }) => {
                if report {
                    self.error(
                        span,
                        format!(
                            "{subject} is live after the {live_arm}-branch of {label} but consumed by `{by}` at {at} on the {other_arm}-branch"
                        ),
                    );
                }
                Some(Slot::Live(self.fresh(span, format!("merged after {label}"), true)))
            }
            Some(Slot::Discarded { at, .. }) => {
                if report {
                    self.error(
                        span,
                        format!(
                            "{subject} is live after the {live_arm}-branch of {label} but discarded at {at} on the {other_arm}-branch"
                        ),
                    );
                }
                Some(Slot::Live(self.fresh(span, format!("merged after {label}"), true)))
            }
        }
    }

    fn lower_loop(
        &mut self,
        keyword: &str,
        cond: Option<&TExpr>,
        body: &[TStmt],
        infinite: bool,
        span: Span,
        state: State,
    ) -> Option<State> {
        let label = format!("`{keyword}` loop at {span}");
        let threaded: BTreeSet<String> = vars::loop_needs(cond, body)
            .into_iter()
            .filter(|name| matches!(state.get(name), Some(Slot::Live(_))))
            .collect();

        let mut head = state.clone();
        for name in &threaded {
            if let Some(Slot::Live(before)) = state.get(name) {
                let poisoned = self.poisoned(*before);
                let carried = self.fresh(span, format!("carried by {label}"), poisoned);
                head.insert(name.clone(), Slot::Live(carried));
            }
        }
        self.loops.push(LoopFrame {
            label: label.clone(),
            threaded: threaded.clone(),
            outer: head.clone(),
        });

        let mut entered = head;
        if let Some(cond) = cond {
            self.expr(cond, "loop condition", &mut entered);
        }
        if !infinite {
            self.check_jump(&entered, "the exit", span);
        }

        self.path.push(format!("body of {label}"));
        if let Some(end) = self.block(body, entered) {
            let end_span = body.last().map_or(span, |s| s.span);
            self.check_jump(&end, "the end of the body", end_span);
        }
        self.path.pop();
        self.loops.pop();

        if infinite && !vars::contains_break(body) {
            return None;
        }
        let mut after = state;
        for name in &threaded {
            let poisoned = matches!(after.get(name), Some(Slot::Live(h)) if self.poisoned(*h));
            let result = self.fresh(span, format!("result of {label}"), poisoned);
            after.insert(name.clone(), Slot::Live(result));
        }
        Some(after)
    }

    /// Check the state on a path leaving the current iteration.
    fn check_jump(&mut self, state: &State, what: &str, span: Span) {
        let Some(frame) = self.loops.last() else {
            return;
        };

        let mut problems = vec![];
        for name in &frame.threaded {
            match state.get(name) {
                Some(Slot::Live(_)) => {}
                Some(Slot::Consumed { handle, at, by }) => {
                    if !self.poisoned(*handle) {
                        problems.push(format!(
                            "loop-carried qubit `{name}` is consumed by `{by}` at {at} and not rebound before {what} of {}",
                            frame.label
                        ));
                    }
                }
                Some(Slot::Discarded { handle, at }) => {
                    if !self.poisoned(*handle) {
                        problems.push(format!(
                            "loop-carried qubit `{name}` is discarded at {at} and not rebound before {what} of {}",
                            frame.label
                        ));
                    }
                }
                None => problems.push(format!(
                    "loop-carried qubit `{name}` is no longer bound at {what} of {}",
                    frame.label
                )),
            }
        }
        for (name, slot) in state {
            let Slot::Live(handle) = slot else {
                continue;
            };
            if frame.threaded.contains(name)
                || frame.outer.get(name) == Some(slot)
                || self.poisoned(*handle)
            {
                continue;
            }
            problems.push(format!(
                "{} is still live at {what} of {}",
                self.describe(*handle, Some(name)),
                frame.label
            ));
        }

        for problem in problems {
            self.error(span, problem);
        }
    }

    /// Report every live handle on a path that leaves the function.
    fn leak_all(&mut self, state: &State, what: &str, span: Span) {
        let leaks: Vec<String> = state
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Live(handle) if !self.poisoned(*handle) => Some(format!(
                    "{} is never consumed: still live {what}",
                    self.describe(*handle, Some(name))
                )),
                _ => None,
            })
            .collect();
        for leak in leaks {
            self.error(span, leak);
        }
    }
}

//! Control-flow lowering into the hierarchical graph IR.
//!
//! Each function is lowered into its own [`Graph`] with local ids. The body
//! becomes the root region of a `function` node. Conditionals become
//! `branch` nodes owning one arm region per outcome, and loops become `loop`
//! nodes owning a loop region:
//!
//! ```text
//! input -> loop_entry -> [test branch] -> body ... -> continue -> loop_entry
//!                                      \-> break -> loop_exit -> output
//! ```
//!
//! While lowering, a scope maps every bound name to the wire carrying its
//! current value. Qubit wires are removed from the scope when read, so each
//! quantum output feeds exactly one input.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use qflow_ir::{Graph, IrError, Literal, NodeId, NodeKind, Port, RegionId, RegionKind, Type};

use crate::ast::Span;
use crate::error::{CompileError, CompileResult, Diagnostic, DiagnosticKind, Diagnostics};
use crate::typed::{Callee, TExpr, TExprKind, TStmt, TStmtKind, TypedFunction};
use crate::vars;

/// Prefix of lowering-internal names. Source variables may not use it.
pub(crate) const HIDDEN: char = '%';

/// Hidden loop-carried names of one `for` loop, suffixed with its nesting
/// depth so enclosing counters stay bound while an inner loop runs.
struct Counter {
    count: String,
    iter: String,
}

impl Counter {
    fn at_depth(depth: usize) -> Self {
        Self {
            count: format!("{HIDDEN}count.{depth}"),
            iter: format!("{HIDDEN}iter.{depth}"),
        }
    }
}

/// An output port and the type it carries.
#[derive(Debug, Clone)]
struct Wire {
    node: NodeId,
    port: u32,
    ty: Type,
}

type Scope = BTreeMap<String, Wire>;

#[derive(Clone, Copy)]
enum Header<'t> {
    While { cond: &'t TExpr, infinite: bool },
    For { var: &'t str, count: &'t TExpr },
}

struct LoopTarget {
    threaded: Vec<String>,
    entry: NodeId,
    exit: NodeId,
}

struct Lowering<'a> {
    function: &'a TypedFunction,
    graph: Graph,
    root: RegionId,
    output: NodeId,
    loops: Vec<LoopTarget>,
}

#[allow(clippy::cast_possible_truncation)]
fn port(index: usize) -> u32 {
    index as u32
}

fn unbound(name: &str) -> CompileError {
    CompileError::Serialization(IrError::InvalidGraph(format!(
        "no value bound to `{name}` during lowering"
    )))
}

fn labelled(entries: &[(String, Wire)]) -> Vec<Port> {
    entries
        .iter()
        .map(|(name, wire)| Port::labelled(wire.ty.clone(), name))
        .collect()
}

/// Lower a checked function into a graph with local ids.
///
/// Node 0 is the `function` node and region 0 its root region.
#[instrument(skip_all, fields(function = %function.name))]
pub fn lower_function(function: &TypedFunction) -> CompileResult<Graph> {
    let mut graph = Graph::new();
    let func = graph.add_node(
        NodeKind::Function {
            name: function.name.clone(),
            function: function.id.0,
        },
        vec![],
        vec![],
        None,
    );
    let params: Vec<Port> = function
        .params
        .iter()
        .map(|p| Port::labelled(p.ty.clone(), &p.name))
        .collect();
    let returns: Vec<Port> = function.returns.iter().cloned().map(Port::new).collect();
    let root = graph.add_region(
        RegionKind::Function,
        &function.name,
        None,
        func,
        params,
        returns,
    );
    let (input, output) = {
        let region = graph.region(root)?;
        (region.input, region.output)
    };

    let scope: Scope = function
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            (
                p.name.clone(),
                Wire {
                    node: input,
                    port: port(i),
                    ty: p.ty.clone(),
                },
            )
        })
        .collect();

    let mut lowering = Lowering {
        function,
        graph,
        root,
        output,
        loops: vec![],
    };
    lowering.block(&function.body, root, scope)?;

    debug!(
        "Lowered to {} nodes, {} edges, {} regions",
        lowering.graph.node_count(),
        lowering.graph.edge_count(),
        lowering.graph.regions().len()
    );
    Ok(lowering.graph)
}

impl Lowering<'_> {
    fn block(
        &mut self,
        stmts: &[TStmt],
        region: RegionId,
        mut scope: Scope,
    ) -> CompileResult<Option<Scope>> {
        for stmt in stmts {
            match self.stmt(stmt, region, scope)? {
                Some(next) => scope = next,
                None => return Ok(None),
            }
        }
        Ok(Some(scope))
    }

    fn stmt(
        &mut self,
        stmt: &TStmt,
        region: RegionId,
        mut scope: Scope,
    ) -> CompileResult<Option<Scope>> {
        match &stmt.kind {
            TStmtKind::Assign { targets, value } => {
                let wires = self.expr(value, region, &mut scope)?;
                for (target, wire) in targets.iter().zip(wires) {
                    scope.insert(target.clone(), wire);
                }
                Ok(Some(scope))
            }
            TStmtKind::Expr(value) => {
                self.expr(value, region, &mut scope)?;
                Ok(Some(scope))
            }
            TStmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.branch(cond, then_body, else_body, stmt.span, region, scope),
            TStmtKind::While {
                cond,
                body,
                infinite,
            } => self.lower_loop(
                Header::While {
                    cond,
                    infinite: *infinite,
                },
                body,
                region,
                scope,
            ),
            TStmtKind::For { var, count, body } => {
                self.lower_loop(Header::For { var, count }, body, region, scope)
            }
            TStmtKind::Break => {
                self.jump(NodeKind::Break, region, &scope)?;
                Ok(None)
            }
            TStmtKind::Continue => {
                self.jump(NodeKind::Continue, region, &scope)?;
                Ok(None)
            }
            TStmtKind::Return(value) => {
                let wires = match value {
                    Some(value) => self.expr(value, region, &mut scope)?,
                    None => vec![],
                };
                if region == self.root {
                    for (i, wire) in wires.iter().enumerate() {
                        self.graph
                            .connect(wire.node, wire.port, self.output, port(i))?;
                    }
                } else {
                    let ports: Vec<Port> = wires.iter().map(|w| Port::new(w.ty.clone())).collect();
                    let node =
                        self.graph
                            .add_node(NodeKind::Return, ports.clone(), ports, Some(region));
                    for (i, wire) in wires.iter().enumerate() {
                        self.graph.connect(wire.node, wire.port, node, port(i))?;
                        self.graph.connect(node, port(i), self.output, port(i))?;
                    }
                }
                Ok(None)
            }
        }
    }

    /// Lower an expression, returning one wire per flattened result value.
    fn expr(
        &mut self,
        expr: &TExpr,
        region: RegionId,
        scope: &mut Scope,
    ) -> CompileResult<Vec<Wire>> {
        match &expr.kind {
            TExprKind::Var(name) => {
                let wire = if expr.ty.is_linear() {
                    scope.remove(name)
                } else {
                    scope.get(name).cloned()
                };
                Ok(vec![wire.ok_or_else(|| unbound(name))?])
            }
            TExprKind::Literal(literal) => self.apply(
                NodeKind::Const(literal.clone()),
                vec![],
                vec![expr.ty.clone()],
                region,
            ),
            TExprKind::Lift { source, value } => self.apply(
                NodeKind::Lift {
                    source: source.clone(),
                    value: *value,
                },
                vec![],
                vec![expr.ty.clone()],
                region,
            ),
            TExprKind::Call { callee, args } => {
                let mut inputs = Vec::with_capacity(args.len());
                for arg in args {
                    inputs.extend(self.expr(arg, region, scope)?);
                }
                let kind = match callee {
                    Callee::Op(op) => op.node_kind(),
                    Callee::Function { id, name, .. } => NodeKind::Call {
                        callee: name.clone(),
                        function: id.0,
                        callee_node: None,
                        callee_region: None,
                    },
                };
                self.apply(kind, inputs, expr.ty.flatten(), region)
            }
            TExprKind::Unary { op, operand } => {
                let inputs = self.expr(operand, region, scope)?;
                self.apply(
                    NodeKind::Op {
                        op: op.name().to_string(),
                    },
                    inputs,
                    vec![expr.ty.clone()],
                    region,
                )
            }
            TExprKind::Binary { op, lhs, rhs } => {
                let mut inputs = self.expr(lhs, region, scope)?;
                inputs.extend(self.expr(rhs, region, scope)?);
                self.apply(
                    NodeKind::Op {
                        op: op.name().to_string(),
                    },
                    inputs,
                    vec![expr.ty.clone()],
                    region,
                )
            }
            TExprKind::Tuple(items) => {
                let mut wires = Vec::with_capacity(items.len());
                for item in items {
                    wires.extend(self.expr(item, region, scope)?);
                }
                Ok(wires)
            }
        }
    }

    /// Lower an expression that yields exactly one value.
    fn single(&mut self, expr: &TExpr, region: RegionId, scope: &mut Scope) -> CompileResult<Wire> {
        self.expr(expr, region, scope)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CompileError::Serialization(IrError::InvalidGraph(format!(
                    "expression at {} has no value",
                    expr.span
                )))
            })
    }

    /// Add a node fed by `inputs` and return its output wires.
    fn apply(
        &mut self,
        kind: NodeKind,
        inputs: Vec<Wire>,
        outputs: Vec<Type>,
        region: RegionId,
    ) -> CompileResult<Vec<Wire>> {
        let in_ports = inputs.iter().map(|w| Port::new(w.ty.clone())).collect();
        let out_ports = outputs.iter().cloned().map(Port::new).collect();
        let node = self.graph.add_node(kind, in_ports, out_ports, Some(region));
        for (i, wire) in inputs.iter().enumerate() {
            self.graph.connect(wire.node, wire.port, node, port(i))?;
        }
        Ok(outputs
            .into_iter()
            .enumerate()
            .map(|(i, ty)| Wire {
                node,
                port: port(i),
                ty,
            })
            .collect())
    }

    fn literal(&mut self, literal: Literal, region: RegionId) -> CompileResult<Wire> {
        let ty = literal.ty();
        let node = self
            .graph
            .add_node(NodeKind::Const(literal), vec![], vec![Port::new(ty.clone())], Some(region));
        Ok(Wire { node, port: 0, ty })
    }

    /// Wires for the boundary inputs of a region.
    fn region_scope(&self, region: RegionId, entries: &[(String, Wire)]) -> CompileResult<Scope> {
        let input = self.graph.region(region)?.input;
        Ok(entries
            .iter()
            .enumerate()
            .map(|(i, (name, wire))| {
                (
                    name.clone(),
                    Wire {
                        node: input,
                        port: port(i),
                        ty: wire.ty.clone(),
                    },
                )
            })
            .collect())
    }

    /// Add a branch node fed by a selector and the crossing values.
    fn branch_node(
        &mut self,
        selector: &Wire,
        crossing: &[(String, Wire)],
        region: RegionId,
    ) -> CompileResult<NodeId> {
        let mut inputs = vec![Port::new(Type::Bool)];
        inputs.extend(labelled(crossing));
        let node = self
            .graph
            .add_node(NodeKind::Branch, inputs, vec![], Some(region));
        self.graph.connect(selector.node, selector.port, node, 0)?;
        for (i, (_, wire)) in crossing.iter().enumerate() {
            self.graph.connect(wire.node, wire.port, node, port(i + 1))?;
        }
        Ok(node)
    }

    fn branch(
        &mut self,
        cond: &TExpr,
        then_body: &[TStmt],
        else_body: &[TStmt],
        span: Span,
        region: RegionId,
        mut scope: Scope,
    ) -> CompileResult<Option<Scope>> {
        let selector = self.single(cond, region, &mut scope)?;

        let jumps: BTreeSet<String> = self
            .loops
            .last()
            .map(|target| target.threaded.iter().cloned().collect())
            .unwrap_or_default();
        let mut needs = vars::block_needs(then_body, &jumps);
        needs.extend(vars::block_needs(else_body, &jumps));

        let crossing: Vec<(String, Wire)> = needs
            .iter()
            .filter_map(|name| scope.get(name).map(|w| (name.clone(), w.clone())))
            .collect();
        for (name, wire) in &crossing {
            if wire.ty.is_linear() {
                scope.remove(name);
            }
        }

        let node = self.branch_node(&selector, &crossing, region)?;
        let ports = labelled(&crossing);

        let mut arms = Vec::with_capacity(2);
        for (index, label, body) in [(0, "else", else_body), (1, "then", then_body)] {
            let arm = self.graph.add_region(
                RegionKind::Arm { index },
                label,
                Some(region),
                node,
                ports.clone(),
                vec![],
            );
            let arm_scope = self.region_scope(arm, &crossing)?;
            let end = self.block(body, arm, arm_scope)?;
            arms.push((arm, end));
        }

        let mut assigned = BTreeSet::new();
        vars::assigned(then_body, &mut assigned);
        vars::assigned(else_body, &mut assigned);

        let ends: Vec<&Scope> = arms.iter().filter_map(|(_, end)| end.as_ref()).collect();
        let Some(first) = ends.first() else {
            return Ok(None);
        };

        let mut candidates = assigned.clone();
        candidates.extend(
            crossing
                .iter()
                .filter(|(_, w)| w.ty.is_linear())
                .map(|(name, _)| name.clone()),
        );

        let mut out: Vec<(String, Type)> = vec![];
        for name in &candidates {
            let ty = first.get(name).map(|w| &w.ty);
            let unified = ty.is_some() && ends.iter().all(|end| end.get(name).map(|w| &w.ty) == ty);
            match ty {
                Some(ty) if unified => out.push((name.clone(), ty.clone())),
                _ => {
                    let quantum = ends
                        .iter()
                        .any(|end| end.get(name).is_some_and(|w| w.ty.is_linear()));
                    if quantum {
                        return Err(CompileError::Failed(Diagnostics::from(vec![
                            Diagnostic::new(
                                DiagnosticKind::ControlFlow,
                                &self.function.name,
                                span,
                                format!(
                                    "qubit `{name}` is bound on only some branches of `if` at {span}"
                                ),
                            ),
                        ])));
                    }
                }
            }
        }

        let out_ports: Vec<Port> = out
            .iter()
            .map(|(name, ty)| Port::labelled(ty.clone(), name))
            .collect();
        self.graph.set_outputs(node, out_ports.clone())?;
        for (arm, end) in &arms {
            self.graph.set_boundary_out(*arm, out_ports.clone())?;
            if let Some(end) = end {
                let output = self.graph.region(*arm)?.output;
                for (i, (name, _)) in out.iter().enumerate() {
                    let wire = end.get(name).ok_or_else(|| unbound(name))?;
                    self.graph.connect(wire.node, wire.port, output, port(i))?;
                }
            }
        }

        for name in &assigned {
            scope.remove(name);
        }
        for (i, (name, ty)) in out.into_iter().enumerate() {
            scope.insert(
                name,
                Wire {
                    node,
                    port: port(i),
                    ty,
                },
            );
        }
        Ok(Some(scope))
    }

    fn lower_loop(
        &mut self,
        header: Header<'_>,
        body: &[TStmt],
        region: RegionId,
        mut scope: Scope,
    ) -> CompileResult<Option<Scope>> {
        let (keyword, cond) = match header {
            Header::While { cond, .. } => ("while", Some(cond)),
            Header::For { .. } => ("for", None),
        };
        let mut needs = vars::loop_needs(cond, body);
        let counter = Counter::at_depth(self.loops.len());
        if let Header::For { count, .. } = header {
            let bound = self.single(count, region, &mut scope)?;
            let zero = self.literal(Literal::Int(0), region)?;
            scope.insert(counter.count.clone(), bound);
            scope.insert(counter.iter.clone(), zero);
            needs.insert(counter.count.clone());
            needs.insert(counter.iter.clone());
        }

        let threaded: Vec<(String, Wire)> = needs
            .iter()
            .filter_map(|name| scope.get(name).map(|w| (name.clone(), w.clone())))
            .collect();
        for (name, _) in &threaded {
            scope.remove(name);
        }
        let ports = labelled(&threaded);

        let node = self.graph.add_node(
            NodeKind::Loop {
                label: keyword.to_string(),
            },
            ports.clone(),
            ports.clone(),
            Some(region),
        );
        for (i, (_, wire)) in threaded.iter().enumerate() {
            self.graph.connect(wire.node, wire.port, node, port(i))?;
        }
        let inner = self.graph.add_region(
            RegionKind::Loop,
            keyword,
            Some(region),
            node,
            ports.clone(),
            ports.clone(),
        );
        let (input, output) = {
            let r = self.graph.region(inner)?;
            (r.input, r.output)
        };
        let entry = self
            .graph
            .add_node(NodeKind::LoopEntry, ports.clone(), ports.clone(), Some(inner));
        let exit = self
            .graph
            .add_node(NodeKind::LoopExit, ports.clone(), ports.clone(), Some(inner));
        for i in 0..ports.len() {
            self.graph.connect(input, port(i), entry, port(i))?;
            self.graph.connect(exit, port(i), output, port(i))?;
        }

        let head: Scope = threaded
            .iter()
            .enumerate()
            .map(|(i, (name, wire))| {
                (
                    name.clone(),
                    Wire {
                        node: entry,
                        port: port(i),
                        ty: wire.ty.clone(),
                    },
                )
            })
            .collect();

        self.loops.push(LoopTarget {
            threaded: threaded.iter().map(|(name, _)| name.clone()).collect(),
            entry,
            exit,
        });
        let lowered = self.loop_body(header, &counter, body, inner, head);
        self.loops.pop();
        lowered?;

        if matches!(header, Header::While { infinite: true, .. }) && !vars::contains_break(body) {
            return Ok(None);
        }
        for (i, (name, wire)) in threaded.into_iter().enumerate() {
            if !name.starts_with(HIDDEN) {
                scope.insert(
                    name,
                    Wire {
                        node,
                        port: port(i),
                        ty: wire.ty,
                    },
                );
            }
        }
        Ok(Some(scope))
    }

    fn loop_body(
        &mut self,
        header: Header<'_>,
        counter: &Counter,
        body: &[TStmt],
        region: RegionId,
        mut head: Scope,
    ) -> CompileResult<()> {
        let selector = match header {
            Header::While { infinite: true, .. } => {
                if let Some(end) = self.block(body, region, head)? {
                    self.jump(NodeKind::Continue, region, &end)?;
                }
                return Ok(());
            }
            Header::While { cond, .. } => self.single(cond, region, &mut head)?,
            Header::For { .. } => {
                let iter = head
                    .get(&counter.iter)
                    .cloned()
                    .ok_or_else(|| unbound(&counter.iter))?;
                let count = head
                    .get(&counter.count)
                    .cloned()
                    .ok_or_else(|| unbound(&counter.count))?;
                let test = self.apply(
                    NodeKind::Op { op: "lt".into() },
                    vec![iter, count],
                    vec![Type::Bool],
                    region,
                )?;
                test.into_iter()
                    .next()
                    .ok_or_else(|| unbound(&counter.iter))?
            }
        };

        let crossing: Vec<(String, Wire)> = head.into_iter().collect();
        let test = self.branch_node(&selector, &crossing, region)?;
        let ports = labelled(&crossing);

        let exit_arm = self.graph.add_region(
            RegionKind::Arm { index: 0 },
            "exit",
            Some(region),
            test,
            ports.clone(),
            vec![],
        );
        let exit_scope = self.region_scope(exit_arm, &crossing)?;
        self.jump(NodeKind::Break, exit_arm, &exit_scope)?;

        let body_arm = self.graph.add_region(
            RegionKind::Arm { index: 1 },
            "body",
            Some(region),
            test,
            ports,
            vec![],
        );
        let mut body_scope = self.region_scope(body_arm, &crossing)?;
        if let Header::For { var, .. } = header {
            let iter = body_scope
                .get(&counter.iter)
                .cloned()
                .ok_or_else(|| unbound(&counter.iter))?;
            let one = self.literal(Literal::Int(1), body_arm)?;
            let next = self.apply(
                NodeKind::Op { op: "add".into() },
                vec![iter.clone(), one],
                vec![Type::Int],
                body_arm,
            )?;
            body_scope.insert(var.to_string(), iter);
            if let Some(next) = next.into_iter().next() {
                body_scope.insert(counter.iter.clone(), next);
            }
        }
        if let Some(end) = self.block(body, body_arm, body_scope)? {
            self.jump(NodeKind::Continue, body_arm, &end)?;
        }
        Ok(())
    }

    /// Emit a `break` or `continue` carrying every threaded value of the
    /// innermost loop.
    fn jump(&mut self, kind: NodeKind, region: RegionId, scope: &Scope) -> CompileResult<()> {
        let target = self.loops.last().ok_or_else(|| {
            CompileError::Serialization(IrError::InvalidGraph(format!(
                "{} outside of a loop",
                kind.name()
            )))
        })?;
        let dest = if kind == NodeKind::Break {
            target.exit
        } else {
            target.entry
        };
        let carried: Vec<(String, Wire)> = target
            .threaded
            .iter()
            .map(|name| {
                scope
                    .get(name)
                    .map(|w| (name.clone(), w.clone()))
                    .ok_or_else(|| unbound(name))
            })
            .collect::<CompileResult<_>>()?;

        let ports = labelled(&carried);
        let node = self
            .graph
            .add_node(kind, ports.clone(), ports, Some(region));
        for (i, (_, wire)) in carried.iter().enumerate() {
            self.graph.connect(wire.node, wire.port, node, port(i))?;
            self.graph.connect(node, port(i), dest, port(i))?;
        }
        Ok(())
    }
}

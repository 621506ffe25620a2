//! Module assembly.
//!
//! Per-function graphs are built with local ids, possibly in parallel. A
//! single writer then appends them in function-id order, which makes the
//! module-wide ids independent of scheduling, and links every `call` node to
//! its callee.

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, instrument};

use qflow_ir::{Graph, IrError, NodeId, NodeKind, RegionId};

use crate::error::CompileResult;
use crate::registry::FunctionId;

/// Where a function landed in the module graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledFunction {
    /// Registry id.
    pub id: FunctionId,
    /// Function name.
    pub name: String,
    /// The `function` node.
    #[serde(serialize_with = "serialize_node")]
    pub node: NodeId,
    /// Root region of the body.
    pub region: RegionId,
}

#[allow(clippy::cast_possible_truncation)]
fn serialize_node<S: serde::Serializer>(node: &NodeId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u32(node.index() as u32)
}

/// The merged module graph and its function table.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub graph: Graph,
    pub functions: Vec<CompiledFunction>,
}

/// Merge per-function graphs into one module graph.
///
/// Each input graph must have its `function` node at id 0 and its root
/// region at id 0, as produced by [`crate::lower::lower_function`].
#[instrument(skip_all, fields(functions = graphs.len()))]
pub fn assemble(mut graphs: Vec<(FunctionId, Graph)>) -> CompileResult<Assembly> {
    graphs.sort_by_key(|(id, _)| *id);

    let mut module = Graph::new();
    let mut functions = Vec::with_capacity(graphs.len());
    for (id, graph) in graphs {
        let offsets = module.append(graph);
        let node = offsets.node(NodeId::new(0));
        let region = offsets.region(RegionId(0));
        let name = match &module.node(node)?.kind {
            NodeKind::Function { name, .. } => name.clone(),
            other => {
                return Err(IrError::InvalidGraph(format!(
                    "graph of function {id} starts with a {} node",
                    other.name()
                ))
                .into());
            }
        };
        functions.push(CompiledFunction {
            id,
            name,
            node,
            region,
        });
    }

    let targets: FxHashMap<u32, (NodeId, RegionId)> = functions
        .iter()
        .map(|f| (f.id.0, (f.node, f.region)))
        .collect();
    let calls: Vec<NodeId> = module
        .nodes()
        .filter(|(_, n)| matches!(n.kind, NodeKind::Call { .. }))
        .map(|(id, _)| id)
        .collect();
    for call in &calls {
        if let NodeKind::Call {
            callee,
            function,
            callee_node,
            callee_region,
        } = &mut module.node_mut(*call)?.kind
        {
            let (node, region) = targets.get(function).copied().ok_or_else(|| {
                IrError::InvalidGraph(format!("call to `{callee}` has no compiled callee"))
            })?;
            *callee_node = Some(node);
            *callee_region = Some(region);
        }
    }

    debug!(
        "Assembled {} functions, {} nodes, {} call sites",
        functions.len(),
        module.node_count(),
        calls.len()
    );
    Ok(Assembly {
        graph: module,
        functions,
    })
}

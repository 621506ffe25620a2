//! Hierarchical program graph.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, IrResult};
use crate::node::{Edge, Node, NodeKind, Port};
use crate::types::ValueKind;

/// Node identifier. Allocated monotonically as nodes are added.
pub type NodeId = NodeIndex<u32>;

/// Region identifier. Allocated monotonically as regions are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The structured construct a region represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    /// Root region of a function body.
    Function,
    /// One arm of a branch; the index is the selector value that picks it.
    Arm {
        /// Selector value (0 = false / else, 1 = true / then).
        index: u32,
    },
    /// Loop region: head, body and exit of one loop.
    Loop,
}

impl RegionKind {
    /// Stable kind name used in serialized documents.
    pub fn name(&self) -> &'static str {
        match self {
            RegionKind::Function => "function",
            RegionKind::Arm { .. } => "arm",
            RegionKind::Loop => "loop",
        }
    }
}

/// A nested sub-graph with declared boundary ports.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Region id.
    pub id: RegionId,
    /// Structured construct.
    pub kind: RegionKind,
    /// Human-readable label (function name, `then`, `else`, `body`, ...).
    pub label: String,
    /// Enclosing region, `None` for function roots.
    pub parent: Option<RegionId>,
    /// Node that owns the region (`function`, `branch` or `loop`).
    pub owner: NodeId,
    /// Boundary input node.
    pub input: NodeId,
    /// Boundary output node.
    pub output: NodeId,
    /// Values crossing into the region.
    pub boundary_in: Vec<Port>,
    /// Values crossing out of the region.
    pub boundary_out: Vec<Port>,
}

/// Index shifts produced by [`Graph::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offsets {
    nodes: u32,
    regions: u32,
}

impl Offsets {
    /// Translate a node id of the appended graph.
    #[inline]
    pub fn node(&self, id: NodeId) -> NodeId {
        NodeId::new(id.index() + self.nodes as usize)
    }

    /// Translate a region id of the appended graph.
    #[inline]
    pub fn region(&self, id: RegionId) -> RegionId {
        RegionId(id.0 + self.regions)
    }
}

/// Hierarchical program graph.
///
/// Nodes and edges live in one petgraph `DiGraph`; every node except
/// module-level function nodes belongs to exactly one region. Edges stay
/// inside a region, except jump edges (`break`, `continue`, `return`) which
/// target a merge node in an enclosing region. Removing the `continue` back
/// edges leaves an acyclic graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    graph: DiGraph<Node, Edge, u32>,
    regions: Vec<Region>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        inputs: Vec<Port>,
        outputs: Vec<Port>,
        region: Option<RegionId>,
    ) -> NodeId {
        self.graph.add_node(Node {
            kind,
            inputs,
            outputs,
            region,
        })
    }

    /// Add a region together with its boundary input and output nodes.
    pub fn add_region(
        &mut self,
        kind: RegionKind,
        label: impl Into<String>,
        parent: Option<RegionId>,
        owner: NodeId,
        boundary_in: Vec<Port>,
        boundary_out: Vec<Port>,
    ) -> RegionId {
        let id = RegionId(
            u32::try_from(self.regions.len()).expect("RegionId overflow: exceeds u32::MAX"),
        );
        let input = self.add_node(NodeKind::Input, vec![], boundary_in.clone(), Some(id));
        let output = self.add_node(NodeKind::Output, boundary_out.clone(), vec![], Some(id));
        self.regions.push(Region {
            id,
            kind,
            label: label.into(),
            parent,
            owner,
            input,
            output,
            boundary_in,
            boundary_out,
        });
        id
    }

    /// Replace the output ports of a node whose outputs are known late.
    pub fn set_outputs(&mut self, node: NodeId, outputs: Vec<Port>) -> IrResult<()> {
        let weight = self
            .graph
            .node_weight_mut(node)
            .ok_or(IrError::NodeNotFound(node))?;
        weight.outputs = outputs;
        Ok(())
    }

    /// Set the outgoing boundary of a region, updating its output node.
    pub fn set_boundary_out(&mut self, region: RegionId, ports: Vec<Port>) -> IrResult<()> {
        let output = self.region(region)?.output;
        self.graph
            .node_weight_mut(output)
            .ok_or(IrError::NodeNotFound(output))?
            .inputs = ports.clone();
        self.regions[region.0 as usize].boundary_out = ports;
        Ok(())
    }

    /// Connect an output port to an input port.
    ///
    /// The edge kind follows the port type; both ports must carry the same
    /// type.
    pub fn connect(
        &mut self,
        from: NodeId,
        from_port: u32,
        to: NodeId,
        to_port: u32,
    ) -> IrResult<()> {
        let source = self.node(from)?;
        let out = source
            .outputs
            .get(from_port as usize)
            .ok_or(IrError::PortOutOfRange {
                node: from,
                kind: source.kind.name(),
                direction: "output",
                port: from_port,
            })?;
        let target = self.node(to)?;
        let inp = target
            .inputs
            .get(to_port as usize)
            .ok_or(IrError::PortOutOfRange {
                node: to,
                kind: target.kind.name(),
                direction: "input",
                port: to_port,
            })?;
        if out.ty != inp.ty {
            return Err(IrError::PortTypeMismatch {
                from: out.ty.clone(),
                to: inp.ty.clone(),
                context: format!(
                    "{}:{from_port} -> {}:{to_port}",
                    source.kind.name(),
                    target.kind.name()
                ),
            });
        }
        let kind = out.kind();
        self.graph.add_edge(
            from,
            to,
            Edge {
                from_port,
                to_port,
                kind,
            },
        );
        Ok(())
    }

    /// Get a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> IrResult<&Node> {
        self.graph.node_weight(id).ok_or(IrError::NodeNotFound(id))
    }

    /// Get a mutable node.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> IrResult<&mut Node> {
        self.graph
            .node_weight_mut(id)
            .ok_or(IrError::NodeNotFound(id))
    }

    /// Get a region.
    #[inline]
    pub fn region(&self, id: RegionId) -> IrResult<&Region> {
        self.regions
            .get(id.0 as usize)
            .ok_or(IrError::RegionNotFound(id))
    }

    /// Iterate over nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx, &self.graph[idx]))
    }

    /// Iterate over edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, &Edge)> {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    /// All regions in id order.
    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Number of nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Edges entering a node, as `(source, edge)` pairs in insertion order.
    pub fn incoming(&self, node: NodeId) -> Vec<(NodeId, Edge)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| (e.id(), e.source(), *e.weight()))
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, src, e)| (src, e)).collect()
    }

    /// Edges leaving a node, as `(target, edge)` pairs in insertion order.
    pub fn outgoing(&self, node: NodeId) -> Vec<(NodeId, Edge)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), *e.weight()))
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, dst, e)| (dst, e)).collect()
    }

    /// Nodes contained directly in a region, in id order.
    pub fn region_nodes(&self, region: RegionId) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| n.region == Some(region))
            .map(|(id, _)| id)
            .collect()
    }

    /// Check whether `ancestor` encloses `region` (or is the same region).
    pub fn encloses(&self, ancestor: RegionId, region: RegionId) -> bool {
        let mut current = Some(region);
        while let Some(r) = current {
            if r == ancestor {
                return true;
            }
            current = self.regions.get(r.0 as usize).and_then(|reg| reg.parent);
        }
        false
    }

    /// Get a reference to the underlying petgraph graph.
    pub fn graph(&self) -> &DiGraph<Node, Edge, u32> {
        &self.graph
    }

    /// Append another graph, shifting its ids past the ones already allocated.
    ///
    /// Appending in a fixed order yields identical ids on every run.
    pub fn append(&mut self, other: Graph) -> Offsets {
        let offsets = Offsets {
            nodes: u32::try_from(self.graph.node_count()).expect("NodeId overflow"),
            regions: u32::try_from(self.regions.len()).expect("RegionId overflow"),
        };

        let (nodes, edges) = other.graph.into_nodes_edges();
        for node in nodes {
            let mut weight = node.weight;
            weight.region = weight.region.map(|r| offsets.region(r));
            if let NodeKind::Call {
                callee_node,
                callee_region,
                ..
            } = &mut weight.kind
            {
                *callee_node = callee_node.map(|n| offsets.node(n));
                *callee_region = callee_region.map(|r| offsets.region(r));
            }
            self.graph.add_node(weight);
        }
        for edge in edges {
            self.graph.add_edge(
                offsets.node(edge.source()),
                offsets.node(edge.target()),
                edge.weight,
            );
        }
        for region in other.regions {
            self.regions.push(Region {
                id: offsets.region(region.id),
                parent: region.parent.map(|p| offsets.region(p)),
                owner: offsets.node(region.owner),
                input: offsets.node(region.input),
                output: offsets.node(region.output),
                ..region
            });
        }
        offsets
    }

    /// Verify the structural invariants of the graph.
    ///
    /// Checks that:
    /// - regions reference existing boundary nodes whose ports match the
    ///   declared boundary
    /// - only function nodes live outside a region
    /// - every edge connects existing ports of equal type and matching kind
    /// - edges leaving a region start at a jump and end at a merge node of
    ///   an enclosing region
    /// - every non-merge input port has exactly one incoming edge
    /// - no quantum output port fans out
    /// - the graph without `continue` back edges is acyclic
    #[allow(clippy::too_many_lines)]
    pub fn validate(&self) -> IrResult<()> {
        // 1. Regions and their boundary nodes
        for (index, region) in self.regions.iter().enumerate() {
            if region.id.0 as usize != index {
                return Err(IrError::InvalidGraph(format!(
                    "region at position {index} has id {}",
                    region.id
                )));
            }
            if let Some(parent) = region.parent {
                self.region(parent)?;
            }
            self.node(region.owner)?;
            let input = self.node(region.input)?;
            let output = self.node(region.output)?;
            if input.kind != NodeKind::Input || input.region != Some(region.id) {
                return Err(IrError::InvalidGraph(format!(
                    "region {} input node is not an input of that region",
                    region.id
                )));
            }
            if output.kind != NodeKind::Output || output.region != Some(region.id) {
                return Err(IrError::InvalidGraph(format!(
                    "region {} output node is not an output of that region",
                    region.id
                )));
            }
            if input.outputs != region.boundary_in || output.inputs != region.boundary_out {
                return Err(IrError::InvalidGraph(format!(
                    "region {} boundary does not match its boundary nodes",
                    region.id
                )));
            }
        }

        // 2. Node placement
        for (id, node) in self.nodes() {
            match (node.region, &node.kind) {
                (None, NodeKind::Function { .. }) => {}
                (None, kind) => {
                    return Err(IrError::InvalidGraph(format!(
                        "{} node {id:?} is outside any region",
                        kind.name()
                    )));
                }
                (Some(region), _) => {
                    self.region(region)?;
                }
            }
        }

        // 3. Edges
        let mut fan_in: FxHashMap<(NodeId, u32), usize> = FxHashMap::default();
        let mut quantum_fan_out: FxHashMap<(NodeId, u32), usize> = FxHashMap::default();
        for (from, to, edge) in self.edges() {
            let source = self.node(from)?;
            let target = self.node(to)?;
            let out = source.outputs.get(edge.from_port as usize).ok_or(
                IrError::PortOutOfRange {
                    node: from,
                    kind: source.kind.name(),
                    direction: "output",
                    port: edge.from_port,
                },
            )?;
            let inp = target.inputs.get(edge.to_port as usize).ok_or(
                IrError::PortOutOfRange {
                    node: to,
                    kind: target.kind.name(),
                    direction: "input",
                    port: edge.to_port,
                },
            )?;
            if out.ty != inp.ty || out.kind() != edge.kind {
                return Err(IrError::PortTypeMismatch {
                    from: out.ty.clone(),
                    to: inp.ty.clone(),
                    context: format!("edge {from:?} -> {to:?}"),
                });
            }
            if source.region != target.region {
                let crosses_legally = source.kind.is_jump()
                    && target.kind.is_merge()
                    && matches!(
                        (target.region, source.region),
                        (Some(outer), Some(inner)) if self.encloses(outer, inner)
                    );
                if !crosses_legally {
                    return Err(IrError::InvalidGraph(format!(
                        "edge {} {from:?} -> {} {to:?} leaves its region",
                        source.kind.name(),
                        target.kind.name()
                    )));
                }
            }
            *fan_in.entry((to, edge.to_port)).or_default() += 1;
            if edge.kind == ValueKind::Quantum {
                *quantum_fan_out.entry((from, edge.from_port)).or_default() += 1;
            }
        }

        // 4. Port occupancy
        for (id, node) in self.nodes() {
            if node.kind.is_merge() {
                continue;
            }
            for port in 0..node.inputs.len() {
                let port = u32::try_from(port).expect("port index overflow");
                let count = fan_in.get(&(id, port)).copied().unwrap_or(0);
                if count != 1 {
                    return Err(IrError::InvalidGraph(format!(
                        "{} node {id:?} input {port} has {count} incoming edges",
                        node.kind.name()
                    )));
                }
            }
        }
        if let Some(((node, port), count)) = quantum_fan_out.iter().find(|(_, c)| **c > 1) {
            return Err(IrError::InvalidGraph(format!(
                "quantum output {port} of node {node:?} is used {count} times"
            )));
        }

        // 5. Acyclicity without loop back edges
        let forward = EdgeFiltered::from_fn(&self.graph, |e| {
            self.graph[e.source()].kind != NodeKind::Continue
        });
        if petgraph::algo::is_cyclic_directed(&forward) {
            return Err(IrError::InvalidGraph(
                "graph contains a cycle outside loop back edges".into(),
            ));
        }

        Ok(())
    }
}

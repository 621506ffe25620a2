//! Versioned, stable serialization of a program graph.
//!
//! The document lists nodes, edges and regions in id order, so an unchanged
//! graph always encodes to the same bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::IrResult;
use crate::graph::Graph;
use crate::node::Port;
use crate::types::ValueKind;

/// Version of the document format.
pub const FORMAT_VERSION: &str = "1.0.0";

/// Serialized form of a compiled module graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document format version (semver).
    pub version: String,
    /// Module name.
    pub module: String,
    /// Nodes in id order.
    pub nodes: Vec<NodeEntry>,
    /// Edges in insertion order.
    pub edges: Vec<EdgeEntry>,
    /// Regions in id order.
    pub regions: Vec<RegionEntry>,
}

/// One serialized node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Node id.
    pub id: u32,
    /// Kind name.
    pub kind: String,
    /// Kind-specific attributes.
    pub attrs: BTreeMap<String, serde_json::Value>,
    /// Input ports.
    pub inputs: Vec<Port>,
    /// Output ports.
    pub outputs: Vec<Port>,
    /// Containing region, `null` for module-level function nodes.
    pub region: Option<u32>,
}

/// One serialized edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEntry {
    /// Source node id.
    pub from: u32,
    /// Source output port.
    pub from_port: u32,
    /// Target node id.
    pub to: u32,
    /// Target input port.
    pub to_port: u32,
    /// Value kind carried.
    pub kind: ValueKind,
}

/// One serialized region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEntry {
    /// Region id.
    pub id: u32,
    /// Enclosing region, `null` for function roots.
    pub parent: Option<u32>,
    /// Owning node id.
    pub owner: u32,
    /// Region kind name.
    pub kind: String,
    /// Region label.
    pub label: String,
    /// Values crossing in.
    pub boundary_in: Vec<Port>,
    /// Values crossing out.
    pub boundary_out: Vec<Port>,
}

#[allow(clippy::cast_possible_truncation)]
fn id(index: usize) -> u32 {
    index as u32
}

impl Document {
    /// Build a document from a graph, validating it first.
    pub fn from_graph(module: &str, graph: &Graph) -> IrResult<Self> {
        graph.validate()?;

        let nodes = graph
            .nodes()
            .map(|(node_id, node)| NodeEntry {
                id: id(node_id.index()),
                kind: node.kind.name().to_string(),
                attrs: node.kind.attrs(),
                inputs: node.inputs.clone(),
                outputs: node.outputs.clone(),
                region: node.region.map(|r| r.0),
            })
            .collect();

        let edges = graph
            .edges()
            .map(|(from, to, edge)| EdgeEntry {
                from: id(from.index()),
                from_port: edge.from_port,
                to: id(to.index()),
                to_port: edge.to_port,
                kind: edge.kind,
            })
            .collect();

        let regions = graph
            .regions()
            .iter()
            .map(|region| RegionEntry {
                id: region.id.0,
                parent: region.parent.map(|p| p.0),
                owner: id(region.owner.index()),
                kind: region.kind.name().to_string(),
                label: region.label.clone(),
                boundary_in: region.boundary_in.clone(),
                boundary_out: region.boundary_out.clone(),
            })
            .collect();

        Ok(Self {
            version: FORMAT_VERSION.to_string(),
            module: module.to_string(),
            nodes,
            edges,
            regions,
        })
    }

    /// Encode as JSON.
    pub fn to_json(&self, pretty: bool) -> IrResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> IrResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Count nodes of a given kind.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RegionKind;
    use crate::node::NodeKind;
    use crate::types::Type;

    fn measure_function() -> Graph {
        let mut graph = Graph::new();
        let func = graph.add_node(
            NodeKind::Function {
                name: "main".into(),
                function: 0,
            },
            vec![],
            vec![],
            None,
        );
        let root = graph.add_region(
            RegionKind::Function,
            "main",
            None,
            func,
            vec![],
            vec![Port::new(Type::Bool)],
        );
        let alloc = graph.add_node(
            NodeKind::Alloc { op: "qubit".into() },
            vec![],
            vec![Port::new(Type::Qubit)],
            Some(root),
        );
        let measure = graph.add_node(
            NodeKind::Measure {
                op: "measure".into(),
            },
            vec![Port::new(Type::Qubit)],
            vec![Port::new(Type::Bool)],
            Some(root),
        );
        let output = graph.region(root).unwrap().output;
        graph.connect(alloc, 0, measure, 0).unwrap();
        graph.connect(measure, 0, output, 0).unwrap();
        graph
    }

    #[test]
    fn test_document_layout() {
        let doc = Document::from_graph("demo", &measure_function()).unwrap();
        assert_eq!(doc.version, FORMAT_VERSION);
        assert_eq!(doc.nodes.len(), 5);
        assert_eq!(doc.nodes[0].kind, "function");
        assert_eq!(doc.nodes[0].region, None);
        assert_eq!(doc.edges.len(), 2);
        assert_eq!(doc.edges[0].kind, ValueKind::Quantum);
        assert_eq!(doc.edges[1].kind, ValueKind::Classical);
        assert_eq!(doc.regions[0].kind, "function");
        assert_eq!(doc.count_kind("measure"), 1);
    }

    #[test]
    fn test_document_json_is_stable() {
        let graph = measure_function();
        let a = Document::from_graph("demo", &graph)
            .unwrap()
            .to_json(true)
            .unwrap();
        let b = Document::from_graph("demo", &graph)
            .unwrap()
            .to_json(true)
            .unwrap();
        assert_eq!(a, b);
        let decoded = Document::from_json(&a).unwrap();
        assert_eq!(decoded.nodes.len(), 5);
        assert!(a.contains("\"kind\": \"quantum\""));
    }

    #[test]
    fn test_invalid_graph_is_rejected() {
        let mut graph = measure_function();
        graph.add_node(
            NodeKind::Gate { op: "h".into() },
            vec![Port::new(Type::Qubit)],
            vec![Port::new(Type::Qubit)],
            Some(crate::graph::RegionId(0)),
        );
        assert!(Document::from_graph("demo", &graph).is_err());
    }
}

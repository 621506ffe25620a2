//! Graph nodes, ports and edges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::{NodeId, RegionId};
use crate::types::{Literal, Type, ValueKind};

/// A typed connection point on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    /// Type of the value flowing through this port.
    #[serde(rename = "type")]
    pub ty: Type,
    /// Name of the binding the port carries, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Port {
    /// Create an unlabelled port.
    pub fn new(ty: Type) -> Self {
        Self { ty, label: None }
    }

    /// Create a port labelled with the binding it carries.
    pub fn labelled(ty: Type, label: impl Into<String>) -> Self {
        Self {
            ty,
            label: Some(label.into()),
        }
    }

    /// Value kind of the port.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.ty.kind()
    }
}

/// The operation a node performs.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Module-level container for one compiled function. Owns its root region.
    Function {
        /// Function name.
        name: String,
        /// Registry id of the function.
        function: u32,
    },
    /// Region entry: outputs are the region's incoming boundary values.
    Input,
    /// Region exit: inputs are the region's outgoing boundary values.
    Output,
    /// Classical constant.
    Const(Literal),
    /// Host value lifted into the program with a declared type.
    Lift {
        /// Host-side name of the lifted value.
        source: String,
        /// The lifted value.
        value: f64,
    },
    /// Resource introduction (qubit allocation).
    Alloc {
        /// Operation name.
        op: String,
    },
    /// Gate application: consumes and re-emits quantum resources.
    Gate {
        /// Operation name.
        op: String,
    },
    /// Measurement: consumes a quantum resource, emits a classical outcome.
    Measure {
        /// Operation name.
        op: String,
    },
    /// Explicit resource discard.
    Discard {
        /// Operation name.
        op: String,
    },
    /// Classical arithmetic, logic or conversion.
    Op {
        /// Operation name.
        op: String,
    },
    /// Call to another function through its signature.
    Call {
        /// Callee name.
        callee: String,
        /// Registry id of the callee.
        function: u32,
        /// Callee `Function` node, filled in by module assembly.
        callee_node: Option<NodeId>,
        /// Callee root region, filled in by module assembly.
        callee_region: Option<RegionId>,
    },
    /// Conditional. Input 0 is the selector, one arm region per outcome.
    Branch,
    /// Structured loop owning a loop region.
    Loop {
        /// Surface construct that produced the loop (`for` or `while`).
        label: String,
    },
    /// Loop head merge point. Receives initial values and `continue` edges.
    LoopEntry,
    /// Loop exit merge point. Receives `break` edges.
    LoopExit,
    /// Jump to the enclosing loop exit.
    Break,
    /// Jump back to the enclosing loop head.
    Continue,
    /// Early return to the function output.
    Return,
}

impl NodeKind {
    /// Stable kind name used in serialized documents.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Function { .. } => "function",
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Const(_) => "const",
            NodeKind::Lift { .. } => "lift",
            NodeKind::Alloc { .. } => "alloc",
            NodeKind::Gate { .. } => "gate",
            NodeKind::Measure { .. } => "measure",
            NodeKind::Discard { .. } => "discard",
            NodeKind::Op { .. } => "op",
            NodeKind::Call { .. } => "call",
            NodeKind::Branch => "branch",
            NodeKind::Loop { .. } => "loop",
            NodeKind::LoopEntry => "loop_entry",
            NodeKind::LoopExit => "loop_exit",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::Return => "return",
        }
    }

    /// Merge points accept any number of edges per input port.
    #[inline]
    pub fn is_merge(&self) -> bool {
        matches!(
            self,
            NodeKind::Output | NodeKind::LoopEntry | NodeKind::LoopExit
        )
    }

    /// Jumps are the only nodes whose edges may leave their region.
    #[inline]
    pub fn is_jump(&self) -> bool {
        matches!(self, NodeKind::Break | NodeKind::Continue | NodeKind::Return)
    }

    /// Kind-specific attributes, keyed for deterministic output.
    pub fn attrs(&self) -> BTreeMap<String, serde_json::Value> {
        let mut attrs = BTreeMap::new();
        match self {
            NodeKind::Function { name, function } => {
                attrs.insert("name".into(), name.as_str().into());
                attrs.insert("function".into(), (*function).into());
            }
            NodeKind::Const(literal) => {
                attrs.insert("type".into(), literal.ty().to_string().into());
                attrs.insert("value".into(), literal.to_json());
            }
            NodeKind::Lift { source, value } => {
                attrs.insert("source".into(), source.as_str().into());
                attrs.insert("value".into(), (*value).into());
            }
            NodeKind::Alloc { op }
            | NodeKind::Gate { op }
            | NodeKind::Measure { op }
            | NodeKind::Discard { op }
            | NodeKind::Op { op } => {
                attrs.insert("op".into(), op.as_str().into());
            }
            NodeKind::Call {
                callee,
                function,
                callee_node,
                callee_region,
            } => {
                attrs.insert("callee".into(), callee.as_str().into());
                attrs.insert("function".into(), (*function).into());
                if let Some(node) = callee_node {
                    attrs.insert("callee_node".into(), node.index().into());
                }
                if let Some(region) = callee_region {
                    attrs.insert("callee_region".into(), region.0.into());
                }
            }
            NodeKind::Loop { label } => {
                attrs.insert("label".into(), label.as_str().into());
            }
            NodeKind::Input
            | NodeKind::Output
            | NodeKind::Branch
            | NodeKind::LoopEntry
            | NodeKind::LoopExit
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Return => {}
        }
        attrs
    }
}

/// A node in the program graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The operation.
    pub kind: NodeKind,
    /// Input ports, in order.
    pub inputs: Vec<Port>,
    /// Output ports, in order.
    pub outputs: Vec<Port>,
    /// Region containing the node. `None` only for module-level function nodes.
    pub region: Option<RegionId>,
}

impl Node {
    /// Get the operation name carried by op-like nodes.
    pub fn op_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Alloc { op }
            | NodeKind::Gate { op }
            | NodeKind::Measure { op }
            | NodeKind::Discard { op }
            | NodeKind::Op { op } => Some(op),
            NodeKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }
}

/// A value or resource dependency between two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Output port on the source node.
    pub from_port: u32,
    /// Input port on the target node.
    pub to_port: u32,
    /// Kind of value transferred.
    pub kind: ValueKind,
}

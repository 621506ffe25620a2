//! Error types for the IR crate.

use thiserror::Error;

use crate::graph::{NodeId, RegionId};
use crate::types::Type;

/// Errors that can occur while building, validating or serializing a graph.
///
/// A well-formed front end never produces these for checked input; seeing one
/// means a builder invariant was broken.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// Node index does not exist in the graph.
    #[error("Node {0:?} not found in graph")]
    NodeNotFound(NodeId),

    /// Region index does not exist in the graph.
    #[error("Region {0} not found in graph")]
    RegionNotFound(RegionId),

    /// Port index is out of range for a node.
    #[error("Node {node:?} ({kind}) has no {direction} port {port}")]
    PortOutOfRange {
        /// The node addressed.
        node: NodeId,
        /// Kind name of the node.
        kind: &'static str,
        /// `input` or `output`.
        direction: &'static str,
        /// The port index requested.
        port: u32,
    },

    /// Edge endpoints carry different types.
    #[error("Cannot connect {from} output to {to} input ({context})")]
    PortTypeMismatch {
        /// Type of the source port.
        from: Type,
        /// Type of the target port.
        to: Type,
        /// Endpoint description.
        context: String,
    },

    /// Structural invariant violated.
    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    /// Document could not be encoded or decoded.
    #[error("Document encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;

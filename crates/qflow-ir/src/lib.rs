//! qflow Graph Intermediate Representation
//!
//! This crate provides the hardware-agnostic, hierarchical graph IR that the
//! qflow front end emits for every compiled function, together with its
//! versioned document format.
//!
//! # Overview
//!
//! A program is a directed graph of operation [`Node`]s connected by typed
//! [`Edge`]s. Structured control flow is represented by nested [`Region`]s:
//! a `branch` node owns one arm region per outcome and a `loop` node owns a
//! loop region. Each region declares the values crossing its boundary through
//! an `input` and an `output` node.
//!
//! # Core Components
//!
//! - **Types**: [`Type`] and [`ValueKind`]; `qubit` is the only linear type
//! - **Nodes**: [`NodeKind`] for gates, measurements, calls, branches, loops
//! - **Graph**: [`Graph`] builder with structural validation
//! - **Document**: [`Document`] stable JSON encoding
//!
//! # Example: A Single-Gate Function
//!
//! ```rust
//! use qflow_ir::{Document, Graph, NodeKind, Port, RegionKind, Type};
//!
//! let mut graph = Graph::new();
//! let func = graph.add_node(
//!     NodeKind::Function { name: "flip".into(), function: 0 },
//!     vec![],
//!     vec![],
//!     None,
//! );
//! let root = graph.add_region(
//!     RegionKind::Function,
//!     "flip",
//!     None,
//!     func,
//!     vec![Port::labelled(Type::Qubit, "q")],
//!     vec![Port::new(Type::Qubit)],
//! );
//! let x = graph.add_node(
//!     NodeKind::Gate { op: "x".into() },
//!     vec![Port::new(Type::Qubit)],
//!     vec![Port::new(Type::Qubit)],
//!     Some(root),
//! );
//! let region = graph.region(root).unwrap().clone();
//! graph.connect(region.input, 0, x, 0).unwrap();
//! graph.connect(x, 0, region.output, 0).unwrap();
//!
//! let doc = Document::from_graph("demo", &graph).unwrap();
//! assert_eq!(doc.count_kind("gate"), 1);
//! ```
//!
//! # Node Kinds
//!
//! | Kind | Role |
//! |------|------|
//! | `function` | Module-level container owning a function's root region |
//! | `input`, `output` | Region boundary |
//! | `const`, `lift` | Classical constants and lifted host values |
//! | `alloc`, `gate`, `measure`, `discard` | Quantum operations |
//! | `op` | Classical arithmetic, logic and conversions |
//! | `call` | Signature-only reference to another function |
//! | `branch`, `loop` | Structured control flow owning regions |
//! | `loop_entry`, `loop_exit` | Loop merge points |
//! | `break`, `continue`, `return` | Jumps to merge points |

pub mod document;
pub mod error;
pub mod graph;
pub mod node;
pub mod types;

pub use document::{Document, EdgeEntry, FORMAT_VERSION, NodeEntry, RegionEntry};
pub use error::{IrError, IrResult};
pub use graph::{Graph, NodeId, Offsets, Region, RegionId, RegionKind};
pub use node::{Edge, Node, NodeKind, Port};
pub use types::{Literal, Type, ValueKind};

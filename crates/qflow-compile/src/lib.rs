//! qflow Front-End Compiler
//!
//! This crate turns quantum programs written as ordinary typed functions
//! into the hierarchical graph IR of [`qflow_ir`]. It statically enforces the
//! linear-resource discipline: a qubit is never duplicated and never silently
//! dropped.
//!
//! # Architecture
//!
//! ```text
//! FunctionDef descriptors
//!       │
//!       ▼
//! ┌──────────┐
//! │ Registry │ ◄── OpTable (loaded extensions)
//! └──────────┘
//!       │  per function, in parallel
//!       ├── check        types, scoping, reachability
//!       ├── linearity    qubit handle dataflow
//!       └── lower        branches, loops, jumps into regions
//!       │
//!       ▼
//! assemble (function-id order) ──► CompiledProgram ──► Document
//! ```
//!
//! # Example: Compiling a Module
//!
//! ```rust
//! use qflow_compile::{CompileOptions, Expr, FunctionDef, Module, Stmt};
//! use qflow_ir::Type;
//!
//! let mut module = Module::with_prelude("demo");
//! module
//!     .register(
//!         FunctionDef::new("rx")
//!             .param("q", Type::Qubit)
//!             .param("a", Type::Angle)
//!             .returns(Type::Qubit)
//!             .body(vec![
//!                 Stmt::assign("q", Expr::call("h", [Expr::var("q")])),
//!                 Stmt::assign("q", Expr::call("rz", [Expr::var("q"), Expr::var("a")])),
//!                 Stmt::ret(Expr::call("h", [Expr::var("q")])),
//!             ]),
//!     )
//!     .unwrap();
//!
//! let program = module.compile(&CompileOptions::default()).unwrap();
//! let doc = qflow_compile::serialize(&program).unwrap();
//! assert_eq!(doc.count_kind("gate"), 3);
//! ```
//!
//! # Diagnostics
//!
//! | Kind | Raised for |
//! |------|------------|
//! | `DuplicateNameError` | A second definition of a function name |
//! | `UnboundNameError` | Unknown names and functions that are never defined |
//! | `TypeError` | Operand, argument, return and annotation mismatches |
//! | `LinearityError` | Qubits consumed twice, leaked, or used after discard |
//! | `ControlFlowError` | Misplaced jumps, missing returns, paths that disagree |
//!
//! Every function is checked even when another one fails, so a single run
//! reports every diagnostic. Any diagnostic means no document.

pub mod assemble;
pub mod ast;
pub mod check;
pub mod driver;
pub mod error;
pub mod linearity;
pub mod lower;
pub mod ops;
pub mod registry;
pub mod typed;
pub mod vars;

pub use assemble::CompiledFunction;
pub use ast::{
    BinOp, Expr, ExprKind, FunctionDef, ModuleSource, Param, Signature, Span, Stmt, StmtKind, UnOp,
};
pub use driver::{CompileOptions, CompiledProgram, Module, serialize};
pub use error::{CompileError, CompileResult, Diagnostic, DiagnosticKind, Diagnostics};
pub use ops::{Extension, OpClass, OpSignature, OpTable};
pub use registry::{FunctionId, Registry};

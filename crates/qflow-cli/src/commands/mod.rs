//! CLI command implementations.

pub mod check;
pub mod common;
pub mod compile;
pub mod ops;
pub mod version;

//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - quantum functions to hierarchical graph IR",
        style("qflow").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qflow-ir       Graph intermediate representation and document format");
    println!("  qflow-compile  Registry, type and linearity checking, lowering");
    println!(
        "  document       Format version {}",
        qflow_ir::FORMAT_VERSION
    );
}

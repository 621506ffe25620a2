//! Compile command implementation.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use qflow_compile::{CompileError, CompileOptions, serialize};

use super::common::{default_output, load_module, print_diagnostics};

/// Execute the compile command.
pub fn execute(
    input: &str,
    output: Option<&str>,
    extensions: &[String],
    sequential: bool,
    compact: bool,
) -> Result<()> {
    println!(
        "{} Compiling {}",
        style("→").cyan().bold(),
        style(input).green()
    );

    let module = load_module(input, extensions)?;
    println!(
        "  Loaded: module '{}', {} functions, {} operations",
        module.name(),
        module.registry().definitions().count(),
        module.ops().len()
    );

    let options = CompileOptions::default()
        .with_parallel(!sequential)
        .with_pretty(!compact);

    let program = match module.compile(&options) {
        Ok(program) => program,
        Err(CompileError::Failed(diagnostics)) => {
            print_diagnostics(&diagnostics);
            anyhow::bail!("{} diagnostic(s), no output written", diagnostics.len());
        }
        Err(e) => return Err(e.into()),
    };

    let doc = serialize(&program)?;
    println!("{} Compilation complete", style("✓").green().bold());
    println!(
        "  Result: {} functions, {} nodes, {} edges, {} regions",
        program.functions().len(),
        doc.nodes.len(),
        doc.edges.len(),
        doc.regions.len()
    );

    let output_path = output.map_or_else(|| default_output(input), PathBuf::from);
    let json = doc.to_json(!compact)?;
    fs::write(&output_path, &json)
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;
    info!(
        output = %output_path.display(),
        bytes = json.len(),
        "Wrote graph document"
    );
    println!("  Output: {}", style(output_path.display()).green());

    Ok(())
}

//! Check command implementation.

use anyhow::Result;
use console::style;

use qflow_compile::CompileOptions;

use super::common::{load_module, print_diagnostics};

/// Execute the check command.
pub fn execute(input: &str, extensions: &[String]) -> Result<()> {
    println!(
        "{} Checking {}",
        style("→").cyan().bold(),
        style(input).green()
    );

    let module = load_module(input, extensions)?;
    let diagnostics = module.check(&CompileOptions::default())?;

    if !diagnostics.is_empty() {
        print_diagnostics(&diagnostics);
        anyhow::bail!("{} diagnostic(s)", diagnostics.len());
    }

    println!(
        "{} {} functions in module '{}' passed",
        style("✓").green().bold(),
        module.registry().definitions().count(),
        module.name()
    );
    Ok(())
}

//! Ops command implementation.

use anyhow::Result;
use console::style;

use qflow_compile::{OpSignature, OpTable};

use super::common::load_extension;

fn types(types: &[qflow_ir::Type]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Execute the ops command.
pub fn execute(extensions: &[String], format: &str) -> Result<()> {
    let mut table = OpTable::with_prelude();
    for ext in extensions {
        table.load(&load_extension(ext)?)?;
    }

    match format.to_lowercase().as_str() {
        "table" => {
            println!(
                "{} Operation table ({} operations):\n",
                style("qflow").cyan().bold(),
                table.len()
            );
            for ext in table.extensions() {
                println!("  {}", style(ext).bold());
                for (op, _) in table.iter().filter(|(_, from)| *from == ext.as_str()) {
                    println!(
                        "    {:<8} {:<8} ({}) -> ({})",
                        style(&op.name).green(),
                        format!("{:?}", op.class).to_lowercase(),
                        types(&op.inputs),
                        types(&op.outputs)
                    );
                }
            }
        }
        "json" => {
            let ops: Vec<&OpSignature> = table.iter().map(|(op, _)| op).collect();
            println!("{}", serde_json::to_string_pretty(&ops)?);
        }
        "yaml" => {
            let ops: Vec<&OpSignature> = table.iter().map(|(op, _)| op).collect();
            print!("{}", serde_yaml_ng::to_string(&ops)?);
        }
        other => anyhow::bail!("Unknown format: '{other}'. Available: table, json, yaml"),
    }

    Ok(())
}

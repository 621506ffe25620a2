//! Shared helpers for CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use tracing::debug;

use qflow_compile::{Diagnostics, Extension, Module, ModuleSource};

/// Load a module source from a JSON or YAML file.
pub fn load_source(path: &str) -> Result<ModuleSource> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        anyhow::bail!("File not found: {path}");
    }

    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?;

    let ext = path_obj.extension().and_then(|e| e.to_str()).unwrap_or("");
    debug!(path, format = ext, bytes = source.len(), "Loading module source");

    match ext.to_lowercase().as_str() {
        "json" => Ok(ModuleSource::from_json(&source)?),
        "yaml" | "yml" => Ok(ModuleSource::from_yaml(&source)?),
        other => anyhow::bail!(
            "Unsupported module source extension: '{other}'. Expected .json, .yaml or .yml"
        ),
    }
}

/// Load an extension document.
pub fn load_extension(path: &str) -> Result<Extension> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read extension: {path}"))?;
    let ext = Extension::from_json(&source)?;
    debug!(path, name = %ext.name, ops = ext.ops.len(), "Loaded extension");
    Ok(ext)
}

/// Build a module from a source file plus extra extension files.
pub fn load_module(path: &str, extensions: &[String]) -> Result<Module> {
    let mut module = Module::from_source(load_source(path)?)?;
    for ext in extensions {
        module.load(&load_extension(ext)?)?;
    }
    Ok(module)
}

/// Default output path: the input path with a `.graph.json` extension.
pub fn default_output(input: &str) -> PathBuf {
    Path::new(input).with_extension("graph.json")
}

/// Print diagnostics, one per line.
pub fn print_diagnostics(diagnostics: &Diagnostics) {
    for d in diagnostics {
        eprintln!(
            "{} {} in {} at {}: {}",
            style("error:").red().bold(),
            style(d.kind).yellow(),
            style(format!("`{}`", d.function)).cyan(),
            d.span,
            d.message
        );
    }
}

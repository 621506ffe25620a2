//! qflow Command-Line Interface
//!
//! The main entry point for the qflow compiler.
//!
//! ```text
//! qflow compile teleport.yaml -o teleport.graph.json
//! qflow check teleport.yaml
//! qflow ops --format json
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{check, compile, ops, version};

/// qflow - compile quantum functions into a hierarchical graph IR
#[derive(Parser)]
#[command(name = "qflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a module source into a graph document
    Compile {
        /// Module source (JSON or YAML)
        input: String,

        /// Output file (defaults to <input>.graph.json)
        #[arg(short, long)]
        output: Option<String>,

        /// Extra extension documents to load (JSON)
        #[arg(short, long = "extension")]
        extensions: Vec<String>,

        /// Compile functions one at a time
        #[arg(long, env = "QFLOW_SEQUENTIAL")]
        sequential: bool,

        /// Write compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Type and linearity check a module source without writing output
    Check {
        /// Module source (JSON or YAML)
        input: String,

        /// Extra extension documents to load (JSON)
        #[arg(short, long = "extension")]
        extensions: Vec<String>,
    },

    /// List the operation table
    Ops {
        /// Extra extension documents to load (JSON)
        #[arg(short, long = "extension")]
        extensions: Vec<String>,

        /// Output format (table, json, yaml)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("QFLOW_LOG").unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            extensions,
            sequential,
            compact,
        } => compile::execute(&input, output.as_deref(), &extensions, sequential, compact),

        Commands::Check { input, extensions } => check::execute(&input, &extensions),

        Commands::Ops { extensions, format } => ops::execute(&extensions, &format),

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

//! CLI command parsing and end-to-end tests.
//!
//! Tests cover argument parsing (via clap `try_parse_from`), module source
//! loading, and the `qflow` binary itself on the sample sources.

use std::path::PathBuf;
use std::process::Command;

fn samples() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../samples")
}

fn qflow(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_qflow"))
        .args(args)
        .env_remove("QFLOW_LOG")
        .env_remove("QFLOW_SEQUENTIAL")
        .output()
        .expect("failed to run qflow")
}

// ============================================================================
// Module source loading
// ============================================================================

mod source_loading {
    use super::samples;
    use qflow_compile::{CompileOptions, Module, ModuleSource};
    use std::fs;

    #[test]
    fn test_yaml_sample_parses() {
        let src = fs::read_to_string(samples().join("teleport.yaml")).unwrap();
        let source = ModuleSource::from_yaml(&src).unwrap();
        assert_eq!(source.name, "teleport");
        assert_eq!(source.extensions, vec!["quantum"]);
        assert_eq!(source.functions.len(), 2);
    }

    #[test]
    fn test_json_sample_compiles() {
        let src = fs::read_to_string(samples().join("rus.json")).unwrap();
        let module = Module::from_source(ModuleSource::from_json(&src).unwrap()).unwrap();
        let program = module.compile(&CompileOptions::default()).unwrap();
        assert!(program.function("rotate").is_some());
    }

    #[test]
    fn test_source_written_to_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.json");
        fs::write(
            &path,
            r#"{"name": "tiny", "functions": [{"name": "noop", "body": []}]}"#,
        )
        .unwrap();

        let src = fs::read_to_string(&path).unwrap();
        let module = Module::from_source(ModuleSource::from_json(&src).unwrap()).unwrap();
        let program = module.compile(&CompileOptions::default()).unwrap();
        assert_eq!(program.functions().len(), 1);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let source = ModuleSource::from_json(r#"{"name": "x", "extensions": ["pulse"]}"#).unwrap();
        let err = Module::from_source(source).unwrap_err();
        assert!(err.to_string().contains("Unknown extension"));
    }
}

// ============================================================================
// Clap argument parsing (test via try_parse_from on equivalent structs)
// ============================================================================

mod clap_parsing {
    use clap::{Parser, Subcommand};

    // Mirror the CLI struct for testing (since main.rs is a binary)
    #[derive(Parser)]
    #[command(name = "qflow")]
    struct TestCli {
        #[arg(short, long, action = clap::ArgAction::Count, global = true)]
        verbose: u8,

        #[command(subcommand)]
        command: TestCommands,
    }

    #[derive(Subcommand)]
    enum TestCommands {
        Compile {
            input: String,
            #[arg(short, long)]
            output: Option<String>,
            #[arg(short, long = "extension")]
            extensions: Vec<String>,
            #[arg(long)]
            sequential: bool,
            #[arg(long)]
            compact: bool,
        },
        Check {
            input: String,
            #[arg(short, long = "extension")]
            extensions: Vec<String>,
        },
        Ops {
            #[arg(short, long = "extension")]
            extensions: Vec<String>,
            #[arg(short, long, default_value = "table")]
            format: String,
        },
        Version,
    }

    #[test]
    fn test_compile_minimal() {
        let cli = TestCli::try_parse_from(["qflow", "compile", "teleport.yaml"]).unwrap();
        match cli.command {
            TestCommands::Compile {
                input,
                output,
                extensions,
                sequential,
                compact,
            } => {
                assert_eq!(input, "teleport.yaml");
                assert!(output.is_none());
                assert!(extensions.is_empty());
                assert!(!sequential);
                assert!(!compact);
            }
            _ => panic!("Expected Compile command"),
        }
    }

    #[test]
    fn test_compile_all_options() {
        let cli = TestCli::try_parse_from([
            "qflow",
            "compile",
            "rus.json",
            "-o",
            "out.json",
            "-e",
            "pulses.json",
            "--extension",
            "extra.json",
            "--sequential",
            "--compact",
        ])
        .unwrap();
        match cli.command {
            TestCommands::Compile {
                output,
                extensions,
                sequential,
                compact,
                ..
            } => {
                assert_eq!(output.as_deref(), Some("out.json"));
                assert_eq!(extensions, vec!["pulses.json", "extra.json"]);
                assert!(sequential);
                assert!(compact);
            }
            _ => panic!("Expected Compile command"),
        }
    }

    #[test]
    fn test_compile_requires_input() {
        assert!(TestCli::try_parse_from(["qflow", "compile"]).is_err());
    }

    #[test]
    fn test_check() {
        let cli = TestCli::try_parse_from(["qflow", "check", "leaky.yaml"]).unwrap();
        assert!(matches!(cli.command, TestCommands::Check { input, .. } if input == "leaky.yaml"));
    }

    #[test]
    fn test_ops_default_format() {
        let cli = TestCli::try_parse_from(["qflow", "ops"]).unwrap();
        match cli.command {
            TestCommands::Ops { format, .. } => assert_eq!(format, "table"),
            _ => panic!("Expected Ops command"),
        }
    }

    #[test]
    fn test_verbosity_levels() {
        for (args, level) in [
            (vec!["qflow", "version"], 0),
            (vec!["qflow", "-v", "version"], 1),
            (vec!["qflow", "-vv", "version"], 2),
            (vec!["qflow", "version", "-vvv"], 3),
        ] {
            let cli = TestCli::try_parse_from(args).unwrap();
            assert_eq!(cli.verbose, level);
            assert!(matches!(cli.command, TestCommands::Version));
        }
    }

    #[test]
    fn test_no_subcommand_fails() {
        assert!(TestCli::try_parse_from(["qflow"]).is_err());
    }
}

// ============================================================================
// Binary
// ============================================================================

mod binary {
    use super::{qflow, samples};
    use std::fs;

    #[test]
    fn test_compile_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("teleport.json");
        let input = samples().join("teleport.yaml");

        let result = qflow(&[
            "compile",
            input.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(result.status.success(), "{result:?}");

        let doc = qflow_ir::Document::from_json(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(doc.module, "teleport");
        assert_eq!(doc.version, qflow_ir::FORMAT_VERSION);
        assert_eq!(doc.count_kind("function"), 2);
        assert_eq!(doc.count_kind("measure"), 2);
    }

    #[test]
    fn test_verbose_compile_logs_progress() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("teleport.json");
        let input = samples().join("teleport.yaml");

        let quiet = qflow(&[
            "compile",
            input.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(quiet.status.success());
        assert!(!String::from_utf8_lossy(&quiet.stderr).contains("Wrote graph document"));

        let verbose = qflow(&[
            "-vv",
            "compile",
            input.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(verbose.status.success());
        let stderr = String::from_utf8_lossy(&verbose.stderr);
        assert!(stderr.contains("Loading module source"));
        assert!(stderr.contains("Wrote graph document"));
    }

    #[test]
    fn test_compile_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let input = samples().join("rus.json");
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");

        for (out, extra) in [(&first, None), (&second, Some("--sequential"))] {
            let mut args = vec![
                "compile",
                input.to_str().unwrap(),
                "-o",
                out.to_str().unwrap(),
                "--compact",
            ];
            args.extend(extra);
            assert!(qflow(&args).status.success());
        }
        assert_eq!(
            fs::read_to_string(&first).unwrap(),
            fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_diagnostics_fail_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("leaky.json");
        let input = samples().join("leaky.yaml");

        let result = qflow(&[
            "compile",
            input.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ]);
        assert_eq!(result.status.code(), Some(1));
        assert!(!out.exists());

        let stderr = String::from_utf8_lossy(&result.stderr);
        assert!(stderr.contains("LinearityError"));
        assert!(stderr.contains("consumed twice"));
        assert!(stderr.contains("never consumed"));
    }

    #[test]
    fn test_check_reports_without_output() {
        let input = samples().join("teleport.yaml");
        let result = qflow(&["check", input.to_str().unwrap()]);
        assert!(result.status.success());
        assert!(String::from_utf8_lossy(&result.stdout).contains("passed"));
    }

    #[test]
    fn test_missing_file() {
        let result = qflow(&["check", "does/not/exist.yaml"]);
        assert_eq!(result.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&result.stderr).contains("File not found"));
    }

    #[test]
    fn test_ops_json_lists_prelude() {
        let result = qflow(&["ops", "--format", "json"]);
        assert!(result.status.success());
        let ops: serde_json::Value = serde_json::from_slice(&result.stdout).unwrap();
        let names: Vec<_> = ops
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|op| op["name"].as_str())
            .collect();
        assert!(names.contains(&"measure"));
        assert!(names.contains(&"angle"));
    }

    #[test]
    fn test_ops_loads_extension_file() {
        let dir = tempfile::tempdir().unwrap();
        let ext = dir.path().join("phase.json");
        fs::write(
            &ext,
            r#"{"name": "phase", "ops": [
                {"name": "p", "class": "gate", "inputs": ["qubit", "angle"], "outputs": ["qubit"]}
            ]}"#,
        )
        .unwrap();

        let result = qflow(&["ops", "-e", ext.to_str().unwrap()]);
        assert!(result.status.success());
        assert!(String::from_utf8_lossy(&result.stdout).contains("phase"));
    }

    #[test]
    fn test_version() {
        let result = qflow(&["version"]);
        assert!(result.status.success());
        assert!(String::from_utf8_lossy(&result.stdout).contains(env!("CARGO_PKG_VERSION")));
    }
}

//! Governance validation CLI.
//!
//! Checks RO-Crate metadata documents: structure and per-entity schema
//! conformance with `check`, the full governance pipeline with
//! `validate`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rocrate_govern::{
    schema, CrateGraph, DocumentError, RuleSet, ValidationPipeline, ValidationReport,
};

#[derive(Parser)]
#[command(name = "rocrate-govern")]
#[command(about = "Validate research data governance metadata in RO-Crate packages")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check document structure and per-entity schema conformance
    Check {
        /// Metadata document to check
        document: PathBuf,

        /// Directory of additional schema definition files (YAML)
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Run the full validation pipeline (schema plus governance rules)
    Validate {
        /// Metadata document to validate
        document: PathBuf,

        /// Directory of additional schema definition files (YAML)
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        /// Restrict governance checks to these entity ids (repeatable)
        #[arg(long = "entity", short)]
        entities: Vec<String>,

        /// Skip checks that need the network
        #[arg(long)]
        offline: bool,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            document,
            schema_dir,
            json,
        } => run_check(&document, schema_dir.as_deref(), json),

        Commands::Validate {
            document,
            schema_dir,
            entities,
            offline,
            json,
        } => run_validate(&document, schema_dir.as_deref(), entities, offline, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_check(document: &Path, schema_dir: Option<&Path>, json: bool) -> Result<(), u8> {
    load_schema_dir(schema_dir, json)?;
    let graph = load_graph(document, json)?;

    graph.check_structure().map_err(|e| {
        report_error(json, &e.to_string());
        2u8
    })?;

    match graph.check_all_props() {
        Ok(()) => {
            if json {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(DocumentError::Check(check)) => {
            if json {
                let output = serde_json::json!({
                    "valid": false,
                    "errors": check.errors,
                });
                println!("{}", output);
            } else {
                eprintln!("Check failed:");
                for error in &check.errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(other) => {
            report_error(json, &other.to_string());
            Err(other.exit_code() as u8)
        }
    }
}

fn run_validate(
    document: &Path,
    schema_dir: Option<&Path>,
    entities: Vec<String>,
    offline: bool,
    json: bool,
) -> Result<(), u8> {
    load_schema_dir(schema_dir, json)?;
    let graph = load_graph(document, json)?;

    let rules = RuleSet::base();
    let mut pipeline = ValidationPipeline::new(&rules);
    if !entities.is_empty() {
        pipeline = pipeline.with_targets(entities);
    }

    #[cfg(feature = "remote")]
    let lookup = if offline {
        None
    } else {
        match rocrate_govern::HttpLookup::new() {
            Ok(lookup) => Some(lookup),
            Err(e) => {
                report_error(json, &format!("cannot build HTTP client: {}", e));
                return Err(2);
            }
        }
    };
    #[cfg(not(feature = "remote"))]
    let _ = offline;
    #[cfg(feature = "remote")]
    if let Some(lookup) = &lookup {
        pipeline = pipeline.with_lookup(lookup);
    }

    let report = pipeline.validate(&graph).map_err(|e| {
        report_error(json, &e.to_string());
        e.exit_code() as u8
    })?;

    print_report(&report, json);
    if report.passed() {
        Ok(())
    } else {
        Err(1)
    }
}

fn print_report(report: &ValidationReport, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "valid": report.passed(),
                "state": report.state,
                "local": report.local,
                "governance": report.cross,
            })
        );
        return;
    }

    if report.passed() {
        println!("Valid");
        return;
    }
    eprintln!("Validation failed:");
    for error in &report.local {
        eprintln!("  [schema] {}", error);
    }
    for error in &report.cross {
        eprintln!("  [governance] {}", error);
    }
}

fn load_graph(path: &Path, json: bool) -> Result<CrateGraph, u8> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        report_error(json, &format!("cannot read {}: {}", path.display(), e));
        3u8
    })?;
    let document: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        report_error(json, &format!("invalid JSON: {}", e));
        2u8
    })?;
    CrateGraph::from_document(&document).map_err(|e| {
        report_error(json, &e.to_string());
        e.exit_code() as u8
    })
}

/// Register every .yml schema definition in a directory before checking.
fn load_schema_dir(dir: Option<&Path>, json: bool) -> Result<(), u8> {
    let Some(dir) = dir else { return Ok(()) };
    let entries = std::fs::read_dir(dir).map_err(|e| {
        report_error(json, &format!("cannot read {}: {}", dir.display(), e));
        3u8
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .map(|e| e == "yml" || e == "yaml")
            .unwrap_or(false);
        if is_yaml {
            schema::load_schema_file(&path).map_err(|e| {
                report_error(json, &e.to_string());
                e.exit_code() as u8
            })?;
        }
    }
    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json: bool, msg: &str) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "valid": false, "error": msg })
        );
    } else {
        eprintln!("Error: {}", msg);
    }
}

//! OpenAPI Reference Graph CLI
//!
//! Command-line interface for dereferencing, bundling, validating and
//! reducing Swagger/OpenAPI documents.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use oas_refgraph::{
    bundle, dereference, load_document, load_document_auto, reduce, validate, CircularMode,
    DereferenceOptions, FileSource, ValidateOptions, DEFAULT_MAX_ERRORS,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oas-refgraph")]
#[command(about = "Resolve, bundle, validate and reduce OpenAPI documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace every $ref with its target
    Dereference {
        /// Document source: file path or URL (http:// or https://)
        document: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Circular reference handling: allow, ignore or forbid
        #[arg(long, default_value = "allow")]
        circular: String,

        /// Leave references to other files and URLs unresolved
        #[arg(long)]
        no_external: bool,

        /// Stop at the first unresolvable reference
        #[arg(long)]
        fail_fast: bool,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Embed external references so the document is self-contained
    Bundle {
        /// Document source: file path or URL (http:// or https://)
        document: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate structure and semantics of a document
    Validate {
        /// Document source: file path or URL (http:// or https://)
        document: String,

        /// Structural meta-schema (default: built-in for the detected version)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Errors to report individually; the rest are counted
        #[arg(long, default_value_t = DEFAULT_MAX_ERRORS)]
        max_errors: usize,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Extract the minimal document for one operation
    Reduce {
        /// Document source: file path or URL (http:// or https://)
        document: String,

        /// Path key, e.g. /pets/{petId}
        #[arg(long)]
        path: String,

        /// HTTP method (case-insensitive)
        #[arg(long, short)]
        method: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dereference {
            document,
            output,
            pretty,
            circular,
            no_external,
            fail_fast,
            timeout_ms,
        } => run_dereference(DereferenceArgs {
            document,
            output,
            pretty,
            circular,
            no_external,
            fail_fast,
            timeout_ms,
        }),

        Commands::Bundle {
            document,
            output,
            pretty,
        } => run_bundle(&document, output, pretty),

        Commands::Validate {
            document,
            schema,
            max_errors,
            timeout_ms,
            json,
        } => run_validate(&document, schema.as_deref(), max_errors, timeout_ms, json),

        Commands::Reduce {
            document,
            path,
            method,
            output,
            pretty,
        } => run_reduce(&document, &path, &method, output, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(source: &str) -> Result<Value, u8> {
    load_document_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn write_output(value: &Value, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

struct DereferenceArgs {
    document: String,
    output: Option<PathBuf>,
    pretty: bool,
    circular: String,
    no_external: bool,
    fail_fast: bool,
    timeout_ms: Option<u64>,
}

fn run_dereference(args: DereferenceArgs) -> Result<(), u8> {
    let DereferenceArgs {
        document,
        output,
        pretty,
        circular,
        no_external,
        fail_fast,
        timeout_ms,
    } = args;

    let Some(mode) = CircularMode::parse(&circular) else {
        eprintln!(
            "Error: invalid --circular value '{}': expected allow, ignore or forbid",
            circular
        );
        return Err(2);
    };
    let doc = load(&document)?;

    let mut options = DereferenceOptions::new()
        .resolve_external(!no_external)
        .circular(mode)
        .fail_fast(fail_fast)
        .base_location(document.as_str());
    if let Some(ms) = timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }

    let dereferenced = dereference(&doc, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    for pointer in dereferenced.circular.iter() {
        eprintln!("circular: {}", pointer);
    }
    for failure in &dereferenced.failures {
        eprintln!("unresolved: {} at {}", failure.error, failure.location);
    }

    write_output(&dereferenced.to_value(), output, pretty)
}

fn run_bundle(source: &str, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let doc = load(source)?;
    let bundled = bundle(&doc, Some(source), &FileSource).map_err(|e| {
        eprintln!("Error bundling refs: {}", e);
        e.exit_code() as u8
    })?;
    write_output(&bundled, output, pretty)
}

fn run_validate(
    source: &str,
    schema: Option<&Path>,
    max_errors: usize,
    timeout_ms: Option<u64>,
    json_output: bool,
) -> Result<(), u8> {
    let doc = load_document_auto(source).map_err(|e| {
        report_error(json_output, &format!("loading document: {}", e));
        e.exit_code() as u8
    })?;

    let mut options = ValidateOptions::new()
        .max_errors(max_errors)
        .base_location(source);
    if let Some(ms) = timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }
    if let Some(path) = schema {
        let meta = load_document(path).map_err(|e| {
            report_error(json_output, &format!("loading schema: {}", e));
            e.exit_code() as u8
        })?;
        options = options.meta_schema(meta);
    }

    let result = validate(&doc, &options, &FileSource).map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    if json_output {
        let output = serde_json::to_string(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else {
        for warning in &result.warnings {
            eprintln!("warning: {}", warning);
        }
        if result.valid {
            println!("Valid");
        } else {
            eprintln!("Validation failed:");
            for error in &result.errors {
                eprintln!("  {}", error);
            }
            if result.additional_error_count > 0 {
                eprintln!("  plus {} additional errors", result.additional_error_count);
            }
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(1)
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn run_reduce(
    source: &str,
    path: &str,
    method: &str,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let doc = load(source)?;
    let reduced = reduce(&doc, path, method).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    write_output(&reduced, output, pretty)
}

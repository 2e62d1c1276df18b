//! Block workspace inspection CLI.
//!
//! Provides the `blockgraph` binary for working with saved workspace
//! documents: checking that every procedure call agrees with its definition,
//! converting between the compact and tree persistence forms, and listing
//! procedures, signatures and palette contents.
//!
//! Documents are loaded the same way an editor loads them, so the reported
//! state is exactly what the editor would see.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use blockgraph_procs::{PersistForm, ProcError, ProcedureWorkspace, SyncConfig, WorkspaceDocument};

/// Block workspace tools.
#[derive(Parser)]
#[command(name = "blockgraph", about = "Block workspace procedure tools")]
struct Cli {
    /// JSON settings file (default: read BLOCKGRAPH_* environment variables).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Report calls out of sync with their definitions and misplaced
    /// conditional returns.
    Check {
        /// Workspace document to check.
        file: PathBuf,
    },
    /// Rewrite a document in another persistence form.
    Convert {
        /// Workspace document to convert.
        file: PathBuf,

        /// Target form.
        #[arg(short, long, value_enum, default_value = "compact")]
        to: Form,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the procedures defined in a document.
    Procedures {
        file: PathBuf,
    },
    /// Print the exported signature of one procedure.
    Signature {
        file: PathBuf,

        /// Procedure name, matched ignoring case.
        name: String,
    },
    /// Print the name a new procedure called `name` would receive.
    LegalName {
        file: PathBuf,
        name: String,
    },
    /// Print the palette templates offered for a document.
    Palette {
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Form {
    Compact,
    Tree,
}

impl From<Form> for PersistForm {
    fn from(form: Form) -> Self {
        match form {
            Form::Compact => PersistForm::Compact,
            Form::Tree => PersistForm::Tree,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let exit_code = match cli.command {
        Commands::Check { file } => run_check(&file, config),
        Commands::Convert { file, to, output } => run_convert(&file, config, to, output),
        Commands::Procedures { file } => run_procedures(&file, config),
        Commands::Signature { file, name } => run_signature(&file, config, &name),
        Commands::LegalName { file, name } => run_legal_name(&file, config, &name),
        Commands::Palette { file } => run_palette(&file, config),
    };
    process::exit(exit_code);
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig, ProcError> {
    match path {
        Some(path) => SyncConfig::from_json_file(path),
        None => SyncConfig::from_env(),
    }
}

/// Reads and loads a document, mapping failures to exit codes:
/// 3 = I/O error, 1 = malformed document.
fn load(path: &Path, config: SyncConfig) -> Result<ProcedureWorkspace, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    let doc = WorkspaceDocument::from_json(&text).map_err(|e| {
        eprintln!("Error: '{}' is not a workspace document: {}", path.display(), e);
        1
    })?;
    let ws = ProcedureWorkspace::from_document(&doc, config).map_err(|e| {
        eprintln!("Error: failed to load '{}': {}", path.display(), e);
        1
    })?;
    tracing::debug!(
        path = %path.display(),
        blocks = ws.workspace().block_count(),
        "loaded workspace"
    );
    Ok(ws)
}

/// Prints a value as pretty JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = consistent, 2 = problems found, 1/3 = load failure.
fn run_check(path: &Path, config: SyncConfig) -> i32 {
    let ws = match load(path, config) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    let problems = ws.check_consistency();
    print_json(&problems);
    if problems.is_empty() {
        0
    } else {
        eprintln!("{} problem(s) found", problems.len());
        2
    }
}

fn run_convert(path: &Path, config: SyncConfig, to: Form, output: Option<PathBuf>) -> i32 {
    let ws = match load(path, config) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    let text = match ws
        .save_document(to.into())
        .and_then(|doc| doc.to_json_pretty())
    {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to save document: {}", e);
            return 1;
        }
    };
    match output {
        Some(out) => match fs::write(&out, text) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: failed to write '{}': {}", out.display(), e);
                3
            }
        },
        None => {
            println!("{}", text);
            0
        }
    }
}

fn run_procedures(path: &Path, config: SyncConfig) -> i32 {
    let ws = match load(path, config) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    let (no_return, with_return) = ws.all_procedures();
    print_json(&serde_json::json!({
        "noReturn": no_return,
        "withReturn": with_return,
    }));
    0
}

/// Returns exit code 4 when no procedure has the given name.
fn run_signature(path: &Path, config: SyncConfig, name: &str) -> i32 {
    let ws = match load(path, config) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    let Some(def) = ws.find_definition(name) else {
        eprintln!("Error: no procedure named '{}'", name);
        return 4;
    };
    match ws.export_signature(def) {
        Ok(signature) => {
            print_json(&signature);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run_legal_name(path: &Path, config: SyncConfig, name: &str) -> i32 {
    let ws = match load(path, config) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    println!("{}", ws.legal_name(name.trim(), None));
    0
}

fn run_palette(path: &Path, config: SyncConfig) -> i32 {
    let ws = match load(path, config) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    let palette: Vec<Value> = ws
        .palette()
        .iter()
        .filter_map(|block| serde_json::to_value(block).ok())
        .collect();
    print_json(&palette);
    0
}

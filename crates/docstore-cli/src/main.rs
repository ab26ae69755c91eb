//! Docstore CLI
//!
//! Command-line interface for the tiered document store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docstore_core::{Config, DocManager, DocstoreError};

mod commands;
mod output;

use output::{Output, OutputFormat};

/// Log filter used when RUST_LOG is not set
const DEFAULT_LOG_FILTER: &str = "docstore_core=warn,docstore_cli=warn";

#[derive(Parser)]
#[command(name = "docstore")]
#[command(about = "Docstore - tiered hot/cold document storage")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a document, unarchiving it if needed
    Get { project_id: String, doc_id: String },
    /// Print a document's lines, unarchiving it if needed
    Lines { project_id: String, doc_id: String },
    /// Show a document without unarchiving it
    Peek { project_id: String, doc_id: String },
    /// Report whether a document is soft-deleted
    IsDeleted { project_id: String, doc_id: String },
    /// Write a document's lines and version
    Update {
        project_id: String,
        doc_id: String,
        /// Edit version to store
        #[arg(short, long)]
        version: i64,
        /// Read lines from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// JSON file with tracked changes and comments
        #[arg(short, long)]
        ranges: Option<PathBuf>,
    },
    /// Update a document's name or deleted flag
    Patch {
        project_id: String,
        doc_id: String,
        /// New name
        #[arg(short, long)]
        name: Option<String>,
        /// Set or clear the deleted flag
        #[arg(short, long)]
        deleted: Option<bool>,
    },
    /// Soft-delete a document
    #[command(alias = "rm")]
    Delete {
        project_id: String,
        doc_id: String,
        /// Name to keep for the deleted document
        #[arg(short, long)]
        name: String,
    },
    /// Move a document to the cold archive
    Archive { project_id: String, doc_id: String },
    /// Bring a document back from the cold archive
    Unarchive { project_id: String, doc_id: String },
    /// Archive every hot document in a project
    ArchiveAll { project_id: String },
    /// Unarchive every archived document in a project
    UnarchiveAll { project_id: String },
    /// List a project's documents
    #[command(alias = "ls")]
    List {
        project_id: String,
        /// List soft-deleted documents instead
        #[arg(long)]
        deleted: bool,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let result = run(cli.command, &output).await;

    if let Err(err) = &result {
        if let Some(hint) = recovery_hint(err) {
            eprintln!("Hint: {}", hint);
        }
    }

    result
}

async fn run(command: Commands, output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    // Commands that don't need the store
    if let Commands::Config { command: config_command } = &command {
        return match config_command {
            Some(ConfigCommands::Show) | None => commands::config::show(&config, output),
            Some(ConfigCommands::Path) => commands::config::path(output),
        };
    }

    debug!(data_dir = %config.data_dir.display(), "opening document store");
    let manager = DocManager::open(&config).context("Failed to open document store")?;
    let result = run_doc_command(command, &manager, output).await;

    // Let archives queued by a soft delete finish before exiting
    manager.shutdown().await;

    result
}

async fn run_doc_command(command: Commands, manager: &DocManager, output: &Output) -> Result<()> {
    match command {
        Commands::Get { project_id, doc_id } => {
            commands::doc::get(manager, &project_id, &doc_id, output).await
        }
        Commands::Lines { project_id, doc_id } => {
            commands::doc::lines(manager, &project_id, &doc_id, output).await
        }
        Commands::Peek { project_id, doc_id } => {
            commands::doc::peek(manager, &project_id, &doc_id, output).await
        }
        Commands::IsDeleted { project_id, doc_id } => {
            commands::doc::is_deleted(manager, &project_id, &doc_id, output).await
        }
        Commands::Update {
            project_id,
            doc_id,
            version,
            file,
            ranges,
        } => {
            commands::doc::update(manager, &project_id, &doc_id, version, file, ranges, output)
                .await
        }
        Commands::Patch {
            project_id,
            doc_id,
            name,
            deleted,
        } => commands::doc::patch(manager, &project_id, &doc_id, name, deleted, output).await,
        Commands::Delete {
            project_id,
            doc_id,
            name,
        } => commands::doc::delete(manager, &project_id, &doc_id, name, output).await,
        Commands::Archive { project_id, doc_id } => {
            commands::archive::archive(manager, &project_id, &doc_id, output).await
        }
        Commands::Unarchive { project_id, doc_id } => {
            commands::archive::unarchive(manager, &project_id, &doc_id, output).await
        }
        Commands::ArchiveAll { project_id } => {
            commands::archive::archive_all(manager, &project_id, output).await
        }
        Commands::UnarchiveAll { project_id } => {
            commands::archive::unarchive_all(manager, &project_id, output).await
        }
        Commands::List {
            project_id,
            deleted,
        } => commands::list::list(manager, &project_id, deleted, output).await,
        Commands::Config { .. } => unreachable!(), // Handled in run
    }
}

/// Log to stderr so stdout stays parseable under --json
fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Suggestion printed after a failed command, if there is one
fn recovery_hint(err: &anyhow::Error) -> Option<&'static str> {
    match err.downcast_ref::<DocstoreError>()? {
        DocstoreError::Storage(storage) => storage.recovery_suggestion(),
        DocstoreError::DocModified { .. } => {
            Some("The document changed while it was being read. Run the command again.")
        }
        DocstoreError::NotFound { .. } | DocstoreError::InvalidInput(_) => None,
    }
}

use std::path::PathBuf;

use canvas::config::EngineConfig;
use canvas::engine::Engine;
use canvas::storage::{FileStorage, StorageError, StorageProvider};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("journal decode failed: {0}")]
    Codec(#[from] journal::CodecError),
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "paintlog", about = "Inspect and replay raster editor journals")]
struct Cli {
    /// Directory holding one `.journal` file per project.
    #[arg(long, env = "PAINTLOG_DIR", default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a project into a fresh engine and print a summary.
    Replay { project: String },
    /// Print a project's records as JSON lines.
    Inspect { project: String },
    /// Append JSON-lines records to a project's journal.
    Import { project: String, file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = FileStorage::new(cli.dir);

    match cli.command {
        Command::Replay { project } => run_replay(&storage, &project).await,
        Command::Inspect { project } => run_inspect(&storage, &project).await,
        Command::Import { project, file } => run_import(&storage, &project, file).await,
    }
}

async fn run_replay(storage: &FileStorage, project: &str) -> Result<(), CliError> {
    let events = storage.load(project).await?;
    let mut engine = Engine::for_project(project, EngineConfig::from_env());
    let summary = engine.replay(&events);

    let core = &engine.core;
    let size = core.composed().size;
    print_json(&json!({
        "project": core.composed().project_id,
        "records": events.len(),
        "applied": summary.applied,
        "skipped": summary.skipped,
        "width": size.width,
        "height": size.height,
        "historyLength": core.history().len(),
        "canUndo": core.can_undo(),
        "canRedo": core.can_redo(),
        "layers": serde_json::to_value(core.layers_state())?,
    }))
}

async fn run_inspect(storage: &FileStorage, project: &str) -> Result<(), CliError> {
    for event in storage.load(project).await? {
        println!("{}", journal::to_json_line(&event));
    }
    Ok(())
}

async fn run_import(storage: &FileStorage, project: &str, file: PathBuf) -> Result<(), CliError> {
    let text = tokio::fs::read_to_string(&file)
        .await
        .map_err(|source| CliError::Read { path: file.clone(), source })?;
    let events = journal::parse_json_lines(&text)?;
    for event in &events {
        storage.append(project, event).await?;
    }
    tracing::info!(project, imported = events.len(), "journal import finished");
    print_json(&json!({ "project": project, "imported": events.len() }))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

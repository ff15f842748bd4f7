//! `trainlog`: ingest transit-feed snapshots into a SQLite fact store.
//!
//! # Usage
//!
//! ```
//! trainlog ingest snapshots/
//! trainlog --config ~/.config/trainlog.toml stats
//! trainlog export > facts.jsonl
//! ```

use std::{
  io::{self, Write as _},
  path::PathBuf,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use trainlog_cli::{Settings, snapshot_files};
use trainlog_core::{ingest::Ingestor, snapshot::Snapshot, store::EntityStore};
use trainlog_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "trainlog", version, about = "Transit feed snapshot ingester")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "trainlog.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Ingest snapshot files, or directories of `.json` snapshots.
  Ingest {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
  },
  /// Print row counts for every table.
  Stats,
  /// Print every fact as one JSON object per line.
  Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store_path = settings.resolved_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Ingest { paths } => {
      let ingestor = Ingestor::with_policy(store, settings.policy());
      ingest(ingestor, &paths).await
    }
    Command::Stats => stats(&store).await,
    Command::Export => export(&store).await,
  }
}

async fn ingest(ingestor: Ingestor<SqliteStore>, paths: &[PathBuf]) -> anyhow::Result<()> {
  let files = snapshot_files(paths)?;
  let (mut ingested, mut skipped, mut inserted) = (0usize, 0usize, 0usize);

  for file in &files {
    let bytes = tokio::fs::read(file)
      .await
      .with_context(|| format!("failed to read {}", file.display()))?;

    let snapshot = match Snapshot::from_slice(&bytes) {
      Ok(snapshot) => snapshot,
      Err(error) => {
        tracing::warn!(file = %file.display(), %error, "skipping undecodable snapshot");
        skipped += 1;
        continue;
      }
    };

    let report = ingestor
      .ingest(&snapshot)
      .await
      .with_context(|| format!("failed to ingest {}", file.display()))?;
    for failure in &report.failures {
      tracing::warn!(
        file = %file.display(),
        train = failure.train_id,
        error = %failure.error,
        "train not ingested"
      );
    }
    ingested += 1;
    inserted += report.facts_inserted;
  }

  tracing::info!(files = files.len(), ingested, skipped, inserted, "ingestion finished");
  Ok(())
}

async fn stats(store: &SqliteStore) -> anyhow::Result<()> {
  let counts = store.counts().await.context("failed to count rows")?;
  for (kind, rows) in counts.by_kind() {
    println!("{:<16} {rows}", kind.to_string());
  }
  Ok(())
}

async fn export(store: &SqliteStore) -> anyhow::Result<()> {
  let facts = store.list_facts().await.context("failed to read facts")?;
  let mut out = io::stdout().lock();
  for fact in &facts {
    serde_json::to_writer(&mut out, fact)?;
    out.write_all(b"\n")?;
  }
  out.flush()?;
  Ok(())
}

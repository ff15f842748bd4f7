//! Shared plumbing for the `trainlog` binary: settings and snapshot discovery.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use trainlog_core::ingest::IngestPolicy;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime settings, deserialised from `trainlog.toml` and `TRAINLOG_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
  #[serde(default = "default_store_path")]
  pub store_path:      PathBuf,
  /// Only write a fact once the train has reached its destination.
  #[serde(default)]
  pub require_arrival: bool,
}

fn default_store_path() -> PathBuf { PathBuf::from("trainlog.db") }

impl Default for Settings {
  fn default() -> Self {
    Self { store_path: default_store_path(), require_arrival: false }
  }
}

impl Settings {
  /// Layer the optional config file at `path` under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("TRAINLOG").try_parsing(true))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise Settings")
  }

  pub fn policy(&self) -> IngestPolicy {
    IngestPolicy { require_arrival: self.require_arrival }
  }

  /// The store path with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Snapshot discovery ──────────────────────────────────────────────────────

/// Expand `paths` into the snapshot files to ingest, in order.
///
/// A directory contributes its `.json` entries sorted by file name; nested
/// directories are not searched. A file is taken as given.
pub fn snapshot_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
  let mut files = Vec::new();
  for path in paths {
    if !path.is_dir() {
      files.push(path.clone());
      continue;
    }

    let mut found = Vec::new();
    let entries = std::fs::read_dir(path)
      .with_context(|| format!("failed to list {}", path.display()))?;
    for entry in entries {
      let entry = entry.with_context(|| format!("failed to list {}", path.display()))?;
      let file = entry.path();
      if file.is_file() && file.extension().is_some_and(|ext| ext == "json") {
        found.push(file);
      }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files.extend(found);
  }
  Ok(files)
}

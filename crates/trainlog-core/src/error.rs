//! Error types for `trainlog-core`.

use thiserror::Error;

use crate::entity::EntityKind;

/// Recoverable ingestion errors.
///
/// Neither variant aborts a whole snapshot: `EntityNotFound` abandons the
/// current train instance, `MalformedRecord` skips a single record. Failures
/// of the storage backend itself surface through the backend's own error
/// type.
#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind} not found: {key}")]
  EntityNotFound { kind: EntityKind, key: String },

  #[error("malformed record for train {train:?}: {reason}")]
  MalformedRecord { train: String, reason: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

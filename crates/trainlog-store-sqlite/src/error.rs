//! Error type for `trainlog-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored location name failed canonicalisation on the way back out.
  #[error("invalid location name in store: {0:?}")]
  InvalidLocation(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

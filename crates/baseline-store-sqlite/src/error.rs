//! Error type for `baseline-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] baseline_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("table not found: {0}")]
  TableNotFound(String),

  #[error("staging table {0} must differ from the target table")]
  StagingIsTarget(String),

  #[error("no free scratch table name in schema {0}")]
  NoScratchName(String),

  /// A row selected for closing was no longer active when the merge reached
  /// it.
  #[error("row {0} is not active")]
  RowNotActive(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for `baseline-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid identifier {0:?}: {1}")]
  InvalidIdentifier(String, &'static str),

  #[error("natural key must name at least one column")]
  EmptyNaturalKey,

  #[error("natural key lists column {0:?} more than once")]
  DuplicateKeyColumn(String),

  /// A natural key column is absent from the batch being merged.
  #[error("natural key column {0:?} is missing from the batch")]
  MissingKeyColumn(String),

  #[error("columns {0:?} and {1:?} differ only by case")]
  ConflictingColumns(String, String),

  #[error("column {0:?} uses the reserved audit prefix")]
  ReservedColumn(String),

  /// More than one active target row shares a natural key.
  #[error("natural key {0} has more than one active row")]
  DuplicateActiveKey(String),

  #[error("unknown record type: {0:?}")]
  UnknownRecordType(String),

  #[error("record is not a JSON object: {0}")]
  NotAnObject(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

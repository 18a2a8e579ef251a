//! Audit columns and stored versions.
//!
//! Every target table carries seven audit columns next to its natural
//! columns. Together they record when each version of an entity became
//! current, when it stopped being current, and which operation produced it.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, record::Record, value::ColumnType};

/// Prefix shared by all audit columns. Batch columns may not use it.
pub const AUDIT_PREFIX: &str = "audit_field_";

pub fn is_audit_column(name: &str) -> bool {
  name
    .get(..AUDIT_PREFIX.len())
    .is_some_and(|head| head.eq_ignore_ascii_case(AUDIT_PREFIX))
}

// ─── AuditColumn ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditColumn {
  /// True for the current version of an entity; at most one per key.
  ActiveFlag,
  RecordType,
  StartDatetimeUtc,
  /// Null while the version is active.
  EndDatetimeUtc,
  InsertDatetimeUtc,
  /// Set when the version is superseded by an update.
  UpdateDatetimeUtc,
  /// Set when the version is closed by a delete.
  DeleteDatetimeUtc,
}

impl AuditColumn {
  /// Physical column order used when creating a target table.
  pub const ALL: [Self; 7] = [
    Self::ActiveFlag,
    Self::RecordType,
    Self::StartDatetimeUtc,
    Self::EndDatetimeUtc,
    Self::InsertDatetimeUtc,
    Self::UpdateDatetimeUtc,
    Self::DeleteDatetimeUtc,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Self::ActiveFlag => "audit_field_active_flag",
      Self::RecordType => "audit_field_record_type",
      Self::StartDatetimeUtc => "audit_field_start_datetime_utc",
      Self::EndDatetimeUtc => "audit_field_end_datetime_utc",
      Self::InsertDatetimeUtc => "audit_field_insert_datetime_utc",
      Self::UpdateDatetimeUtc => "audit_field_update_datetime_utc",
      Self::DeleteDatetimeUtc => "audit_field_delete_datetime_utc",
    }
  }

  pub fn column_type(self) -> ColumnType {
    match self {
      Self::ActiveFlag => ColumnType::Boolean,
      Self::RecordType => ColumnType::Text,
      _ => ColumnType::Timestamp,
    }
  }
}

// ─── RecordType ──────────────────────────────────────────────────────────────

/// The merge operation that produced (or, for `Delete`, closed) a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
  Insert,
  Update,
  Delete,
}

impl RecordType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Insert => "insert",
      Self::Update => "update",
      Self::Delete => "delete",
    }
  }
}

impl FromStr for RecordType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "insert" => Ok(Self::Insert),
      "update" => Ok(Self::Update),
      "delete" => Ok(Self::Delete),
      other => Err(Error::UnknownRecordType(other.to_owned())),
    }
  }
}

impl fmt::Display for RecordType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Stored versions ─────────────────────────────────────────────────────────

/// Typed audit columns of one stored version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFields {
  pub active:      bool,
  pub record_type: RecordType,
  pub start:       DateTime<Utc>,
  pub end:         Option<DateTime<Utc>>,
  pub inserted:    DateTime<Utc>,
  pub updated:     Option<DateTime<Utc>>,
  pub deleted:     Option<DateTime<Utc>>,
}

/// One row of a target table: natural columns plus audit fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionRow {
  pub values: Record,
  pub audit:  AuditFields,
}

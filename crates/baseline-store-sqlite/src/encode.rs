//! Conversion between [`Value`]s and SQLite storage values.
//!
//! SQLite has no boolean or timestamp storage class, so booleans are stored
//! as `1`/`0` and timestamps as RFC 3339 text. Decoding therefore needs the
//! declared type of the column a value was read from.

use baseline_core::{
  audit::{AuditFields, RecordType, VersionRow},
  record::Record,
  value::{ColumnType, Value, decode_timestamp, encode_timestamp},
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;

use crate::{Error, Result};

// ─── Values ──────────────────────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
    Value::Integer(i) => SqlValue::Integer(*i),
    Value::Float(f) if f.is_nan() => SqlValue::Null,
    Value::Float(f) => SqlValue::Real(*f),
    Value::Text(s) => SqlValue::Text(s.clone()),
    Value::Timestamp(ts) => SqlValue::Text(encode_timestamp(*ts)),
  }
}

/// Decode a stored value read from a column declared as `ty`.
pub fn decode_value(raw: SqlValue, ty: Option<ColumnType>) -> Value {
  match (raw, ty) {
    (SqlValue::Null, _) => Value::Null,
    (SqlValue::Integer(i @ (0 | 1)), Some(ColumnType::Boolean)) => Value::Boolean(i == 1),
    (SqlValue::Integer(i), _) => Value::Integer(i),
    (SqlValue::Real(f), _) => Value::from(f),
    (SqlValue::Text(s), Some(ColumnType::Timestamp)) => match decode_timestamp(&s) {
      Some(ts) => Value::Timestamp(ts),
      None => Value::Text(s),
    },
    (SqlValue::Text(s), _) => Value::Text(s),
    (SqlValue::Blob(b), _) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
  }
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  decode_timestamp(s).ok_or_else(|| Error::DateParse(format!("{s:?}")))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// Flat representation of one target row as read from SQLite, before the
/// audit columns are parsed.
pub struct RawVersion {
  pub values:      Vec<SqlValue>,
  pub active:      bool,
  pub record_type: String,
  pub start:       String,
  pub end:         Option<String>,
  pub inserted:    String,
  pub updated:     Option<String>,
  pub deleted:     Option<String>,
}

impl RawVersion {
  /// `columns` names and types the natural columns, aligned with `values`.
  pub fn into_version(self, columns: &[(String, Option<ColumnType>)]) -> Result<VersionRow> {
    let values = columns
      .iter()
      .zip(self.values)
      .map(|((name, ty), raw)| (name.clone(), decode_value(raw, *ty)))
      .collect::<Record>();

    Ok(VersionRow {
      values,
      audit: AuditFields {
        active:      self.active,
        record_type: self.record_type.parse::<RecordType>()?,
        start:       decode_dt(&self.start)?,
        end:         decode_opt_dt(self.end)?,
        inserted:    decode_dt(&self.inserted)?,
        updated:     decode_opt_dt(self.updated)?,
        deleted:     decode_opt_dt(self.deleted)?,
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn booleans_are_stored_as_integers() {
    assert_eq!(encode_value(&Value::Boolean(true)), SqlValue::Integer(1));
    assert_eq!(
      decode_value(SqlValue::Integer(0), Some(ColumnType::Boolean)),
      Value::Boolean(false)
    );
    assert_eq!(
      decode_value(SqlValue::Integer(0), Some(ColumnType::Integer)),
      Value::Integer(0)
    );
  }

  #[test]
  fn timestamps_decode_only_from_timestamp_columns() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let stored = encode_value(&Value::Timestamp(ts));
    assert_eq!(
      decode_value(stored.clone(), Some(ColumnType::Timestamp)),
      Value::Timestamp(ts)
    );
    assert!(matches!(
      decode_value(stored, Some(ColumnType::Text)),
      Value::Text(_)
    ));
  }

  #[test]
  fn unparseable_timestamp_text_stays_text() {
    assert_eq!(
      decode_value(SqlValue::Text("soon".into()), Some(ColumnType::Timestamp)),
      Value::Text("soon".into())
    );
  }

  #[test]
  fn nan_is_stored_as_null() {
    assert_eq!(encode_value(&Value::Float(f64::NAN)), SqlValue::Null);
  }

  #[test]
  fn bad_audit_timestamp_is_an_error() {
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }
}

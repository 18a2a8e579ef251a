//! Scalar values and storage-type inference.
//!
//! A [`Value`] is what a scraped record holds for one column. A
//! [`ColumnType`] is what a table column is declared as. Inference is total:
//! every value maps to a type, null maps to "no evidence", and anything that
//! is not clearly one of the narrower types ends up as text.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

// ─── ColumnType ──────────────────────────────────────────────────────────────

/// Storage type of a staging or target column.
///
/// Types form a widening lattice: `Boolean < Integer < Float < Text` and
/// `Timestamp < Text`. Incomparable pairs widen to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
  Boolean,
  Integer,
  Float,
  Timestamp,
  Text,
}

impl ColumnType {
  /// The storage type of a single value; `None` for null-like values.
  pub fn of(value: &Value) -> Option<Self> {
    match value {
      Value::Null => None,
      Value::Boolean(_) => Some(Self::Boolean),
      Value::Integer(_) => Some(Self::Integer),
      Value::Float(f) if f.is_nan() => None,
      Value::Float(_) => Some(Self::Float),
      Value::Timestamp(_) => Some(Self::Timestamp),
      Value::Text(_) => Some(Self::Text),
    }
  }

  /// The type name written into `CREATE TABLE` / `ADD COLUMN`.
  pub fn declared(self) -> &'static str {
    match self {
      Self::Boolean => "BOOLEAN",
      Self::Integer => "INTEGER",
      Self::Float => "FLOAT",
      Self::Timestamp => "TIMESTAMP",
      Self::Text => "TEXT",
    }
  }

  /// Parse a declared column type as reported by the database.
  ///
  /// An empty declaration means the column carries no type evidence and
  /// yields `None`. Unrecognised declarations are treated as text.
  pub fn from_declared(decl: &str) -> Option<Self> {
    let upper = decl.trim().to_ascii_uppercase();
    if upper.is_empty() {
      return None;
    }
    Some(match upper.as_str() {
      "BOOLEAN" | "BOOL" => Self::Boolean,
      "INTEGER" | "INT" | "BIGINT" | "SMALLINT" => Self::Integer,
      "FLOAT" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" => Self::Float,
      "TIMESTAMP" | "DATETIME" => Self::Timestamp,
      _ => Self::Text,
    })
  }

  /// Least upper bound of two types in the widening lattice.
  pub fn widen(self, other: Self) -> Self {
    if self == other {
      return self;
    }
    match (self, other) {
      (Self::Text | Self::Timestamp, _) | (_, Self::Text | Self::Timestamp) => {
        Self::Text
      }
      (Self::Float, _) | (_, Self::Float) => Self::Float,
      _ => Self::Integer,
    }
  }

  /// True if every value of `self` also fits `other` and the two differ.
  pub fn is_narrower_than(self, other: Self) -> bool {
    self != other && self.widen(other) == other
  }
}

impl fmt::Display for ColumnType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.declared())
  }
}

/// Infer the storage type of a column from all of its values.
///
/// Returns the least upper bound over the non-null values, or `None` when the
/// column holds nothing but nulls.
pub fn infer_column<'a>(
  values: impl IntoIterator<Item = &'a Value>,
) -> Option<ColumnType> {
  values
    .into_iter()
    .filter_map(ColumnType::of)
    .reduce(ColumnType::widen)
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// One scalar cell of a record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
  #[default]
  Null,
  Boolean(bool),
  Integer(i64),
  Float(f64),
  Text(String),
  Timestamp(DateTime<Utc>),
}

impl Value {
  /// Null, or a float that is not a number.
  pub fn is_null_like(&self) -> bool {
    matches!(self, Self::Null) || matches!(self, Self::Float(f) if f.is_nan())
  }

  /// Collapse null-like values to [`Value::Null`].
  pub fn normalized(self) -> Self {
    if self.is_null_like() { Self::Null } else { self }
  }

  /// Storage-level text form used for change detection and key matching.
  ///
  /// Numbers compare by value (`3` and `3.0` share a form), booleans use
  /// their stored `1`/`0`, timestamps use the encoded RFC 3339 text. Null has
  /// no form.
  pub fn canonical(&self) -> Option<String> {
    match self {
      Self::Null => None,
      Self::Boolean(b) => Some(if *b { "1" } else { "0" }.to_owned()),
      Self::Integer(i) => Some(i.to_string()),
      Self::Float(f) if f.is_nan() => None,
      Self::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
        Some((*f as i64).to_string())
      }
      Self::Float(f) => Some(f.to_string()),
      Self::Text(s) => Some(s.clone()),
      Self::Timestamp(ts) => Some(encode_timestamp(*ts)),
    }
  }

  /// Null-safe equality: null equals null, and values equal by
  /// [`canonical`](Self::canonical) form.
  pub fn same_as(&self, other: &Value) -> bool {
    self.canonical() == other.canonical()
  }

  /// Convert a JSON scalar into a value.
  ///
  /// Arrays and objects are kept as their JSON text. Strings become
  /// timestamps only when `detect_timestamps` is set and they parse as
  /// RFC 3339.
  pub fn from_json(value: serde_json::Value, detect_timestamps: bool) -> Self {
    use serde_json::Value as J;
    match value {
      J::Null => Self::Null,
      J::Bool(b) => Self::Boolean(b),
      J::Number(n) => match n.as_i64() {
        Some(i) => Self::Integer(i),
        None => n.as_f64().map(Self::Float).unwrap_or_default().normalized(),
      },
      J::String(s) => {
        if detect_timestamps && let Some(ts) = decode_timestamp(&s) {
          Self::Timestamp(ts)
        } else {
          Self::Text(s)
        }
      }
      other @ (J::Array(_) | J::Object(_)) => Self::Text(other.to_string()),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Boolean(b) => write!(f, "{b}"),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Float(x) => write!(f, "{x}"),
      Self::Text(s) => write!(f, "{s:?}"),
      Self::Timestamp(ts) => f.write_str(&encode_timestamp(*ts)),
    }
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::Null => s.serialize_none(),
      Self::Boolean(b) => s.serialize_bool(*b),
      Self::Integer(i) => s.serialize_i64(*i),
      Self::Float(f) => s.serialize_f64(*f),
      Self::Text(t) => s.serialize_str(t),
      Self::Timestamp(ts) => s.serialize_str(&encode_timestamp(*ts)),
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self { Self::Integer(i) }
}

impl From<f64> for Value {
  fn from(f: f64) -> Self { Self::Float(f).normalized() }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<DateTime<Utc>> for Value {
  fn from(ts: DateTime<Utc>) -> Self { Self::Timestamp(ts) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or_default() }
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 text (microseconds, `Z` suffix); sorts
/// chronologically as plain text.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

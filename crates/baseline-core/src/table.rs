//! Table references, identifier validation and natural keys.
//!
//! Identifiers are validated here and quoted by the storage backend; no
//! caller-supplied name ever reaches a statement unquoted.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, audit::is_audit_column};

/// Schema used when a table reference does not name one.
pub const DEFAULT_SCHEMA: &str = "main";

/// Schema holding connection-private tables; the default home of staging
/// tables.
pub const TEMP_SCHEMA: &str = "temp";

const MAX_IDENTIFIER_LEN: usize = 128;

/// Reject identifiers that cannot be quoted safely.
pub fn validate_identifier(name: &str) -> Result<()> {
  if name.is_empty() {
    return Err(Error::InvalidIdentifier(name.to_owned(), "is empty"));
  }
  if name.len() > MAX_IDENTIFIER_LEN {
    return Err(Error::InvalidIdentifier(name.to_owned(), "is too long"));
  }
  if name.contains('\0') {
    return Err(Error::InvalidIdentifier(name.to_owned(), "contains NUL"));
  }
  Ok(())
}

// ─── TableRef ────────────────────────────────────────────────────────────────

/// A `schema.table` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableRef {
  schema: String,
  name:   String,
}

impl TableRef {
  pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Result<Self> {
    let schema = schema.into();
    let name = name.into();
    validate_identifier(&schema)?;
    validate_identifier(&name)?;
    Ok(Self { schema, name })
  }

  /// A table in the [`DEFAULT_SCHEMA`].
  pub fn main(name: impl Into<String>) -> Result<Self> {
    Self::new(DEFAULT_SCHEMA, name)
  }

  pub fn schema(&self) -> &str { &self.schema }

  pub fn name(&self) -> &str { &self.name }

  /// The conventional staging table for this target: same name, `temp`
  /// schema.
  pub fn staging(&self) -> Self {
    Self { schema: TEMP_SCHEMA.to_owned(), name: self.name.clone() }
  }
}

impl FromStr for TableRef {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.split_once('.') {
      Some((schema, name)) => Self::new(schema, name),
      None => Self::main(s),
    }
  }
}

impl TryFrom<String> for TableRef {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<TableRef> for String {
  fn from(t: TableRef) -> Self { t.to_string() }
}

impl fmt::Display for TableRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.schema, self.name)
  }
}

// ─── NaturalKey ──────────────────────────────────────────────────────────────

/// The ordered set of columns identifying one real-world entity across
/// versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
  pub fn new<I, S>(columns: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    if columns.is_empty() {
      return Err(Error::EmptyNaturalKey);
    }
    for (i, col) in columns.iter().enumerate() {
      validate_identifier(col)?;
      if is_audit_column(col) {
        return Err(Error::ReservedColumn(col.clone()));
      }
      if columns[..i].iter().any(|c| c.eq_ignore_ascii_case(col)) {
        return Err(Error::DuplicateKeyColumn(col.clone()));
      }
    }
    Ok(Self(columns))
  }

  pub fn columns(&self) -> &[String] { &self.0 }

  /// Positions of the key columns within `columns`.
  pub fn positions(&self, columns: &[String]) -> Result<Vec<usize>> {
    self
      .0
      .iter()
      .map(|key| {
        columns
          .iter()
          .position(|c| c.eq_ignore_ascii_case(key))
          .ok_or_else(|| Error::MissingKeyColumn(key.clone()))
      })
      .collect()
  }
}

impl TryFrom<Vec<String>> for NaturalKey {
  type Error = Error;

  fn try_from(columns: Vec<String>) -> Result<Self> { Self::new(columns) }
}

impl From<NaturalKey> for Vec<String> {
  fn from(k: NaturalKey) -> Self { k.0 }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_ref_parses_schema_and_name() {
    let t: TableRef = "ingestion.players".parse().unwrap();
    assert_eq!(t.schema(), "ingestion");
    assert_eq!(t.name(), "players");
    assert_eq!(t.to_string(), "ingestion.players");
  }

  #[test]
  fn table_ref_defaults_to_main() {
    let t: TableRef = "matches".parse().unwrap();
    assert_eq!(t.schema(), DEFAULT_SCHEMA);
    assert_eq!(t.staging().to_string(), "temp.matches");
  }

  #[test]
  fn identifiers_are_validated() {
    assert!(matches!(
      "".parse::<TableRef>(),
      Err(Error::InvalidIdentifier(_, _))
    ));
    assert!(validate_identifier("bad\0name").is_err());
    assert!(validate_identifier("quote\"d").is_ok());
  }

  #[test]
  fn table_ref_serde_is_a_string() {
    let t: TableRef = serde_json::from_str("\"a.b\"").unwrap();
    assert_eq!(t, TableRef::new("a", "b").unwrap());
    assert_eq!(serde_json::to_string(&t).unwrap(), "\"a.b\"");
  }

  #[test]
  fn natural_key_rejects_empty_and_duplicates() {
    assert!(matches!(
      NaturalKey::new(Vec::<String>::new()),
      Err(Error::EmptyNaturalKey)
    ));
    assert!(matches!(
      NaturalKey::new(["url", "URL"]),
      Err(Error::DuplicateKeyColumn(_))
    ));
    assert!(matches!(
      NaturalKey::new(["audit_field_active_flag"]),
      Err(Error::ReservedColumn(_))
    ));
  }

  #[test]
  fn natural_key_positions() {
    let key = NaturalKey::new(["b", "a"]).unwrap();
    let columns = vec!["a".to_owned(), "B".to_owned(), "c".to_owned()];
    assert_eq!(key.positions(&columns).unwrap(), vec![1, 0]);

    let missing = NaturalKey::new(["z"]).unwrap();
    assert!(matches!(
      missing.positions(&columns),
      Err(Error::MissingKeyColumn(c)) if c == "z"
    ));
  }
}

//! Records and batches.
//!
//! A [`Record`] is the schema-less shape scrapers produce: an ordered mapping
//! from column name to [`Value`]. A [`Batch`] turns a sequence of records into
//! uniform rows over the union of their columns, in first-seen order.

use std::collections::HashMap;

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{
  Error, Result,
  audit::is_audit_column,
  table::{NaturalKey, validate_identifier},
  value::{ColumnType, Value, infer_column},
};

// ─── Record ──────────────────────────────────────────────────────────────────

/// An ordered column → value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
  fields: Vec<(String, Value)>,
}

impl Record {
  pub fn new() -> Self { Self::default() }

  /// Builder form of [`insert`](Self::insert).
  pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert(column, value);
    self
  }

  /// Set a column, replacing any existing value in place.
  pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
    let column = column.into();
    let value = value.into();
    match self.fields.iter_mut().find(|(c, _)| *c == column) {
      Some((_, slot)) => *slot = value,
      None => self.fields.push((column, value)),
    }
  }

  pub fn get(&self, column: &str) -> Option<&Value> {
    self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.fields.iter().map(|(c, v)| (c.as_str(), v))
  }

  pub fn len(&self) -> usize { self.fields.len() }

  pub fn is_empty(&self) -> bool { self.fields.is_empty() }

  /// Build a record from a JSON object.
  pub fn from_json(value: serde_json::Value, detect_timestamps: bool) -> Result<Self> {
    match value {
      serde_json::Value::Object(map) => Ok(
        map
          .into_iter()
          .map(|(k, v)| (k, Value::from_json(v, detect_timestamps)))
          .collect(),
      ),
      other => Err(Error::NotAnObject(other.to_string())),
    }
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut record = Self::new();
    for (k, v) in iter {
      record.insert(k, v);
    }
    record
  }
}

impl Serialize for Record {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(self.fields.len()))?;
    for (c, v) in &self.fields {
      map.serialize_entry(c, v)?;
    }
    map.end()
  }
}

// ─── Batch ───────────────────────────────────────────────────────────────────

/// Uniform rows over a fixed column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
  columns: Vec<String>,
  rows:    Vec<Vec<Value>>,
}

impl Batch {
  /// Collect records into uniform rows.
  ///
  /// Columns appear in first-seen order; a record missing a column gets null
  /// there. Null-like values are normalised to null. Column names must be
  /// valid identifiers, must not use the audit prefix and must not differ
  /// from another column only by case.
  pub fn from_records(records: impl IntoIterator<Item = Record>) -> Result<Self> {
    let records: Vec<Record> = records.into_iter().collect();

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
      for (col, _) in record.iter() {
        if columns.iter().any(|c| c == col) {
          continue;
        }
        validate_identifier(col)?;
        if is_audit_column(col) {
          return Err(Error::ReservedColumn(col.to_owned()));
        }
        if let Some(existing) = columns.iter().find(|c| c.eq_ignore_ascii_case(col)) {
          return Err(Error::ConflictingColumns(existing.clone(), col.to_owned()));
        }
        columns.push(col.to_owned());
      }
    }

    let rows = records
      .into_iter()
      .map(|record| {
        let mut row = vec![Value::Null; columns.len()];
        for (col, value) in record.fields {
          if let Some(i) = columns.iter().position(|c| *c == col) {
            row[i] = value.normalized();
          }
        }
        row
      })
      .collect();

    Ok(Self { columns, rows })
  }

  pub fn columns(&self) -> &[String] { &self.columns }

  pub fn rows(&self) -> &[Vec<Value>] { &self.rows }

  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  /// Inferred storage type per column; `None` for null-only columns.
  pub fn column_types(&self) -> Vec<Option<ColumnType>> {
    (0..self.columns.len())
      .map(|i| infer_column(self.rows.iter().map(|row| &row[i])))
      .collect()
  }

  /// Drop earlier rows that share a natural key with a later row.
  ///
  /// The surviving row of each key is its last occurrence, and survivors keep
  /// their relative order. Returns the number of rows removed.
  pub fn dedupe_last_wins(&mut self, key: &NaturalKey) -> Result<usize> {
    let positions = key.positions(&self.columns)?;
    let before = self.rows.len();
    self.rows = last_wins(std::mem::take(&mut self.rows), &positions);
    Ok(before - self.rows.len())
  }

  /// Split into consecutive batches of at most `size` rows over the same
  /// columns. A zero size, or an empty batch, yields the batch unchanged.
  pub fn into_chunks(self, size: usize) -> Vec<Batch> {
    if size == 0 || self.rows.len() <= size {
      return vec![self];
    }
    let Self { columns, rows } = self;
    let mut chunks = Vec::with_capacity(rows.len().div_ceil(size));
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
      chunks.push(Batch {
        columns: columns.clone(),
        rows:    rows.by_ref().take(size).collect(),
      });
    }
    chunks
  }
}

/// Null-safe comparison form of the key columns of one row.
pub fn key_form(row: &[Value], positions: &[usize]) -> Vec<Option<String>> {
  positions.iter().map(|&i| row[i].canonical()).collect()
}

/// Keep the last row of each key, preserving the order of survivors.
pub(crate) fn last_wins(rows: Vec<Vec<Value>>, positions: &[usize]) -> Vec<Vec<Value>> {
  let mut last: HashMap<Vec<Option<String>>, usize> = HashMap::with_capacity(rows.len());
  for (i, row) in rows.iter().enumerate() {
    last.insert(key_form(row, positions), i);
  }
  rows
    .into_iter()
    .enumerate()
    .filter(|(i, row)| last.get(&key_form(row, positions)) == Some(i))
    .map(|(_, row)| row)
    .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Change-set classification: staged rows vs. active target rows.
//!
//! Every natural key seen in either input is placed in exactly one bucket:
//! insert, update, delete or no-change. Comparison is null-safe (null equals
//! null) and numeric values compare by value.

use std::collections::HashMap;

use crate::{
  Error, Result,
  record::{key_form, last_wins},
  table::NaturalKey,
  value::Value,
};

/// An active target row projected onto the staging columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRow {
  /// Storage-level row identifier used to close the row.
  pub row_id: i64,
  pub values: Vec<Value>,
}

/// An active row to close, and the staged values of its successor.
#[derive(Debug, Clone, PartialEq)]
pub struct Supersession {
  pub row_id: i64,
  pub values: Vec<Value>,
}

/// The classified difference between a staging table and its target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
  /// Staged rows with no active counterpart.
  pub inserts:   Vec<Vec<Value>>,
  pub updates:   Vec<Supersession>,
  /// Active rows whose key is absent from staging.
  pub deletes:   Vec<i64>,
  pub unchanged: usize,
  /// Active rows absent from staging that stay active because deletion is
  /// disabled.
  pub retained:  usize,
}

impl ChangeSet {
  pub fn is_noop(&self) -> bool {
    self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
  }
}

/// Classify `staged` rows against `active` target rows.
///
/// Both inputs are aligned with `columns`. Only those columns are compared,
/// so a target column the batch does not carry is not evidence of change.
/// Duplicate staged keys resolve last-row-wins. Two active rows sharing a
/// key violate the one-active-version invariant and fail classification.
pub fn classify(
  columns: &[String],
  key: &NaturalKey,
  staged: Vec<Vec<Value>>,
  active: Vec<ActiveRow>,
  delete_missing_rows: bool,
) -> Result<ChangeSet> {
  let positions = key.positions(columns)?;
  let mut by_key: HashMap<Vec<Option<String>>, usize> =
    HashMap::with_capacity(active.len());
  for (i, row) in active.iter().enumerate() {
    if by_key.insert(key_form(&row.values, &positions), i).is_some() {
      let rendered: Vec<String> =
        positions.iter().map(|&i| row.values[i].to_string()).collect();
      return Err(Error::DuplicateActiveKey(format!("({})", rendered.join(", "))));
    }
  }

  let mut matched = vec![false; active.len()];
  let mut set = ChangeSet::default();

  for row in last_wins(staged, &positions) {
    let Some(&i) = by_key.get(&key_form(&row, &positions)) else {
      set.inserts.push(row);
      continue;
    };
    matched[i] = true;

    let current = &active[i];
    let changed = row
      .iter()
      .zip(&current.values)
      .enumerate()
      .filter(|(c, _)| !positions.contains(c))
      .any(|(_, (new, old))| !new.same_as(old));

    if changed {
      set.updates.push(Supersession { row_id: current.row_id, values: row });
    } else {
      set.unchanged += 1;
    }
  }

  for (row, _) in active.iter().zip(&matched).filter(|(_, m)| !**m) {
    if delete_missing_rows {
      set.deletes.push(row.row_id);
    } else {
      set.retained += 1;
    }
  }

  Ok(set)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn columns() -> Vec<String> { vec!["url".into(), "title".into(), "score".into()] }

  fn key() -> NaturalKey { NaturalKey::new(["url"]).unwrap() }

  fn row(url: &str, title: impl Into<Value>, score: impl Into<Value>) -> Vec<Value> {
    vec![Value::from(url), title.into(), score.into()]
  }

  fn active(row_id: i64, values: Vec<Value>) -> ActiveRow { ActiveRow { row_id, values } }

  #[test]
  fn new_key_is_insert() {
    let set = classify(&columns(), &key(), vec![row("m1", "A", 1_i64)], vec![], false)
      .unwrap();
    assert_eq!(set.inserts, vec![row("m1", "A", 1_i64)]);
    assert!(set.updates.is_empty());
  }

  #[test]
  fn changed_value_is_update() {
    let set = classify(
      &columns(),
      &key(),
      vec![row("m1", "B", 1_i64)],
      vec![active(7, row("m1", "A", 1_i64))],
      false,
    )
    .unwrap();
    assert_eq!(set.updates, vec![Supersession {
      row_id: 7,
      values: row("m1", "B", 1_i64),
    }]);
    assert!(set.inserts.is_empty());
  }

  #[test]
  fn identical_row_is_no_change() {
    let set = classify(
      &columns(),
      &key(),
      vec![row("m1", "A", 1_i64)],
      vec![active(1, row("m1", "A", 1_i64))],
      true,
    )
    .unwrap();
    assert!(set.is_noop());
    assert_eq!(set.unchanged, 1);
  }

  #[test]
  fn shared_nulls_are_not_a_change() {
    let set = classify(
      &columns(),
      &key(),
      vec![row("m1", "A", Value::Null)],
      vec![active(1, row("m1", "A", Value::Null))],
      false,
    )
    .unwrap();
    assert!(set.is_noop());
    assert_eq!(set.unchanged, 1);
  }

  #[test]
  fn null_against_value_is_a_change() {
    let set = classify(
      &columns(),
      &key(),
      vec![row("m1", "A", Value::Null)],
      vec![active(1, row("m1", "A", 3_i64))],
      false,
    )
    .unwrap();
    assert_eq!(set.updates.len(), 1);
  }

  #[test]
  fn integer_and_float_of_same_value_are_equal() {
    let set = classify(
      &columns(),
      &key(),
      vec![row("m1", "A", 3_i64)],
      vec![active(1, row("m1", "A", 3.0))],
      false,
    )
    .unwrap();
    assert!(set.is_noop());
  }

  #[test]
  fn missing_key_deletes_only_when_enabled() {
    let target = vec![active(4, row("gone", "A", 1_i64))];

    let kept = classify(&columns(), &key(), vec![], target.clone(), false).unwrap();
    assert!(kept.deletes.is_empty());
    assert_eq!(kept.retained, 1);
    assert_eq!(kept.unchanged, 0);

    let deleted = classify(&columns(), &key(), vec![], target, true).unwrap();
    assert_eq!(deleted.deletes, vec![4]);
    assert_eq!(deleted.retained, 0);
  }

  #[test]
  fn duplicate_staged_keys_last_row_wins() {
    let set = classify(
      &columns(),
      &key(),
      vec![row("m1", "first", 1_i64), row("m1", "last", 2_i64)],
      vec![active(1, row("m1", "first", 1_i64))],
      false,
    )
    .unwrap();
    assert_eq!(set.updates.len(), 1);
    assert_eq!(set.updates[0].values, row("m1", "last", 2_i64));
    assert!(set.inserts.is_empty());
    assert_eq!(set.unchanged, 0);
  }

  #[test]
  fn duplicate_active_keys_are_rejected() {
    let err = classify(
      &columns(),
      &key(),
      vec![],
      vec![active(1, row("m1", "A", 1_i64)), active(2, row("m1", "B", 1_i64))],
      false,
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateActiveKey(_)));
  }

  #[test]
  fn composite_keys_match_on_all_columns() {
    let key = NaturalKey::new(["url", "score"]).unwrap();
    let set = classify(
      &columns(),
      &key,
      vec![row("m1", "A", 1_i64), row("m1", "A", 2_i64)],
      vec![active(1, row("m1", "A", 1_i64))],
      false,
    )
    .unwrap();
    assert_eq!(set.unchanged, 1);
    assert_eq!(set.inserts, vec![row("m1", "A", 2_i64)]);
  }

  #[test]
  fn null_key_values_match_null_safely() {
    let key = NaturalKey::new(["url", "score"]).unwrap();
    let set = classify(
      &columns(),
      &key,
      vec![row("m1", "B", Value::Null)],
      vec![active(9, row("m1", "A", Value::Null))],
      false,
    )
    .unwrap();
    assert_eq!(set.updates.len(), 1);
    assert_eq!(set.updates[0].row_id, 9);
  }
}

//! Schema reconciliation planning.
//!
//! Compares the columns of a staging table with those of its target table
//! and produces the schema changes that make the target able to hold the
//! staged rows. Applying the plan is the storage backend's job.

use serde::{Deserialize, Serialize};

use crate::{audit::is_audit_column, value::ColumnType};

/// A column as reported by the database.
///
/// `ty` is `None` for a staging column that held only nulls; such a column
/// carries no type evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
  pub name: String,
  pub ty:   Option<ColumnType>,
}

impl ColumnDef {
  pub fn new(name: impl Into<String>, ty: Option<ColumnType>) -> Self {
    Self { name: name.into(), ty }
  }

  /// The type to declare when this column must exist on a durable table.
  pub fn concrete_type(&self) -> ColumnType { self.ty.unwrap_or(ColumnType::Text) }
}

/// Caller-controlled reconciliation behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPolicy {
  /// Drop target columns that the staging table no longer has.
  pub drop_missing_columns: bool,
  /// Alter a target column to the staging type even when that narrows it.
  /// Otherwise the target is only ever widened.
  pub allow_narrowing:      bool,
}

/// One schema change against a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SchemaChange {
  /// The target did not exist and was created with these natural columns
  /// (audit columns are implied).
  CreateTable { columns: Vec<String> },
  Add { column: String, ty: ColumnType },
  Alter { column: String, from: ColumnType, to: ColumnType },
  Drop { column: String },
}

impl SchemaChange {
  /// Application order: adds, then alters, then drops.
  fn rank(&self) -> u8 {
    match self {
      Self::CreateTable { .. } => 0,
      Self::Add { .. } => 1,
      Self::Alter { .. } => 2,
      Self::Drop { .. } => 3,
    }
  }
}

/// Plan the changes that reconcile `target` with `staging`.
///
/// For every non-audit column name in either table:
/// - only in staging: add it (text if the staging column has no evidence);
/// - in both with differing types: alter the target column, widening it to
///   the least upper bound unless [`SchemaPolicy::allow_narrowing`] is set, in
///   which case the staging type is taken verbatim; a staging column without
///   evidence never alters;
/// - only in target: drop it if [`SchemaPolicy::drop_missing_columns`];
/// - otherwise nothing.
///
/// Column names match case-insensitively. The returned plan is ordered adds,
/// alters, drops.
pub fn plan_changes(
  staging: &[ColumnDef],
  target: &[ColumnDef],
  policy: SchemaPolicy,
) -> Vec<SchemaChange> {
  let mut plan = Vec::new();

  for column in staging.iter().filter(|c| !is_audit_column(&c.name)) {
    let existing = target
      .iter()
      .find(|t| t.name.eq_ignore_ascii_case(&column.name));

    let Some(existing) = existing else {
      plan.push(SchemaChange::Add {
        column: column.name.clone(),
        ty:     column.concrete_type(),
      });
      continue;
    };

    let Some(staged) = column.ty else { continue };
    let current = existing.concrete_type();
    let wanted = if policy.allow_narrowing {
      staged
    } else {
      current.widen(staged)
    };
    if wanted != current {
      plan.push(SchemaChange::Alter {
        column: existing.name.clone(),
        from:   current,
        to:     wanted,
      });
    }
  }

  if policy.drop_missing_columns {
    for column in target.iter().filter(|c| !is_audit_column(&c.name)) {
      let staged = staging
        .iter()
        .any(|s| s.name.eq_ignore_ascii_case(&column.name));
      if !staged {
        plan.push(SchemaChange::Drop { column: column.name.clone() });
      }
    }
  }

  plan.sort_by_key(SchemaChange::rank);
  plan
}

//! The `Warehouse` trait and the job / report types that cross it.
//!
//! The trait is implemented by storage backends (e.g.
//! `baseline-store-sqlite`). The ingestion orchestrator depends on this
//! abstraction, not on any concrete backend.

use std::{future::Future, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  audit::VersionRow,
  record::{Batch, Record},
  schema::{SchemaChange, SchemaPolicy},
  table::{NaturalKey, TableRef},
};

// ─── Job ─────────────────────────────────────────────────────────────────────

/// Per-source merge flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
  /// Drop target columns the batch no longer carries.
  #[serde(default)]
  pub drop_missing_columns: bool,
  /// Close active rows whose key is absent from the batch.
  #[serde(default)]
  pub delete_missing_rows:  bool,
  /// Permit schema alters that narrow a target column.
  #[serde(default)]
  pub allow_narrowing:      bool,
}

impl SyncPolicy {
  pub fn schema(self) -> SchemaPolicy {
    SchemaPolicy {
      drop_missing_columns: self.drop_missing_columns,
      allow_narrowing:      self.allow_narrowing,
    }
  }
}

/// Everything a backend needs to merge one batch into one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
  pub target:      TableRef,
  pub staging:     TableRef,
  pub natural_key: NaturalKey,
  pub policy:      SyncPolicy,
}

impl SyncJob {
  /// A job staging through `temp.<target name>` with default flags.
  pub fn new(target: TableRef, natural_key: NaturalKey) -> Self {
    Self {
      staging: target.staging(),
      target,
      natural_key,
      policy: SyncPolicy::default(),
    }
  }

  pub fn with_staging(mut self, staging: TableRef) -> Self {
    self.staging = staging;
    self
  }

  pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
    self.policy = policy;
    self
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
  pub run_id:             Uuid,
  pub target:             TableRef,
  /// Rows written to staging, after duplicate removal.
  pub staged_rows:        usize,
  pub duplicates_dropped: usize,
  pub schema_changes:     Vec<SchemaChange>,
  pub inserted:           usize,
  pub updated:            usize,
  pub deleted:            usize,
  pub unchanged:          usize,
  pub retained:           usize,
  /// The batch was empty; nothing beyond staging cleanup ran.
  pub skipped_empty:      bool,
  pub started_at:         DateTime<Utc>,
  pub finished_at:        DateTime<Utc>,
}

impl MergeReport {
  pub fn new(target: TableRef, started_at: DateTime<Utc>) -> Self {
    Self {
      run_id: Uuid::new_v4(),
      target,
      staged_rows: 0,
      duplicates_dropped: 0,
      schema_changes: Vec::new(),
      inserted: 0,
      updated: 0,
      deleted: 0,
      unchanged: 0,
      retained: 0,
      skipped_empty: false,
      started_at,
      finished_at: started_at,
    }
  }

  /// Rows physically inserted into the target (inserts plus new versions).
  pub fn rows_written(&self) -> usize { self.inserted + self.updated }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a warehouse backend.
///
/// Target tables are append-only: a changed entity gets a new row and its
/// previous row is closed through its audit columns, never rewritten.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded tokio runtime.
pub trait Warehouse: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Stage `batch`, reconcile the target schema, classify and merge, as one
  /// atomic unit. Either every schema and row change of the run commits or
  /// none does.
  fn ingest<'a>(
    &'a self,
    job: &'a SyncJob,
    batch: Batch,
  ) -> impl Future<Output = Result<MergeReport, Self::Error>> + Send + 'a;

  /// Distinct natural key values of the active rows of `target`. A target
  /// that does not exist yet has no keys.
  fn active_keys<'a>(
    &'a self,
    target: &'a TableRef,
    key: &'a NaturalKey,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;

  /// Every stored version of the entity whose columns match `key`, oldest
  /// first.
  fn history<'a>(
    &'a self,
    target: &'a TableRef,
    key: &'a Record,
  ) -> impl Future<Output = Result<Vec<VersionRow>, Self::Error>> + Send + 'a;

  /// Make the database file at `path` available as schema `name`. Attaching
  /// a name that is already attached is a no-op.
  fn attach_schema<'a>(
    &'a self,
    name: &'a str,
    path: &'a Path,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

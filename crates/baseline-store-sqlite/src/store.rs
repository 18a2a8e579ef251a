//! [`SqliteWarehouse`]: the SQLite implementation of [`Warehouse`].

use std::path::Path;

use baseline_core::{
  audit::{AuditColumn, VersionRow, is_audit_column},
  record::{Batch, Record},
  schema::{SchemaChange, SchemaPolicy},
  table::{NaturalKey, TableRef},
  value::ColumnType,
  warehouse::{MergeReport, SyncJob, Warehouse},
};
use chrono::Utc;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};

use crate::{
  Error, Result,
  encode::{RawVersion, decode_value, encode_value},
  merge, reconcile,
  schema::{PRAGMAS, schema_attached, table_columns},
  sql::{column_list, qualified, quote_ident},
  stage::{self, Staged},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A warehouse backed by one SQLite database plus any attached schemas.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// are serialised on the connection's worker thread, so two runs never
/// interleave.
#[derive(Clone)]
pub struct SqliteWarehouse {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteWarehouse {
  /// Open (or create) the database at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let warehouse = Self { conn };
    warehouse.init().await?;
    Ok(warehouse)
  }

  /// Open an in-memory warehouse, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let warehouse = Self { conn };
    warehouse.init().await?;
    Ok(warehouse)
  }

  async fn init(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Load `batch` into `staging` on its own, replacing any previous staging
  /// table of that name. Returns the number of rows staged.
  pub async fn stage(&self, staging: &TableRef, batch: Batch) -> Result<usize> {
    let staging = staging.clone();
    self
      .conn
      .call(move |conn| {
        Ok(in_transaction(conn, |tx| stage::stage(tx, &staging, &batch)))
      })
      .await?
      .map(|staged| staged.rows)
  }

  /// Reconcile `target` against an existing staging table on its own.
  pub async fn reconcile(
    &self,
    target: &TableRef,
    staging: &TableRef,
    policy: SchemaPolicy,
  ) -> Result<Vec<SchemaChange>> {
    let (target, staging) = (target.clone(), staging.clone());
    self
      .conn
      .call(move |conn| {
        Ok(in_transaction(conn, |tx| {
          reconcile::reconcile(tx, &target, &staging, policy)
        }))
      })
      .await?
  }

  /// Natural columns of `target` with their declared types.
  pub async fn columns(&self, target: &TableRef) -> Result<Vec<(String, Option<ColumnType>)>> {
    let target = target.clone();
    self
      .conn
      .call(move |conn| Ok(natural_columns(conn, &target)))
      .await?
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Run `f` in a transaction that commits only if `f` succeeds.
fn in_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction()?;
  let out = f(&tx)?;
  tx.commit()?;
  Ok(out)
}

/// One ingestion run inside a single transaction. Dropping the transaction
/// on an early return rolls back every schema and row change of the run,
/// including the staging table.
fn run_ingest(conn: &mut Connection, job: &SyncJob, mut batch: Batch) -> Result<MergeReport> {
  if job.staging == job.target {
    return Err(Error::StagingIsTarget(job.staging.to_string()));
  }

  let now = Utc::now();
  let mut report = MergeReport::new(job.target.clone(), now);
  let span = tracing::info_span!("merge", table = %job.target, run_id = %report.run_id);
  let _entered = span.enter();
  let tx = conn.transaction()?;

  if batch.is_empty() {
    stage::drop_table(&tx, &job.staging)?;
    tx.commit()?;
    tracing::info!("empty batch, nothing to merge");
    report.skipped_empty = true;
    report.finished_at = Utc::now();
    return Ok(report);
  }

  report.duplicates_dropped = batch.dedupe_last_wins(&job.natural_key)?;
  if report.duplicates_dropped > 0 {
    tracing::warn!(
      dropped = report.duplicates_dropped,
      "batch repeats natural keys; keeping the last row of each"
    );
  }

  let Staged { rows, columns } = stage::stage(&tx, &job.staging, &batch)?;
  report.staged_rows = rows;
  tracing::debug!(staging = %job.staging, rows, "batch staged");

  report.schema_changes =
    reconcile::reconcile(&tx, &job.target, &job.staging, job.policy.schema())?;

  let set = merge::load_changes(
    &tx,
    &job.target,
    &job.staging,
    &columns,
    &job.natural_key,
    job.policy.delete_missing_rows,
  )?;
  let names: Vec<String> = columns.into_iter().map(|c| c.name).collect();
  merge::apply(&tx, &job.target, &names, &set, now)?;

  stage::drop_table(&tx, &job.staging)?;
  tx.commit()?;

  report.inserted = set.inserts.len();
  report.updated = set.updates.len();
  report.deleted = set.deletes.len();
  report.unchanged = set.unchanged;
  report.retained = set.retained;
  report.finished_at = Utc::now();
  Ok(report)
}

/// Non-audit columns of `table`.
fn natural_columns(
  conn: &Connection,
  table: &TableRef,
) -> Result<Vec<(String, Option<ColumnType>)>> {
  Ok(
    table_columns(conn, table)?
      .into_iter()
      .filter(|c| !is_audit_column(&c.name))
      .map(|c| (c.name, c.ty))
      .collect(),
  )
}

/// Resolve `name` against `columns` case-insensitively.
fn find_column<'a>(
  columns: &'a [(String, Option<ColumnType>)],
  name: &str,
) -> Result<&'a (String, Option<ColumnType>)> {
  columns
    .iter()
    .find(|(c, _)| c.eq_ignore_ascii_case(name))
    .ok_or_else(|| baseline_core::Error::MissingKeyColumn(name.to_owned()).into())
}

fn load_active_keys(
  conn: &Connection,
  target: &TableRef,
  key: &NaturalKey,
) -> Result<Vec<Record>> {
  let columns = natural_columns(conn, target)?;
  if columns.is_empty() {
    return Ok(Vec::new());
  }
  let key_columns = key
    .columns()
    .iter()
    .map(|k| find_column(&columns, k).cloned())
    .collect::<Result<Vec<_>>>()?;

  let sql = format!(
    "SELECT {} FROM {} WHERE {} = 1 ORDER BY rowid",
    column_list(key_columns.iter().map(|(c, _)| c.as_str())),
    qualified(target),
    quote_ident(AuditColumn::ActiveFlag.name()),
  );
  let mut stmt = conn.prepare(&sql)?;
  let keys = stmt
    .query_map([], |row| {
      let mut record = Record::new();
      for (i, (name, ty)) in key_columns.iter().enumerate() {
        let raw: SqlValue = row.get(i)?;
        record.insert(name.clone(), decode_value(raw, *ty));
      }
      Ok(record)
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(keys)
}

fn load_history(conn: &Connection, target: &TableRef, key: &Record) -> Result<Vec<VersionRow>> {
  let columns = natural_columns(conn, target)?;
  if columns.is_empty() {
    return Ok(Vec::new());
  }

  let mut filters = Vec::with_capacity(key.len());
  let mut params = Vec::with_capacity(key.len());
  for (name, value) in key.iter() {
    let (column, _) = find_column(&columns, name)?;
    filters.push(format!("{} IS ?{}", quote_ident(column), params.len() + 1));
    params.push(encode_value(value));
  }
  let filter = if filters.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", filters.join(" AND "))
  };

  let audit = column_list(AuditColumn::ALL.iter().map(|a| a.name()));
  let sql = format!(
    "SELECT {}, {audit} FROM {} {filter} ORDER BY rowid",
    column_list(columns.iter().map(|(c, _)| c.as_str())),
    qualified(target),
  );
  tracing::debug!(%sql, "reading history");

  let n = columns.len();
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params_from_iter(params), |row| {
      let values = (0..n)
        .map(|i| row.get::<_, SqlValue>(i))
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(RawVersion {
        values,
        active: row.get(n)?,
        record_type: row.get(n + 1)?,
        start: row.get(n + 2)?,
        end: row.get(n + 3)?,
        inserted: row.get(n + 4)?,
        updated: row.get(n + 5)?,
        deleted: row.get(n + 6)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws
    .into_iter()
    .map(|raw| raw.into_version(&columns))
    .collect()
}

fn attach(conn: &Connection, name: &str, path: &str) -> Result<()> {
  if schema_attached(conn, name)? {
    tracing::debug!(schema = %name, "schema already attached");
    return Ok(());
  }
  tracing::info!(schema = %name, %path, "attaching database");
  conn.execute("ATTACH DATABASE ?1 AS ?2", rusqlite::params![path, name])?;
  Ok(())
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteWarehouse {
  type Error = Error;

  async fn ingest(&self, job: &SyncJob, batch: Batch) -> Result<MergeReport> {
    let job = job.clone();
    self
      .conn
      .call(move |conn| Ok(run_ingest(conn, &job, batch)))
      .await?
  }

  async fn active_keys(&self, target: &TableRef, key: &NaturalKey) -> Result<Vec<Record>> {
    let (target, key) = (target.clone(), key.clone());
    self
      .conn
      .call(move |conn| Ok(load_active_keys(conn, &target, &key)))
      .await?
  }

  async fn history(&self, target: &TableRef, key: &Record) -> Result<Vec<VersionRow>> {
    let (target, key) = (target.clone(), key.clone());
    self
      .conn
      .call(move |conn| Ok(load_history(conn, &target, &key)))
      .await?
  }

  async fn attach_schema(&self, name: &str, path: &Path) -> Result<()> {
    baseline_core::table::validate_identifier(name)?;
    let name = name.to_owned();
    let path = path.to_string_lossy().into_owned();
    self
      .conn
      .call(move |conn| Ok(attach(conn, &name, &path)))
      .await?
  }
}

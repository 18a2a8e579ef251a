//! Change classification against a live target, and applying the result.

use baseline_core::{
  audit::{AuditColumn, RecordType},
  classify::{ActiveRow, ChangeSet, classify},
  schema::ColumnDef,
  table::{NaturalKey, TableRef},
  value::{ColumnType, Value, encode_timestamp},
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};

use crate::{
  Error, Result,
  encode::{decode_value, encode_value},
  schema::table_columns,
  sql::{column_list, placeholders, qualified, quote_ident},
};

/// Classify the rows of `staging` against the active rows of `target`.
///
/// Only the staged columns take part. Staged values are read in the storage
/// type the target declares for their column, so they compare the same way
/// the target stores them.
pub fn load_changes(
  conn: &Connection,
  target: &TableRef,
  staging: &TableRef,
  staged: &[ColumnDef],
  key: &NaturalKey,
  delete_missing_rows: bool,
) -> Result<ChangeSet> {
  let target_columns = table_columns(conn, target)?;
  let target_type = |name: &str| {
    target_columns
      .iter()
      .find(|t| t.name.eq_ignore_ascii_case(name))
      .and_then(|t| t.ty)
  };

  let mut staged_exprs = Vec::with_capacity(staged.len());
  let mut staged_types = Vec::with_capacity(staged.len());
  for column in staged {
    match storage_cast(column.ty, target_type(&column.name)) {
      Some((affinity, ty)) => {
        staged_exprs.push(format!("CAST({} AS {affinity})", quote_ident(&column.name)));
        staged_types.push(Some(ty));
      }
      None => {
        staged_exprs.push(quote_ident(&column.name));
        staged_types.push(column.ty);
      }
    }
  }

  let staged_rows: Vec<Vec<Value>> = read_rows(
    conn,
    &format!(
      "SELECT {} FROM {} ORDER BY rowid",
      staged_exprs.join(", "),
      qualified(staging)
    ),
    &staged_types,
    false,
  )?
  .into_iter()
  .map(|(_, values)| values)
  .collect();

  let active_types: Vec<Option<ColumnType>> =
    staged.iter().map(|c| target_type(&c.name)).collect();
  let active_rows: Vec<ActiveRow> = read_rows(
    conn,
    &format!(
      "SELECT rowid, {} FROM {} WHERE {} = 1 ORDER BY rowid",
      column_list(staged.iter().map(|c| c.name.as_str())),
      qualified(target),
      quote_ident(AuditColumn::ActiveFlag.name()),
    ),
    &active_types,
    true,
  )?
  .into_iter()
  .map(|(row_id, values)| ActiveRow { row_id, values })
  .collect();

  let columns: Vec<String> = staged.iter().map(|c| c.name.clone()).collect();
  Ok(classify(&columns, key, staged_rows, active_rows, delete_missing_rows)?)
}

/// The conversion the target applies when storing a staged value, if any.
///
/// A TEXT column stores every value as text, and a FLOAT column stores
/// integers and booleans as REAL (rounding integers beyond 2^53).
fn storage_cast(
  staged: Option<ColumnType>,
  target: Option<ColumnType>,
) -> Option<(&'static str, ColumnType)> {
  match (staged?, target?) {
    (ColumnType::Text, _) => None,
    (_, ColumnType::Text) => Some(("TEXT", ColumnType::Text)),
    (ColumnType::Integer | ColumnType::Boolean, ColumnType::Float) => {
      Some(("REAL", ColumnType::Float))
    }
    _ => None,
  }
}

/// Run `sql` and decode each row by `types`. With `with_row_id` the first
/// selected column is the row id.
fn read_rows(
  conn: &Connection,
  sql: &str,
  types: &[Option<ColumnType>],
  with_row_id: bool,
) -> Result<Vec<(i64, Vec<Value>)>> {
  tracing::debug!(%sql, "reading rows");
  let offset = usize::from(with_row_id);
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt
    .query_map([], |row| {
      let row_id: i64 = if with_row_id { row.get(0)? } else { 0 };
      let mut values = Vec::with_capacity(types.len());
      for (i, ty) in types.iter().enumerate() {
        let raw: SqlValue = row.get(i + offset)?;
        values.push(decode_value(raw, *ty));
      }
      Ok((row_id, values))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Write `set` into `target`: deletes, then updates, then inserts.
///
/// Every timestamp written uses `now`. Rows are only ever closed, never
/// rewritten: a delete ends the active row, an update ends it and appends
/// its successor.
pub fn apply(
  conn: &Connection,
  target: &TableRef,
  columns: &[String],
  set: &ChangeSet,
  now: DateTime<Utc>,
) -> Result<()> {
  let table = qualified(target);
  let col = |a: AuditColumn| quote_ident(a.name());
  let at = encode_timestamp(now);

  if !set.deletes.is_empty() {
    let sql = format!(
      "UPDATE {table} SET {active} = 0, {kind} = ?1, {end} = ?2, {deleted} = ?2 \
       WHERE rowid = ?3 AND {active} = 1",
      active = col(AuditColumn::ActiveFlag),
      kind = col(AuditColumn::RecordType),
      end = col(AuditColumn::EndDatetimeUtc),
      deleted = col(AuditColumn::DeleteDatetimeUtc),
    );
    tracing::debug!(%sql, rows = set.deletes.len(), "closing deleted rows");
    let mut stmt = conn.prepare(&sql)?;
    for &row_id in &set.deletes {
      let closed =
        stmt.execute(rusqlite::params![RecordType::Delete.as_str(), at, row_id])?;
      if closed != 1 {
        return Err(Error::RowNotActive(row_id));
      }
    }
  }

  let insert_sql = format!(
    "INSERT INTO {table} ({}, {}, {}, {}, {}) VALUES ({}, 1, ?{}, ?{}, ?{})",
    column_list(columns.iter().map(String::as_str)),
    col(AuditColumn::ActiveFlag),
    col(AuditColumn::RecordType),
    col(AuditColumn::StartDatetimeUtc),
    col(AuditColumn::InsertDatetimeUtc),
    placeholders(columns.len()),
    columns.len() + 1,
    columns.len() + 2,
    columns.len() + 3,
  );
  let insert_version = |stmt: &mut rusqlite::Statement<'_>,
                        values: &[Value],
                        kind: RecordType|
   -> Result<()> {
    let params = values
      .iter()
      .map(encode_value)
      .chain([
        SqlValue::Text(kind.as_str().to_owned()),
        SqlValue::Text(at.clone()),
        SqlValue::Text(at.clone()),
      ]);
    stmt.execute(params_from_iter(params))?;
    Ok(())
  };

  if !set.updates.is_empty() {
    let close_sql = format!(
      "UPDATE {table} SET {active} = 0, {end} = ?1, {updated} = ?1 \
       WHERE rowid = ?2 AND {active} = 1",
      active = col(AuditColumn::ActiveFlag),
      end = col(AuditColumn::EndDatetimeUtc),
      updated = col(AuditColumn::UpdateDatetimeUtc),
    );
    tracing::debug!(sql = %close_sql, rows = set.updates.len(), "superseding updated rows");
    let mut close = conn.prepare(&close_sql)?;
    let mut insert = conn.prepare(&insert_sql)?;
    for update in &set.updates {
      if close.execute(rusqlite::params![at, update.row_id])? != 1 {
        return Err(Error::RowNotActive(update.row_id));
      }
      insert_version(&mut insert, &update.values, RecordType::Update)?;
    }
  }

  if !set.inserts.is_empty() {
    tracing::debug!(sql = %insert_sql, rows = set.inserts.len(), "inserting new rows");
    let mut insert = conn.prepare(&insert_sql)?;
    for values in &set.inserts {
      insert_version(&mut insert, values, RecordType::Insert)?;
    }
  }

  Ok(())
}

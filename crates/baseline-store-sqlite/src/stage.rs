//! Loading a batch into its staging table.

use baseline_core::{record::Batch, schema::ColumnDef, table::TableRef};
use rusqlite::{Connection, params_from_iter};

use crate::{
  Result,
  encode::encode_value,
  sql::{ROWID_ALIASES, column_decl, column_list, exec, placeholders, qualified},
};

/// What [`stage`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
  pub rows:    usize,
  pub columns: Vec<ColumnDef>,
}

pub fn drop_table(conn: &Connection, table: &TableRef) -> Result<()> {
  exec(conn, &format!("DROP TABLE IF EXISTS {}", qualified(table)), [])?;
  Ok(())
}

/// Replace `staging` with a table holding exactly the rows of `batch`.
///
/// Any previous staging table of that name is dropped first. Column types are
/// inferred from all values of each column; a column holding only nulls is
/// declared without a type. An empty batch leaves no staging table behind.
pub fn stage(conn: &Connection, staging: &TableRef, batch: &Batch) -> Result<Staged> {
  if let Some(column) = batch
    .columns()
    .iter()
    .find(|c| ROWID_ALIASES.iter().any(|a| c.eq_ignore_ascii_case(a)))
  {
    return Err(baseline_core::Error::ReservedColumn(column.clone()).into());
  }

  drop_table(conn, staging)?;
  if batch.is_empty() || batch.columns().is_empty() {
    tracing::debug!(table = %staging, "nothing to stage");
    return Ok(Staged { rows: 0, columns: Vec::new() });
  }

  let columns: Vec<ColumnDef> = batch
    .columns()
    .iter()
    .zip(batch.column_types())
    .map(|(name, ty)| ColumnDef::new(name.clone(), ty))
    .collect();

  let decls: Vec<String> = columns.iter().map(|c| column_decl(&c.name, c.ty)).collect();
  exec(
    conn,
    &format!("CREATE TABLE {} ({})", qualified(staging), decls.join(", ")),
    [],
  )?;

  let insert = format!(
    "INSERT INTO {} ({}) VALUES ({})",
    qualified(staging),
    column_list(batch.columns().iter().map(String::as_str)),
    placeholders(columns.len()),
  );
  tracing::debug!(sql = %insert, rows = batch.len(), "staging rows");
  let mut stmt = conn.prepare(&insert)?;
  for row in batch.rows() {
    stmt.execute(params_from_iter(row.iter().map(encode_value)))?;
  }

  Ok(Staged { rows: batch.len(), columns })
}

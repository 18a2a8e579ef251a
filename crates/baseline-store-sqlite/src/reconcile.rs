//! Applying schema plans to target tables.
//!
//! SQLite can add and drop columns in place but cannot change a column's
//! declared type, so alters rebuild the table: copy into a fresh table with
//! the new declarations, drop the original, rename the copy.

use baseline_core::{
  audit::AuditColumn,
  schema::{ColumnDef, SchemaChange, SchemaPolicy, plan_changes},
  table::TableRef,
  value::ColumnType,
};
use rusqlite::Connection;

use crate::{
  Error, Result,
  schema::{object_exists, table_columns},
  sql::{column_decl, column_list, exec, qualified, quote_ident},
};

const SCRATCH_PREFIX: &str = "__baseline_rebuild_";
const SCRATCH_ATTEMPTS: usize = 100;

/// Bring `target` in line with the columns of `staging`, creating it with
/// the audit columns if it does not exist. Returns the changes applied.
pub fn reconcile(
  conn: &Connection,
  target: &TableRef,
  staging: &TableRef,
  policy: SchemaPolicy,
) -> Result<Vec<SchemaChange>> {
  let staged = table_columns(conn, staging)?;
  if staged.is_empty() {
    return Err(Error::TableNotFound(staging.to_string()));
  }

  let existing = table_columns(conn, target)?;
  if existing.is_empty() {
    create_target(conn, target, &staged)?;
    return Ok(vec![SchemaChange::CreateTable {
      columns: staged.into_iter().map(|c| c.name).collect(),
    }]);
  }

  let plan = plan_changes(&staged, &existing, policy);
  apply(conn, target, &plan)?;
  Ok(plan)
}

fn create_target(conn: &Connection, target: &TableRef, staged: &[ColumnDef]) -> Result<()> {
  let decls: Vec<String> = staged
    .iter()
    .map(|c| column_decl(&c.name, Some(c.concrete_type())))
    .chain(
      AuditColumn::ALL
        .iter()
        .map(|a| column_decl(a.name(), Some(a.column_type()))),
    )
    .collect();
  tracing::info!(table = %target, columns = staged.len(), "creating target table");
  exec(
    conn,
    &format!("CREATE TABLE {} ({})", qualified(target), decls.join(", ")),
    [],
  )?;
  Ok(())
}

fn apply(conn: &Connection, target: &TableRef, plan: &[SchemaChange]) -> Result<()> {
  let table = qualified(target);

  for change in plan {
    if let SchemaChange::Add { column, ty } = change {
      tracing::info!(table = %target, %column, %ty, "adding column");
      exec(
        conn,
        &format!("ALTER TABLE {table} ADD COLUMN {}", column_decl(column, Some(*ty))),
        [],
      )?;
    }
  }

  let alters: Vec<(&str, ColumnType)> = plan
    .iter()
    .filter_map(|change| match change {
      SchemaChange::Alter { column, from, to } => {
        if to.is_narrower_than(*from) {
          tracing::warn!(table = %target, %column, %from, %to, "narrowing column type");
        } else {
          tracing::info!(table = %target, %column, %from, %to, "altering column type");
        }
        Some((column.as_str(), *to))
      }
      _ => None,
    })
    .collect();
  if !alters.is_empty() {
    rebuild(conn, target, &alters)?;
  }

  for change in plan {
    if let SchemaChange::Drop { column } = change {
      tracing::info!(table = %target, %column, "dropping column");
      exec(
        conn,
        &format!("ALTER TABLE {table} DROP COLUMN {}", quote_ident(column)),
        [],
      )?;
    }
  }

  Ok(())
}

/// Recreate `target` with the declared types in `alters`, keeping every row
/// and its insertion order.
fn rebuild(conn: &Connection, target: &TableRef, alters: &[(&str, ColumnType)]) -> Result<()> {
  let columns = table_columns(conn, target)?;
  let scratch = scratch_table(conn, target)?;

  let decls: Vec<String> = columns
    .iter()
    .map(|c| {
      let ty = alters
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&c.name))
        .map(|(_, ty)| Some(*ty))
        .unwrap_or(c.ty);
      column_decl(&c.name, ty)
    })
    .collect();
  let names = column_list(columns.iter().map(|c| c.name.as_str()));

  exec(
    conn,
    &format!("CREATE TABLE {} ({})", qualified(&scratch), decls.join(", ")),
    [],
  )?;
  exec(
    conn,
    &format!(
      "INSERT INTO {} ({names}) SELECT {names} FROM {} ORDER BY rowid",
      qualified(&scratch),
      qualified(target),
    ),
    [],
  )?;
  exec(conn, &format!("DROP TABLE {}", qualified(target)), [])?;
  exec(
    conn,
    &format!(
      "ALTER TABLE {} RENAME TO {}",
      qualified(&scratch),
      quote_ident(target.name())
    ),
    [],
  )?;
  Ok(())
}

/// A fresh table name in `target`'s schema. Existing objects are never
/// reused or dropped.
fn scratch_table(conn: &Connection, target: &TableRef) -> Result<TableRef> {
  for n in 0..SCRATCH_ATTEMPTS {
    let scratch = TableRef::new(target.schema(), format!("{SCRATCH_PREFIX}{n}"))?;
    if !object_exists(conn, &scratch)? {
      return Ok(scratch);
    }
  }
  Err(Error::NoScratchName(target.schema().to_owned()))
}

//! Statement text helpers.
//!
//! Identifiers are always double-quoted with embedded quotes doubled, so any
//! validated column or table name is safe to splice into SQL. Values are
//! never spliced; they travel as bound parameters.

use baseline_core::{table::TableRef, value::ColumnType};
use rusqlite::{Connection, Params};

use crate::Result;

/// Names SQLite resolves to the implicit row id unless a real column shadows
/// them. The merge addresses rows by `rowid`, so batches may not use them.
pub const ROWID_ALIASES: [&str; 3] = ["rowid", "oid", "_rowid_"];

pub fn quote_ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

/// `"schema"."table"`
pub fn qualified(table: &TableRef) -> String {
  format!("{}.{}", quote_ident(table.schema()), quote_ident(table.name()))
}

/// Comma-separated quoted column names.
pub fn column_list<'a>(columns: impl IntoIterator<Item = &'a str>) -> String {
  columns
    .into_iter()
    .map(quote_ident)
    .collect::<Vec<_>>()
    .join(", ")
}

/// `?1, ?2, …, ?n`
pub fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// A column definition for `CREATE TABLE`. A column without a type is
/// declared without one, so SQLite reports an empty declared type for it.
pub fn column_decl(name: &str, ty: Option<ColumnType>) -> String {
  match ty {
    Some(ty) => format!("{} {}", quote_ident(name), ty.declared()),
    None => quote_ident(name),
  }
}

/// Execute one statement, logging its text at debug level.
pub fn exec(conn: &Connection, sql: &str, params: impl Params) -> Result<usize> {
  tracing::debug!(%sql, "executing statement");
  Ok(conn.execute(sql, params)?)
}

//! Connection setup and catalog introspection.
//!
//! Target and staging tables are discovered at run time, so the store owns no
//! fixed DDL; it only reads what the catalog reports.

use baseline_core::{schema::ColumnDef, table::TableRef, value::ColumnType};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{Result, sql::quote_ident};

/// Executed once per connection.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
";

/// Columns of `table` in declaration order. A table that does not exist has
/// no columns.
pub fn table_columns(conn: &Connection, table: &TableRef) -> Result<Vec<ColumnDef>> {
  let mut stmt =
    conn.prepare("SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
  let columns = stmt
    .query_map(rusqlite::params![table.name(), table.schema()], |row| {
      let name: String = row.get(0)?;
      let declared: String = row.get(1)?;
      Ok(ColumnDef::new(name, ColumnType::from_declared(&declared)))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(columns)
}

pub fn schema_attached(conn: &Connection, name: &str) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM pragma_database_list WHERE name = ?1 COLLATE NOCASE",
        rusqlite::params![name],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

/// Whether any catalog object in `table`'s schema already uses its name.
pub fn object_exists(conn: &Connection, table: &TableRef) -> Result<bool> {
  let sql = format!(
    "SELECT 1 FROM {}.sqlite_master WHERE name = ?1 COLLATE NOCASE",
    quote_ident(table.schema())
  );
  Ok(
    conn
      .query_row(&sql, rusqlite::params![table.name()], |_| Ok(true))
      .optional()?
      .unwrap_or(false),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(PRAGMAS).unwrap();
    conn
  }

  #[test]
  fn connection_setup_leaves_foreign_keys_off() {
    let enabled: i64 = conn()
      .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
      .unwrap();
    assert_eq!(enabled, 0);
  }

  #[test]
  fn object_exists_sees_tables_and_indexes_in_their_schema() {
    let conn = conn();
    conn
      .execute_batch(
        "CREATE TABLE movies (url TEXT);
         CREATE INDEX movies_url ON movies (url);
         CREATE TEMP TABLE scratch (x);",
      )
      .unwrap();

    let main = |name: &str| TableRef::main(name).unwrap();
    assert!(object_exists(&conn, &main("movies")).unwrap());
    assert!(object_exists(&conn, &main("MOVIES")).unwrap());
    assert!(object_exists(&conn, &main("movies_url")).unwrap());
    assert!(!object_exists(&conn, &main("scratch")).unwrap());
    assert!(object_exists(&conn, &TableRef::new("temp", "scratch").unwrap()).unwrap());
  }
}

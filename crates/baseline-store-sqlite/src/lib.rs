//! SQLite backend for the baseline merge engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Schemas are SQLite schema names:
//! `main`, `temp`, or any database attached with
//! [`Warehouse::attach_schema`](baseline_core::warehouse::Warehouse::attach_schema).

mod encode;
mod merge;
mod reconcile;
mod schema;
mod sql;
mod stage;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteWarehouse;

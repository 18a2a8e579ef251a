//! Core types and trait definitions for the baseline merge engine.
//!
//! This crate is deliberately free of database dependencies: it owns the
//! value model, type inference, schema planning and change classification.
//! Storage backends implement [`warehouse::Warehouse`] on top of it.

pub mod audit;
pub mod classify;
pub mod error;
pub mod record;
pub mod schema;
pub mod table;
pub mod value;
pub mod warehouse;

pub use error::{Error, Result};

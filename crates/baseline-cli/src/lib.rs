//! Ingestion orchestrator for the baseline merge engine.
//!
//! Reads per-source configuration, loads each source's batch file and merges
//! it into its target through a [`Warehouse`](baseline_core::warehouse::Warehouse).

pub mod batch;
pub mod config;
pub mod run;

//! Ingestion orchestration: one merge per configured source, with failures
//! isolated per source.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use baseline_core::{
  record::Batch,
  warehouse::{MergeReport, Warehouse},
};
use baseline_store_sqlite::SqliteWarehouse;
use tracing::Instrument as _;

use crate::{
  batch::load_batch,
  config::{Settings, SourceConfig},
};

/// Open the configured database and attach every configured schema.
pub async fn open_warehouse(settings: &Settings) -> Result<SqliteWarehouse> {
  let path = expand_tilde(&settings.database);
  let warehouse = SqliteWarehouse::open(&path)
    .await
    .with_context(|| format!("failed to open database at {path:?}"))?;

  for schema in &settings.schemas {
    let path = expand_tilde(&schema.path);
    warehouse
      .attach_schema(&schema.name, &path)
      .await
      .with_context(|| format!("failed to attach {path:?} as {}", schema.name))?;
  }
  Ok(warehouse)
}

/// Merge `batch` into the source's target, one chunk at a time when the
/// source sets `chunk_size`. Stops at the first failing chunk; chunks merged
/// before it stay committed.
pub async fn run_source<W: Warehouse>(
  warehouse: &W,
  source: &SourceConfig,
  batch: Batch,
) -> Result<Vec<MergeReport>> {
  let job = source.job();
  let chunks = match source.chunk_size {
    Some(size) => batch.into_chunks(size),
    None => vec![batch],
  };

  let total = chunks.len();
  let mut reports = Vec::with_capacity(total);
  for (i, chunk) in chunks.into_iter().enumerate() {
    let report = warehouse
      .ingest(&job, chunk)
      .await
      .with_context(|| format!("merging chunk {} of {total} into {}", i + 1, job.target))?;
    tracing::info!(
      run_id = %report.run_id,
      table = %report.target,
      inserted = report.inserted,
      updated = report.updated,
      deleted = report.deleted,
      unchanged = report.unchanged,
      schema_changes = report.schema_changes.len(),
      "merge finished"
    );
    reports.push(report);
  }
  Ok(reports)
}

/// Outcome of [`run_sources`].
#[derive(Debug, Default)]
pub struct RunSummary {
  pub reports: Vec<(String, MergeReport)>,
  pub failed:  Vec<(String, anyhow::Error)>,
}

impl RunSummary {
  pub fn is_success(&self) -> bool { self.failed.is_empty() }
}

/// Load and merge each source in turn. A failing source is logged and
/// recorded; the remaining sources still run.
pub async fn run_sources<'a, W: Warehouse>(
  warehouse: &W,
  sources: impl IntoIterator<Item = &'a SourceConfig>,
) -> RunSummary {
  let mut summary = RunSummary::default();

  for source in sources {
    let span = tracing::info_span!("ingest", source = %source.name);
    let result = async {
      let batch = load_batch(&source.input, source.detect_timestamps)?;
      tracing::debug!(rows = batch.len(), input = %source.input.display(), "batch loaded");
      run_source(warehouse, source, batch).await
    }
    .instrument(span.clone())
    .await;

    match result {
      Ok(reports) => summary
        .reports
        .extend(reports.into_iter().map(|r| (source.name.clone(), r))),
      Err(e) => {
        let error = format!("{e:#}");
        tracing::error!(parent: &span, %error, "source failed");
        summary.failed.push((source.name.clone(), e));
      }
    }
  }

  summary
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

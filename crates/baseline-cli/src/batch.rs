//! Reading batch files.
//!
//! A `.json` file holds one array of flat objects; `.ndjson` and `.jsonl`
//! files hold one object per line. Blank lines are skipped.

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use baseline_core::record::{Batch, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  Json,
  Ndjson,
}

impl Format {
  pub fn from_path(path: &Path) -> Result<Self> {
    let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase);
    match ext.as_deref() {
      Some("json") => Ok(Self::Json),
      Some("ndjson" | "jsonl") => Ok(Self::Ndjson),
      _ => bail!("unsupported batch file {}: expected .json, .ndjson or .jsonl", path.display()),
    }
  }
}

pub fn load_batch(path: &Path, detect_timestamps: bool) -> Result<Batch> {
  let format = Format::from_path(path)?;
  let text = std::fs::read_to_string(path)
    .with_context(|| format!("reading batch file {}", path.display()))?;
  parse_batch(&text, format, detect_timestamps)
    .with_context(|| format!("parsing batch file {}", path.display()))
}

pub fn parse_batch(text: &str, format: Format, detect_timestamps: bool) -> Result<Batch> {
  let values: Vec<serde_json::Value> = match format {
    Format::Json => serde_json::from_str(text).context("expected a JSON array of objects")?,
    Format::Ndjson => text
      .lines()
      .enumerate()
      .filter(|(_, line)| !line.trim().is_empty())
      .map(|(i, line)| {
        serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
      })
      .collect::<Result<_>>()?,
  };

  let records = values
    .into_iter()
    .map(|value| Record::from_json(value, detect_timestamps))
    .collect::<baseline_core::Result<Vec<_>>>()?;
  Ok(Batch::from_records(records)?)
}

//! Runtime configuration, deserialised from `baseline.toml` and `BASELINE_*`
//! environment variables.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, bail};
use baseline_core::{
  table::{DEFAULT_SCHEMA, NaturalKey, TEMP_SCHEMA, TableRef},
  warehouse::{SyncJob, SyncPolicy},
};
use serde::Deserialize;

fn default_database() -> PathBuf { PathBuf::from("baseline.db") }

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// The database opened as schema `main`.
  #[serde(default = "default_database")]
  pub database: PathBuf,
  /// Additional database files, attached under their schema names.
  #[serde(default)]
  pub schemas:  Vec<SchemaConfig>,
  #[serde(default)]
  pub sources:  Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
  pub name: String,
  pub path: PathBuf,
}

/// One batch input and where it merges to.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
  pub name:                 String,
  pub target:               TableRef,
  /// Defaults to `temp.<target table>`.
  #[serde(default)]
  pub staging:              Option<TableRef>,
  pub natural_key:          NaturalKey,
  #[serde(default)]
  pub drop_missing_columns: bool,
  #[serde(default)]
  pub delete_missing_rows:  bool,
  #[serde(default)]
  pub allow_narrowing:      bool,
  /// Read RFC 3339 strings in the input as timestamps.
  #[serde(default)]
  pub detect_timestamps:    bool,
  /// Merge the batch in consecutive chunks of this many rows.
  #[serde(default)]
  pub chunk_size:           Option<usize>,
  pub input:                PathBuf,
}

impl SourceConfig {
  pub fn policy(&self) -> SyncPolicy {
    SyncPolicy {
      drop_missing_columns: self.drop_missing_columns,
      delete_missing_rows:  self.delete_missing_rows,
      allow_narrowing:      self.allow_narrowing,
    }
  }

  pub fn job(&self) -> SyncJob {
    let job = SyncJob::new(self.target.clone(), self.natural_key.clone())
      .with_policy(self.policy());
    match &self.staging {
      Some(staging) => job.with_staging(staging.clone()),
      None => job,
    }
  }
}

impl Settings {
  /// Read `path` (if it exists) and overlay `BASELINE_*` variables.
  pub fn load(path: &Path) -> Result<Self> {
    Self::build(
      config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("BASELINE")),
    )
  }

  fn build(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> Result<Self> {
    let settings: Self = builder
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise Settings")?;
    settings.validate()?;
    Ok(settings)
  }

  pub fn validate(&self) -> Result<()> {
    let mut schemas = HashSet::new();
    for schema in &self.schemas {
      baseline_core::table::validate_identifier(&schema.name)?;
      let name = schema.name.to_ascii_lowercase();
      if name == DEFAULT_SCHEMA || name == TEMP_SCHEMA {
        bail!("schema name {:?} is reserved", schema.name);
      }
      if !schemas.insert(name) {
        bail!("schema {:?} is configured more than once", schema.name);
      }
    }

    let mut names = HashSet::new();
    for source in &self.sources {
      if source.name.trim().is_empty() {
        bail!("source names may not be empty");
      }
      if !names.insert(source.name.as_str()) {
        bail!("source {:?} is configured more than once", source.name);
      }
      if source.staging.as_ref() == Some(&source.target) {
        bail!("source {:?}: staging table must differ from the target", source.name);
      }
      match source.chunk_size {
        Some(0) => bail!("source {:?}: chunk_size must be positive", source.name),
        Some(_) if source.delete_missing_rows => bail!(
          "source {:?}: chunk_size cannot be combined with delete_missing_rows",
          source.name
        ),
        _ => {}
      }
    }
    Ok(())
  }

  pub fn source(&self, name: &str) -> Result<&SourceConfig> {
    self
      .sources
      .iter()
      .find(|s| s.name == name)
      .with_context(|| format!("no source named {name:?}"))
  }

  /// The named sources in the order given, or every source when `names` is
  /// empty.
  pub fn select(&self, names: &[String]) -> Result<Vec<&SourceConfig>> {
    if names.is_empty() {
      return Ok(self.sources.iter().collect());
    }
    names.iter().map(|name| self.source(name)).collect()
  }
}

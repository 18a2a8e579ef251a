//! `baseline`: merge batch files into versioned target tables.
//!
//! Reads `baseline.toml` (or the path given with `--config`), opens the
//! configured SQLite database and runs the requested command.
//!
//! ```
//! baseline ingest
//! baseline ingest --source players --json
//! baseline active-keys --source players
//! baseline history --source players --key player_url=https://example.org/p/1
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use baseline_cli::{
  config::Settings,
  run::{open_warehouse, run_sources},
};
use baseline_core::{record::Record, warehouse::Warehouse};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Batch table sync with full version history")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "baseline.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Merge every configured source, or only the named ones.
  Ingest {
    #[arg(short, long = "source", value_name = "NAME")]
    sources: Vec<String>,

    /// Print one JSON merge report per line.
    #[arg(long)]
    json: bool,
  },

  /// Print the natural keys of a source's active rows as JSON lines.
  ActiveKeys {
    #[arg(short, long, value_name = "NAME")]
    source: String,
  },

  /// Print every stored version of one entity as JSON lines.
  History {
    #[arg(short, long, value_name = "NAME")]
    source: String,

    /// Key column and value, e.g. `--key url=m1`. Repeat for composite keys.
    #[arg(short, long, value_name = "COLUMN=VALUE", required = true, value_parser = parse_key_value)]
    key: Vec<(String, String)>,
  },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .ok_or_else(|| format!("expected COLUMN=VALUE, got {s:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let warehouse = open_warehouse(&settings).await?;

  match cli.command {
    Command::Ingest { sources, json } => {
      let selected = settings.select(&sources)?;
      let total = selected.len();
      let summary = run_sources(&warehouse, selected).await;

      for (source, report) in &summary.reports {
        if json {
          println!("{}", serde_json::to_string(report)?);
        } else {
          println!(
            "{source}: {} inserted, {} updated, {} deleted, {} unchanged",
            report.inserted, report.updated, report.deleted, report.unchanged
          );
        }
      }
      if !summary.is_success() {
        bail!("{} of {total} sources failed", summary.failed.len());
      }
    }

    Command::ActiveKeys { source } => {
      let source = settings.source(&source)?;
      let keys = warehouse
        .active_keys(&source.target, &source.natural_key)
        .await
        .with_context(|| format!("reading active keys of {}", source.target))?;
      for key in keys {
        println!("{}", serde_json::to_string(&key)?);
      }
    }

    Command::History { source, key } => {
      let source = settings.source(&source)?;
      let key: Record = key.into_iter().collect();
      let versions = warehouse
        .history(&source.target, &key)
        .await
        .with_context(|| format!("reading history of {}", source.target))?;
      for version in versions {
        println!("{}", serde_json::to_string(&version)?);
      }
    }
  }

  Ok(())
}

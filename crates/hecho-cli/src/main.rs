//! `hecho`: batch loads from the open-data portal into the lake and the
//! warehouse, plus the health and catch-up checks a scheduler runs.
//!
//! # Usage
//!
//! ```
//! hecho lake --initial
//! hecho lake --dataset incidents --batch-size 500
//! hecho warehouse --incremental
//! hecho catchup --lake || hecho lake --incremental
//! ```
//!
//! Settings come from `hecho.toml` (or `--config <FILE>`) overlaid with
//! `HECHO_*` environment variables, e.g. `HECHO_SOURCE__API_KEY`.

mod commands;

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::Context as _;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use hecho_core::settings::{LogFormat, Settings};
use tracing::{Instrument as _, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hecho", version, about = "Open-data ETL: source → lake → warehouse")]
struct Cli {
  /// Path to the TOML configuration file (optional).
  #[arg(short, long, global = true, default_value = "hecho.toml", value_name = "FILE")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Land source datasets in the raw lake.
  Lake(LakeArgs),
  /// Build the star schema from the lake.
  Warehouse(WarehouseArgs),
  /// Report store connectivity, recent loads and data freshness.
  Health(HealthArgs),
  /// Exit 1 when a scheduled load is due, 0 otherwise.
  Catchup(CatchupArgs),
}

impl Command {
  fn name(&self) -> &'static str {
    match self {
      Self::Lake(_) => "lake",
      Self::Warehouse(_) => "warehouse",
      Self::Health(_) => "health",
      Self::Catchup(_) => "catchup",
    }
  }
}

#[derive(Args, Debug)]
#[command(group(
  ArgGroup::new("mode").required(true).multiple(true).args(["initial", "incremental", "dataset"])
))]
struct LakeArgs {
  /// Full load: catalogs then every incident.
  #[arg(long, conflicts_with = "incremental")]
  initial: bool,

  /// Only incidents newer than the lake watermark.
  #[arg(long)]
  incremental: bool,

  /// Load a single dataset.
  #[arg(long, value_enum)]
  dataset: Option<DatasetArg>,

  /// Page and insert batch size (default from settings).
  #[arg(long, value_name = "N")]
  batch_size: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DatasetArg {
  Incidents,
  Departments,
  Municipalities,
  All,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("mode").required(true).args(["initial", "incremental"])))]
struct WarehouseArgs {
  /// Refresh every dimension and resolve all raw incidents.
  #[arg(long)]
  initial: bool,

  /// Refresh dimensions and load facts past the fact watermark.
  #[arg(long)]
  incremental: bool,

  /// Fact batch size for the initial load (default from settings).
  #[arg(long, value_name = "N")]
  batch_size: Option<usize>,
}

#[derive(Args, Debug)]
struct HealthArgs {
  /// Also ask the source for its latest occurrence date.
  #[arg(long)]
  check_source: bool,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("stage").required(true).args(["lake", "warehouse"])))]
struct CatchupArgs {
  #[arg(long)]
  lake: bool,

  #[arg(long)]
  warehouse: bool,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  let cli = Cli::parse();

  let settings = load_settings(&cli.config)?;
  init_tracing(settings.logging.format);

  let span = tracing::info_span!(
    "run",
    run_id = %uuid::Uuid::new_v4(),
    command = cli.command.name(),
  );

  async move {
    match cli.command {
      Command::Lake(args) => commands::lake(&settings, args).await,
      Command::Warehouse(args) => commands::warehouse(&settings, args).await,
      Command::Health(args) => commands::health(&settings, args).await,
      Command::Catchup(args) => commands::catchup(&settings, args).await,
    }
  }
  .instrument(span)
  .await
}

/// Defaults, then the optional TOML file, then `HECHO_*` variables.
fn load_settings(path: &Path) -> anyhow::Result<Settings> {
  let settings: Settings = config::Config::builder()
    .add_source(
      config::Config::try_from(&Settings::default()).context("failed to encode default settings")?,
    )
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("HECHO")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .with_context(|| format!("failed to read configuration from {}", path.display()))?
    .try_deserialize()
    .context("failed to deserialise settings")?;

  settings.validate().context("invalid settings")?;
  Ok(settings)
}

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();

  match format {
    LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
  }
}

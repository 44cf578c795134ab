//! Subcommand bodies. Each returns the process exit code.

use std::process::ExitCode;

use anyhow::Context as _;
use chrono::Utc;
use hecho_core::{
  dataset::CatalogKind,
  schedule::{LoadSchedule, Verdict},
  settings::Settings,
};
use hecho_etl::{
  LakeLoader, WarehouseLoader,
  catchup::{lake_last_success, warehouse_last_success},
  health::{STALE_AFTER_DAYS, health_report},
};
use hecho_source::SodaClient;
use hecho_store_sqlite::{Gateway, Schema};
use tracing::{error, info, warn};

use crate::{CatchupArgs, DatasetArg, HealthArgs, LakeArgs, WarehouseArgs};

async fn open_lake(settings: &Settings) -> anyhow::Result<Gateway> {
  Gateway::open(&settings.lake, Schema::Lake)
    .await
    .with_context(|| format!("failed to open lake at {}", settings.lake.path.display()))
}

async fn open_warehouse(settings: &Settings) -> anyhow::Result<Gateway> {
  Gateway::open(&settings.warehouse, Schema::Warehouse).await.with_context(|| {
    format!("failed to open warehouse at {}", settings.warehouse.path.display())
  })
}

fn source_client(settings: &Settings) -> anyhow::Result<SodaClient> {
  SodaClient::new(settings.source.clone()).context("failed to build source client")
}

// ─── lake ────────────────────────────────────────────────────────────────────

pub async fn lake(settings: &Settings, args: LakeArgs) -> anyhow::Result<ExitCode> {
  let batch_size = args.batch_size.unwrap_or(settings.load.batch_size);

  let lake = open_lake(settings).await?;
  if !lake.test_connection().await {
    error!("lake store is unreachable");
    return Ok(ExitCode::FAILURE);
  }

  let loader = LakeLoader::new(source_client(settings)?, lake)
    .with_page_delay(settings.source.page_delay());

  match (args.dataset, args.initial) {
    (None, true) => {
      let summary = loader.load_all_initial(batch_size).await?;
      println!(
        "lake initial load: {} departments, {} municipalities, {} incidents",
        summary.departments, summary.municipalities, summary.incidents
      );
    }
    (None, false) | (Some(DatasetArg::Incidents), false) => {
      let loaded = loader.load_incidents_incremental(batch_size).await?;
      println!("incidents (incremental): {loaded} new rows");
    }
    (Some(DatasetArg::Incidents), true) => {
      let loaded = loader.load_incidents_initial(batch_size).await?;
      println!("incidents (initial): {loaded} new rows");
    }
    (Some(DatasetArg::Departments), _) => {
      let loaded = loader.load_catalog_once(CatalogKind::Departments).await?;
      println!("departments: {loaded} rows");
    }
    (Some(DatasetArg::Municipalities), _) => {
      let loaded = loader.load_catalog_once(CatalogKind::Municipalities).await?;
      println!("municipalities: {loaded} rows");
    }
    (Some(DatasetArg::All), initial) => {
      let departments = loader.load_catalog_once(CatalogKind::Departments).await?;
      let municipalities = loader.load_catalog_once(CatalogKind::Municipalities).await?;
      let incidents = if initial {
        loader.load_incidents_initial(batch_size).await?
      } else {
        loader.load_incidents_incremental(batch_size).await?
      };
      println!(
        "lake load: {departments} departments, {municipalities} municipalities, \
         {incidents} incidents"
      );
    }
  }

  Ok(ExitCode::SUCCESS)
}

// ─── warehouse ───────────────────────────────────────────────────────────────

pub async fn warehouse(settings: &Settings, args: WarehouseArgs) -> anyhow::Result<ExitCode> {
  let lake = open_lake(settings).await?;
  let warehouse = open_warehouse(settings).await?;
  if !(lake.test_connection().await && warehouse.test_connection().await) {
    error!("lake or warehouse store is unreachable");
    return Ok(ExitCode::FAILURE);
  }

  let loader = WarehouseLoader::new(lake, warehouse);
  let summary = if args.initial {
    let batch_size = args.batch_size.unwrap_or(settings.load.fact_batch_size);
    loader.load_all_initial(batch_size).await?
  } else {
    loader.load_incremental().await?
  };

  println!("warehouse {} ({} ms):", summary.process, summary.elapsed_ms);
  for (table, count) in &summary.table_counts {
    println!("  {table:<18} {count}");
  }
  println!("  {:<18} {}", "total", summary.total());
  Ok(ExitCode::SUCCESS)
}

// ─── health ──────────────────────────────────────────────────────────────────

pub async fn health(settings: &Settings, args: HealthArgs) -> anyhow::Result<ExitCode> {
  let lake = open_lake(settings).await?;
  let warehouse = open_warehouse(settings).await?;

  let client = if args.check_source { Some(source_client(settings)?) } else { None };
  let report = health_report(&lake, &warehouse, client.as_ref()).await?;

  let status = |ok: bool| if ok { "ok" } else { "UNREACHABLE" };
  println!("lake:      {}", status(report.lake_connected));
  println!("warehouse: {}", status(report.warehouse_connected));

  println!("\nrecent lake loads:");
  if report.recent_loads.is_empty() {
    println!("  (none)");
  }
  for load in &report.recent_loads {
    println!(
      "  {}  {:<14} {:<11} {:>8}  {}{}",
      load.completed_at.format("%Y-%m-%d %H:%M"),
      load.dataset,
      load.load_type,
      load.records,
      load.status,
      load.error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default(),
    );
  }

  let stats = &report.incidents;
  println!("\nraw incidents: {}", stats.total);
  if let (Some(first), Some(last)) = (stats.first_occurrence, stats.last_occurrence) {
    println!("  occurrences: {first} .. {last}");
  }
  if let Some(loaded_at) = stats.last_loaded_at {
    println!("  last loaded: {}", loaded_at.format("%Y-%m-%d %H:%M:%S UTC"));
  }
  if let Some(days) = stats.days_since_last {
    let note = if stats.is_stale() {
      format!(" (stale: more than {STALE_AFTER_DAYS} days)")
    } else {
      String::new()
    };
    println!("  days since last occurrence: {days}{note}");
  }
  if let Some(latest) = report.source_latest {
    println!("  latest at source: {latest}");
  }

  if report.is_healthy() {
    Ok(ExitCode::SUCCESS)
  } else {
    warn!("health check found problems");
    Ok(ExitCode::FAILURE)
  }
}

// ─── catchup ─────────────────────────────────────────────────────────────────

pub async fn catchup(settings: &Settings, args: CatchupArgs) -> anyhow::Result<ExitCode> {
  let (stage, schedule, last_success) = if args.lake {
    let lake = open_lake(settings).await?;
    ("lake", settings.schedule.lake, lake_last_success(&lake).await?)
  } else {
    let warehouse = open_warehouse(settings).await?;
    ("warehouse", settings.schedule.warehouse, warehouse_last_success(&warehouse).await?)
  };

  let verdict = schedule.evaluate(last_success, Utc::now());
  report_verdict(stage, &schedule, verdict);

  Ok(if verdict.is_due() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn report_verdict(stage: &str, schedule: &LoadSchedule, verdict: Verdict) {
  match verdict {
    Verdict::NeverLoaded => {
      warn!(stage, "no successful load recorded");
      println!("{stage}: load due (never loaded)");
    }
    Verdict::Overdue { days } => {
      warn!(stage, days, "last successful load is overdue");
      println!(
        "{stage}: load due ({days} days since last success, limit {})",
        schedule.max_days_between_loads
      );
    }
    Verdict::MissedScheduledDay { scheduled } => {
      warn!(stage, %scheduled, "scheduled load was missed");
      println!("{stage}: load due (missed scheduled {} {scheduled})", schedule.weekday);
    }
    Verdict::UpToDate => {
      info!(stage, "up to date");
      println!("{stage}: up to date");
    }
  }
}

//! Operational health report over the lake and warehouse stores.

use chrono::{DateTime, NaiveDate, Utc};
use hecho_core::{
  audit::LoadAudit,
  dataset::{DatasetKind, LoadStatus, LoadType},
  source::{RecordSource, latest_occurrence_date},
};
use hecho_store_sqlite::{Gateway, encode};
use serde::Serialize;
use tracing::{info, warn};

use crate::Result;

/// Occurrence data older than this many days is reported as stale.
pub const STALE_AFTER_DAYS: i64 = 30;

/// How many `data_load_log` entries the report includes.
pub const RECENT_LOADS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
  pub checked_at:          DateTime<Utc>,
  pub lake_connected:      bool,
  pub warehouse_connected: bool,
  /// Newest first.
  pub recent_loads:        Vec<LoadAudit>,
  pub incidents:           IncidentStats,
  /// Latest occurrence date published by the source, when it was asked.
  pub source_latest:       Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentStats {
  pub total:            u64,
  pub first_occurrence: Option<NaiveDate>,
  pub last_occurrence:  Option<NaiveDate>,
  pub last_loaded_at:   Option<DateTime<Utc>>,
  pub days_since_last:  Option<i64>,
}

impl IncidentStats {
  fn empty() -> Self {
    Self {
      total:            0,
      first_occurrence: None,
      last_occurrence:  None,
      last_loaded_at:   None,
      days_since_last:  None,
    }
  }

  pub fn is_stale(&self) -> bool {
    self.days_since_last.is_some_and(|days| days > STALE_AFTER_DAYS)
  }
}

impl HealthReport {
  /// Both stores reachable and the lake not stale.
  pub fn is_healthy(&self) -> bool {
    self.lake_connected && self.warehouse_connected && !self.incidents.is_stale()
  }
}

/// Gather the health report. `source` is only queried when given.
pub async fn health_report<S: RecordSource>(
  lake: &Gateway,
  warehouse: &Gateway,
  source: Option<&S>,
) -> Result<HealthReport> {
  let checked_at = Utc::now();
  let lake_connected = lake.test_connection().await;
  let warehouse_connected = warehouse.test_connection().await;

  let (recent_loads, incidents) = if lake_connected {
    (recent_loads(lake).await?, incident_stats(lake, checked_at.date_naive()).await?)
  } else {
    (Vec::new(), IncidentStats::empty())
  };

  let source_latest = match source {
    Some(source) => latest_occurrence_date(source).await?,
    None => None,
  };

  if incidents.is_stale() {
    warn!(days = ?incidents.days_since_last, "lake incident data is stale");
  }
  info!(lake_connected, warehouse_connected, total = incidents.total, "health check complete");

  Ok(HealthReport {
    checked_at,
    lake_connected,
    warehouse_connected,
    recent_loads,
    incidents,
    source_latest,
  })
}

async fn recent_loads(lake: &Gateway) -> Result<Vec<LoadAudit>> {
  type Raw = (String, String, i64, String, String, String, Option<String>);

  let raws: Vec<Raw> = lake
    .query(
      format!(
        "SELECT dataset, load_type, records_loaded, started_at, completed_at, status, error_message
         FROM data_load_log ORDER BY completed_at DESC, id DESC LIMIT {RECENT_LOADS}"
      ),
      Vec::new(),
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?)),
    )
    .await?;

  let mut loads = Vec::with_capacity(raws.len());
  for (dataset, load_type, records, started_at, completed_at, status, error) in raws {
    let (Ok(dataset), Ok(load_type), Ok(status)) = (
      dataset.parse::<DatasetKind>(),
      load_type.parse::<LoadType>(),
      status.parse::<LoadStatus>(),
    ) else {
      warn!(%dataset, %load_type, %status, "unrecognised data_load_log row");
      continue;
    };
    loads.push(LoadAudit {
      dataset,
      load_type,
      records: records.max(0) as u64,
      started_at: encode::decode_dt(&started_at)?,
      completed_at: encode::decode_dt(&completed_at)?,
      status,
      error,
    });
  }
  Ok(loads)
}

async fn incident_stats(lake: &Gateway, today: NaiveDate) -> Result<IncidentStats> {
  let row: Option<(i64, Option<String>, Option<String>, Option<String>)> = lake
    .query_row(
      "SELECT COUNT(*), MIN(occurred_on), MAX(occurred_on), MAX(loaded_at) FROM raw_incidents",
      Vec::new(),
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )
    .await?;
  let Some((total, first, last, loaded)) = row else { return Ok(IncidentStats::empty()) };

  let last_occurrence = last.as_deref().map(encode::decode_date).transpose()?;
  Ok(IncidentStats {
    total: total.max(0) as u64,
    first_occurrence: first.as_deref().map(encode::decode_date).transpose()?,
    last_occurrence,
    last_loaded_at: loaded.as_deref().map(encode::decode_dt).transpose()?,
    days_since_last: last_occurrence.map(|day| (today - day).num_days()),
  })
}

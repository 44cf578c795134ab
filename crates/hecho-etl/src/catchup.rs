//! Last-success lookups that feed [`LoadSchedule::evaluate`].
//!
//! [`LoadSchedule::evaluate`]: hecho_core::schedule::LoadSchedule::evaluate

use chrono::{DateTime, Utc};
use hecho_core::dataset::{DatasetKind, LoadStatus};
use hecho_store_sqlite::{Gateway, Value, encode};

use crate::Result;

/// Completion time of the latest successful incident load in the lake.
pub async fn lake_last_success(lake: &Gateway) -> Result<Option<DateTime<Utc>>> {
  last_success(
    lake,
    "SELECT MAX(completed_at) FROM data_load_log WHERE dataset = ?1 AND status = ?2",
    vec![
      Value::Text(DatasetKind::Incidents.to_string()),
      Value::Text(LoadStatus::Success.to_string()),
    ],
  )
  .await
}

/// Completion time of the latest successful warehouse run.
pub async fn warehouse_last_success(warehouse: &Gateway) -> Result<Option<DateTime<Utc>>> {
  last_success(
    warehouse,
    "SELECT MAX(completed_at) FROM etl_log WHERE status = ?1",
    vec![Value::Text(LoadStatus::Success.to_string())],
  )
  .await
}

async fn last_success(
  gateway: &Gateway,
  sql: &'static str,
  params: Vec<Value>,
) -> Result<Option<DateTime<Utc>>> {
  let at: Option<Option<String>> = gateway.query_row(sql, params, |r| r.get(0)).await?;
  Ok(at.flatten().as_deref().map(encode::decode_dt).transpose()?)
}

//! [`WarehouseLoader`]: maintains the star schema from the raw lake.
//!
//! Dimensions are refreshed with upserts or insert-or-ignore, then facts are
//! resolved against snapshots of the date and sex keys. Rows whose keys do
//! not resolve are skipped with a warning rather than failing the load.

use std::{
  collections::{BTreeMap, HashMap},
  time::Instant,
};

use chrono::{DateTime, NaiveDate, Utc};
use hecho_core::{
  audit::EtlAudit,
  calendar,
  dataset::{EtlProcess, LoadStatus},
};
use hecho_store_sqlite::{Gateway, Value, encode, rusqlite};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{Error, Result, sql};

/// Lower bound of the date dimension when the lake has no incidents.
const EPOCH_DAY: (i32, u32, u32) = (2000, 1, 1);

/// Fact watermark used before any fact has been loaded.
const EPOCH_WATERMARK: &str = "2000-01-01T00:00:00.000000Z";

const SELECT_RAW_INCIDENTS: &str = "
  SELECT id, occurred_on, department_code, municipality_code, sex, zone, victims
  FROM raw_incidents";

const INSERT_FACT: &str = "
  INSERT OR IGNORE INTO fact_incidents (
    date_key, department_code, municipality_code, sex_key, zone, victims,
    source_id, loaded_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const INSERT_ETL_LOG: &str = "
  INSERT INTO etl_log (
    process, records_processed, table_counts, started_at, completed_at,
    elapsed_ms, status, error_message
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

// ─── Types ───────────────────────────────────────────────────────────────────

/// Per-table row counts of a completed warehouse run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseSummary {
  pub process:      EtlProcess,
  pub table_counts: BTreeMap<String, u64>,
  pub elapsed_ms:   u64,
}

impl WarehouseSummary {
  pub fn total(&self) -> u64 { self.table_counts.values().sum() }
}

/// A raw incident as read back from the lake for fact resolution.
#[derive(Debug, Clone)]
struct RawIncident {
  id:                i64,
  occurred_on:       String,
  department_code:   Option<i64>,
  municipality_code: Option<i64>,
  sex:               Option<String>,
  zone:              Option<String>,
  victims:           Option<i64>,
}

impl RawIncident {
  fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(0)?,
      occurred_on:       row.get(1)?,
      department_code:   row.get(2)?,
      municipality_code: row.get(3)?,
      sex:               row.get(4)?,
      zone:              row.get(5)?,
      victims:           row.get(6)?,
    })
  }
}

/// Why a raw incident produced no fact row.
#[derive(Debug)]
enum UnresolvedKey<'a> {
  Date(&'a str),
  Sex(Option<&'a str>),
}

// ─── Loader ──────────────────────────────────────────────────────────────────

/// Reads the lake and writes the warehouse. Never writes to the lake.
pub struct WarehouseLoader {
  lake:      Gateway,
  warehouse: Gateway,
}

impl WarehouseLoader {
  pub fn new(lake: Gateway, warehouse: Gateway) -> Self { Self { lake, warehouse } }

  // ── Dimensions ────────────────────────────────────────────────────────────

  /// Mirror `raw_departments` into `dim_department`.
  pub async fn load_dim_department(&self) -> Result<u64> {
    let rows: Vec<Vec<Value>> = self
      .lake
      .query(
        "SELECT department_code, name, latitude, longitude
         FROM raw_departments ORDER BY department_code",
        Vec::new(),
        |r| {
          Ok(vec![
            Value::Integer(r.get(0)?),
            sql::text(r.get::<_, Option<String>>(1)?.as_deref()),
            sql::real(r.get(2)?),
            sql::real(r.get(3)?),
          ])
        },
      )
      .await?;

    if rows.is_empty() {
      warn!("no departments in the lake");
      return Ok(0);
    }

    let prepared = rows.len() as u64;
    self
      .warehouse
      .execute_batch(
        "INSERT INTO dim_department (department_code, name, latitude, longitude)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (department_code) DO UPDATE SET
           name      = excluded.name,
           latitude  = excluded.latitude,
           longitude = excluded.longitude",
        rows,
      )
      .await?;

    info!(rows = prepared, "dim_department refreshed");
    Ok(prepared)
  }

  /// Mirror `raw_municipalities` into `dim_municipality` and report
  /// municipalities whose department is missing from `dim_department`.
  pub async fn load_dim_municipality(&self) -> Result<u64> {
    let rows: Vec<Vec<Value>> = self
      .lake
      .query(
        "SELECT municipality_code, department_code, name, kind, latitude, longitude
         FROM raw_municipalities ORDER BY municipality_code",
        Vec::new(),
        |r| {
          Ok(vec![
            Value::Integer(r.get(0)?),
            sql::int(r.get(1)?),
            sql::text(r.get::<_, Option<String>>(2)?.as_deref()),
            sql::text(r.get::<_, Option<String>>(3)?.as_deref()),
            sql::real(r.get(4)?),
            sql::real(r.get(5)?),
          ])
        },
      )
      .await?;

    if rows.is_empty() {
      warn!("no municipalities in the lake");
      return Ok(0);
    }

    let prepared = rows.len() as u64;
    self
      .warehouse
      .execute_batch(
        "INSERT INTO dim_municipality (
           municipality_code, department_code, name, kind, latitude, longitude
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (municipality_code) DO UPDATE SET
           department_code = excluded.department_code,
           name            = excluded.name,
           kind            = excluded.kind,
           latitude        = excluded.latitude,
           longitude       = excluded.longitude",
        rows,
      )
      .await?;

    let orphans = self.count_orphan_municipalities().await?;
    if orphans > 0 {
      warn!(orphans, "municipalities reference departments missing from dim_department");
    }

    info!(rows = prepared, "dim_municipality refreshed");
    Ok(prepared)
  }

  /// Municipalities whose `department_code` has no `dim_department` row.
  pub async fn count_orphan_municipalities(&self) -> Result<u64> {
    let count: Option<i64> = self
      .warehouse
      .query_row(
        "SELECT COUNT(*) FROM dim_municipality m
         WHERE m.department_code IS NOT NULL
           AND NOT EXISTS (
             SELECT 1 FROM dim_department d WHERE d.department_code = m.department_code
           )",
        Vec::new(),
        |r| r.get(0),
      )
      .await?;
    Ok(count.unwrap_or(0).max(0) as u64)
  }

  /// Add every distinct non-null sex value seen in the lake.
  pub async fn load_dim_sex(&self) -> Result<u64> {
    let rows: Vec<Vec<Value>> = self
      .lake
      .query(
        "SELECT DISTINCT sex FROM raw_incidents WHERE sex IS NOT NULL ORDER BY sex",
        Vec::new(),
        |r| Ok(vec![Value::Text(r.get(0)?)]),
      )
      .await?;

    if rows.is_empty() {
      warn!("no sex values in the lake");
      return Ok(0);
    }

    let prepared = rows.len() as u64;
    self
      .warehouse
      .execute_batch("INSERT OR IGNORE INTO dim_sex (sex) VALUES (?1)", rows)
      .await?;

    info!(rows = prepared, "dim_sex refreshed");
    Ok(prepared)
  }

  /// Fill `dim_date` for every day in `[start, end]`.
  ///
  /// A missing bound comes from the lake's occurrence dates, or failing that
  /// from 2000-01-01 (start) and today (end).
  pub async fn load_dim_date(
    &self,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
  ) -> Result<u64> {
    let (start, end) = match (start, end) {
      (Some(start), Some(end)) => (start, end),
      (start, end) => {
        let (min, max) = self.raw_occurrence_bounds().await?;
        let epoch = NaiveDate::from_ymd_opt(EPOCH_DAY.0, EPOCH_DAY.1, EPOCH_DAY.2)
          .unwrap_or(NaiveDate::MIN);
        (
          start.or(min).unwrap_or(epoch),
          end.or(max).unwrap_or_else(|| Utc::now().date_naive()),
        )
      }
    };

    if start > end {
      warn!(%start, %end, "empty date range, dim_date unchanged");
      return Ok(0);
    }

    info!(%start, %end, "generating calendar days");
    let rows: Vec<Vec<Value>> = calendar::expand(start, end)
      .into_iter()
      .map(|d| {
        vec![
          Value::Text(encode::encode_date(d.day)),
          Value::Integer(i64::from(d.year)),
          Value::Integer(i64::from(d.month)),
          Value::Integer(i64::from(d.day_of_month)),
          Value::Integer(i64::from(d.quarter)),
          Value::Integer(i64::from(d.iso_week)),
          Value::Integer(i64::from(d.weekday)),
          Value::Text(d.month_name.to_owned()),
          Value::Text(d.weekday_name.to_owned()),
          Value::Integer(i64::from(d.is_weekend)),
        ]
      })
      .collect();

    let prepared = rows.len() as u64;
    self
      .warehouse
      .execute_batch(
        "INSERT OR IGNORE INTO dim_date (
           day, year, month, day_of_month, quarter, iso_week, weekday,
           month_name, weekday_name, is_weekend
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rows,
      )
      .await?;

    info!(rows = prepared, "dim_date refreshed");
    Ok(prepared)
  }

  async fn raw_occurrence_bounds(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
    let bounds: Option<(Option<String>, Option<String>)> = self
      .lake
      .query_row(
        "SELECT MIN(occurred_on), MAX(occurred_on) FROM raw_incidents",
        Vec::new(),
        |r| Ok((r.get(0)?, r.get(1)?)),
      )
      .await?;
    let (min, max) = bounds.unwrap_or((None, None));
    Ok((
      min.as_deref().map(encode::decode_date).transpose()?,
      max.as_deref().map(encode::decode_date).transpose()?,
    ))
  }

  // ── Facts ─────────────────────────────────────────────────────────────────

  /// Resolve every raw incident into `fact_incidents`, `batch_size` at a
  /// time. Raw rows that already have a fact are ignored, so a rerun picks
  /// up rows skipped earlier.
  pub async fn load_fact_initial(&self, batch_size: usize) -> Result<u64> {
    if batch_size == 0 {
      return Err(Error::InvalidBatchSize);
    }

    let incidents = self
      .lake
      .query(
        format!("{SELECT_RAW_INCIDENTS} ORDER BY occurred_on, id"),
        Vec::new(),
        RawIncident::from_row,
      )
      .await?;

    if incidents.is_empty() {
      warn!("no incidents in the lake");
      return Ok(0);
    }
    info!(rows = incidents.len(), batch_size, "initial fact load");

    let mut prepared = 0;
    for (n, chunk) in incidents.chunks(batch_size).enumerate() {
      let loaded = self.load_fact_batch(chunk).await?;
      info!(batch = n + 1, loaded, "fact batch committed");
      prepared += loaded;
    }

    info!(rows = prepared, "fact_incidents loaded");
    Ok(prepared)
  }

  /// Resolve raw incidents landed after the newest fact's `loaded_at`.
  pub async fn load_fact_incremental(&self) -> Result<u64> {
    let watermark: Option<Option<String>> = self
      .warehouse
      .query_row("SELECT MAX(loaded_at) FROM fact_incidents", Vec::new(), |r| r.get(0))
      .await?;
    let watermark = watermark.flatten().unwrap_or_else(|| EPOCH_WATERMARK.to_owned());
    info!(%watermark, "incremental fact load");

    let incidents = self
      .lake
      .query(
        format!("{SELECT_RAW_INCIDENTS} WHERE loaded_at > ?1 ORDER BY occurred_on, id"),
        vec![Value::Text(watermark)],
        RawIncident::from_row,
      )
      .await?;

    if incidents.is_empty() {
      info!("no new raw incidents for the warehouse");
      return Ok(0);
    }

    let prepared = self.load_fact_batch(&incidents).await?;
    info!(rows = prepared, "fact_incidents incremental load complete");
    Ok(prepared)
  }

  /// Resolve keys for `incidents` and insert the facts in one transaction.
  /// Returns the number of fact rows prepared.
  async fn load_fact_batch(&self, incidents: &[RawIncident]) -> Result<u64> {
    let date_keys = self.key_map("SELECT day, date_key FROM dim_date").await?;
    let sex_keys = self.key_map("SELECT sex, sex_key FROM dim_sex").await?;
    let loaded_at = encode::encode_dt(Utc::now());

    let mut rows = Vec::with_capacity(incidents.len());
    for incident in incidents {
      let resolved = match date_keys.get(&incident.occurred_on) {
        None => Err(UnresolvedKey::Date(&incident.occurred_on)),
        Some(date_key) => match incident.sex.as_ref().and_then(|s| sex_keys.get(s)) {
          None => Err(UnresolvedKey::Sex(incident.sex.as_deref())),
          Some(sex_key) => Ok((*date_key, *sex_key)),
        },
      };

      let (date_key, sex_key) = match resolved {
        Ok(keys) => keys,
        Err(missing) => {
          warn!(source_id = incident.id, ?missing, "skipping incident with unresolved key");
          continue;
        }
      };

      rows.push(vec![
        Value::Integer(date_key),
        sql::int(incident.department_code),
        sql::int(incident.municipality_code),
        Value::Integer(sex_key),
        sql::text(incident.zone.as_deref()),
        Value::Integer(incident.victims.unwrap_or(1)),
        Value::Integer(incident.id),
        Value::Text(loaded_at.clone()),
      ]);
    }

    if rows.is_empty() {
      return Ok(0);
    }
    let prepared = rows.len() as u64;
    self.warehouse.execute_batch(INSERT_FACT, rows).await?;
    Ok(prepared)
  }

  async fn key_map(&self, sql: &'static str) -> Result<HashMap<String, i64>> {
    let pairs: Vec<(String, i64)> = self
      .warehouse
      .query(sql, Vec::new(), |r| Ok((r.get(0)?, r.get(1)?)))
      .await?;
    Ok(pairs.into_iter().collect())
  }

  // ── Orchestration ─────────────────────────────────────────────────────────

  /// Full rebuild path: every dimension, then every raw incident.
  pub async fn load_all_initial(&self, fact_batch_size: usize) -> Result<WarehouseSummary> {
    info!("initial warehouse load");
    let started_at = Utc::now();
    let clock = Instant::now();
    let mut counts = BTreeMap::new();

    let outcome = async {
      self.refresh_dimensions(&mut counts).await?;
      counts.insert("fact_incidents".to_owned(), self.load_fact_initial(fact_batch_size).await?);
      Ok::<_, Error>(())
    }
    .await;

    self.finish(EtlProcess::InitialLoad, counts, started_at, clock, outcome).await
  }

  /// Refresh dimensions, then load facts past the fact watermark.
  pub async fn load_incremental(&self) -> Result<WarehouseSummary> {
    info!("incremental warehouse load");
    let started_at = Utc::now();
    let clock = Instant::now();
    let mut counts = BTreeMap::new();

    let outcome = async {
      self.refresh_dimensions(&mut counts).await?;
      counts.insert("fact_incidents".to_owned(), self.load_fact_incremental().await?);
      Ok::<_, Error>(())
    }
    .await;

    self.finish(EtlProcess::IncrementalLoad, counts, started_at, clock, outcome).await
  }

  async fn refresh_dimensions(&self, counts: &mut BTreeMap<String, u64>) -> Result<()> {
    counts.insert("dim_department".to_owned(), self.load_dim_department().await?);
    counts.insert("dim_municipality".to_owned(), self.load_dim_municipality().await?);
    counts.insert("dim_sex".to_owned(), self.load_dim_sex().await?);
    counts.insert("dim_date".to_owned(), self.load_dim_date(None, None).await?);
    Ok(())
  }

  /// Write the `etl_log` entry for a run and turn its outcome into the
  /// caller's result.
  async fn finish(
    &self,
    process: EtlProcess,
    table_counts: BTreeMap<String, u64>,
    started_at: DateTime<Utc>,
    clock: Instant,
    outcome: Result<()>,
  ) -> Result<WarehouseSummary> {
    let elapsed_ms = clock.elapsed().as_millis() as u64;
    let (status, error) = match &outcome {
      Ok(()) => (LoadStatus::Success, None),
      Err(e) => {
        error!(%process, error = %e, "warehouse load failed");
        (LoadStatus::Failed, Some(e.to_string()))
      }
    };

    let audit = EtlAudit {
      process,
      table_counts,
      started_at,
      completed_at: Utc::now(),
      elapsed_ms,
      status,
      error,
    };
    if let Err(e) = write_etl_audit(&self.warehouse, &audit).await {
      error!(%process, error = %e, "could not write etl_log entry");
    }

    outcome?;
    let summary = WarehouseSummary {
      process,
      elapsed_ms,
      table_counts: audit.table_counts,
    };
    info!(
      %process,
      total = summary.total(),
      elapsed_ms,
      counts = ?summary.table_counts,
      "warehouse load complete"
    );
    Ok(summary)
  }
}

pub(crate) async fn write_etl_audit(warehouse: &Gateway, audit: &EtlAudit) -> Result<()> {
  warehouse
    .execute(INSERT_ETL_LOG, vec![
      Value::Text(audit.process.to_string()),
      Value::Integer(audit.records_processed() as i64),
      Value::Text(serde_json::to_string(&audit.table_counts)?),
      Value::Text(encode::encode_dt(audit.started_at)),
      Value::Text(encode::encode_dt(audit.completed_at)),
      Value::Integer(audit.elapsed_ms as i64),
      Value::Text(audit.status.to_string()),
      sql::text(audit.error.as_deref()),
    ])
    .await?;
  Ok(())
}

//! [`LakeLoader`]: lands source records in the raw lake tables.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use hecho_core::{
  audit::LoadAudit,
  dataset::{CatalogKind, DatasetKind, LoadType},
  record::{DepartmentRecord, IncidentRecord, MunicipalityRecord, PROVENANCE},
  source::{FetchOptions, Filter, RecordSource, fetch_all},
};
use hecho_store_sqlite::{Gateway, Value, encode};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{Error, Result, sql};

/// Departments arrive in a single page of this size.
const DEPARTMENT_PAGE: usize = 50;
/// Page size for the paginated municipality fetch.
const MUNICIPALITY_PAGE: usize = 1_000;

const INSERT_INCIDENT: &str = "
  INSERT OR IGNORE INTO raw_incidents (
    source_row_id, occurred_on, department_code, department_name, municipality_code,
    municipality_name, zone, sex, victims, provenance, loaded_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const UPSERT_DEPARTMENT: &str = "
  INSERT INTO raw_departments (
    department_code, name, latitude, longitude, geometry, provenance, loaded_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
  ON CONFLICT (department_code) DO UPDATE SET
    name       = excluded.name,
    latitude   = excluded.latitude,
    longitude  = excluded.longitude,
    geometry   = excluded.geometry,
    provenance = excluded.provenance,
    loaded_at  = excluded.loaded_at";

const UPSERT_MUNICIPALITY: &str = "
  INSERT INTO raw_municipalities (
    municipality_code, department_code, department_name, name, kind,
    latitude, longitude, geometry, provenance, loaded_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
  ON CONFLICT (municipality_code) DO UPDATE SET
    department_code = excluded.department_code,
    department_name = excluded.department_name,
    name            = excluded.name,
    kind            = excluded.kind,
    latitude        = excluded.latitude,
    longitude       = excluded.longitude,
    geometry        = excluded.geometry,
    provenance      = excluded.provenance,
    loaded_at       = excluded.loaded_at";

const INSERT_AUDIT: &str = "
  INSERT INTO data_load_log (
    dataset, load_type, records_loaded, started_at, completed_at, status, error_message
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Rows landed per dataset by [`LakeLoader::load_all_initial`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LakeSummary {
  pub departments:    u64,
  pub municipalities: u64,
  pub incidents:      u64,
}

impl LakeSummary {
  pub fn total(&self) -> u64 { self.departments + self.municipalities + self.incidents }
}

/// Loads the three source datasets into the raw lake tables.
///
/// Only ever inserts or upserts; every load that reaches the source records
/// one `data_load_log` row.
pub struct LakeLoader<S> {
  source:     S,
  lake:       Gateway,
  page_delay: Duration,
}

impl<S: RecordSource> LakeLoader<S> {
  pub fn new(source: S, lake: Gateway) -> Self {
    Self { source, lake, page_delay: Duration::from_millis(500) }
  }

  /// Pause between page requests.
  pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
    self.page_delay = page_delay;
    self
  }

  pub fn source(&self) -> &S { &self.source }

  pub fn gateway(&self) -> &Gateway { &self.lake }

  // ─── Catalogs ────────────────────────────────────────────────────────────

  /// Load a reference catalog unless its raw table already has rows.
  ///
  /// Returns the number of rows written, 0 when the catalog was already
  /// present or the source returned nothing.
  pub async fn load_catalog_once(&self, kind: CatalogKind) -> Result<u64> {
    let dataset = kind.dataset();
    let existing = self.lake.count_rows(dataset.raw_table()).await?;
    if existing > 0 {
      info!(%dataset, existing, "catalog already loaded, skipping");
      return Ok(0);
    }

    let started_at = Utc::now();
    let outcome = match kind {
      CatalogKind::Departments => self.land_departments().await,
      CatalogKind::Municipalities => self.land_municipalities().await,
    };
    self.audit(dataset, LoadType::Full, started_at, &outcome).await;
    outcome
  }

  async fn land_departments(&self) -> Result<u64> {
    let options = FetchOptions::new(DEPARTMENT_PAGE)
      .max_records(DEPARTMENT_PAGE)
      .page_delay(self.page_delay);
    let records: Vec<DepartmentRecord> = fetch_all(&self.source, &options).await?;
    if records.is_empty() {
      warn!(dataset = %DatasetKind::Departments, "source returned no departments");
      return Ok(0);
    }

    let loaded_at = encode::encode_dt(Utc::now());
    let rows = records
      .iter()
      .map(|d| {
        vec![
          Value::Integer(d.code),
          sql::text(d.name.as_deref()),
          sql::real(d.latitude),
          sql::real(d.longitude),
          sql::text(d.geometry.as_deref()),
          Value::Text(PROVENANCE.to_owned()),
          Value::Text(loaded_at.clone()),
        ]
      })
      .collect();
    let written = self.lake.execute_batch(UPSERT_DEPARTMENT, rows).await? as u64;

    info!(dataset = %DatasetKind::Departments, fetched = records.len(), written, "catalog loaded");
    Ok(written)
  }

  async fn land_municipalities(&self) -> Result<u64> {
    let options = FetchOptions::new(MUNICIPALITY_PAGE).page_delay(self.page_delay);
    let records: Vec<MunicipalityRecord> = fetch_all(&self.source, &options).await?;
    if records.is_empty() {
      warn!(dataset = %DatasetKind::Municipalities, "source returned no municipalities");
      return Ok(0);
    }

    let loaded_at = encode::encode_dt(Utc::now());
    let rows = records
      .iter()
      .map(|m| {
        vec![
          Value::Integer(m.code),
          sql::int(m.department_code),
          sql::text(m.department_name.as_deref()),
          sql::text(m.name.as_deref()),
          sql::text(m.kind.as_deref()),
          sql::real(m.latitude),
          sql::real(m.longitude),
          sql::text(m.geometry.as_deref()),
          Value::Text(PROVENANCE.to_owned()),
          Value::Text(loaded_at.clone()),
        ]
      })
      .collect();
    let written = self.lake.execute_batch(UPSERT_MUNICIPALITY, rows).await? as u64;

    info!(
      dataset = %DatasetKind::Municipalities,
      fetched = records.len(),
      written,
      "catalog loaded"
    );
    Ok(written)
  }

  // ─── Incidents ───────────────────────────────────────────────────────────

  /// Fetch the whole incident dataset and insert it in batches.
  ///
  /// Returns the number of new rows. A row whose source id is already landed
  /// is ignored, so rerunning the initial load is safe.
  pub async fn load_incidents_initial(&self, batch_size: usize) -> Result<u64> {
    let started_at = Utc::now();
    let outcome = self.land_incidents(batch_size, None).await;
    self.audit(DatasetKind::Incidents, LoadType::Initial, started_at, &outcome).await;
    outcome
  }

  /// Fetch incidents that occurred strictly after the latest landed
  /// occurrence date. Falls back to the initial load on an empty lake.
  pub async fn load_incidents_incremental(&self, batch_size: usize) -> Result<u64> {
    let started_at = Utc::now();
    let watermark = match self.latest_loaded_date().await {
      Ok(Some(day)) => day,
      Ok(None) => {
        info!("raw_incidents is empty, running the initial load instead");
        return self.load_incidents_initial(batch_size).await;
      }
      Err(e) => {
        let outcome = Err(e);
        self.audit(DatasetKind::Incidents, LoadType::Incremental, started_at, &outcome).await;
        return outcome;
      }
    };

    info!(%watermark, "incremental incident load");
    let outcome = self.land_incidents(batch_size, Some(Filter::OccurredAfter(watermark))).await;
    self.audit(DatasetKind::Incidents, LoadType::Incremental, started_at, &outcome).await;
    outcome
  }

  /// `MAX(occurred_on)` over the landed incidents.
  pub async fn latest_loaded_date(&self) -> Result<Option<NaiveDate>> {
    let max: Option<Option<String>> = self
      .lake
      .query_row("SELECT MAX(occurred_on) FROM raw_incidents", Vec::new(), |r| r.get(0))
      .await?;
    Ok(max.flatten().as_deref().map(encode::decode_date).transpose()?)
  }

  async fn land_incidents(&self, batch_size: usize, filter: Option<Filter>) -> Result<u64> {
    if batch_size == 0 {
      return Err(Error::InvalidBatchSize);
    }

    let mut options = FetchOptions::new(batch_size).page_delay(self.page_delay);
    if let Some(filter) = filter {
      options = options.filter(filter);
    }
    let records: Vec<IncidentRecord> = fetch_all(&self.source, &options).await?;
    if records.is_empty() {
      info!("no new incidents at the source");
      return Ok(0);
    }

    let loaded_at = encode::encode_dt(Utc::now());
    let mut inserted = 0u64;
    for (n, chunk) in records.chunks(batch_size).enumerate() {
      let rows = chunk.iter().map(|r| incident_row(r, &loaded_at)).collect();
      let written = self.lake.execute_batch(INSERT_INCIDENT, rows).await? as u64;
      inserted += written;
      info!(batch = n + 1, size = chunk.len(), written, "incident batch committed");
    }

    info!(fetched = records.len(), inserted, "incidents landed");
    Ok(inserted)
  }

  // ─── Orchestration ───────────────────────────────────────────────────────

  /// Departments, then municipalities, then the full incident dataset.
  pub async fn load_all_initial(&self, batch_size: usize) -> Result<LakeSummary> {
    let summary = LakeSummary {
      departments:    self.load_catalog_once(CatalogKind::Departments).await?,
      municipalities: self.load_catalog_once(CatalogKind::Municipalities).await?,
      incidents:      self.load_incidents_initial(batch_size).await?,
    };
    info!(?summary, total = summary.total(), "initial lake load complete");
    Ok(summary)
  }

  // ─── Audit ───────────────────────────────────────────────────────────────

  /// Record the outcome in `data_load_log`. A failure here is logged and
  /// never replaces the load's own result.
  async fn audit(
    &self,
    dataset: DatasetKind,
    load_type: LoadType,
    started_at: DateTime<Utc>,
    outcome: &Result<u64>,
  ) {
    let entry = match outcome {
      Ok(records) => LoadAudit::success(dataset, load_type, *records, started_at),
      Err(e) => {
        error!(%dataset, %load_type, error = %e, "lake load failed");
        LoadAudit::failure(dataset, load_type, started_at, e)
      }
    };

    if let Err(e) = write_load_audit(&self.lake, &entry).await {
      error!(%dataset, %load_type, error = %e, "could not write data_load_log entry");
    }
  }
}

fn incident_row(record: &IncidentRecord, loaded_at: &str) -> Vec<Value> {
  vec![
    sql::text(record.source_row_id.as_deref()),
    Value::Text(encode::encode_date(record.occurred_on)),
    sql::int(record.department_code),
    sql::text(record.department_name.as_deref()),
    sql::int(record.municipality_code),
    sql::text(record.municipality_name.as_deref()),
    sql::text(record.zone.as_deref()),
    sql::text(record.sex.as_deref()),
    Value::Integer(record.victims),
    Value::Text(PROVENANCE.to_owned()),
    Value::Text(loaded_at.to_owned()),
  ]
}

pub(crate) async fn write_load_audit(lake: &Gateway, entry: &LoadAudit) -> Result<()> {
  lake
    .execute(INSERT_AUDIT, vec![
      Value::Text(entry.dataset.to_string()),
      Value::Text(entry.load_type.to_string()),
      Value::Integer(entry.records as i64),
      Value::Text(encode::encode_dt(entry.started_at)),
      Value::Text(encode::encode_dt(entry.completed_at)),
      Value::Text(entry.status.to_string()),
      sql::text(entry.error.as_deref()),
    ])
    .await?;
  Ok(())
}

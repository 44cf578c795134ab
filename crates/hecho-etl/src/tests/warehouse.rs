use std::collections::{BTreeMap, HashMap};

use hecho_core::dataset::DatasetKind;
use hecho_store_sqlite::Gateway;

use super::{
  fake::{FakeSource, day, department, incident, lake_loader, municipality, warehouse_for},
  logs::CapturedLogs,
};
use crate::Error;

async fn fact_count(warehouse: &Gateway) -> u64 {
  warehouse.count_rows("fact_incidents").await.unwrap()
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn date_dimension_covers_the_range_without_gaps() {
  let loader = lake_loader(FakeSource::default()).await;
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;
  let (a, b) = (day(2024, 1, 1), day(2024, 1, 14));

  let prepared = etl.load_dim_date(Some(a), Some(b)).await.unwrap();

  assert_eq!(prepared, ((b - a).num_days() + 1) as u64);
  assert_eq!(warehouse.count_rows("dim_date").await.unwrap(), 14);

  let weekends: Vec<(String, String)> = warehouse
    .query(
      "SELECT day, weekday_name FROM dim_date WHERE is_weekend = 1 ORDER BY day",
      Vec::new(),
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .await
    .unwrap();
  let days: Vec<&str> = weekends.iter().map(|(d, _)| d.as_str()).collect();
  assert_eq!(days, ["2024-01-06", "2024-01-07", "2024-01-13", "2024-01-14"]);
  assert_eq!(weekends[0].1, "Sábado");
  assert_eq!(weekends[1].1, "Domingo");

  // Overlapping ranges only add the new days.
  etl.load_dim_date(Some(day(2024, 1, 10)), Some(day(2024, 1, 20))).await.unwrap();
  assert_eq!(warehouse.count_rows("dim_date").await.unwrap(), 20);
}

#[tokio::test]
async fn date_bounds_default_to_raw_occurrences() {
  let source = FakeSource::default();
  source.push(DatasetKind::Incidents, incident(day(2023, 12, 30), 5_001, "MASCULINO", 1));
  source.push(DatasetKind::Incidents, incident(day(2024, 1, 2), 5_001, "FEMENINO", 1));
  let loader = lake_loader(source).await;
  loader.load_incidents_initial(100).await.unwrap();
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;

  assert_eq!(etl.load_dim_date(None, None).await.unwrap(), 4);

  let bounds: Option<(String, String)> = warehouse
    .query_row("SELECT MIN(day), MAX(day) FROM dim_date", Vec::new(), |r| {
      Ok((r.get(0)?, r.get(1)?))
    })
    .await
    .unwrap();
  assert_eq!(bounds, Some(("2023-12-30".to_owned(), "2024-01-02".to_owned())));
}

#[tokio::test]
async fn inverted_date_range_is_a_no_op() {
  let loader = lake_loader(FakeSource::default()).await;
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;

  let prepared = etl.load_dim_date(Some(day(2024, 2, 1)), Some(day(2024, 1, 1))).await.unwrap();

  assert_eq!(prepared, 0);
  assert_eq!(warehouse.count_rows("dim_date").await.unwrap(), 0);
}

#[tokio::test]
async fn geographic_dimensions_mirror_the_catalogs() {
  let source = FakeSource::default();
  source.push(DatasetKind::Departments, department(5, "ANTIOQUIA"));
  source.push(DatasetKind::Municipalities, municipality(5_001, 5, "MEDELLÍN"));
  source.push(DatasetKind::Municipalities, municipality(99_001, 99, "HUÉRFANO"));
  let loader = lake_loader(source).await;
  loader.load_all_initial(100).await.unwrap();
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;

  assert_eq!(etl.load_dim_department().await.unwrap(), 1);
  assert_eq!(etl.load_dim_municipality().await.unwrap(), 2);
  assert_eq!(etl.count_orphan_municipalities().await.unwrap(), 1);

  // A second refresh updates in place.
  assert_eq!(etl.load_dim_department().await.unwrap(), 1);
  assert_eq!(warehouse.count_rows("dim_department").await.unwrap(), 1);

  let name: Option<String> = warehouse
    .query_row(
      "SELECT name FROM dim_municipality WHERE municipality_code = 5001",
      Vec::new(),
      |r| r.get(0),
    )
    .await
    .unwrap();
  assert_eq!(name.as_deref(), Some("MEDELLÍN"));
}

#[tokio::test]
async fn sex_dimension_grows_monotonically() {
  let source = FakeSource::default();
  source.push(DatasetKind::Incidents, incident(day(2024, 1, 1), 5_001, "MASCULINO", 1));
  let loader = lake_loader(source).await;
  loader.load_incidents_initial(100).await.unwrap();
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;

  assert_eq!(etl.load_dim_sex().await.unwrap(), 1);

  loader.source().push(DatasetKind::Incidents, incident(day(2024, 1, 2), 5_001, "FEMENINO", 1));
  loader.load_incidents_incremental(100).await.unwrap();
  assert_eq!(etl.load_dim_sex().await.unwrap(), 2);

  let sexes: Vec<(i64, String)> = warehouse
    .query("SELECT sex_key, sex FROM dim_sex ORDER BY sex_key", Vec::new(), |r| {
      Ok((r.get(0)?, r.get(1)?))
    })
    .await
    .unwrap();
  assert_eq!(sexes.len(), 2);
  assert_eq!(sexes[0].1, "MASCULINO", "existing keys are kept");
}

// ─── Facts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unresolved_sex_is_skipped_until_the_dimension_catches_up() {
  let source = FakeSource::default();
  source.push(DatasetKind::Incidents, incident(day(2024, 5, 1), 5_001, "MASCULINO", 1));
  let loader = lake_loader(source).await;
  loader.load_incidents_initial(100).await.unwrap();
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;
  etl.load_dim_sex().await.unwrap();

  // A new sex value lands after the dimension refresh.
  loader
    .source()
    .push(DatasetKind::Incidents, incident(day(2024, 5, 2), 5_001, "NO REPORTA", 1));
  loader.load_incidents_incremental(100).await.unwrap();
  etl.load_dim_date(None, None).await.unwrap();

  let logs = CapturedLogs::default();
  let guard = logs.install();
  let prepared = etl.load_fact_initial(100).await.unwrap();
  drop(guard);

  assert_eq!(prepared, 1);
  assert_eq!(fact_count(&warehouse).await, 1);
  let warnings = logs.events("WARN");
  let skipped: Vec<&serde_json::Value> = warnings
    .iter()
    .filter(|f| f["message"] == "skipping incident with unresolved key")
    .collect();
  assert_eq!(skipped.len(), 1, "{warnings:?}");
  assert_eq!(skipped[0]["source_id"], 2);
  assert!(skipped[0]["missing"].as_str().is_some_and(|m| m.contains("NO REPORTA")));

  etl.load_dim_sex().await.unwrap();
  assert_eq!(etl.load_fact_initial(100).await.unwrap(), 2);
  assert_eq!(fact_count(&warehouse).await, 2, "rerun inserts only the skipped row");
}

#[tokio::test]
async fn facts_reference_the_raw_row_date_and_sex() {
  let source = FakeSource::default();
  source.push(DatasetKind::Incidents, incident(day(2024, 6, 1), 5_001, "MASCULINO", 2));
  source.push(DatasetKind::Incidents, incident(day(2024, 6, 1), 5_002, "FEMENINO", 1));
  source.push(DatasetKind::Incidents, incident(day(2024, 6, 3), 5_001, "FEMENINO", 4));
  let loader = lake_loader(source).await;
  loader.load_incidents_initial(100).await.unwrap();
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;

  etl.load_all_initial(2).await.unwrap();

  let raw: HashMap<i64, (String, String, i64)> = loader
    .gateway()
    .query("SELECT id, occurred_on, sex, victims FROM raw_incidents", Vec::new(), |r| {
      Ok((r.get(0)?, (r.get(1)?, r.get(2)?, r.get(3)?)))
    })
    .await
    .unwrap()
    .into_iter()
    .collect();

  let facts: Vec<(i64, String, String, i64)> = warehouse
    .query(
      "SELECT f.source_id, d.day, s.sex, f.victims
       FROM fact_incidents f
       JOIN dim_date d ON d.date_key = f.date_key
       JOIN dim_sex  s ON s.sex_key  = f.sex_key",
      Vec::new(),
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )
    .await
    .unwrap();

  assert_eq!(facts.len(), 3);
  for (source_id, on, sex, victims) in facts {
    assert_eq!(raw[&source_id], (on, sex, victims));
  }
}

#[tokio::test]
async fn zero_fact_batch_size_is_rejected() {
  let loader = lake_loader(FakeSource::default()).await;
  let (etl, _) = warehouse_for(loader.gateway()).await;

  assert!(matches!(etl.load_fact_initial(0).await, Err(Error::InvalidBatchSize)));
}

// ─── Orchestration ───────────────────────────────────────────────────────────

async fn etl_log(warehouse: &Gateway) -> Vec<(String, i64, String, String)> {
  warehouse
    .query(
      "SELECT process, records_processed, table_counts, status FROM etl_log ORDER BY id",
      Vec::new(),
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn initial_then_incremental_loads_only_new_facts() {
  let source = FakeSource::default();
  source.push(DatasetKind::Departments, department(5, "ANTIOQUIA"));
  source.push(DatasetKind::Municipalities, municipality(5_001, 5, "MEDELLÍN"));
  source.push(DatasetKind::Incidents, incident(day(2024, 7, 1), 5_001, "MASCULINO", 1));
  source.push(DatasetKind::Incidents, incident(day(2024, 7, 2), 5_001, "FEMENINO", 1));
  let loader = lake_loader(source).await;
  loader.load_all_initial(100).await.unwrap();
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;

  let initial = etl.load_all_initial(1_000).await.unwrap();
  assert_eq!(initial.table_counts["fact_incidents"], 2);
  assert_eq!(initial.table_counts["dim_department"], 1);
  assert_eq!(initial.table_counts["dim_date"], 2);
  assert_eq!(fact_count(&warehouse).await, 2);

  loader.source().push(DatasetKind::Incidents, incident(day(2024, 7, 3), 5_001, "MASCULINO", 5));
  loader.load_incidents_incremental(100).await.unwrap();

  let incremental = etl.load_incremental().await.unwrap();
  assert_eq!(incremental.table_counts["fact_incidents"], 1);
  assert_eq!(fact_count(&warehouse).await, 3);

  // Nothing new: no facts prepared.
  let idle = etl.load_incremental().await.unwrap();
  assert_eq!(idle.table_counts["fact_incidents"], 0);

  let log = etl_log(&warehouse).await;
  let processes: Vec<&str> = log.iter().map(|l| l.0.as_str()).collect();
  assert_eq!(processes, ["initial_load", "incremental_load", "incremental_load"]);
  assert!(log.iter().all(|l| l.3 == "success"));

  let counts: BTreeMap<String, u64> = serde_json::from_str(&log[0].2).unwrap();
  assert_eq!(counts, initial.table_counts);
  assert_eq!(log[0].1 as u64, initial.total());
}

#[tokio::test]
async fn failed_warehouse_run_is_audited() {
  let loader = lake_loader(FakeSource::default()).await;
  let (etl, warehouse) = warehouse_for(loader.gateway()).await;

  let err = etl.load_all_initial(0).await.unwrap_err();
  assert!(matches!(err, Error::InvalidBatchSize));

  let log = etl_log(&warehouse).await;
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].0, "initial_load");
  assert_eq!(log[0].3, "failed");

  // Dimension counts from before the failure are kept.
  let counts: BTreeMap<String, u64> = serde_json::from_str(&log[0].2).unwrap();
  assert!(counts.contains_key("dim_date"));
  assert!(!counts.contains_key("fact_incidents"));
}

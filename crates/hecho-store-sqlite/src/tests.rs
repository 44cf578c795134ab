//! Gateway tests against in-memory and temporary-file databases.

use std::time::Duration;

use hecho_core::settings::StoreSettings;

use crate::{Error, Gateway, Schema, Value};

async fn lake() -> Gateway {
  Gateway::open_in_memory(Schema::Lake).await.expect("in-memory lake")
}

async fn warehouse() -> Gateway {
  Gateway::open_in_memory(Schema::Warehouse).await.expect("in-memory warehouse")
}

const INSERT_INCIDENT: &str = "
  INSERT OR IGNORE INTO raw_incidents (
    occurred_on, department_code, department_name, municipality_code,
    municipality_name, zone, sex, victims, source_row_id, provenance, loaded_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'test', '2024-01-01T00:00:00.000000Z')";

fn incident(day: &str, sex: Option<&str>, victims: i64) -> Vec<Value> {
  sourced(None, day, sex, victims)
}

fn sourced(row_id: Option<&str>, day: &str, sex: Option<&str>, victims: i64) -> Vec<Value> {
  vec![
    Value::Text(day.into()),
    Value::Integer(5),
    Value::Text("ANTIOQUIA".into()),
    Value::Null,
    Value::Null,
    Value::Text("URBANA".into()),
    sex.map_or(Value::Null, |s| Value::Text(s.into())),
    Value::Integer(victims),
    row_id.map_or(Value::Null, |id| Value::Text(id.into())),
  ]
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn schemas_create_their_tables() {
  let lake = lake().await;
  for table in ["raw_incidents", "raw_departments", "raw_municipalities", "data_load_log"] {
    assert_eq!(lake.count_rows(table).await.unwrap(), 0, "{table}");
  }

  let warehouse = warehouse().await;
  for table in
    ["dim_department", "dim_municipality", "dim_sex", "dim_date", "fact_incidents", "etl_log"]
  {
    assert_eq!(warehouse.count_rows(table).await.unwrap(), 0, "{table}");
  }
  assert!(warehouse.count_rows("raw_incidents").await.is_err());
}

#[tokio::test]
async fn count_rows_rejects_non_identifiers() {
  let lake = lake().await;
  let err = lake.count_rows("raw_incidents; DROP TABLE x").await.unwrap_err();
  assert!(matches!(err, Error::InvalidIdentifier(_)));
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_insert_ignores_redelivered_source_rows() {
  let lake = lake().await;

  let rows = vec![
    sourced(Some("row-1"), "2024-01-01", Some("MASCULINO"), 1),
    sourced(Some("row-1"), "2024-01-01", Some("MASCULINO"), 1),
    sourced(Some("row-2"), "2024-01-01", Some("MASCULINO"), 1),
    sourced(Some("row-3"), "2024-01-02", Some("FEMENINO"), 3),
  ];
  let inserted = lake.execute_batch(INSERT_INCIDENT, rows).await.unwrap();

  assert_eq!(inserted, 3, "equal content under distinct ids is kept");
  assert_eq!(lake.count_rows("raw_incidents").await.unwrap(), 3);

  // Re-running a landed row is a no-op.
  let redelivered = sourced(Some("row-3"), "2024-01-02", Some("FEMENINO"), 3);
  let again = lake.execute_batch(INSERT_INCIDENT, vec![redelivered]).await.unwrap();
  assert_eq!(again, 0);
}

#[tokio::test]
async fn rows_without_source_id_are_always_kept() {
  let lake = lake().await;

  let rows = vec![incident("2024-01-01", None, 1), incident("2024-01-01", None, 1)];

  assert_eq!(lake.execute_batch(INSERT_INCIDENT, rows).await.unwrap(), 2);
}

#[tokio::test]
async fn empty_batch_does_nothing() {
  let lake = lake().await;
  assert_eq!(lake.execute_batch(INSERT_INCIDENT, Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn failed_batch_rolls_back_entirely() {
  let lake = lake().await;

  // `occurred_on` is NOT NULL; the third row aborts the batch.
  let mut bad = incident("2024-01-03", Some("MASCULINO"), 1);
  bad[0] = Value::Null;
  let rows = vec![
    incident("2024-01-01", Some("MASCULINO"), 1),
    incident("2024-01-02", Some("MASCULINO"), 1),
    bad,
  ];

  let err = lake.execute_batch(INSERT_INCIDENT, rows).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));
  assert_eq!(lake.count_rows("raw_incidents").await.unwrap(), 0);
}

#[tokio::test]
async fn transaction_commits_on_ok() {
  let warehouse = warehouse().await;

  let keys = warehouse
    .transaction(|tx| {
      tx.execute("INSERT INTO dim_sex (sex) VALUES ('MASCULINO')", [])?;
      tx.execute("INSERT INTO dim_sex (sex) VALUES ('FEMENINO')", [])?;
      tx.query_row("SELECT COUNT(*) FROM dim_sex", [], |r| r.get::<_, i64>(0))
    })
    .await
    .unwrap();

  assert_eq!(keys, 2);
  assert_eq!(warehouse.count_rows("dim_sex").await.unwrap(), 2);
}

#[tokio::test]
async fn transaction_rolls_back_on_err() {
  let warehouse = warehouse().await;

  let result = warehouse
    .transaction(|tx| {
      tx.execute("INSERT INTO dim_sex (sex) VALUES ('MASCULINO')", [])?;
      // Unique violation.
      tx.execute("INSERT INTO dim_sex (sex) VALUES ('MASCULINO')", [])?;
      Ok(())
    })
    .await;

  assert!(result.is_err());
  assert_eq!(warehouse.count_rows("dim_sex").await.unwrap(), 0);
}

#[tokio::test]
async fn fact_foreign_keys_are_enforced() {
  let warehouse = warehouse().await;

  let err = warehouse
    .execute(
      "INSERT INTO fact_incidents (date_key, sex_key, victims, source_id, loaded_at)
       VALUES (?1, ?2, 1, 1, '2024-01-01T00:00:00.000000Z')",
      vec![Value::Integer(99), Value::Integer(99)],
    )
    .await;

  assert!(err.is_err());
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_maps_rows_and_query_row_handles_empty() {
  let lake = lake().await;
  lake
    .execute_batch(INSERT_INCIDENT, vec![
      incident("2024-02-01", Some("MASCULINO"), 2),
      incident("2024-01-15", Some("FEMENINO"), 1),
    ])
    .await
    .unwrap();

  let days: Vec<String> = lake
    .query("SELECT occurred_on FROM raw_incidents ORDER BY occurred_on", Vec::new(), |r| {
      r.get(0)
    })
    .await
    .unwrap();
  assert_eq!(days, ["2024-01-15", "2024-02-01"]);

  let max: Option<Option<String>> = lake
    .query_row("SELECT MAX(occurred_on) FROM raw_incidents", Vec::new(), |r| r.get(0))
    .await
    .unwrap();
  assert_eq!(max.flatten().as_deref(), Some("2024-02-01"));

  let none: Option<i64> = lake
    .query_row(
      "SELECT victims FROM raw_incidents WHERE sex = ?1",
      vec![Value::Text("NO REPORTA".into())],
      |r| r.get(0),
    )
    .await
    .unwrap();
  assert_eq!(none, None);
}

#[tokio::test]
async fn in_memory_gateway_connects() {
  assert!(lake().await.test_connection().await);
}

// ─── Files & pooling ─────────────────────────────────────────────────────────

fn temp_store(name: &str, max_connections: usize) -> StoreSettings {
  let dir = std::env::temp_dir().join(format!("hecho-store-{}-{name}", std::process::id()));
  let _ = std::fs::remove_dir_all(&dir);
  StoreSettings {
    path: dir.join("nested").join("store.db"),
    min_connections: 1,
    max_connections,
    acquire_timeout_secs: 1,
  }
}

#[tokio::test]
async fn file_store_creates_parent_and_reopens() {
  let settings = temp_store("reopen", 4);

  let first = Gateway::open(&settings, Schema::Lake).await.unwrap();
  first
    .execute_batch(INSERT_INCIDENT, vec![incident("2024-03-01", None, 1)])
    .await
    .unwrap();
  drop(first);

  let second = Gateway::open(&settings, Schema::Lake).await.unwrap();
  assert_eq!(second.count_rows("raw_incidents").await.unwrap(), 1);
  assert!(second.test_connection().await);
}

#[tokio::test]
async fn pool_reports_exhaustion() {
  let settings = temp_store("exhaust", 1);
  let gateway = Gateway::open(&settings, Schema::Warehouse).await.unwrap();

  // Hold the only connection while a second caller waits past the timeout.
  let held = gateway.pool.acquire().await.unwrap();
  let waited = tokio::time::timeout(Duration::from_secs(5), gateway.count_rows("dim_sex"))
    .await
    .expect("acquire timeout should fire first");
  assert!(matches!(waited, Err(Error::PoolExhausted { .. })));

  drop(held);
  assert_eq!(gateway.count_rows("dim_sex").await.unwrap(), 0);
}

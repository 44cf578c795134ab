//! SQL schemas for the lake and warehouse stores.
//!
//! Both are idempotent (`IF NOT EXISTS`) and run once when a gateway opens.

/// Which set of tables a gateway bootstraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
  /// Raw landing tables plus `data_load_log`.
  Lake,
  /// Star schema plus `etl_log`.
  Warehouse,
}

impl Schema {
  pub fn ddl(self) -> &'static str {
    match self {
      Self::Lake => LAKE_SCHEMA,
      Self::Warehouse => WAREHOUSE_SCHEMA,
    }
  }
}

pub const LAKE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS raw_incidents (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    source_row_id     TEXT,               -- the portal's `:id`
    occurred_on       TEXT    NOT NULL,   -- YYYY-MM-DD
    department_code   INTEGER,
    department_name   TEXT,
    municipality_code INTEGER,
    municipality_name TEXT,
    zone              TEXT,
    sex               TEXT,
    victims           INTEGER NOT NULL DEFAULT 1,
    provenance        TEXT    NOT NULL,
    loaded_at         TEXT    NOT NULL    -- RFC 3339 UTC
);

-- A re-delivered source row is ignored. Rows with equal content but distinct
-- source ids are separate incidents; rows without an id are always kept.
CREATE UNIQUE INDEX IF NOT EXISTS raw_incidents_source_row_uidx
    ON raw_incidents(source_row_id);

CREATE INDEX IF NOT EXISTS raw_incidents_occurred_idx ON raw_incidents(occurred_on);
CREATE INDEX IF NOT EXISTS raw_incidents_loaded_idx   ON raw_incidents(loaded_at);

CREATE TABLE IF NOT EXISTS raw_departments (
    department_code INTEGER PRIMARY KEY,
    name            TEXT,
    latitude        REAL,
    longitude       REAL,
    geometry        TEXT,
    provenance      TEXT NOT NULL,
    loaded_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw_municipalities (
    municipality_code INTEGER PRIMARY KEY,
    department_code   INTEGER,
    department_name   TEXT,
    name              TEXT,
    kind              TEXT,
    latitude          REAL,
    longitude         REAL,
    geometry          TEXT,
    provenance        TEXT NOT NULL,
    loaded_at         TEXT NOT NULL
);

-- Write-once audit of every lake load.
CREATE TABLE IF NOT EXISTS data_load_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset        TEXT    NOT NULL,   -- 'incidents' | 'departments' | 'municipalities'
    load_type      TEXT    NOT NULL,   -- 'initial' | 'incremental' | 'full'
    records_loaded INTEGER NOT NULL,
    started_at     TEXT    NOT NULL,
    completed_at   TEXT    NOT NULL,
    status         TEXT    NOT NULL,   -- 'success' | 'failed'
    error_message  TEXT
);

CREATE INDEX IF NOT EXISTS data_load_log_lookup_idx
    ON data_load_log(dataset, status, completed_at);

PRAGMA user_version = 1;
";

pub const WAREHOUSE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS dim_department (
    department_code INTEGER PRIMARY KEY,
    name            TEXT,
    latitude        REAL,
    longitude       REAL
);

-- No foreign key to dim_department: orphans are reported, not rejected.
CREATE TABLE IF NOT EXISTS dim_municipality (
    municipality_code INTEGER PRIMARY KEY,
    department_code   INTEGER,
    name              TEXT,
    kind              TEXT,
    latitude          REAL,
    longitude         REAL
);

CREATE TABLE IF NOT EXISTS dim_sex (
    sex_key INTEGER PRIMARY KEY AUTOINCREMENT,
    sex     TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS dim_date (
    date_key     INTEGER PRIMARY KEY AUTOINCREMENT,
    day          TEXT    NOT NULL UNIQUE,   -- YYYY-MM-DD
    year         INTEGER NOT NULL,
    month        INTEGER NOT NULL,
    day_of_month INTEGER NOT NULL,
    quarter      INTEGER NOT NULL,
    iso_week     INTEGER NOT NULL,
    weekday      INTEGER NOT NULL,          -- ISO: 1 = Monday
    month_name   TEXT    NOT NULL,
    weekday_name TEXT    NOT NULL,
    is_weekend   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_incidents (
    fact_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    date_key          INTEGER NOT NULL REFERENCES dim_date(date_key),
    department_code   INTEGER,
    municipality_code INTEGER,
    sex_key           INTEGER NOT NULL REFERENCES dim_sex(sex_key),
    zone              TEXT,
    victims           INTEGER NOT NULL,
    source_id         INTEGER NOT NULL UNIQUE,   -- raw_incidents.id
    loaded_at         TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS fact_incidents_date_idx   ON fact_incidents(date_key);
CREATE INDEX IF NOT EXISTS fact_incidents_loaded_idx ON fact_incidents(loaded_at);

-- Write-once audit of every warehouse run.
CREATE TABLE IF NOT EXISTS etl_log (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    process           TEXT    NOT NULL,   -- 'initial_load' | 'incremental_load'
    records_processed INTEGER NOT NULL,
    table_counts      TEXT    NOT NULL,   -- JSON object
    started_at        TEXT    NOT NULL,
    completed_at      TEXT    NOT NULL,
    elapsed_ms        INTEGER NOT NULL,
    status            TEXT    NOT NULL,
    error_message     TEXT
);

CREATE INDEX IF NOT EXISTS etl_log_lookup_idx ON etl_log(status, completed_at);

PRAGMA user_version = 1;
";

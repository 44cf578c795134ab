//! Runtime configuration, deserialised by the binary from a TOML file and
//! `HECHO_*` environment variables.
//!
//! Nothing in the libraries reads configuration on its own; the relevant
//! section is handed to each constructor.

use std::{path::PathBuf, time::Duration};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, dataset::DatasetKind, schedule::LoadSchedule};

// ─── Sections ────────────────────────────────────────────────────────────────

/// Top-level settings; every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub source:    SourceSettings,
  pub lake:      StoreSettings,
  pub warehouse: StoreSettings,
  pub load:      LoadSettings,
  pub schedule:  ScheduleSettings,
  pub logging:   LogSettings,
}

/// Open-data portal connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
  /// Base URL ending in `/`; dataset ids are appended as `<id>.json`.
  pub base_url:               String,
  /// Optional application token sent as `X-App-Token`.
  pub api_key:                Option<String>,
  pub incidents_dataset:      String,
  pub departments_dataset:    String,
  pub municipalities_dataset: String,
  pub timeout_secs:           u64,
  pub max_retries:            u32,
  pub backoff_base_ms:        u64,
  pub page_delay_ms:          u64,
}

/// Connection settings for one SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
  pub path:                 PathBuf,
  pub min_connections:      usize,
  pub max_connections:      usize,
  pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
  /// Page and insert batch size for lake loads.
  pub batch_size:      usize,
  /// Batch size for the initial fact load.
  pub fact_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
  pub lake:      LoadSchedule,
  pub warehouse: LoadSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Text,
  Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
  pub format: LogFormat,
}

// ─── Defaults ────────────────────────────────────────────────────────────────

impl Default for Settings {
  fn default() -> Self {
    Self {
      source:    SourceSettings::default(),
      lake:      StoreSettings::at("data/lake.db"),
      warehouse: StoreSettings::at("data/warehouse.db"),
      load:      LoadSettings::default(),
      schedule:  ScheduleSettings::default(),
      logging:   LogSettings::default(),
    }
  }
}

impl Default for SourceSettings {
  fn default() -> Self {
    Self {
      base_url:               "https://www.datos.gov.co/resource/".to_owned(),
      api_key:                None,
      incidents_dataset:      String::new(),
      departments_dataset:    String::new(),
      municipalities_dataset: String::new(),
      timeout_secs:           30,
      max_retries:            3,
      backoff_base_ms:        1_000,
      page_delay_ms:          500,
    }
  }
}

impl StoreSettings {
  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self {
      path:                 path.into(),
      min_connections:      1,
      max_connections:      10,
      acquire_timeout_secs: 30,
    }
  }

  pub fn acquire_timeout(&self) -> Duration { Duration::from_secs(self.acquire_timeout_secs) }
}

impl Default for StoreSettings {
  fn default() -> Self { Self::at("data/hecho.db") }
}

impl Default for LoadSettings {
  fn default() -> Self { Self { batch_size: 1_000, fact_batch_size: 5_000 } }
}

impl Default for ScheduleSettings {
  fn default() -> Self {
    Self {
      lake:      LoadSchedule::weekly(Weekday::Fri),
      warehouse: LoadSchedule::weekly(Weekday::Sat),
    }
  }
}

// ─── Accessors & validation ──────────────────────────────────────────────────

impl SourceSettings {
  pub fn dataset_id(&self, dataset: DatasetKind) -> &str {
    match dataset {
      DatasetKind::Incidents => &self.incidents_dataset,
      DatasetKind::Departments => &self.departments_dataset,
      DatasetKind::Municipalities => &self.municipalities_dataset,
    }
  }

  /// Full endpoint URL for `dataset`; errors when its id is not configured.
  pub fn endpoint(&self, dataset: DatasetKind) -> Result<String> {
    let id = self.dataset_id(dataset).trim();
    if id.is_empty() {
      return Err(Error::InvalidSettings(format!(
        "no dataset id configured for {dataset} (source.{dataset}_dataset)"
      )));
    }
    Ok(format!("{}{id}.json", self.base_url))
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  pub fn backoff_base(&self) -> Duration { Duration::from_millis(self.backoff_base_ms) }

  pub fn page_delay(&self) -> Duration { Duration::from_millis(self.page_delay_ms) }
}

impl Settings {
  /// Reject settings that would make a load misbehave at runtime.
  pub fn validate(&self) -> Result<()> {
    for (name, store) in [("lake", &self.lake), ("warehouse", &self.warehouse)] {
      if store.max_connections == 0 {
        return Err(Error::InvalidSettings(format!("{name}.max_connections must be > 0")));
      }
      if store.min_connections > store.max_connections {
        return Err(Error::InvalidSettings(format!(
          "{name}.min_connections ({}) exceeds max_connections ({})",
          store.min_connections, store.max_connections
        )));
      }
    }
    if self.load.batch_size == 0 || self.load.fact_batch_size == 0 {
      return Err(Error::InvalidSettings("batch sizes must be > 0".to_owned()));
    }
    if !self.source.base_url.ends_with('/') {
      return Err(Error::InvalidSettings("source.base_url must end with '/'".to_owned()));
    }
    Ok(())
  }
}

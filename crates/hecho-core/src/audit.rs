//! Audit log entries written once per load execution.
//!
//! Entries are write-once; catch-up and health checks read them to decide
//! whether a new load is due.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetKind, EtlProcess, LoadStatus, LoadType};

/// One row of the lake's `data_load_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadAudit {
  pub dataset:      DatasetKind,
  pub load_type:    LoadType,
  pub records:      u64,
  pub started_at:   DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
  pub status:       LoadStatus,
  pub error:        Option<String>,
}

impl LoadAudit {
  pub fn success(
    dataset: DatasetKind,
    load_type: LoadType,
    records: u64,
    started_at: DateTime<Utc>,
  ) -> Self {
    Self {
      dataset,
      load_type,
      records,
      started_at,
      completed_at: Utc::now(),
      status: LoadStatus::Success,
      error: None,
    }
  }

  pub fn failure(
    dataset: DatasetKind,
    load_type: LoadType,
    started_at: DateTime<Utc>,
    error: impl ToString,
  ) -> Self {
    Self {
      dataset,
      load_type,
      records: 0,
      started_at,
      completed_at: Utc::now(),
      status: LoadStatus::Failed,
      error: Some(error.to_string()),
    }
  }
}

/// One row of the warehouse's `etl_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlAudit {
  pub process:      EtlProcess,
  /// Rows prepared per warehouse table, keyed by table name.
  pub table_counts: BTreeMap<String, u64>,
  pub started_at:   DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
  pub elapsed_ms:   u64,
  pub status:       LoadStatus,
  pub error:        Option<String>,
}

impl EtlAudit {
  /// Sum of all per-table counts.
  pub fn records_processed(&self) -> u64 { self.table_counts.values().sum() }
}

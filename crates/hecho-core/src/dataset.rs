//! Dataset identities and the vocabulary of the load audit tables.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ─── Datasets ────────────────────────────────────────────────────────────────

/// One of the three datasets pulled from the open-data portal.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DatasetKind {
  Incidents,
  Departments,
  Municipalities,
}

impl DatasetKind {
  /// The raw (lake) table this dataset lands in.
  pub fn raw_table(self) -> &'static str {
    match self {
      Self::Incidents => "raw_incidents",
      Self::Departments => "raw_departments",
      Self::Municipalities => "raw_municipalities",
    }
  }
}

/// The reference catalogs, which are loaded once and never refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CatalogKind {
  Departments,
  Municipalities,
}

impl CatalogKind {
  pub fn dataset(self) -> DatasetKind {
    match self {
      Self::Departments => DatasetKind::Departments,
      Self::Municipalities => DatasetKind::Municipalities,
    }
  }
}

// ─── Audit vocabulary ────────────────────────────────────────────────────────

/// How a lake load was performed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadType {
  /// Full pull of the incident dataset.
  Initial,
  /// Only incidents past the lake watermark.
  Incremental,
  /// One-shot catalog load.
  Full,
}

/// Outcome recorded for a load execution.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadStatus {
  Success,
  Failed,
}

/// The warehouse processes recorded in `etl_log`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EtlProcess {
  InitialLoad,
  IncrementalLoad,
}

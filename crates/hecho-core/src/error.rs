//! Error types for `hecho-core`.

use thiserror::Error;

use crate::dataset::DatasetKind;

#[derive(Debug, Error)]
pub enum Error {
  /// A source record failed the typed decoding step.
  #[error("invalid {dataset} record: field `{field}` {reason}")]
  InvalidRecord {
    dataset: DatasetKind,
    field:   &'static str,
    reason:  String,
  },

  /// The remote source failed after exhausting its retries.
  #[error("source fetch failed: {0}")]
  SourceFetch(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("invalid settings: {0}")]
  InvalidSettings(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error type for `hecho-etl`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] hecho_core::Error),

  #[error(transparent)]
  Store(#[from] hecho_store_sqlite::Error),

  #[error("batch size must be greater than zero")]
  InvalidBatchSize,

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

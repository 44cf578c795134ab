//! Error type for `hecho-source`.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("GET {url} → {status}")]
  Status { status: StatusCode, url: String },

  #[error("configuration error: {0}")]
  Config(#[from] hecho_core::Error),

  #[error("invalid api key header: {0}")]
  ApiKey(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

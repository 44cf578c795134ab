//! Error type for `hecho-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The database file could not be opened or initialised.
  #[error("cannot open {}: {source}", path.display())]
  Connection {
    path:   PathBuf,
    #[source]
    source: tokio_rusqlite::Error,
  },

  /// No connection became free within the acquire timeout.
  #[error("connection pool exhausted after {waited_ms} ms")]
  PoolExhausted { waited_ms: u64 },

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Beginning or committing a transaction failed.
  #[error("transaction {stage} failed: {source}")]
  Transaction {
    stage:  &'static str,
    #[source]
    source: rusqlite::Error,
  },

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("invalid table name: {0:?}")]
  InvalidIdentifier(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

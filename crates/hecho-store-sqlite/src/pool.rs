//! A small bounded pool of `tokio_rusqlite` connections.
//!
//! Idle connections sit in a vector; a semaphore caps how many are leased at
//! once. A [`Lease`] hands its connection back when dropped.

use std::{
  ops::Deref,
  path::PathBuf,
  sync::{Arc, Mutex},
  time::Duration,
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::{Error, Result};

const CONNECTION_PRAGMAS: &str = "
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
";

#[derive(Debug, Clone)]
pub(crate) enum Target {
  File(PathBuf),
  Memory,
}

impl Target {
  fn describe(&self) -> PathBuf {
    match self {
      Self::File(path) => path.clone(),
      Self::Memory => PathBuf::from(":memory:"),
    }
  }
}

pub(crate) struct Pool {
  target:          Target,
  idle:            Mutex<Vec<Connection>>,
  permits:         Arc<Semaphore>,
  acquire_timeout: Duration,
}

impl Pool {
  /// Build a pool and eagerly open `min` connections.
  ///
  /// In-memory targets are pinned to exactly one connection, since every
  /// in-memory connection is its own database.
  pub async fn open(
    target: Target,
    min: usize,
    max: usize,
    acquire_timeout: Duration,
  ) -> Result<Arc<Self>> {
    let (min, max) = match target {
      Target::Memory => (1, 1),
      Target::File(_) => (min.min(max).max(1), max.max(1)),
    };

    let pool = Arc::new(Self {
      target,
      idle: Mutex::new(Vec::with_capacity(max)),
      permits: Arc::new(Semaphore::new(max)),
      acquire_timeout,
    });

    let mut opened = Vec::with_capacity(min);
    for _ in 0..min {
      opened.push(pool.connect().await?);
    }
    pool.idle_mut().extend(opened);

    debug!(db = ?pool.target.describe(), min, max, "connection pool ready");
    Ok(pool)
  }

  async fn connect(&self) -> Result<Connection> {
    let conn = match &self.target {
      Target::File(path) => Connection::open(path).await,
      Target::Memory => Connection::open_in_memory().await,
    }
    .map_err(|source| Error::Connection { path: self.target.describe(), source })?;

    conn
      .call(|conn| {
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        Ok(())
      })
      .await
      .map_err(|source| Error::Connection { path: self.target.describe(), source })?;

    Ok(conn)
  }

  fn idle_mut(&self) -> std::sync::MutexGuard<'_, Vec<Connection>> {
    // A panic while holding the lock leaves the vector itself intact.
    self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Lease a connection, opening a new one if none is idle.
  pub async fn acquire(self: &Arc<Self>) -> Result<Lease> {
    let waited_ms = self.acquire_timeout.as_millis() as u64;
    let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
      .await
      .map_err(|_| Error::PoolExhausted { waited_ms })?
      .map_err(|_| Error::PoolExhausted { waited_ms })?;

    let reused = self.idle_mut().pop();
    let conn = match reused {
      Some(conn) => conn,
      None => self.connect().await?,
    };

    Ok(Lease { conn: Some(conn), pool: Arc::clone(self), _permit: permit })
  }
}

/// A leased connection; returned to the pool on drop.
pub(crate) struct Lease {
  conn:    Option<Connection>,
  pool:    Arc<Pool>,
  _permit: OwnedSemaphorePermit,
}

impl Deref for Lease {
  type Target = Connection;

  fn deref(&self) -> &Connection {
    // Only `Drop` takes the connection out.
    self.conn.as_ref().unwrap_or_else(|| unreachable!("lease used after drop"))
  }
}

impl Drop for Lease {
  fn drop(&mut self) {
    if let Some(conn) = self.conn.take() {
      self.pool.idle_mut().push(conn);
    }
  }
}

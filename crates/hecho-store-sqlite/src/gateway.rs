//! [`Gateway`]: parameterized SQL over a pooled SQLite store.

use std::{path::Path, sync::Arc, time::Duration};

use hecho_core::settings::StoreSettings;
use rusqlite::{OptionalExtension as _, Row, params_from_iter, types::Value};
use tracing::{debug, error, info};

use crate::{
  Error, Result,
  pool::{Lease, Pool, Target},
  schema::Schema,
};

/// One store instance (lake or warehouse).
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct Gateway {
  pub(crate) pool: Arc<Pool>,
  schema:          Schema,
}

impl Gateway {
  /// Open (or create) the store described by `settings` and bootstrap
  /// `schema`.
  pub async fn open(settings: &StoreSettings, schema: Schema) -> Result<Self> {
    ensure_parent_dir(&settings.path).await?;
    let pool = Pool::open(
      Target::File(settings.path.clone()),
      settings.min_connections,
      settings.max_connections,
      settings.acquire_timeout(),
    )
    .await?;

    let gateway = Self { pool, schema };
    gateway.init_schema().await?;
    info!(
      path = %settings.path.display(),
      ?schema,
      max_connections = settings.max_connections,
      "store opened"
    );
    Ok(gateway)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(schema: Schema) -> Result<Self> {
    let pool = Pool::open(Target::Memory, 1, 1, Duration::from_secs(30)).await?;
    let gateway = Self { pool, schema };
    gateway.init_schema().await?;
    Ok(gateway)
  }

  pub fn schema(&self) -> Schema { self.schema }

  async fn init_schema(&self) -> Result<()> {
    let ddl = self.schema.ddl();
    self
      .lease()
      .await?
      .call(move |conn| {
        conn.execute_batch(ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn lease(&self) -> Result<Lease> { self.pool.acquire().await }

  // ─── Statements ──────────────────────────────────────────────────────────

  /// Run a single statement; returns the number of changed rows.
  pub async fn execute(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<usize> {
    let sql = sql.into();
    let changed = self
      .lease()
      .await?
      .call(move |conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
      .await?;
    Ok(changed)
  }

  /// Run one statement per parameter row inside a single transaction.
  ///
  /// Returns the sum of changed rows, so rows ignored on conflict count 0.
  pub async fn execute_batch(
    &self,
    sql: impl Into<String>,
    rows: Vec<Vec<Value>>,
  ) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let sql = sql.into();
    let submitted = rows.len();

    let changed = self
      .transaction(move |tx| {
        let mut stmt = tx.prepare_cached(&sql)?;
        let mut changed = 0;
        for row in &rows {
          changed += stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(changed)
      })
      .await?;

    debug!(submitted, changed, "batch committed");
    Ok(changed)
  }

  /// Run `f` inside a transaction: commit on `Ok`, roll back otherwise.
  pub async fn transaction<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    self
      .lease()
      .await?
      .call(move |conn| {
        let tx = match conn.transaction() {
          Ok(tx) => tx,
          Err(source) => return Ok(Err(Error::Transaction { stage: "begin", source })),
        };
        // Dropping `tx` on error rolls it back.
        let value = f(&tx)?;
        match tx.commit() {
          Ok(()) => Ok(Ok(value)),
          Err(source) => Ok(Err(Error::Transaction { stage: "commit", source })),
        }
      })
      .await?
  }

  // ─── Queries ─────────────────────────────────────────────────────────────

  /// Map every result row through `map`.
  pub async fn query<T, F>(
    &self,
    sql: impl Into<String>,
    params: Vec<Value>,
    map: F,
  ) -> Result<Vec<T>>
  where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let sql = sql.into();
    let rows = self
      .lease()
      .await?
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params.iter()), map)?
          .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Map the first result row through `map`; `None` when there is none.
  pub async fn query_row<T, F>(
    &self,
    sql: impl Into<String>,
    params: Vec<Value>,
    map: F,
  ) -> Result<Option<T>>
  where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let sql = sql.into();
    let row = self
      .lease()
      .await?
      .call(move |conn| {
        Ok(conn.query_row(&sql, params_from_iter(params.iter()), map).optional()?)
      })
      .await?;
    Ok(row)
  }

  /// `SELECT COUNT(*)` over `table`.
  pub async fn count_rows(&self, table: &str) -> Result<u64> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
      return Err(Error::InvalidIdentifier(table.to_owned()));
    }
    let count: Option<i64> = self
      .query_row(format!("SELECT COUNT(*) FROM {table}"), Vec::new(), |r| r.get(0))
      .await?;
    Ok(count.unwrap_or(0).max(0) as u64)
  }

  /// `true` when a connection can be leased and answers `SELECT 1`.
  pub async fn test_connection(&self) -> bool {
    let probe = self.query_row("SELECT 1", Vec::new(), |r| r.get::<_, i64>(0)).await;
    match probe {
      Ok(Some(1)) => true,
      Ok(other) => {
        error!(?other, schema = ?self.schema, "unexpected connectivity probe result");
        false
      }
      Err(e) => {
        error!(error = %e, schema = ?self.schema, "store connectivity check failed");
        false
      }
    }
  }
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
  let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
    return Ok(());
  };
  tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Connection {
    path:   path.to_path_buf(),
    source: tokio_rusqlite::Error::Other(Box::new(e)),
  })
}

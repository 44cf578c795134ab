//! The `RecordSource` trait and the paginated fetch built on top of it.
//!
//! The trait is implemented by `hecho-source` (HTTP) and by test fakes. The
//! loaders depend on this abstraction, never on the HTTP client directly.

use std::{future::Future, time::Duration};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::{
  Error, Result,
  dataset::DatasetKind,
  record::{FromSourceRow, OCCURRED_ON_FIELD, SourceRow},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Row filter pushed down to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  /// Incidents whose occurrence date is strictly after the given day.
  OccurredAfter(NaiveDate),
}

/// Sort applied by the source before paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
  pub field:      &'static str,
  pub descending: bool,
}

impl SortOrder {
  pub fn ascending(field: &'static str) -> Self { Self { field, descending: false } }

  pub fn descending(field: &'static str) -> Self { Self { field, descending: true } }
}

/// One page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
  pub limit:  usize,
  pub offset: usize,
  pub filter: Option<Filter>,
  pub order:  Option<SortOrder>,
  /// Restrict the returned columns; `None` returns every column.
  pub select: Option<&'static str>,
}

/// Parameters for [`fetch_all`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub page_size:   usize,
  pub filter:      Option<Filter>,
  /// Stop after this many records even if the source has more.
  pub max_records: Option<usize>,
  /// Pause between consecutive page requests.
  pub page_delay:  Duration,
}

impl FetchOptions {
  pub fn new(page_size: usize) -> Self {
    Self {
      page_size,
      filter: None,
      max_records: None,
      page_delay: Duration::from_millis(500),
    }
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filter = Some(filter);
    self
  }

  pub fn max_records(mut self, max: usize) -> Self {
    self.max_records = Some(max);
    self
  }

  pub fn page_delay(mut self, delay: Duration) -> Self {
    self.page_delay = delay;
    self
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the remote open-data API.
///
/// Implementations own transport concerns (timeouts, retries). A returned
/// error means the page could not be fetched at all.
pub trait RecordSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch a single page of raw rows from `dataset`.
  fn fetch_page(
    &self,
    dataset: DatasetKind,
    query: PageQuery,
  ) -> impl Future<Output = Result<Vec<SourceRow>, Self::Error>> + Send + '_;
}

fn source_error<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::SourceFetch(Box::new(e))
}

// ─── Paginated fetch ─────────────────────────────────────────────────────────

/// Fetch every record of `T::DATASET`, page by page.
///
/// The offset advances by the number of rows actually returned. Paging stops
/// on a page shorter than requested (including an empty one) or once
/// `max_records` have been collected. Rows are decoded as soon as their page
/// arrives.
pub async fn fetch_all<S, T>(source: &S, options: &FetchOptions) -> Result<Vec<T>>
where
  S: RecordSource,
  T: FromSourceRow,
{
  let dataset = T::DATASET;
  let page_size = options.page_size.max(1);
  let mut records: Vec<T> = Vec::new();
  let mut offset = 0;
  let mut pages = 0usize;

  info!(
    dataset = %dataset,
    page_size,
    filter = ?options.filter,
    "starting paginated extraction"
  );

  loop {
    let limit = match options.max_records {
      Some(max) => {
        let remaining = max.saturating_sub(records.len());
        if remaining == 0 {
          break;
        }
        remaining.min(page_size)
      }
      None => page_size,
    };

    let query = PageQuery {
      limit,
      offset,
      filter: options.filter.clone(),
      order: Some(SortOrder::ascending(T::ORDER_FIELD)),
      select: T::SELECT,
    };

    let page = source
      .fetch_page(dataset, query)
      .await
      .map_err(source_error)?;
    pages += 1;

    let returned = page.len();
    for row in &page {
      records.push(T::from_source_row(row)?);
    }
    offset += returned;

    debug!(dataset = %dataset, page = pages, returned, total = records.len(), "page fetched");

    if returned < limit {
      break;
    }
    if !options.page_delay.is_zero() {
      tokio::time::sleep(options.page_delay).await;
    }
  }

  info!(dataset = %dataset, pages, total = records.len(), "extraction complete");
  Ok(records)
}

/// The most recent incident occurrence date published by the source.
pub async fn latest_occurrence_date<S>(source: &S) -> Result<Option<NaiveDate>>
where
  S: RecordSource,
{
  let query = PageQuery {
    limit:  1,
    offset: 0,
    filter: None,
    order:  Some(SortOrder::descending(OCCURRED_ON_FIELD)),
    select: Some(OCCURRED_ON_FIELD),
  };

  let page = source
    .fetch_page(DatasetKind::Incidents, query)
    .await
    .map_err(source_error)?;

  let latest = page
    .first()
    .and_then(|row| row.get(OCCURRED_ON_FIELD))
    .and_then(|v| v.as_str())
    .and_then(|s| s.get(..10))
    .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());

  if let Some(day) = latest {
    info!(latest = %day, "latest occurrence date at source");
  }
  Ok(latest)
}

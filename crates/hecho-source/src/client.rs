//! [`SodaClient`]: the reqwest implementation of [`RecordSource`].

use hecho_core::{
  dataset::DatasetKind,
  record::{OCCURRED_ON_FIELD, SourceRow},
  settings::SourceSettings,
  source::{Filter, PageQuery, RecordSource},
};
use reqwest::{
  Client,
  header::{ACCEPT, HeaderMap, HeaderValue},
};
use tracing::{debug, error, warn};

use crate::{Error, Result, RetryPolicy};

/// Render a typed filter as a SoQL `$where` predicate.
pub fn soql_where(filter: &Filter) -> String {
  match filter {
    Filter::OccurredAfter(day) => {
      format!("{OCCURRED_ON_FIELD} > '{}'", day.format("%Y-%m-%d"))
    }
  }
}

/// HTTP client for the open-data portal.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct SodaClient {
  client:   Client,
  settings: SourceSettings,
  retry:    RetryPolicy,
}

impl SodaClient {
  pub fn new(settings: SourceSettings) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(key) = settings.api_key.as_deref().filter(|k| !k.is_empty()) {
      headers.insert("X-App-Token", HeaderValue::from_str(key)?);
    }

    let client = Client::builder()
      .timeout(settings.timeout())
      .user_agent(concat!("hecho/", env!("CARGO_PKG_VERSION")))
      .default_headers(headers)
      .build()?;

    let retry = RetryPolicy {
      max_retries:  settings.max_retries,
      backoff_base: settings.backoff_base(),
    };

    Ok(Self { client, settings, retry })
  }

  pub fn settings(&self) -> &SourceSettings { &self.settings }

  fn params(query: &PageQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
      ("$limit", query.limit.to_string()),
      ("$offset", query.offset.to_string()),
    ];
    if let Some(order) = &query.order {
      let direction = if order.descending { " DESC" } else { "" };
      params.push(("$order", format!("{}{direction}", order.field)));
    }
    if let Some(filter) = &query.filter {
      params.push(("$where", soql_where(filter)));
    }
    if let Some(select) = query.select {
      params.push(("$select", select.to_owned()));
    }
    params
  }

  /// `GET url?params`, retrying transient failures per the retry policy.
  async fn get_rows(
    &self,
    url: &str,
    params: &[(&'static str, String)],
  ) -> Result<Vec<SourceRow>> {
    let mut attempt = 0;
    loop {
      debug!(url, ?params, attempt, "requesting page");

      let outcome = self.client.get(url).query(params).send().await;
      let retry_reason = match outcome {
        Ok(resp) if resp.status().is_success() => {
          let rows: Vec<SourceRow> = resp.json().await?;
          debug!(url, rows = rows.len(), "page received");
          return Ok(rows);
        }
        Ok(resp) => {
          let status = resp.status();
          if !RetryPolicy::is_retryable(status) || attempt >= self.retry.max_retries {
            error!(url, %status, attempt, "source request failed");
            return Err(Error::Status { status, url: url.to_owned() });
          }
          status.to_string()
        }
        Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.retry.max_retries => {
          e.to_string()
        }
        Err(e) => {
          error!(url, error = %e, attempt, "source request failed");
          return Err(e.into());
        }
      };

      let delay = self.retry.delay_for_attempt(attempt);
      warn!(url, reason = %retry_reason, attempt, ?delay, "retrying source request");
      tokio::time::sleep(delay).await;
      attempt += 1;
    }
  }
}

impl RecordSource for SodaClient {
  type Error = Error;

  async fn fetch_page(&self, dataset: DatasetKind, query: PageQuery) -> Result<Vec<SourceRow>> {
    let url = self.settings.endpoint(dataset)?;
    self.get_rows(&url, &Self::params(&query)).await
  }
}

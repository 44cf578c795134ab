use std::time::Duration;

use reqwest::StatusCode;

/// Bounded retry with exponential backoff for transient HTTP failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt.
  pub max_retries:  u32,
  pub backoff_base: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_retries: 3, backoff_base: Duration::from_secs(1) }
  }
}

impl RetryPolicy {
  /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
  }

  pub fn is_retryable(status: StatusCode) -> bool {
    matches!(
      status,
      StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT
    )
  }
}

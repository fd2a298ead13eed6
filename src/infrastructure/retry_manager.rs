//! Retry/backoff controller for one logical page fetch
//!
//! Classifies every attempt into one of three failure kinds and reacts to
//! each differently:
//! - rate limited (429): exponential backoff with jitter; exhausting the
//!   budget is fatal to the whole run and surfaces as [`RateLimitExhausted`]
//! - other HTTP status: abandoned immediately, "no data" for the row
//! - transport error: fixed cooldown, retried from the same budget
//!
//! The controller never terminates the process itself.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infrastructure::config::RetryConfig;
use crate::infrastructure::http_client::{FetchError, FetchResponse, Fetcher};
use crate::infrastructure::timing::{seconds, SharedRng, Sleeper};

/// Persistent rate limiting: the run must stop so the block can cool down
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limited on every one of {attempts} attempts for {url}")]
pub struct RateLimitExhausted {
    pub url: String,
    pub attempts: u32,
}

/// Non-fatal results of a logical fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffOutcome {
    Succeeded(FetchResponse),
    /// Non-success status other than 429; not retried
    Abandoned { status: u16 },
    /// Budget consumed by transport errors (the last attempt was not a 429)
    TransportExhausted { attempts: u32, last_error: FetchError },
}

impl BackoffOutcome {
    pub fn into_response(self) -> Option<FetchResponse> {
        match self {
            Self::Succeeded(response) => Some(response),
            _ => None,
        }
    }
}

/// Bounded retry around a [`Fetcher`]
pub struct BackoffController {
    fetcher: Arc<dyn Fetcher>,
    sleeper: Arc<dyn Sleeper>,
    rng: Arc<SharedRng>,
    config: RetryConfig,
}

impl BackoffController {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        sleeper: Arc<dyn Sleeper>,
        rng: Arc<SharedRng>,
        config: RetryConfig,
    ) -> Self {
        Self { fetcher, sleeper, rng, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Wait before the attempt following rate-limited attempt `attempt` (0-based)
    pub fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        let exponential = self.config.backoff_base_seconds * 2_f64.powi(i32::try_from(attempt.min(62)).unwrap_or(62));
        let jitter = self.rng.uniform(self.config.jitter_min_seconds, self.config.jitter_max_seconds);
        seconds(exponential + jitter)
    }

    pub fn transport_cooldown(&self) -> Duration {
        seconds(self.config.transport_cooldown_seconds)
    }

    /// Fetch `url`, retrying according to the policy
    pub async fn fetch_with_backoff(&self, url: &str) -> Result<BackoffOutcome, RateLimitExhausted> {
        let max_retries = self.config.max_retries.max(1);
        let mut last_transport_error = None;

        for attempt in 0..max_retries {
            match self.fetcher.fetch(url, &[]).await {
                Ok(response) if response.is_ok() => {
                    debug!("Fetched {} on attempt {}/{}", url, attempt + 1, max_retries);
                    return Ok(BackoffOutcome::Succeeded(response));
                }
                Ok(response) if response.is_rate_limited() => {
                    if attempt + 1 == max_retries {
                        warn!("⛔ 429 on final attempt {}/{} for {}", attempt + 1, max_retries, url);
                        return Err(RateLimitExhausted { url: url.to_string(), attempts: max_retries });
                    }
                    let wait = self.rate_limit_backoff(attempt);
                    info!(
                        "⏳ Attempt {}/{}: 429 rate limit for {}. Waiting {:.2}s...",
                        attempt + 1,
                        max_retries,
                        url,
                        wait.as_secs_f64()
                    );
                    self.sleeper.sleep(wait).await;
                }
                Ok(response) => {
                    warn!("🚫 Request failed for {}. Status code: {}", url, response.status);
                    return Ok(BackoffOutcome::Abandoned { status: response.status });
                }
                Err(error) => {
                    let cooldown = self.transport_cooldown();
                    warn!(
                        "⚠️ Attempt {}/{}: {}. Cooling down {:.2}s",
                        attempt + 1,
                        max_retries,
                        error,
                        cooldown.as_secs_f64()
                    );
                    last_transport_error = Some(error);
                    self.sleeper.sleep(cooldown).await;
                }
            }
        }

        let last_error = last_transport_error
            .unwrap_or_else(|| FetchError::transport(url, "retry budget exhausted"));
        warn!("Giving up on {} after {} transport failures", url, max_retries);
        Ok(BackoffOutcome::TransportExhausted { attempts: max_retries, last_error })
    }
}

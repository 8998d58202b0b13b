// Whole-request retry policy

use ipeds_common::{PipelineError, Result};
use reqwest::{Client, Method, Request, Response, StatusCode};
use std::time::Duration;
use tracing::{info, warn};

/// Statuses that are worth another attempt
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Longest single wait between attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Bounded retry with exponential backoff.
///
/// Only the request/response-header exchange is retried. A failure while the
/// body is being streamed belongs to the caller.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1.0)
    }
}

impl RetryPolicy {
    /// `max_attempts` counts every try including the first
    pub fn new(max_attempts: u32, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_factor: backoff_factor.max(0.0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        RETRYABLE_STATUSES.contains(&status.as_u16())
    }

    pub fn is_idempotent(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Delay after the `attempt`-th failure: `factor * 2^(attempt - 1)` seconds,
    /// capped at [`MAX_BACKOFF`]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let secs = self.backoff_factor * f64::from(1u32 << exponent);
        Duration::try_from_secs_f64(secs).map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Execute `request`, retrying transport errors and allowlisted statuses.
    ///
    /// Non-idempotent methods and non-allowlisted statuses are returned after
    /// the first attempt; the caller decides what a non-2xx response means.
    pub async fn execute(&self, client: &Client, request: Request) -> Result<Response> {
        let url = request.url().to_string();
        let retryable_method = Self::is_idempotent(request.method());
        let mut attempt = 0;

        loop {
            attempt += 1;
            let this_try = request.try_clone().ok_or_else(|| {
                PipelineError::transfer(&url, "request body cannot be replayed")
            })?;
            let can_retry = retryable_method && attempt < self.max_attempts;

            match client.execute(this_try).await {
                Ok(response) if retryable_method && Self::is_retryable_status(response.status()) => {
                    let status = response.status();
                    if !can_retry {
                        return Err(PipelineError::transfer(
                            &url,
                            format!("HTTP {} after {} attempts", status, attempt),
                        ));
                    }
                    warn!("Attempt {}/{} for {} returned {}", attempt, self.max_attempts, url, status);
                },
                Ok(response) => return Ok(response),
                Err(e) if can_retry => {
                    warn!("Attempt {}/{} for {} failed: {}", attempt, self.max_attempts, url, e);
                },
                Err(e) => {
                    return Err(PipelineError::transfer(
                        &url,
                        format!("{} (after {} attempts)", e, attempt),
                    ));
                },
            }

            let delay = self.backoff(attempt);
            info!("Retrying in {:.1}s...", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }
    }
}

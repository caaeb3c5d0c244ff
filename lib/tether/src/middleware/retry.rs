//! Retry policy for the retry stage.
//!
//! Retries transport failures (connection errors, timeouts) and responses
//! whose status is listed in [`RetryOptions::retry_statuses`], sleeping with
//! exponential backoff and jitter between attempts.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Sleep;
use tower::retry::Policy;
use tracing::debug;

use crate::config::RetryOptions;
use crate::{Error, Request, Response};

/// Retry policy driven by [`RetryOptions`].
///
/// `tower::retry::Retry` clones the policy for every request, so the attempt
/// counter is local to one request.
///
/// # Example
///
/// ```
/// use tether::RetryOptions;
/// use tether::middleware::{RetryLayer, RetryPolicy};
///
/// let layer = RetryLayer::new(RetryPolicy::new(RetryOptions::default()));
/// # let _ = layer;
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    options: Arc<RetryOptions>,
    attempts: u32,
}

impl RetryPolicy {
    /// Create a policy from the given options.
    #[must_use]
    pub fn new(options: RetryOptions) -> Self {
        Self {
            options: Arc::new(options),
            attempts: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based), before jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.options.backoff_factor.powi(exponent);
        let delay = Duration::try_from_secs_f64(self.options.interval.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX);

        match self.options.max_interval {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Delay before retry number `attempt`, scaled by a random factor in
    /// `[1 - randomness, 1 + randomness]`.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        // the field is public: NaN or out-of-range values bypass the builder
        let randomness = self.options.interval_randomness;
        if !randomness.is_finite() || randomness <= 0.0 {
            return delay;
        }
        let randomness = randomness.min(1.0);

        let factor = rand::thread_rng().gen_range((1.0 - randomness)..=(1.0 + randomness));
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
    }

    fn allows(&self, request: &Request) -> bool {
        self.options.max > 0
            && (request.method().is_idempotent() || self.options.retry_non_idempotent)
    }

    fn should_retry_response(&self, response: &Response) -> bool {
        self.options.retry_statuses.contains(&response.status())
    }

    fn should_retry_error(error: &Error) -> bool {
        error.is_transport()
    }
}

impl Policy<Request, Response, Error> for RetryPolicy {
    type Future = Sleep;

    fn retry(
        &mut self,
        request: &mut Request,
        result: &mut Result<Response, Error>,
    ) -> Option<Self::Future> {
        if self.attempts >= self.options.max {
            return None;
        }

        let should_retry = match result {
            Ok(response) => self.should_retry_response(response),
            Err(error) => Self::should_retry_error(error),
        };
        if !should_retry {
            return None;
        }

        self.attempts += 1;
        let delay = self.jittered_delay(self.attempts);
        debug!(
            method = %request.method(),
            url = %request.url(),
            attempt = self.attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying request"
        );

        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, request: &Request) -> Option<Request> {
        self.allows(request).then(|| request.clone())
    }
}

//! Backoff policy for summarization calls.
//!
//! Only transient failures are retried: HTTP 429 and 5xx, network errors,
//! timeouts, and empty completions. Client errors (400, 401, 403, 404, 422)
//! fail immediately.

use crate::context::summarizer::SummarizeError;
use std::time::Duration;

/// HTTP statuses worth retrying.
pub const RETRY_ON_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::with_attempts(1)
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        // Cheap deterministic spread; pulling in `rand` for this isn't worth it.
        let spread = [0.75, 0.9, 0.6, 0.85][(attempt % 4) as usize];
        Duration::from_secs_f64(capped * spread)
    }

    /// Whether another attempt is allowed after `attempt` failed with `error`.
    pub fn should_retry(&self, attempt: u32, error: &SummarizeError) -> bool {
        attempt + 1 < self.max_attempts && error.is_transient()
    }
}

/// Map a client error string onto a [`SummarizeError`].
///
/// The HTTP client reports failures as `String`s (`"request failed: ..."`,
/// `"OpenRouter API HTTP 429 ..."`). Anything carrying a retryable status or a
/// network failure becomes [`SummarizeError::Transport`]; everything else is
/// [`SummarizeError::Api`].
pub fn classify_error(error: String) -> SummarizeError {
    if is_transient_error(&error) && !is_permanent_error(&error) {
        SummarizeError::Transport(error)
    } else {
        SummarizeError::Api(error)
    }
}

/// Whether an error string describes a retryable failure.
pub fn is_transient_error(error: &str) -> bool {
    if RETRY_ON_STATUS
        .iter()
        .any(|status| error.contains(&format!("HTTP {status}")))
    {
        return true;
    }
    let lower = error.to_lowercase();
    [
        "request failed:",
        "failed to read response",
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Whether an error string describes a failure that will not go away.
pub fn is_permanent_error(error: &str) -> bool {
    ["HTTP 400", "HTTP 401", "HTTP 403", "HTTP 404", "HTTP 422"]
        .iter()
        .any(|needle| error.contains(needle))
}

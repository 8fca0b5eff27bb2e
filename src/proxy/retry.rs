// src/proxy/retry.rs

//! Retry policy for transient upstream failures (spec.md section 4.E
//! "Retries"): exponential backoff capped at `retryMaxDelay`, excluding
//! SSE responses and non-replayable (streaming) request bodies.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Backoff for the given zero-based attempt index, capped at
    /// `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(20));
        Duration::from_millis(exp.min(self.max_delay.as_millis()) as u64)
    }

    /// Whether the response/error on this attempt is eligible for a retry
    /// at all (spec.md section 4.E: connection refused, timeout,
    /// 502/503/504).
    pub fn is_transient_status(status: u16) -> bool {
        matches!(status, 502 | 503 | 504)
    }
}

/// Whether a request may be retried on a different instance at all. SSE
/// responses and streaming (non-replayable) request bodies are excluded
/// even within the attempt budget (spec.md section 4.E, resolved per the
/// "streaming-body retry exclusion" open question: a request is
/// non-replayable once its body has started streaming to the first
/// attempt's upstream, so the retry check happens before the first byte is
/// forwarded).
pub fn is_replayable(is_sse: bool, is_streaming_body: bool) -> bool {
    !is_sse && !is_streaming_body
}

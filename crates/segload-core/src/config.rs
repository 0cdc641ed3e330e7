use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetcher::ByteRange;

/// Header carrying the per-client correlation id on every range request.
pub const SESSION_HEADER: &str = "X-Session-ID";

/// Configuration for a loader session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Bytes requested per segment (default: 2 MiB).
    pub chunk_size: u64,
    /// Bytes requested by the bootstrap metadata probe (default: 65536).
    pub metadata_probe_bytes: u64,
    /// Headroom below which the buffer monitor emits a low-buffer trigger.
    pub buffer_threshold: Duration,
    /// HTTP request timeout for a single range fetch.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Timed retry policy for failed segment fetches.
    pub retry: RetryPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2 * 1024 * 1024,
            metadata_probe_bytes: 65536,
            buffer_threshold: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl LoaderConfig {
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn with_metadata_probe_bytes(mut self, bytes: u64) -> Self {
        self.metadata_probe_bytes = bytes.max(1);
        self
    }

    pub fn with_buffer_threshold(mut self, threshold: Duration) -> Self {
        self.buffer_threshold = threshold;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Range of the bootstrap request. Never empty, even for a zero probe size
    /// set through the public field or a deserialized config.
    pub fn metadata_range(&self) -> ByteRange {
        ByteRange::new(0, self.metadata_probe_bytes.max(1) - 1)
    }
}

/// Backoff schedule for segment retries driven by a timer.
///
/// `max_retries: None` retries forever; `Some(0)` leaves retries entirely to
/// external triggers such as low-buffer signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: Option<u32>,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::default()
        }
    }

    pub fn unbounded(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries: None,
            base_backoff,
            max_backoff,
        }
    }

    /// Delay before timed retry number `attempt` (1-based), or `None` once
    /// the budget is spent.
    pub fn backoff_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        if let Some(max) = self.max_retries {
            if attempt > max {
                return None;
            }
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base_backoff.saturating_mul(factor).min(self.max_backoff))
    }
}

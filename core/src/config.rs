//! Client tuning knobs.

use std::time::Duration;

use tracing::warn;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_LOG_EVERY: u32 = 5;

/// Timing for the single-shot fetcher and the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound for one HTTP attempt, layered under the caller's deadline.
    pub request_timeout: Duration,

    /// Fixed period of the retry clock.
    pub retry_interval: Duration,

    /// Failed attempts are logged on attempt 1 and every `log_every`-th one.
    pub log_every: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

impl ClientConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_log_every(mut self, every: u32) -> Self {
        self.log_every = every.max(1);
        self
    }

    /// Reads `HEIMDALL_REQUEST_TIMEOUT_MS`, `HEIMDALL_RETRY_INTERVAL_MS` and
    /// `HEIMDALL_LOG_EVERY`. Missing or unparsable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "HEIMDALL_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HEIMDALL_RETRY_INTERVAL_MS") {
            config.retry_interval = Duration::from_millis(ms);
        }
        if let Some(every) = parse_var::<u32>(&lookup, "HEIMDALL_LOG_EVERY") {
            config = config.with_log_every(every);
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

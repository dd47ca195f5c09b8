use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Legacy numeric code reported for every non-HTTP failure.
pub const SENTINEL_CODE: u16 = 999;

/// The status code a request must return to count as a success.
pub const SUCCESS_CODE: u16 = 200;

/// One unit of work: the URL to GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTask {
    url: Arc<str>,
}

impl RequestTask {
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum Status {
    Http(u16),
    Timeout,
    ConnectionError,
}

impl Status {
    /// Numeric code: the HTTP status, or [`SENTINEL_CODE`] for failures.
    pub fn code(&self) -> u16 {
        match self {
            Status::Http(code) => *code,
            Status::Timeout | Status::ConnectionError => SENTINEL_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Http(SUCCESS_CODE))
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Status::Http(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Http(code) => write!(f, "HTTP {}", code),
            Status::Timeout => f.write_str("TIMEOUT"),
            Status::ConnectionError => f.write_str("CONNECTION_ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub issued_at: DateTime<Utc>,
    pub latency_ms: f64,
    pub status: Status,
}

impl RequestOutcome {
    pub fn new(issued_at: DateTime<Utc>, elapsed: Duration, status: Status) -> Self {
        Self {
            issued_at,
            latency_ms: elapsed.as_secs_f64() * 1000.0,
            status,
        }
    }
}

/// Frozen result of one run, ordered by completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    pub target_count: u64,
    pub requested_concurrency: u32,
    pub total_wall_time_ms: f64,
    /// Set when the run was interrupted before every task completed.
    pub cancelled: bool,
    pub outcomes: Vec<RequestOutcome>,
}

impl RunResult {
    pub fn total_wall_time(&self) -> Duration {
        Duration::from_secs_f64(self.total_wall_time_ms.max(0.0) / 1000.0)
    }

    /// Issue time of each outcome relative to the earliest one, in milliseconds.
    pub fn relative_offsets_ms(&self) -> Vec<f64> {
        let Some(first) = self.outcomes.iter().map(|o| o.issued_at).min() else {
            return Vec::new();
        };

        self.outcomes
            .iter()
            .map(|o| {
                let delta = o.issued_at - first;
                delta
                    .num_microseconds()
                    .map(|us| us as f64 / 1000.0)
                    .unwrap_or_else(|| delta.num_milliseconds() as f64)
            })
            .collect()
    }
}

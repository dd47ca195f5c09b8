use crate::outcome::{RequestOutcome, RunResult};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Append-only, completion-ordered store for request outcomes shared by all workers.
pub struct ResultSink {
    inner: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    outcomes: Vec<RequestOutcome>,
    frozen: bool,
}

/// Run-level metadata attached when the sink is frozen.
#[derive(Debug, Clone)]
pub struct RunMeta {
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    pub target_count: u64,
    pub requested_concurrency: u32,
    pub total_wall_time: Duration,
    pub cancelled: bool,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(SinkState {
                outcomes: Vec::with_capacity(capacity),
                frozen: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append one outcome. Outcomes arriving after [`ResultSink::freeze`] are dropped.
    pub fn record(&self, outcome: RequestOutcome) {
        let mut state = self.lock();
        if state.frozen {
            tracing::debug!("Discarding outcome recorded after freeze: {}", outcome.status);
            return;
        }
        state.outcomes.push(outcome);
    }

    pub fn size(&self) -> usize {
        self.lock().outcomes.len()
    }

    /// Copy of the outcomes recorded from index `from` onwards.
    pub fn tail(&self, from: usize) -> Vec<RequestOutcome> {
        let state = self.lock();
        state.outcomes.get(from..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Take the recorded outcomes as an immutable [`RunResult`].
    ///
    /// # Panics
    ///
    /// Panics if the sink was already frozen.
    pub fn freeze(&self, meta: RunMeta) -> RunResult {
        let outcomes = {
            let mut state = self.lock();
            assert!(!state.frozen, "ResultSink::freeze called twice");
            state.frozen = true;
            std::mem::take(&mut state.outcomes)
        };

        RunResult {
            target_url: meta.target_url,
            started_at: meta.started_at,
            target_count: meta.target_count,
            requested_concurrency: meta.requested_concurrency,
            total_wall_time_ms: meta.total_wall_time.as_secs_f64() * 1000.0,
            cancelled: meta.cancelled,
            outcomes,
        }
    }
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new()
    }
}

use crate::executor::RequestExecutor;
use crate::outcome::{RequestTask, RunResult};
use crate::pool::WorkerPool;
use crate::queue::WorkQueue;
use crate::sink::{ResultSink, RunMeta};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Upper bound on outcomes preallocated up front; the sink grows past it as needed.
const MAX_PREALLOCATED_OUTCOMES: usize = 1 << 16;

/// What one run should do.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub url: String,
    pub total_requests: u64,
    pub concurrency: u32,
}

impl RunPlan {
    pub fn new(url: impl Into<String>, total_requests: u64, concurrency: u32) -> Self {
        Self {
            url: url.into(),
            total_requests,
            concurrency,
        }
    }

    /// One request at a time, in order.
    pub fn sequential(url: impl Into<String>, total_requests: u64) -> Self {
        Self::new(url, total_requests, 1)
    }
}

/// A single run: fills the queue, drives the pool until drain, freezes the sink.
///
/// The sink and cancel token are exposed before [`LoadRun::execute`] so a
/// progress reporter can poll and a signal handler can interrupt.
pub struct LoadRun {
    plan: RunPlan,
    sink: Arc<ResultSink>,
    cancel: CancellationToken,
}

impl LoadRun {
    pub fn new(plan: RunPlan) -> Self {
        Self::with_cancel_token(plan, CancellationToken::new())
    }

    /// Like [`LoadRun::new`], but interrupted whenever `cancel` is cancelled.
    /// Pass a child token to tie several runs to one interrupt.
    pub fn with_cancel_token(plan: RunPlan, cancel: CancellationToken) -> Self {
        let capacity = usize::try_from(plan.total_requests)
            .unwrap_or(usize::MAX)
            .min(MAX_PREALLOCATED_OUTCOMES);
        Self {
            plan,
            sink: Arc::new(ResultSink::with_capacity(capacity)),
            cancel,
        }
    }

    pub fn sink(&self) -> Arc<ResultSink> {
        self.sink.clone()
    }

    /// Cancelling this token stops the run early; partial results are still returned.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn execute(self, executor: Arc<dyn RequestExecutor>) -> RunResult {
        let plan = self.plan;
        let concurrency = plan.concurrency.max(1);

        let queue = Arc::new(WorkQueue::filled(
            RequestTask::new(plan.url.as_str()),
            plan.total_requests,
        ));
        queue.close();

        info!(
            "Starting run against {}: {} requests, concurrency {} ({} executor)",
            plan.url,
            plan.total_requests,
            concurrency,
            executor.name()
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let pool = WorkerPool::spawn(
            concurrency,
            executor,
            queue.clone(),
            self.sink.clone(),
            self.cancel.child_token(),
        );

        let cancelled = tokio::select! {
            _ = queue.await_drain() => false,
            _ = self.cancel.cancelled() => {
                info!("Run interrupted; stopping workers");
                true
            }
        };
        let total_wall_time = start.elapsed();

        pool.shutdown().await;

        let result = self.sink.freeze(RunMeta {
            target_url: plan.url,
            started_at,
            target_count: plan.total_requests,
            requested_concurrency: concurrency,
            total_wall_time,
            cancelled,
        });

        info!(
            "Run finished: {}/{} outcomes in {:.2}s",
            result.outcomes.len(),
            result.target_count,
            total_wall_time.as_secs_f64()
        );

        result
    }
}

/// Run `plan` to completion with no external interruption.
pub async fn run(plan: RunPlan, executor: Arc<dyn RequestExecutor>) -> RunResult {
    LoadRun::new(plan).execute(executor).await
}

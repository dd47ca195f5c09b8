use crate::executor::RequestExecutor;
use crate::queue::WorkQueue;
use crate::sink::ResultSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed set of workers draining a [`WorkQueue`] into a [`ResultSink`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<u64>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn exactly `concurrency` workers. Cancelling `cancel` stops them
    /// at their next suspension point.
    pub fn spawn(
        concurrency: u32,
        executor: Arc<dyn RequestExecutor>,
        queue: Arc<WorkQueue>,
        sink: Arc<ResultSink>,
        cancel: CancellationToken,
    ) -> Self {
        let handles = (0..concurrency)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    executor.clone(),
                    queue.clone(),
                    sink.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Self { handles, cancel }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Cancel every worker and wait until all of them have returned.
    /// Returns the number of tasks each worker completed.
    pub async fn shutdown(self) -> Vec<u64> {
        self.cancel.cancel();

        let mut completed = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(n) => completed.push(n),
                Err(e) => {
                    warn!("Worker task failed: {}", e);
                    completed.push(0);
                }
            }
        }
        completed
    }
}

async fn worker_loop(
    id: u32,
    executor: Arc<dyn RequestExecutor>,
    queue: Arc<WorkQueue>,
    sink: Arc<ResultSink>,
    cancel: CancellationToken,
) -> u64 {
    let mut completed = 0u64;

    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = queue.dequeue() => match task {
                Some(task) => task,
                None => break,
            },
        };

        // An abandoned request produces no outcome and is never marked done.
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Worker {} abandoned in-flight request to {}", id, task.url());
                break;
            }
            outcome = executor.execute(&task) => outcome,
        };

        sink.record(outcome);
        queue.mark_task_done();
        completed += 1;
    }

    debug!("Worker {} stopped after {} requests", id, completed);
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::outcome::RequestTask;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_pool_drains_queue() {
        let queue = Arc::new(WorkQueue::filled(RequestTask::new("mock://"), 40));
        let sink = Arc::new(ResultSink::new());

        let pool = WorkerPool::spawn(
            4,
            Arc::new(MockExecutor::new(10)),
            queue.clone(),
            sink.clone(),
            CancellationToken::new(),
        );
        assert_eq!(pool.size(), 4);

        queue.await_drain().await;
        let per_worker = pool.shutdown().await;

        assert_eq!(per_worker.len(), 4);
        assert_eq!(per_worker.iter().sum::<u64>(), 40);
        assert_eq!(sink.size(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_idle_workers() {
        // Nothing enqueued and never closed: workers park in dequeue.
        let queue = Arc::new(WorkQueue::new());
        let sink = Arc::new(ResultSink::new());

        let pool = WorkerPool::spawn(
            3,
            Arc::new(MockExecutor::new(1)),
            queue,
            sink.clone(),
            CancellationToken::new(),
        );

        let per_worker = timeout(Duration::from_secs(1), pool.shutdown())
            .await
            .expect("idle workers must stop on cancel");
        assert_eq!(per_worker, vec![0, 0, 0]);
        assert_eq!(sink.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_in_flight_requests() {
        let queue = Arc::new(WorkQueue::filled(RequestTask::new("mock://"), 2));
        let sink = Arc::new(ResultSink::new());

        let pool = WorkerPool::spawn(
            2,
            Arc::new(MockExecutor::new(60_000)),
            queue.clone(),
            sink.clone(),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown().await;

        assert_eq!(sink.size(), 0);
        assert_eq!(queue.outstanding(), 2);
    }
}

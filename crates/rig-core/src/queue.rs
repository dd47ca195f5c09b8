use crate::outcome::RequestTask;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Multi-producer/multi-consumer queue of pending requests with drain tracking.
///
/// A task is *outstanding* from `enqueue` until the consumer that dequeued it
/// calls [`WorkQueue::mark_task_done`]. The queue is drained when nothing is
/// outstanding.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    available: Notify,
    drained: Notify,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<RequestTask>,
    outstanding: usize,
    in_progress: usize,
    closed: bool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Pre-load `count` copies of `task`.
    pub fn filled(task: RequestTask, count: u64) -> Self {
        let queue = Self::new();
        for _ in 0..count {
            queue.enqueue(task.clone());
        }
        queue
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Never held across an await.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, task: RequestTask) {
        {
            let mut state = self.lock();
            state.tasks.push_back(task);
            state.outstanding += 1;
        }
        self.available.notify_one();
    }

    /// Wait for the next task. Returns `None` once the queue is closed and empty.
    pub async fn dequeue(&self) -> Option<RequestTask> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(task) = state.tasks.pop_front() {
                    state.in_progress += 1;
                    return Some(task);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Report that a dequeued task has been fully processed.
    ///
    /// # Panics
    ///
    /// Panics if there is no dequeued task left to acknowledge.
    pub fn mark_task_done(&self) {
        let drained = {
            let mut state = self.lock();
            assert!(
                state.in_progress > 0,
                "mark_task_done called more times than tasks were dequeued"
            );
            state.in_progress -= 1;
            state.outstanding -= 1;
            state.outstanding == 0
        };

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every enqueued task has been marked done.
    pub async fn await_drain(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.lock().outstanding == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Stop handing out work; waiting consumers wake up with `None` once the backlog is empty.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Tasks waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks enqueued but not yet marked done.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

use crate::sink::ResultSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Polls a [`ResultSink`] and logs a line each time another `every`
/// completions have been recorded. Read-only; never touches the run.
pub struct ProgressReporter {
    sink: Arc<ResultSink>,
    total: u64,
    every: u64,
    poll: Duration,
}

impl ProgressReporter {
    pub fn new(sink: Arc<ResultSink>, total: u64, every: u64) -> Self {
        Self {
            sink,
            total,
            every: every.max(1),
            poll: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Milestones crossed when moving from `last` to `now` completions.
    fn milestones(&self, last: u64, now: u64) -> impl Iterator<Item = u64> {
        let every = self.every;
        (last / every + 1..=now / every).map(move |m| m * every)
    }

    pub fn spawn(self, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last = 0u64;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let now = self.sink.size() as u64;
                for done in self.milestones(last, now) {
                    info!("--> {}/{} completed", done, self.total);
                }
                last = now;

                if now >= self.total {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestones() {
        let reporter = ProgressReporter::new(Arc::new(ResultSink::new()), 1000, 100);

        assert_eq!(reporter.milestones(0, 99).count(), 0);
        assert_eq!(reporter.milestones(0, 100).collect::<Vec<_>>(), vec![100]);
        assert_eq!(
            reporter.milestones(150, 420).collect::<Vec<_>>(),
            vec![200, 300, 400]
        );
        assert_eq!(reporter.milestones(400, 400).count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_stops_on_cancel() {
        let stop = CancellationToken::new();
        let handle = ProgressReporter::new(Arc::new(ResultSink::new()), 10, 1)
            .with_poll_interval(Duration::from_millis(5))
            .spawn(stop.clone());

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop")
            .unwrap();
    }
}

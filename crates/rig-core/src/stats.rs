use crate::outcome::{RunResult, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of a frozen run. Fields that cannot be computed (no samples,
/// zero elapsed time) are `None` rather than NaN or a panic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub count: u64,
    pub target_count: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub connection_errors: u64,
    pub error_rate: Option<f64>,
    pub mean_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,
    /// Latency of the first completed request; the cold-start sample.
    pub first_latency_ms: Option<f64>,
    pub worst: Option<WorstRequest>,
    pub throughput_rps: Option<f64>,
    pub duration_ms: f64,
    /// Outcome count per status label ("HTTP 200", "TIMEOUT", "CONNECTION_ERROR").
    /// Keyed by label rather than numeric code so a server answering 999
    /// is not folded into the sentinels.
    pub status_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstRequest {
    /// Position in completion order, zero-based.
    pub index: usize,
    pub latency_ms: f64,
    pub status: Status,
}

impl RunStatistics {
    pub fn from_run(run: &RunResult) -> Self {
        let mut errors = 0u64;
        let mut timeouts = 0u64;
        let mut connection_errors = 0u64;
        let mut status_counts = BTreeMap::new();

        for outcome in &run.outcomes {
            if !outcome.status.is_success() {
                errors += 1;
            }
            match outcome.status {
                Status::Timeout => timeouts += 1,
                Status::ConnectionError => connection_errors += 1,
                Status::Http(_) => {}
            }
            *status_counts.entry(outcome.status.to_string()).or_insert(0) += 1;
        }

        let mut sorted: Vec<f64> = run.outcomes.iter().map(|o| o.latency_ms).collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len() as u64;
        let mean_latency_ms = if sorted.is_empty() {
            None
        } else {
            Some(sorted.iter().sum::<f64>() / sorted.len() as f64)
        };

        // First maximum in completion order.
        let worst = run
            .outcomes
            .iter()
            .enumerate()
            .fold(None::<WorstRequest>, |worst, (index, o)| match worst {
                Some(w) if w.latency_ms >= o.latency_ms => Some(w),
                _ => Some(WorstRequest {
                    index,
                    latency_ms: o.latency_ms,
                    status: o.status,
                }),
            });

        let duration_ms = run.total_wall_time_ms;
        let wall_secs = run.total_wall_time().as_secs_f64();
        let throughput_rps = if run.target_count == 0 || wall_secs <= 0.0 {
            None
        } else {
            Some(run.target_count as f64 / wall_secs)
        };

        Self {
            count,
            target_count: run.target_count,
            errors,
            timeouts,
            connection_errors,
            error_rate: (count > 0).then(|| errors as f64 / count as f64),
            mean_latency_ms,
            min_latency_ms: sorted.first().copied(),
            max_latency_ms: sorted.last().copied(),
            latency_p50_ms: percentile(&sorted, 50),
            latency_p95_ms: percentile(&sorted, 95),
            latency_p99_ms: percentile(&sorted, 99),
            first_latency_ms: run.outcomes.first().map(|o| o.latency_ms),
            worst,
            throughput_rps,
            duration_ms,
            status_counts,
        }
    }
}

/// Nearest-rank percentile over already sorted samples.
pub fn percentile(sorted: &[f64], p: u64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let p = p.min(100) as usize;
    let rank = (p * sorted.len()).div_ceil(100).max(1);
    sorted.get(rank - 1).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::RequestOutcome;
    use chrono::Utc;

    fn run_of(samples: &[(f64, Status)], wall_ms: f64) -> RunResult {
        RunResult {
            target_url: "http://localhost/".to_string(),
            started_at: Utc::now(),
            target_count: samples.len() as u64,
            requested_concurrency: 1,
            total_wall_time_ms: wall_ms,
            cancelled: false,
            outcomes: samples
                .iter()
                .map(|&(latency_ms, status)| RequestOutcome {
                    issued_at: Utc::now(),
                    latency_ms,
                    status,
                })
                .collect(),
        }
    }

    #[test]
    fn test_basic_summary() {
        let run = run_of(
            &[
                (120.0, Status::Http(200)),
                (40.0, Status::Http(200)),
                (300.0, Status::Timeout),
                (60.0, Status::Http(500)),
            ],
            1000.0,
        );

        let stats = RunStatistics::from_run(&run);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.connection_errors, 0);
        assert_eq!(stats.error_rate, Some(0.5));
        assert_eq!(stats.mean_latency_ms, Some(130.0));
        assert_eq!(stats.min_latency_ms, Some(40.0));
        assert_eq!(stats.max_latency_ms, Some(300.0));
        assert_eq!(stats.first_latency_ms, Some(120.0));
        assert_eq!(stats.throughput_rps, Some(4.0));

        let worst = stats.worst.unwrap();
        assert_eq!(worst.index, 2);
        assert_eq!(worst.status, Status::Timeout);

        assert_eq!(stats.status_counts.get("HTTP 200"), Some(&2));
        assert_eq!(stats.status_counts.get("HTTP 500"), Some(&1));
        assert_eq!(stats.status_counts.get("TIMEOUT"), Some(&1));
    }

    #[test]
    fn test_http_999_is_not_counted_as_sentinel() {
        let run = run_of(
            &[
                (10.0, Status::Http(999)),
                (20.0, Status::Timeout),
                (30.0, Status::ConnectionError),
            ],
            100.0,
        );

        let stats = RunStatistics::from_run(&run);
        assert_eq!(stats.status_counts.get("HTTP 999"), Some(&1));
        assert_eq!(stats.status_counts.get("TIMEOUT"), Some(&1));
        assert_eq!(stats.status_counts.get("CONNECTION_ERROR"), Some(&1));
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.connection_errors, 1);
        assert_eq!(stats.errors, 3);
    }

    #[test]
    fn test_throughput_uses_wall_time() {
        let run = run_of(&[(5.0, Status::Http(200)), (5.0, Status::Http(200))], 500.0);
        assert_eq!(run.total_wall_time(), std::time::Duration::from_millis(500));

        let stats = RunStatistics::from_run(&run);
        assert_eq!(stats.throughput_rps, Some(4.0));
        assert_eq!(stats.duration_ms, 500.0);
    }

    #[test]
    fn test_empty_run_is_undefined() {
        let stats = RunStatistics::from_run(&run_of(&[], 0.0));

        assert_eq!(stats.count, 0);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.error_rate, None);
        assert_eq!(stats.mean_latency_ms, None);
        assert_eq!(stats.min_latency_ms, None);
        assert_eq!(stats.max_latency_ms, None);
        assert_eq!(stats.latency_p99_ms, None);
        assert_eq!(stats.worst, None);
        assert_eq!(stats.throughput_rps, None);
        assert!(stats.status_counts.is_empty());
    }

    #[test]
    fn test_zero_wall_time_has_no_throughput() {
        let stats = RunStatistics::from_run(&run_of(&[(1.0, Status::Http(200))], 0.0));
        assert_eq!(stats.throughput_rps, None);
        assert_eq!(stats.mean_latency_ms, Some(1.0));
    }

    #[test]
    fn test_idempotent() {
        let run = run_of(
            &[
                (10.0, Status::Http(200)),
                (25.0, Status::ConnectionError),
                (15.0, Status::Http(200)),
            ],
            40.0,
        );

        assert_eq!(RunStatistics::from_run(&run), RunStatistics::from_run(&run));
    }

    #[test]
    fn test_percentile_calculation() {
        let sorted: Vec<f64> = (1..=100).map(|v| v as f64).collect();

        assert_eq!(percentile(&sorted, 50), Some(50.0));
        assert_eq!(percentile(&sorted, 95), Some(95.0));
        assert_eq!(percentile(&sorted, 99), Some(99.0));
        assert_eq!(percentile(&sorted, 100), Some(100.0));
        assert_eq!(percentile(&sorted, 0), Some(1.0));
        assert_eq!(percentile(&[7.0], 99), Some(7.0));
        assert_eq!(percentile(&[], 50), None);
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use rig_core::{
    Config, HttpExecutor, LoadRun, MockExecutor, RequestExecutor, ResultSink, RunPlan, RunResult,
    RunStatistics,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "audit")]
#[command(about = "Sequential latency audit - cold-start scenario followed by a warm scenario")]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config/example.toml")]
    config: PathBuf,

    /// Execution mode: mock or http
    #[arg(long, default_value = "http")]
    mode: String,

    /// Requests per scenario (overrides config)
    #[arg(long)]
    requests: Option<u64>,

    /// Directory for the JSON result file
    #[arg(long, default_value = "results")]
    out_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct Scenario {
    name: String,
    statistics: RunStatistics,
    run: RunResult,
}

#[derive(Debug, Serialize)]
struct AuditReport {
    timestamp: String,
    target: String,
    requests_per_scenario: u64,
    /// First request of the cold scenario.
    cold_start_ms: Option<f64>,
    /// Mean of the warm scenario.
    steady_state_ms: Option<f64>,
    cold: Scenario,
    warm: Scenario,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(requests) = args.requests {
        config.audit.requests_per_scenario = requests;
    }

    let url = config.target.endpoint(&config.audit.path)?;
    let count = config.audit.requests_per_scenario;

    info!("--- Starting audit: {} ---", url);
    warn!("Cold start is only observable if the target has been idle long enough to sleep");

    let executor: Arc<dyn RequestExecutor> = match args.mode.as_str() {
        "mock" => Arc::new(MockExecutor::new(5)),
        "http" => Arc::new(
            HttpExecutor::new(config.audit.timeout())
                .context("Failed to create HTTP executor")?,
        ),
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };

    let interrupt = CancellationToken::new();
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted by user; collecting partial results");
                interrupt.cancel();
            }
        });
    }

    let cold = run_scenario(
        "Scenario A (cold start)",
        url.as_str(),
        count,
        executor.clone(),
        &interrupt,
    )
    .await;

    info!("--- Cooling down ({}ms) ---", config.audit.cooldown_ms);
    tokio::select! {
        _ = tokio::time::sleep(config.audit.cooldown()) => {}
        _ = interrupt.cancelled() => {}
    }

    // An interrupted audit still runs the warm scenario, which stops at once
    // and reports `cancelled` with no outcomes.
    let warm = run_scenario(
        "Scenario B (warm)",
        url.as_str(),
        count,
        executor,
        &interrupt,
    )
    .await;

    let report = AuditReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        target: url.to_string(),
        requests_per_scenario: count,
        cold_start_ms: cold.statistics.first_latency_ms,
        steady_state_ms: warm.statistics.mean_latency_ms,
        cold,
        warm,
    };

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let output_path = args.out_dir.join(format!("audit_{}.json", timestamp));

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {:?}", args.out_dir))?;
    let report_json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&output_path, report_json)
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    info!("Audit written to {:?}", output_path);
    print_comparison(&report);

    Ok(())
}

async fn run_scenario(
    name: &str,
    url: &str,
    count: u64,
    executor: Arc<dyn RequestExecutor>,
    interrupt: &CancellationToken,
) -> Scenario {
    info!("Running {} ({} requests)...", name, count);

    let load =
        LoadRun::with_cancel_token(RunPlan::sequential(url, count), interrupt.child_token());
    let stop = CancellationToken::new();
    let printer = spawn_request_printer(load.sink(), count, stop.clone());

    let run = load.execute(executor).await;
    stop.cancel();
    let _ = printer.await;

    Scenario {
        name: name.to_string(),
        statistics: RunStatistics::from_run(&run),
        run,
    }
}

/// Print one line per completed request as the sequential run advances.
fn spawn_request_printer(
    sink: Arc<ResultSink>,
    total: u64,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed = 0usize;
        let mut ticker = tokio::time::interval(Duration::from_millis(50));

        loop {
            let stopping = tokio::select! {
                _ = stop.cancelled() => true,
                _ = ticker.tick() => false,
            };

            for outcome in sink.tail(printed) {
                printed += 1;
                if outcome.status.is_sentinel() {
                    println!(
                        "   [{:02}/{}] FAILED: {} after {:.0} ms",
                        printed, total, outcome.status, outcome.latency_ms
                    );
                } else {
                    println!(
                        "   [{:02}/{}] {:6.0} ms | Status: {}",
                        printed,
                        total,
                        outcome.latency_ms,
                        outcome.status.code()
                    );
                }
            }

            if stopping {
                break;
            }
        }
    })
}

fn fmt_ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.0} ms", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_comparison(report: &AuditReport) {
    let (a, b) = (&report.cold.statistics, &report.warm.statistics);

    println!("\n=== Audit: {} ===", report.target);
    if report.cold.run.cancelled || report.warm.run.cancelled {
        println!("(interrupted: partial results)");
    }
    println!("{:<28} | {:>16} | {:>16}", "Metric", "Cold", "Warm");
    println!(
        "{:<28} | {:>14.2} s | {:>14.2} s",
        format!("Total time (N={})", report.requests_per_scenario),
        a.duration_ms / 1000.0,
        b.duration_ms / 1000.0
    );
    println!(
        "{:<28} | {:>16} | {:>16}",
        "Worst request",
        fmt_ms(a.max_latency_ms),
        fmt_ms(b.max_latency_ms)
    );
    println!(
        "{:<28} | {:>16} | {:>16}",
        "Mean",
        fmt_ms(a.mean_latency_ms),
        fmt_ms(b.mean_latency_ms)
    );
    println!(
        "{:<28} | {:>16} | {:>16}",
        "Errors",
        a.errors.to_string(),
        b.errors.to_string()
    );
    println!();

    match (report.cold_start_ms, report.steady_state_ms) {
        (Some(cold), Some(steady)) => println!(
            "Cold start: {:.2} s; afterwards the target answers in about {:.0} ms.",
            cold / 1000.0,
            steady
        ),
        _ => println!("Not enough samples to compare cold and warm behaviour."),
    }
    println!();
}

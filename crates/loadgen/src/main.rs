use anyhow::{Context, Result};
use clap::Parser;
use rig_core::{
    Config, HttpExecutor, LoadRun, MockExecutor, ProgressReporter, RequestExecutor, RunPlan,
    RunResult, RunStatistics,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "loadgen")]
#[command(about = "Concurrent HTTP load generator - fixed request count over a fixed worker pool")]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config/example.toml")]
    config: PathBuf,

    /// Execution mode: mock or http
    #[arg(long, default_value = "http")]
    mode: String,

    /// Total requests (overrides config)
    #[arg(long)]
    requests: Option<u64>,

    /// Concurrent workers (overrides config)
    #[arg(long)]
    concurrency: Option<u32>,

    /// Directory for the JSON result file
    #[arg(long, default_value = "results")]
    out_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct LoadReport<'a> {
    mode: &'a str,
    statistics: &'a RunStatistics,
    run: &'a RunResult,
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
        config.load.total_requests = requests;
    }
    if let Some(concurrency) = args.concurrency {
        config.load.concurrency = concurrency;
    }
    config.validate().context("Invalid configuration after CLI overrides")?;

    let url = config.target.endpoint(&config.target.path)?;

    info!("--- Starting load test: {} ---", url);
    info!(
        "--- Total: {} | Concurrency: {} | Timeout: {}ms ---",
        config.load.total_requests, config.load.concurrency, config.target.timeout_ms
    );

    let executor: Arc<dyn RequestExecutor> = match args.mode.as_str() {
        "mock" => Arc::new(MockExecutor::new(5)), // 5ms simulated latency
        "http" => Arc::new(
            HttpExecutor::new(config.target.timeout())
                .context("Failed to create HTTP executor")?,
        ),
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };

    let load = LoadRun::new(RunPlan::new(
        url.as_str(),
        config.load.total_requests,
        config.load.concurrency,
    ));

    let stop_progress = CancellationToken::new();
    let progress = ProgressReporter::new(
        load.sink(),
        config.load.total_requests,
        config.load.progress_every,
    )
    .spawn(stop_progress.clone());

    let cancel = load.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted by user; collecting partial results");
            cancel.cancel();
        }
    });

    let run = load.execute(executor).await;
    stop_progress.cancel();
    let _ = progress.await;

    let stats = RunStatistics::from_run(&run);

    let report = LoadReport {
        mode: &args.mode,
        statistics: &stats,
        run: &run,
    };
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let output_path = args.out_dir.join(format!("load_{}.json", timestamp));

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {:?}", args.out_dir))?;
    let report_json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&output_path, report_json)
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    info!("Results written to {:?}", output_path);
    print_summary(&run, &stats);

    Ok(())
}

fn fmt_ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2} ms", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_summary(run: &RunResult, stats: &RunStatistics) {
    println!("\n=== Load Test Summary: {} ===", run.target_url);
    if run.cancelled {
        println!("(interrupted: partial results)");
    }
    println!(
        "Requests: {}/{} | Concurrency: {}",
        stats.count, stats.target_count, run.requested_concurrency
    );
    println!("Duration: {:.2} s", stats.duration_ms / 1000.0);
    match stats.throughput_rps {
        Some(rps) => println!("Avg RPS (client): {:.2} req/s", rps),
        None => println!("Avg RPS (client): n/a"),
    }
    println!("Latency mean: {}", fmt_ms(stats.mean_latency_ms));
    println!("Latency max: {}", fmt_ms(stats.max_latency_ms));
    println!("Latency min: {}", fmt_ms(stats.min_latency_ms));
    println!("Latency p50: {}", fmt_ms(stats.latency_p50_ms));
    println!("Latency p95: {}", fmt_ms(stats.latency_p95_ms));
    println!("Latency p99: {}", fmt_ms(stats.latency_p99_ms));
    println!(
        "Errors (non-200): {} (timeouts: {}, connection errors: {})",
        stats.errors, stats.timeouts, stats.connection_errors
    );
    println!("Status distribution:");
    for (code, count) in &stats.status_counts {
        println!("  {}: {}", code, count);
    }
    println!();
}

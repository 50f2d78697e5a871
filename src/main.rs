// src/main.rs
use clap::Parser;
use harmonic_detector::backtest_engine::{BacktestConfig, ProgressCallback, WalkForwardEngine};
use harmonic_detector::detection::default_detectors;
use harmonic_detector::errors::CoreError;
use harmonic_detector::types::CandleData;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "harmonic_detector",
    about = "Walk-forward harmonic pattern backtest over an OHLC CSV file"
)]
struct Cli {
    /// CSV file with time,open,high,low,close,volume rows
    csv: PathBuf,

    /// Symbol tag carried into report signals
    #[arg(long, default_value = "UNKNOWN")]
    symbol: String,

    /// Timeframe tag carried into report signals
    #[arg(long, default_value = "1h")]
    timeframe: String,

    /// Swing confirmation window (bars on each side)
    #[arg(long, default_value_t = 5)]
    extremum_length: usize,

    /// Run detection every N bars
    #[arg(long, default_value_t = 10)]
    detection_interval: usize,

    /// Trailing extremum points visible to detectors
    #[arg(long, default_value_t = 500)]
    lookback_window: usize,

    /// Concurrent detector tasks
    #[arg(long, default_value_t = 4)]
    max_workers: usize,

    /// Detection cache time-to-live in seconds
    #[arg(long, default_value_t = 3600)]
    cache_ttl_secs: u64,

    /// Write the full JSON report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn load_candles(path: &PathBuf) -> Result<Vec<CandleData>, CoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut candles = Vec::new();
    for record in reader.deserialize() {
        let candle: CandleData = record?;
        candles.push(candle);
    }
    info!("[Main] Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    let candles = load_candles(&cli.csv)?;

    let config = BacktestConfig {
        symbol: cli.symbol.clone(),
        timeframe: cli.timeframe.clone(),
        lookback_window: cli.lookback_window,
        detection_interval: cli.detection_interval,
        extremum_length: cli.extremum_length,
        max_workers: cli.max_workers,
        cache_ttl: Duration::from_secs(cli.cache_ttl_secs),
        ..BacktestConfig::default()
    };
    let engine = WalkForwardEngine::new(config, default_detectors())?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("[Main] Interrupt received, finishing current bar");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let progress: ProgressCallback = Box::new(|pct, msg| {
        info!("[Main] Progress {}% ({})", pct, msg);
    });

    let report = engine.run(&candles, Some(cancel), Some(progress)).await?;

    println!(
        "Tracked {} patterns: {} success, {} invalid, {} failed, {} dismissed, {} still open (success rate {:.1}%)",
        report.tracked_patterns,
        report.status_counts.success,
        report.status_counts.invalid_prz,
        report.status_counts.failed_prz,
        report.status_counts.dismissed,
        report.status_counts.pending + report.status_counts.in_zone,
        report.success_rate * 100.0
    );
    for warning in &report.warnings {
        warn!("[Main] {}", warning);
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("[Main] Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init_from_env(
        env_logger::Env::new().default_filter_or("harmonic_detector=info,info"),
    );

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

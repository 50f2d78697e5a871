// src/backtest_engine.rs
// Walk-forward backtest over a candle series. Bars are consumed strictly in
// order; detectors only ever see the prefix up to the current bar, and the
// extremum tail handed to them is bounded by the lookback window. Detection
// runs at a fixed bar interval through the parallel dispatcher, newly seen
// unformed candidates are handed to the lifecycle tracker, and the tracker
// advances on every bar.

use crate::detection::{DetectionCache, DetectionDispatcher, PatternDetector};
use crate::errors::CoreError;
use crate::pattern_tracker::{PatternTracker, StatusCounts};
use crate::signal::PatternSignal;
use crate::statistics::{analyze_success_patterns, FibonacciAnalysis};
use crate::types::CandleData;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: String,
    /// How many trailing extremum points detectors get to see.
    pub lookback_window: usize,
    /// Run detection every N bars.
    pub detection_interval: usize,
    /// Swing confirmation window on each side of a candidate bar.
    pub extremum_length: usize,
    pub max_workers: usize,
    pub cache_max_entries: usize,
    pub cache_ttl: Duration,
    /// Report progress roughly this many times over the run.
    pub progress_steps: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "UNKNOWN".to_string(),
            timeframe: "1h".to_string(),
            lookback_window: 500,
            detection_interval: 10,
            extremum_length: 5,
            max_workers: crate::detection::DEFAULT_MAX_WORKERS,
            cache_max_entries: crate::detection::DEFAULT_MAX_ENTRIES,
            cache_ttl: Duration::from_secs(crate::detection::DEFAULT_TTL_SECS),
            progress_steps: 20,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.detection_interval == 0 {
            return Err(CoreError::Config(
                "detection_interval must be at least 1".to_string(),
            ));
        }
        if self.extremum_length == 0 {
            return Err(CoreError::Config(
                "extremum_length must be at least 1".to_string(),
            ));
        }
        if self.lookback_window == 0 {
            return Err(CoreError::Config(
                "lookback_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub type ProgressCallback = Box<dyn Fn(u8, &str) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub total_bars: usize,
    pub extremum_highs: usize,
    pub extremum_lows: usize,
    /// Distinct candidates by shape, counted the first time they are seen.
    pub candidates_by_shape: HashMap<String, usize>,
    pub candidates_by_subtype: HashMap<String, usize>,
    pub formed_candidates: usize,
    pub unformed_candidates: usize,
    pub tracked_patterns: usize,
    pub status_counts: StatusCounts,
    pub success_rate: f64,
    pub fibonacci: FibonacciAnalysis,
    /// Patterns still awaiting an outcome at the end of the data, as
    /// outbound signal snapshots.
    pub open_signals: Vec<PatternSignal>,
    /// Last error message per detector that reported one.
    pub detector_errors: HashMap<String, String>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
    pub detection_runs: usize,
    pub detection_secs: f64,
    pub elapsed_secs: f64,
    /// Net resolved-outcome balance sampled once per detection interval.
    pub outcome_curve: Vec<f64>,
    pub generated_at: DateTime<Utc>,
}

pub struct WalkForwardEngine {
    config: BacktestConfig,
    detectors: Vec<Arc<dyn PatternDetector>>,
    dispatcher: DetectionDispatcher,
}

impl WalkForwardEngine {
    pub fn new(
        config: BacktestConfig,
        detectors: Vec<Arc<dyn PatternDetector>>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        if detectors.is_empty() {
            return Err(CoreError::Config(
                "at least one detector is required".to_string(),
            ));
        }
        let cache = Arc::new(DetectionCache::new(
            config.cache_max_entries,
            config.cache_ttl,
        ));
        let dispatcher = DetectionDispatcher::new(cache, config.max_workers);
        Ok(Self {
            config,
            detectors,
            dispatcher,
        })
    }

    pub async fn run(
        &self,
        candles: &[CandleData],
        cancel: Option<Arc<AtomicBool>>,
        progress: Option<ProgressCallback>,
    ) -> Result<BacktestReport, CoreError> {
        let min_bars = 2 * self.config.extremum_length + 1;
        if candles.len() < min_bars {
            return Err(CoreError::Processing(format!(
                "Not enough candles: {} provided, {} required for extremum length {}",
                candles.len(),
                min_bars,
                self.config.extremum_length
            )));
        }

        let start = Instant::now();
        let total_bars = candles.len();
        let progress_every = (total_bars / self.config.progress_steps.max(1)).max(1);

        let mut extremum_tracker =
            crate::extremum::ExtremumTracker::new(self.config.extremum_length);
        let mut tracker = PatternTracker::new();
        let mut counted_candidates: HashSet<String> = HashSet::new();

        let mut candidates_by_shape: HashMap<String, usize> = HashMap::new();
        let mut candidates_by_subtype: HashMap<String, usize> = HashMap::new();
        let mut formed_candidates = 0usize;
        let mut unformed_candidates = 0usize;
        let mut detector_errors: HashMap<String, String> = HashMap::new();
        let mut detection_runs = 0usize;
        let mut detection_time = Duration::ZERO;
        let mut outcome_curve = Vec::new();
        let mut cancelled = false;

        info!(
            "[Backtest] Starting walk-forward over {} bars (interval {}, lookback {}, length {})",
            total_bars,
            self.config.detection_interval,
            self.config.lookback_window,
            self.config.extremum_length
        );

        for bar in 0..total_bars {
            if let Some(flag) = &cancel {
                if flag.load(Ordering::Relaxed) {
                    warn!("[Backtest] Cancelled at bar {}/{}", bar, total_bars);
                    cancelled = true;
                    break;
                }
            }

            extremum_tracker.advance(candles, bar);

            let due = bar % self.config.detection_interval == 0;
            if due && !extremum_tracker.points().is_empty() {
                detection_runs += 1;

                // Detectors see the confirmed extremum tail and the candle
                // prefix up to the current bar. Bar indices stay global, so
                // the prefix always starts at bar 0.
                let points = extremum_tracker.points();
                let tail_start = points.len().saturating_sub(self.config.lookback_window);
                let extremums = Arc::new(points[tail_start..].to_vec());
                let visible = Arc::new(candles[..=bar].to_vec());

                let outcome = self
                    .dispatcher
                    .dispatch(&self.detectors, extremums, visible)
                    .await;
                detection_time += outcome.elapsed;

                for (name, message) in outcome.errors {
                    detector_errors.insert(name, message);
                }

                for candidates in outcome.results.values() {
                    for candidate in candidates {
                        if counted_candidates.insert(candidate.pattern_id.clone()) {
                            *candidates_by_shape
                                .entry(candidate.shape.as_str().to_string())
                                .or_insert(0) += 1;
                            *candidates_by_subtype
                                .entry(candidate.subtype.clone())
                                .or_insert(0) += 1;
                            if candidate.is_formed {
                                formed_candidates += 1;
                            } else {
                                unformed_candidates += 1;
                            }
                        }
                        if !candidate.is_formed && !tracker.is_registered(&candidate.pattern_id)
                        {
                            tracker.register(candidate, candles, bar);
                        }
                    }
                }

                let counts = tracker.status_counts();
                outcome_curve.push(
                    counts.success as f64 - (counts.invalid_prz + counts.failed_prz) as f64,
                );
            }

            tracker.advance(bar, candles);

            if bar % progress_every == 0 || bar + 1 == total_bars {
                let pct = (((bar + 1) * 100) / total_bars) as u8;
                debug!("[Backtest] Bar {}/{} ({}%)", bar + 1, total_bars, pct);
                if let Some(cb) = &progress {
                    cb(pct, &format!("bar {}/{}", bar + 1, total_bars));
                }
            }
        }

        let status_counts = tracker.status_counts();
        let fibonacci = analyze_success_patterns(tracker.patterns(), candles);
        let last_close = candles.last().map(|c| c.close);
        let open_signals: Vec<PatternSignal> = tracker
            .patterns()
            .filter(|p| !p.status.is_terminal())
            .map(|p| {
                PatternSignal::from_tracked(p, &self.config.symbol, &self.config.timeframe, last_close)
            })
            .collect();
        let elapsed = start.elapsed();

        info!(
            "[Backtest] Done in {:.2}s: {} tracked, {} success, {} invalid, {} failed, {} dismissed ({} detection runs, {:.2}s detecting)",
            elapsed.as_secs_f64(),
            tracker.len(),
            status_counts.success,
            status_counts.invalid_prz,
            status_counts.failed_prz,
            status_counts.dismissed,
            detection_runs,
            detection_time.as_secs_f64()
        );

        Ok(BacktestReport {
            total_bars,
            extremum_highs: extremum_tracker.high_count(),
            extremum_lows: extremum_tracker.low_count(),
            candidates_by_shape,
            candidates_by_subtype,
            formed_candidates,
            unformed_candidates,
            tracked_patterns: tracker.len(),
            success_rate: status_counts.success_rate(),
            status_counts,
            fibonacci,
            open_signals,
            detector_errors,
            warnings: tracker.warnings().to_vec(),
            cancelled,
            detection_runs,
            detection_secs: detection_time.as_secs_f64(),
            elapsed_secs: elapsed.as_secs_f64(),
            outcome_curve,
            generated_at: Utc::now(),
        })
    }
}

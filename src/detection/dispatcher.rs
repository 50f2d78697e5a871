// src/detection/dispatcher.rs
// Fans detector calls out across a bounded set of tokio tasks and fans the
// results back in with a blocking join. One detector failing (error return
// or panic) is logged and converted to an empty result for that detector
// only; the others are unaffected. Merge order is irrelevant since results
// are keyed by detector name.

use crate::detection::{DetectionCache, PatternDetector};
use crate::types::{CandleData, ExtremumPoint, PatternCandidate};
use futures::future::join_all;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

pub const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Debug)]
pub struct DispatchOutcome {
    pub results: HashMap<String, Vec<PatternCandidate>>,
    pub errors: HashMap<String, String>,
    pub elapsed: Duration,
}

impl DispatchOutcome {
    pub fn total_candidates(&self) -> usize {
        self.results.values().map(|v| v.len()).sum()
    }
}

pub struct DetectionDispatcher {
    cache: Arc<DetectionCache>,
    max_workers: usize,
}

impl DetectionDispatcher {
    pub fn new(cache: Arc<DetectionCache>, max_workers: usize) -> Self {
        Self {
            cache,
            max_workers: max_workers.max(1),
        }
    }

    pub async fn dispatch(
        &self,
        detectors: &[Arc<dyn PatternDetector>],
        extremums: Arc<Vec<ExtremumPoint>>,
        candles: Arc<Vec<CandleData>>,
    ) -> DispatchOutcome {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = Vec::with_capacity(detectors.len());

        for detector in detectors {
            let detector = Arc::clone(detector);
            let extremums = Arc::clone(&extremums);
            let candles = Arc::clone(&candles);
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&semaphore);
            let detector_name = detector.name().to_string();

            let task = tokio::task::spawn(async move {
                // Closing the semaphore is not part of this design; acquire
                // can only fail if it were, so treat that as a detector error.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => return (detector.name().to_string(), Err(e.to_string())),
                };

                let name = detector.name().to_string();
                let key =
                    DetectionCache::cache_key(&extremums, &candles, &name, &detector.params());

                if let Some(patterns) = cache.get(&key) {
                    debug!("[Dispatcher] {} served {} candidates from cache", name, patterns.len());
                    return (name, Ok(patterns));
                }

                match detector.detect(&extremums, &candles) {
                    Ok(patterns) => {
                        cache.set(key, patterns.clone());
                        (name, Ok(patterns))
                    }
                    Err(e) => (name, Err(e.to_string())),
                }
            });
            tasks.push((detector_name, task));
        }

        let mut results = HashMap::new();
        let mut errors = HashMap::new();

        let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok((task_name, Ok(patterns))) => {
                    results.insert(task_name, patterns);
                }
                Ok((task_name, Err(message))) => {
                    warn!("[Dispatcher] Detector '{}' failed: {}", task_name, message);
                    errors.insert(task_name.clone(), message);
                    results.insert(task_name, Vec::new());
                }
                Err(join_err) => {
                    // A panic inside the detector task lands here.
                    let message = if join_err.is_panic() {
                        format!("detector panicked: {}", join_err)
                    } else {
                        join_err.to_string()
                    };
                    warn!("[Dispatcher] Detector '{}' aborted: {}", name, message);
                    errors.insert(name.clone(), message);
                    results.insert(name, Vec::new());
                }
            }
        }

        let elapsed = start.elapsed();
        debug!(
            "[Dispatcher] {} detectors, {} candidates, {} errors in {:.3}ms",
            results.len(),
            results.values().map(|v| v.len()).sum::<usize>(),
            errors.len(),
            elapsed.as_secs_f64() * 1000.0
        );

        DispatchOutcome {
            results,
            errors,
            elapsed,
        }
    }
}

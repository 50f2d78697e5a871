// src/detection/mod.rs
use crate::errors::CoreError;
use crate::types::{CandleData, ExtremumPoint, PatternCandidate};
use serde_json::Value;
use std::sync::Arc;

// Trait for pattern detectors. One implementation per pattern-shape x
// formed/unformed combination; the dispatcher only relies on this signature.
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Detector parameters, serialized canonically for cache keying.
    fn params(&self) -> Value {
        serde_json::json!({})
    }

    fn detect(
        &self,
        extremums: &[ExtremumPoint],
        candles: &[CandleData],
    ) -> Result<Vec<PatternCandidate>, CoreError>;
}

// Declare submodules
mod abcd;
pub mod cache;
pub mod dispatcher;
mod xabcd;

// Export detectors
pub use abcd::AbcdDetector;
pub use cache::{DetectionCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS};
pub use dispatcher::{DetectionDispatcher, DispatchOutcome, DEFAULT_MAX_WORKERS};
pub use xabcd::XabcdDetector;

/// The built-in detector set: formed and unformed variants of both shapes.
pub fn default_detectors() -> Vec<Arc<dyn PatternDetector>> {
    vec![
        Arc::new(AbcdDetector::formed()),
        Arc::new(AbcdDetector::unformed()),
        Arc::new(XabcdDetector::formed()),
        Arc::new(XabcdDetector::unformed()),
    ]
}

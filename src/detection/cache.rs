// src/detection/cache.rs
// Content-addressed memoization of detector output. The key is a pure
// function of the visible market state (extremum tail + recent OHLC), the
// detector name, and its parameters, so identical inputs always hash to the
// same key and a hit is always safe to reuse. A miss never fabricates an
// empty result; the caller runs the real detection.

use crate::types::{CandleData, ExtremumPoint, PatternCandidate};
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_TTL_SECS: u64 = 3600;

// How much trailing state participates in the key.
const KEY_EXTREMUM_TAIL: usize = 500;
const KEY_OHLC_TAIL: usize = 100;

struct CacheEntry {
    patterns: Vec<PatternCandidate>,
    inserted_at: Instant,
}

pub struct DetectionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl: Duration,
}

impl Default for DetectionCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl DetectionCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            ttl,
        }
    }

    /// Hash of (extremum tail, recent OHLC rounded to 8 decimals, detector
    /// name, canonical parameter JSON). serde_json serializes object keys in
    /// sorted order, so the parameter serialization is canonical.
    pub fn cache_key(
        extremums: &[ExtremumPoint],
        candles: &[CandleData],
        detector_name: &str,
        params: &Value,
    ) -> String {
        let mut hasher = Sha256::new();

        let ext_start = extremums.len().saturating_sub(KEY_EXTREMUM_TAIL);
        for point in &extremums[ext_start..] {
            hasher.update(
                format!("{}:{}:{:.8};", point.bar_index, point.is_high as u8, point.price)
                    .as_bytes(),
            );
        }

        let bar_start = candles.len().saturating_sub(KEY_OHLC_TAIL);
        for candle in &candles[bar_start..] {
            hasher.update(
                format!(
                    "{:.8}:{:.8}:{:.8}:{:.8};",
                    candle.open, candle.high, candle.low, candle.close
                )
                .as_bytes(),
            );
        }

        hasher.update(detector_name.as_bytes());
        hasher.update(params.to_string().as_bytes());

        let hex = format!("{:x}", hasher.finalize());
        hex[..16].to_string()
    }

    pub fn get(&self, key: &str) -> Option<Vec<PatternCandidate>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                debug!("[Cache] Hit for key {}", key);
                Some(entry.patterns.clone())
            }
            Some(_) => {
                debug!("[Cache] Expired entry for key {}", key);
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: String, patterns: Vec<PatternCandidate>) {
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CacheEntry {
                patterns,
                inserted_at: Instant::now(),
            },
        );

        // Evict the globally oldest entry while over capacity.
        while entries.len() > self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    debug!("[Cache] Evicting oldest entry {}", k);
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }

    pub fn remove_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

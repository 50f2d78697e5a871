// src/extremum.rs
// Swing point extraction. A bar is a swing high when its high is the maximum
// over the surrounding window of `length` bars on each side, and a swing low
// when its low is the window minimum. With length 1 a single bar can be both.

use crate::types::{CandleData, ExtremumPoint};

/// Scan a full candle slice for swing highs and lows. Output is ordered
/// ascending by bar index; when a bar is both high and low (length 1) the
/// high is emitted first.
pub fn find_extremum_points(candles: &[CandleData], length: usize) -> Vec<ExtremumPoint> {
    let mut points = Vec::new();
    if length == 0 || candles.len() < 2 * length + 1 {
        return points;
    }

    for i in length..candles.len() - length {
        let window = &candles[i - length..=i + length];
        let candle = &candles[i];

        let is_high = window.iter().all(|c| c.high <= candle.high);
        let is_low = window.iter().all(|c| c.low >= candle.low);

        if is_high {
            points.push(ExtremumPoint {
                time: candle.time.clone(),
                price: candle.high,
                is_high: true,
                bar_index: i,
            });
        }
        if is_low {
            points.push(ExtremumPoint {
                time: candle.time.clone(),
                price: candle.low,
                is_high: false,
                bar_index: i,
            });
        }
    }

    points
}

/// Incremental extremum tracking for the walk-forward engine. A swing at
/// bar `i` needs `length` later bars to confirm, so as the engine consumes
/// bar `current`, the candidate bar `current - length` can be settled.
/// Points are immutable once confirmed.
pub struct ExtremumTracker {
    length: usize,
    points: Vec<ExtremumPoint>,
    high_count: usize,
    low_count: usize,
}

impl ExtremumTracker {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            points: Vec::new(),
            high_count: 0,
            low_count: 0,
        }
    }

    /// Advance to `current_bar` (inclusive). Confirms at most one candidate
    /// bar per call, so the engine must call this once per consumed bar.
    pub fn advance(&mut self, candles: &[CandleData], current_bar: usize) {
        if self.length == 0 || current_bar >= candles.len() {
            return;
        }
        if current_bar < 2 * self.length {
            return;
        }

        let i = current_bar - self.length;
        let window = &candles[i - self.length..=i + self.length];
        let candle = &candles[i];

        if window.iter().all(|c| c.high <= candle.high) {
            self.points.push(ExtremumPoint {
                time: candle.time.clone(),
                price: candle.high,
                is_high: true,
                bar_index: i,
            });
            self.high_count += 1;
        }
        if window.iter().all(|c| c.low >= candle.low) {
            self.points.push(ExtremumPoint {
                time: candle.time.clone(),
                price: candle.low,
                is_high: false,
                bar_index: i,
            });
            self.low_count += 1;
        }
    }

    pub fn points(&self) -> &[ExtremumPoint] {
        &self.points
    }

    pub fn high_count(&self) -> usize {
        self.high_count
    }

    pub fn low_count(&self) -> usize {
        self.low_count
    }
}

// src/validation.rs
// Price containment validation. Pure predicates: given the candle series and
// candidate point indices/prices, decide whether the price action strictly
// between consecutive role points respects the ordering that defines the
// shape. Malformed input (misordered or out-of-range indices) reports false,
// it never panics.

use crate::types::{CandleData, Direction};

#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub bar_index: usize,
    pub price: f64,
}

impl PricePoint {
    pub fn new(bar_index: usize, price: f64) -> Self {
        Self { bar_index, price }
    }
}

/// True when any bar strictly between `start` and `end` has a high above
/// `limit`.
fn high_exceeds_between(candles: &[CandleData], start: usize, end: usize, limit: f64) -> bool {
    candles[start + 1..end].iter().any(|c| c.high > limit)
}

/// True when any bar strictly between `start` and `end` has a low below
/// `limit`.
fn low_breaks_between(candles: &[CandleData], start: usize, end: usize, limit: f64) -> bool {
    candles[start + 1..end].iter().any(|c| c.low < limit)
}

fn indices_valid(candles: &[CandleData], indices: &[usize]) -> bool {
    if indices.is_empty() {
        return false;
    }
    indices.windows(2).all(|w| w[0] < w[1]) && *indices.last().unwrap() < candles.len()
}

/// Containment rules for an ABCD candidate. `d` is absent for unformed
/// candidates; when present the two D-leg rules are checked as well.
pub fn validate_abcd(
    candles: &[CandleData],
    a: PricePoint,
    b: PricePoint,
    c: PricePoint,
    d: Option<PricePoint>,
    direction: Direction,
) -> bool {
    let mut indices = vec![a.bar_index, b.bar_index, c.bar_index];
    if let Some(d) = d {
        indices.push(d.bar_index);
    }
    if !indices_valid(candles, &indices) {
        return false;
    }

    match direction {
        Direction::Bullish => {
            // A high, B low, C high, D low.
            if high_exceeds_between(candles, a.bar_index, b.bar_index, a.price) {
                return false;
            }
            if low_breaks_between(candles, a.bar_index, c.bar_index, b.price) {
                return false;
            }
            if high_exceeds_between(candles, b.bar_index, c.bar_index, c.price) {
                return false;
            }
            if let Some(d) = d {
                if high_exceeds_between(candles, b.bar_index, d.bar_index, c.price) {
                    return false;
                }
                if low_breaks_between(candles, c.bar_index, d.bar_index, d.price) {
                    return false;
                }
            }
        }
        Direction::Bearish => {
            // A low, B high, C low, D high.
            if low_breaks_between(candles, a.bar_index, b.bar_index, a.price) {
                return false;
            }
            if high_exceeds_between(candles, a.bar_index, c.bar_index, b.price) {
                return false;
            }
            if low_breaks_between(candles, b.bar_index, c.bar_index, c.price) {
                return false;
            }
            if let Some(d) = d {
                if low_breaks_between(candles, b.bar_index, d.bar_index, c.price) {
                    return false;
                }
                if high_exceeds_between(candles, c.bar_index, d.bar_index, d.price) {
                    return false;
                }
            }
        }
    }

    true
}

/// Containment rules for the X/A/B/C legs of an XABCD candidate. The D leg
/// is projected for unformed candidates, so only the fixed points are
/// checked here.
pub fn validate_xabcd(
    candles: &[CandleData],
    x: PricePoint,
    a: PricePoint,
    b: PricePoint,
    c: PricePoint,
    direction: Direction,
) -> bool {
    let indices = [x.bar_index, a.bar_index, b.bar_index, c.bar_index];
    if !indices_valid(candles, &indices) {
        return false;
    }

    match direction {
        Direction::Bullish => {
            // X low, A high, B low, C high; B must hold above X.
            if b.price <= x.price {
                return false;
            }
            if low_breaks_between(candles, x.bar_index, a.bar_index, x.price) {
                return false;
            }
            if high_exceeds_between(candles, x.bar_index, b.bar_index, a.price) {
                return false;
            }
            if low_breaks_between(candles, a.bar_index, c.bar_index, b.price) {
                return false;
            }
            if high_exceeds_between(candles, b.bar_index, c.bar_index, c.price) {
                return false;
            }
        }
        Direction::Bearish => {
            // X high, A low, B high, C low; B must hold below X.
            if b.price >= x.price {
                return false;
            }
            if high_exceeds_between(candles, x.bar_index, a.bar_index, x.price) {
                return false;
            }
            if low_breaks_between(candles, x.bar_index, b.bar_index, a.price) {
                return false;
            }
            if high_exceeds_between(candles, a.bar_index, c.bar_index, b.price) {
                return false;
            }
            if low_breaks_between(candles, b.bar_index, c.bar_index, c.price) {
                return false;
            }
        }
    }

    true
}

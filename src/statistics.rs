// src/statistics.rs
// Post-hoc Fibonacci analysis over concluded patterns. Read-only with
// respect to the tracker: it measures how price behaved after each
// successful reversal, it never feeds back into lifecycle state.

use crate::pattern_tracker::{PatternStatus, TrackedPattern};
use crate::types::{CandleData, Direction, Role};
use log::debug;
use serde::Serialize;

/// Retracement/extension levels evaluated per pattern, in percent of the
/// reference range. Scanning stops once 161.8 is first touched.
pub const FIB_LEVELS: [f64; 12] = [
    0.0, 23.6, 38.2, 50.0, 61.8, 78.6, 88.6, 100.0, 112.8, 127.2, 141.4, 161.8,
];

const COMPLETION_LEVEL: f64 = 161.8;

#[derive(Debug, Clone, Serialize)]
pub struct FibLevelStats {
    pub level: f64,
    pub patterns_touched: usize,
    pub touch_rate_pct: f64,
    pub avg_touches: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarmonicPointStats {
    pub role: String,
    pub patterns_touched: usize,
    pub touch_rate_pct: f64,
    pub avg_touches: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FibonacciAnalysis {
    pub analyzed_patterns: usize,
    pub completed_patterns: usize,
    pub levels: Vec<FibLevelStats>,
    pub harmonic_points: Vec<HarmonicPointStats>,
}

/// Absolute price of a percentage level on the pattern's reference range.
/// Bullish patterns measure from max(A, C) at 0% down to the realized D at
/// 100%; bearish patterns from D at 0% up to min(A, C) at 100%.
fn level_prices(pattern: &TrackedPattern, d_price: f64) -> Option<Vec<f64>> {
    let a = pattern.candidate.point(Role::A)?.price;
    let c = pattern.candidate.point(Role::C)?.price;

    let (start, end) = match pattern.candidate.direction {
        Direction::Bullish => (a.max(c), d_price),
        Direction::Bearish => (d_price, a.min(c)),
    };
    if (end - start).abs() <= f64::EPSILON {
        return None;
    }

    Some(
        FIB_LEVELS
            .iter()
            .map(|lvl| start + (end - start) * lvl / 100.0)
            .collect(),
    )
}

pub fn analyze_success_patterns<'a, I>(patterns: I, candles: &[CandleData]) -> FibonacciAnalysis
where
    I: IntoIterator<Item = &'a TrackedPattern>,
{
    let harmonic_roles = [Role::A, Role::B, Role::C];

    let mut analyzed = 0usize;
    let mut completed = 0usize;
    let mut level_touch_counts: Vec<Vec<usize>> = vec![Vec::new(); FIB_LEVELS.len()];
    let mut point_touch_counts: Vec<Vec<usize>> = vec![Vec::new(); harmonic_roles.len()];

    for pattern in patterns {
        if pattern.status != PatternStatus::Success {
            continue;
        }
        let (d_bar, d_price) = match (pattern.actual_d_bar, pattern.realized_d()) {
            (Some(bar), Some(price)) => (bar, price),
            _ => continue,
        };
        let prices = match level_prices(pattern, d_price) {
            Some(p) => p,
            None => continue,
        };
        let point_prices: Vec<f64> = harmonic_roles
            .iter()
            .filter_map(|r| pattern.candidate.point(*r).map(|p| p.price))
            .collect();
        if point_prices.len() != harmonic_roles.len() {
            continue;
        }

        analyzed += 1;
        let mut level_touches = vec![0usize; FIB_LEVELS.len()];
        let mut point_touches = vec![0usize; harmonic_roles.len()];
        let mut pattern_completed = false;

        // Scan strictly after D; the whole scan stops once the completion
        // level is first touched.
        for candle in candles.iter().skip(d_bar + 1) {
            for (i, price) in prices.iter().enumerate() {
                if candle.low <= *price && *price <= candle.high {
                    level_touches[i] += 1;
                    if FIB_LEVELS[i] == COMPLETION_LEVEL {
                        pattern_completed = true;
                    }
                }
            }
            for (i, price) in point_prices.iter().enumerate() {
                if candle.low <= *price && *price <= candle.high {
                    point_touches[i] += 1;
                }
            }
            if pattern_completed {
                break;
            }
        }

        if pattern_completed {
            completed += 1;
        }
        for (i, touches) in level_touches.into_iter().enumerate() {
            level_touch_counts[i].push(touches);
        }
        for (i, touches) in point_touches.into_iter().enumerate() {
            point_touch_counts[i].push(touches);
        }
    }

    debug!(
        "[Statistics] Analyzed {} success patterns ({} completed)",
        analyzed, completed
    );

    let levels = FIB_LEVELS
        .iter()
        .zip(level_touch_counts)
        .map(|(level, touches)| summarize_level(*level, analyzed, &touches))
        .collect();

    let harmonic_points = harmonic_roles
        .iter()
        .zip(point_touch_counts)
        .map(|(role, touches)| {
            let s = summarize_level(0.0, analyzed, &touches);
            HarmonicPointStats {
                role: role.as_str().to_string(),
                patterns_touched: s.patterns_touched,
                touch_rate_pct: s.touch_rate_pct,
                avg_touches: s.avg_touches,
            }
        })
        .collect();

    FibonacciAnalysis {
        analyzed_patterns: analyzed,
        completed_patterns: completed,
        levels,
        harmonic_points,
    }
}

fn summarize_level(level: f64, analyzed: usize, touches: &[usize]) -> FibLevelStats {
    let touched: Vec<usize> = touches.iter().copied().filter(|t| *t > 0).collect();
    let patterns_touched = touched.len();
    let touch_rate_pct = if analyzed > 0 {
        patterns_touched as f64 / analyzed as f64 * 100.0
    } else {
        0.0
    };
    let avg_touches = if patterns_touched > 0 {
        touched.iter().sum::<usize>() as f64 / patterns_touched as f64
    } else {
        0.0
    };
    FibLevelStats {
        level,
        patterns_touched,
        touch_rate_pct,
        avg_touches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern_tracker::PatternTracker;
    use crate::types::{
        generate_pattern_id, PatternCandidate, PatternPoint, PatternShape, PrzZone,
    };
    use std::collections::{BTreeMap, HashMap};

    fn candle(high: f64, low: f64, close: f64) -> CandleData {
        CandleData {
            time: String::new(),
            open: close,
            high,
            low,
            close,
            volume: 0,
        }
    }

    // Bullish candidate: A=110 (bar 0), B=100 (bar 1), C=108 (bar 2), PRZ
    // band [95, 97]. Reference range runs from max(A, C)=110 down to the
    // realized D.
    fn success_tracker() -> (PatternTracker, Vec<CandleData>) {
        let mut points = BTreeMap::new();
        points.insert(Role::A, PatternPoint { bar_index: 0, price: 110.0 });
        points.insert(Role::B, PatternPoint { bar_index: 1, price: 100.0 });
        points.insert(Role::C, PatternPoint { bar_index: 2, price: 108.0 });
        let candidate = PatternCandidate {
            pattern_id: generate_pattern_id(
                PatternShape::Abcd,
                "AB=CD",
                Direction::Bullish,
                &points,
            ),
            shape: PatternShape::Abcd,
            subtype: "AB=CD".to_string(),
            direction: Direction::Bullish,
            points,
            ratios: HashMap::new(),
            prz_zones: vec![PrzZone {
                min: 95.0,
                max: 97.0,
                source: "AB=CD".to_string(),
                proj_min: 95.0,
                proj_max: 97.0,
            }],
            d_lines: vec![],
            is_formed: false,
        };

        let mut candles = vec![
            candle(110.0, 105.0, 106.0),
            candle(105.0, 100.0, 102.0),
            candle(108.0, 102.0, 107.0),
        ];
        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.register(&candidate, &candles, 2), 1);

        // Approach from above; the entry bar wicks to 96 (realized D) and
        // closes back above the band top, succeeding on the same bar.
        for bar in [
            candle(104.0, 99.0, 100.0),
            candle(99.0, 96.0, 97.5),
            candle(99.0, 97.1, 98.5),
        ] {
            candles.push(bar);
            tracker.advance(candles.len() - 1, &candles);
        }
        assert_eq!(
            tracker.patterns().next().unwrap().status,
            PatternStatus::Success
        );
        (tracker, candles)
    }

    #[test]
    fn levels_are_monotonic_over_the_reference_range() {
        let (tracker, _) = success_tracker();
        let pattern = tracker.patterns().next().unwrap();
        let prices = level_prices(pattern, pattern.realized_d().unwrap()).unwrap();

        // Bullish: 0% at max(A, C) = 110 descending to 100% at D = 96 and
        // beyond for the extensions.
        assert_eq!(prices.len(), FIB_LEVELS.len());
        assert!((prices[0] - 110.0).abs() < 1e-9);
        for pair in prices.windows(2) {
            assert!(pair[0] > pair[1]);
        }
        let d_index = FIB_LEVELS.iter().position(|l| *l == 100.0).unwrap();
        assert!((prices[d_index] - 96.0).abs() < 1e-9);
    }

    #[test]
    fn counts_touches_after_d() {
        let (tracker, mut candles) = success_tracker();
        // Price grinds back up through the retracement levels.
        candles.push(candle(102.0, 98.0, 101.0));
        candles.push(candle(106.0, 101.0, 105.0));
        candles.push(candle(110.5, 105.0, 110.0));

        let analysis = analyze_success_patterns(tracker.patterns(), &candles);
        assert_eq!(analysis.analyzed_patterns, 1);

        // The 0% level at 110 was touched by the final bar.
        let zero = &analysis.levels[0];
        assert_eq!(zero.patterns_touched, 1);
        assert!((zero.touch_rate_pct - 100.0).abs() < 1e-9);

        // Harmonic point B=100 was crossed on the way back up.
        let b = analysis
            .harmonic_points
            .iter()
            .find(|p| p.role == "B")
            .unwrap();
        assert_eq!(b.patterns_touched, 1);
    }

    #[test]
    fn scan_stops_at_completion_level() {
        let (tracker, mut candles) = success_tracker();
        let pattern = tracker.patterns().next().unwrap();
        let prices = level_prices(pattern, pattern.realized_d().unwrap()).unwrap();
        let completion_price = *prices.last().unwrap();

        // One bar that spikes through every level including 161.8, then a
        // long tail that would otherwise keep touching levels.
        candles.push(candle(112.0, completion_price - 1.0, 100.0));
        for _ in 0..10 {
            candles.push(candle(105.0, 95.0, 100.0));
        }

        let analysis = analyze_success_patterns(tracker.patterns(), &candles);
        assert_eq!(analysis.completed_patterns, 1);
        // The scan stopped with the completion bar, so the trailing noise
        // bars contributed nothing: at most two touches per level (one from
        // the bar after D, one from the spike).
        for level in &analysis.levels {
            assert_eq!(level.patterns_touched, 1);
            assert!(level.avg_touches <= 2.0);
        }
        let completion = analysis.levels.last().unwrap();
        assert!((completion.avg_touches - 1.0).abs() < 1e-9);
    }

    #[test]
    fn non_success_patterns_are_ignored() {
        let (tracker, candles) = success_tracker();
        let analysis = analyze_success_patterns(
            tracker.patterns().filter(|p| p.status != PatternStatus::Success),
            &candles,
        );
        assert_eq!(analysis.analyzed_patterns, 0);
        assert!(analysis.levels.iter().all(|l| l.patterns_touched == 0));
    }
}

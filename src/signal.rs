// src/signal.rs
// Outbound snapshot of a tracked pattern, shaped for JSON consumers. Signals
// are derived views; producing one never mutates tracker state.

use crate::pattern_tracker::{PatternStatus, TrackedPattern};
use crate::types::{Direction, PatternPoint, PatternShape, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct PatternSignal {
    pub symbol: String,
    pub timeframe: String,
    pub pattern_id: String,
    pub tracking_id: String,
    pub shape: PatternShape,
    pub subtype: String,
    pub direction: Direction,
    pub status: PatternStatus,
    pub is_formed: bool,
    pub points: BTreeMap<Role, PatternPoint>,
    pub prz_low: f64,
    pub prz_high: f64,
    pub d_lines: Vec<f64>,
    /// Signed distance from the current price to the nearest zone boundary,
    /// in percent of current price. Zero once price is inside the band.
    pub distance_to_prz_pct: Option<f64>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub targets: Vec<f64>,
    pub generated_at: DateTime<Utc>,
}

impl PatternSignal {
    pub fn from_tracked(
        pattern: &TrackedPattern,
        symbol: &str,
        timeframe: &str,
        current_price: Option<f64>,
    ) -> Self {
        let zone_height = (pattern.zone_high - pattern.zone_low).max(0.0);

        // Entry at the near edge of the band, stop one band-height beyond the
        // far edge, first target back at the C pivot.
        let (entry_price, stop_loss) = match pattern.candidate.direction {
            Direction::Bullish => (pattern.zone_high, pattern.zone_low - zone_height),
            Direction::Bearish => (pattern.zone_low, pattern.zone_high + zone_height),
        };
        let targets = pattern
            .candidate
            .point(Role::C)
            .map(|c| vec![c.price])
            .unwrap_or_default();

        let distance_to_prz_pct = current_price.map(|price| {
            if price <= 0.0 {
                return 0.0;
            }
            if price > pattern.zone_high {
                (price - pattern.zone_high) / price * 100.0
            } else if price < pattern.zone_low {
                (price - pattern.zone_low) / price * 100.0
            } else {
                0.0
            }
        });

        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            pattern_id: pattern.candidate.pattern_id.clone(),
            tracking_id: pattern.tracking_id.clone(),
            shape: pattern.candidate.shape,
            subtype: pattern.candidate.subtype.clone(),
            direction: pattern.candidate.direction,
            status: pattern.status,
            is_formed: pattern.candidate.is_formed,
            points: pattern.candidate.points.clone(),
            prz_low: pattern.zone_low,
            prz_high: pattern.zone_high,
            d_lines: pattern.d_lines.clone(),
            distance_to_prz_pct,
            entry_price,
            stop_loss,
            targets,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern_tracker::PatternTracker;
    use crate::types::{generate_pattern_id, CandleData, PatternCandidate, PrzZone};
    use std::collections::HashMap;

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

    fn tracked() -> (PatternTracker, Vec<CandleData>) {
        let mut points = BTreeMap::new();
        points.insert(Role::A, PatternPoint { bar_index: 0, price: 110.0 });
        points.insert(Role::B, PatternPoint { bar_index: 1, price: 100.0 });
        points.insert(Role::C, PatternPoint { bar_index: 2, price: 106.0 });
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
                min: 94.0,
                max: 96.0,
                source: "AB=CD".to_string(),
                proj_min: 94.0,
                proj_max: 96.0,
            }],
            d_lines: vec![],
            is_formed: false,
        };
        let candles = vec![
            candle(110.0, 105.0, 106.0),
            candle(105.0, 100.0, 101.0),
            candle(106.0, 101.0, 105.0),
        ];
        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.register(&candidate, &candles, 2), 1);
        (tracker, candles)
    }

    #[test]
    fn snapshot_carries_zone_and_trade_levels() {
        let (tracker, _) = tracked();
        let pattern = tracker.patterns().next().unwrap();
        let signal = PatternSignal::from_tracked(pattern, "EURUSD", "1h", Some(100.0));

        assert_eq!(signal.symbol, "EURUSD");
        assert_eq!(signal.status, PatternStatus::Pending);
        assert!((signal.prz_low - 94.0).abs() < 1e-9);
        assert!((signal.prz_high - 96.0).abs() < 1e-9);
        // Bullish: entry at the upper edge, stop a band-height below.
        assert!((signal.entry_price - 96.0).abs() < 1e-9);
        assert!((signal.stop_loss - 92.0).abs() < 1e-9);
        assert_eq!(signal.targets, vec![106.0]);
        // 100 is 4 above the band top: +4%.
        assert!((signal.distance_to_prz_pct.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn distance_is_zero_inside_the_band() {
        let (tracker, _) = tracked();
        let pattern = tracker.patterns().next().unwrap();
        let signal = PatternSignal::from_tracked(pattern, "EURUSD", "1h", Some(95.0));
        assert_eq!(signal.distance_to_prz_pct, Some(0.0));
    }

    #[test]
    fn distance_is_negative_below_the_band() {
        let (tracker, _) = tracked();
        let pattern = tracker.patterns().next().unwrap();
        let signal = PatternSignal::from_tracked(pattern, "EURUSD", "1h", Some(90.0));
        assert!(signal.distance_to_prz_pct.unwrap() < 0.0);
    }

    #[test]
    fn serializes_with_snake_case_status() {
        let (tracker, _) = tracked();
        let pattern = tracker.patterns().next().unwrap();
        let signal = PatternSignal::from_tracked(pattern, "EURUSD", "1h", None);
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json["distance_to_prz_pct"].is_null());
    }
}

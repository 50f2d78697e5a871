// src/pattern_tracker.rs
// Lifecycle tracking for detected pattern candidates. The tracker owns every
// TrackedPattern from registration until the end of the run; patterns are
// never deleted, they only move forward through the status machine:
//
//   Pending -> InZone -> Success | InvalidPrz | FailedPrz
//   any non-terminal state -> Dismissed (structural break)
//
// Terminal states are never reverted. Zone mechanics are evaluated relative
// to the side price approached the band from; the zone-cross check runs
// before the reversal check.

use crate::types::{CandleData, Direction, PatternCandidate, PatternShape, Role};
use crate::validation::{validate_abcd, validate_xabcd, PricePoint};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Pending,
    InZone,
    Success,
    InvalidPrz,
    FailedPrz,
    Dismissed,
}

impl PatternStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PatternStatus::Success
                | PatternStatus::InvalidPrz
                | PatternStatus::FailedPrz
                | PatternStatus::Dismissed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternStatus::Pending => "pending",
            PatternStatus::InZone => "in_zone",
            PatternStatus::Success => "success",
            PatternStatus::InvalidPrz => "invalid_prz",
            PatternStatus::FailedPrz => "failed_prz",
            PatternStatus::Dismissed => "dismissed",
        }
    }
}

/// Which side price approached the reversal band from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApproachSide {
    Above,
    Below,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedPattern {
    pub tracking_id: String,
    pub prz_instance: usize,
    pub candidate: PatternCandidate,
    pub status: PatternStatus,
    pub zone_low: f64,
    pub zone_high: f64,
    pub d_lines: Vec<f64>,
    pub registered_bar: usize,
    pub zone_entry_bar: Option<usize>,
    pub zone_entry_price: Option<f64>,
    pub reversal_bar: Option<usize>,
    pub reversal_price: Option<f64>,
    pub zone_exit_bar: Option<usize>,
    pub invalid_bar: Option<usize>,
    pub failed_bar: Option<usize>,
    pub dismissed_bar: Option<usize>,
    pub actual_d_bar: Option<usize>,
    #[serde(skip)]
    approach: Option<ApproachSide>,
    #[serde(skip)]
    far_exit_seen: bool,
}

impl TrackedPattern {
    /// The realized D price once the zone has been touched.
    pub fn realized_d(&self) -> Option<f64> {
        self.zone_entry_price
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_zone: usize,
    pub success: usize,
    pub invalid_prz: usize,
    pub failed_prz: usize,
    pub dismissed: usize,
}

impl StatusCounts {
    /// success / (success + invalid_prz + failed_prz); zero when no pattern
    /// reached a PRZ outcome.
    pub fn success_rate(&self) -> f64 {
        let resolved = self.success + self.invalid_prz + self.failed_prz;
        if resolved == 0 {
            0.0
        } else {
            self.success as f64 / resolved as f64
        }
    }
}

pub struct PatternTracker {
    patterns: HashMap<String, TrackedPattern>,
    // Insertion order, so advancement and reporting stay deterministic.
    order: Vec<String>,
    seen_pattern_ids: HashSet<String>,
    warnings: Vec<String>,
}

impl Default for PatternTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternTracker {
    pub fn new() -> Self {
        Self {
            patterns: HashMap::new(),
            order: Vec::new(),
            seen_pattern_ids: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_registered(&self, pattern_id: &str) -> bool {
        self.seen_pattern_ids.contains(pattern_id)
    }

    /// Register a candidate. Returns how many TrackedPatterns were created:
    /// one per PRZ zone for ABCD candidates, one spanning the D-lines for
    /// XABCD. Formed candidates and duplicates register nothing; XABCD
    /// candidates without D-lines are discarded with a warning.
    pub fn register(
        &mut self,
        candidate: &PatternCandidate,
        candles: &[CandleData],
        current_bar: usize,
    ) -> usize {
        if candidate.is_formed {
            return 0;
        }
        if self.seen_pattern_ids.contains(&candidate.pattern_id) {
            return 0;
        }

        // Fixed-leg containment can never start failing later, so a
        // discarded candidate is remembered and not re-examined.
        self.seen_pattern_ids.insert(candidate.pattern_id.clone());

        if !self.structure_holds(candidate, candles) {
            debug!(
                "[Tracker] Candidate {} failed containment at registration",
                candidate.pattern_id
            );
            return 0;
        }

        let bands: Vec<(f64, f64)> = match candidate.shape {
            PatternShape::Abcd => candidate
                .prz_zones
                .iter()
                .map(|z| (z.min, z.max))
                .collect(),
            PatternShape::Xabcd => {
                if candidate.d_lines.is_empty() {
                    let message = format!(
                        "XABCD candidate {} has no D-lines; not registered",
                        candidate.pattern_id
                    );
                    warn!("[Tracker] {}", message);
                    self.warnings.push(message);
                    return 0;
                }
                let low = candidate.d_lines.iter().cloned().fold(f64::INFINITY, f64::min);
                let high = candidate.d_lines.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                vec![(low, high)]
            }
        };

        if bands.is_empty() {
            let message = format!(
                "ABCD candidate {} has no PRZ zones; not registered",
                candidate.pattern_id
            );
            warn!("[Tracker] {}", message);
            self.warnings.push(message);
            return 0;
        }

        let mut registered = 0;
        for (instance, (zone_low, zone_high)) in bands.into_iter().enumerate() {
            let tracking_id = format!("{}#{}", candidate.pattern_id, instance);
            if self.patterns.contains_key(&tracking_id) {
                continue;
            }

            self.patterns.insert(
                tracking_id.clone(),
                TrackedPattern {
                    tracking_id: tracking_id.clone(),
                    prz_instance: instance,
                    candidate: candidate.clone(),
                    status: PatternStatus::Pending,
                    zone_low,
                    zone_high,
                    d_lines: candidate.d_lines.clone(),
                    registered_bar: current_bar,
                    zone_entry_bar: None,
                    zone_entry_price: None,
                    reversal_bar: None,
                    reversal_price: None,
                    zone_exit_bar: None,
                    invalid_bar: None,
                    failed_bar: None,
                    dismissed_bar: None,
                    actual_d_bar: None,
                    approach: None,
                    far_exit_seen: false,
                },
            );
            self.order.push(tracking_id);
            registered += 1;
        }

        registered
    }

    /// Advance every open pattern by one bar. Must be called in strictly
    /// increasing bar order.
    pub fn advance(&mut self, bar_index: usize, candles: &[CandleData]) {
        if bar_index >= candles.len() {
            return;
        }
        let candle = candles[bar_index].clone();

        for id in &self.order {
            let pattern = match self.patterns.get_mut(id) {
                Some(p) => p,
                None => continue,
            };
            if pattern.status.is_terminal() || bar_index <= pattern.registered_bar {
                continue;
            }

            // Structural break first: price exceeding the C pivot before a
            // PRZ outcome invalidates the leg geometry regardless of zone
            // state.
            if let Some(c) = pattern.candidate.point(Role::C) {
                let broken = match pattern.candidate.direction {
                    Direction::Bullish => candle.high > c.price,
                    Direction::Bearish => candle.low < c.price,
                };
                if broken {
                    debug!(
                        "[Tracker] {} dismissed at bar {} (C pivot violated)",
                        pattern.tracking_id, bar_index
                    );
                    pattern.status = PatternStatus::Dismissed;
                    pattern.dismissed_bar = Some(bar_index);
                    continue;
                }
            }

            if pattern.status == PatternStatus::Pending {
                let touches =
                    candle.low <= pattern.zone_high && candle.high >= pattern.zone_low;
                if touches {
                    let approach = approach_side(pattern, bar_index, candles);
                    pattern.approach = Some(approach);
                    pattern.status = PatternStatus::InZone;
                    pattern.zone_entry_bar = Some(bar_index);
                    pattern.zone_entry_price =
                        Some(entry_price(&candle, pattern.zone_low, pattern.zone_high, approach));
                    pattern.actual_d_bar = Some(bar_index);
                    debug!(
                        "[Tracker] {} entered zone [{:.5}, {:.5}] at bar {}",
                        pattern.tracking_id, pattern.zone_low, pattern.zone_high, bar_index
                    );
                    // Fall through: the entry bar is also evaluated against
                    // the cross/reversal rules below.
                }
            }

            if pattern.status == PatternStatus::InZone {
                apply_zone_rules(pattern, &candle, bar_index);
            }
        }
    }

    /// Fixed-leg containment for a candidate (X/A/B/C only).
    fn structure_holds(&self, candidate: &PatternCandidate, candles: &[CandleData]) -> bool {
        let point = |role| {
            candidate
                .point(role)
                .map(|p: &crate::types::PatternPoint| PricePoint::new(p.bar_index, p.price))
        };
        match candidate.shape {
            PatternShape::Abcd => match (point(Role::A), point(Role::B), point(Role::C)) {
                (Some(a), Some(b), Some(c)) => {
                    validate_abcd(candles, a, b, c, None, candidate.direction)
                }
                _ => false,
            },
            PatternShape::Xabcd => {
                match (point(Role::X), point(Role::A), point(Role::B), point(Role::C)) {
                    (Some(x), Some(a), Some(b), Some(c)) => {
                        validate_xabcd(candles, x, a, b, c, candidate.direction)
                    }
                    _ => false,
                }
            }
        }
    }

    pub fn patterns(&self) -> impl Iterator<Item = &TrackedPattern> {
        self.order.iter().filter_map(|id| self.patterns.get(id))
    }

    pub fn get(&self, tracking_id: &str) -> Option<&TrackedPattern> {
        self.patterns.get(tracking_id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for pattern in self.patterns.values() {
            match pattern.status {
                PatternStatus::Pending => counts.pending += 1,
                PatternStatus::InZone => counts.in_zone += 1,
                PatternStatus::Success => counts.success += 1,
                PatternStatus::InvalidPrz => counts.invalid_prz += 1,
                PatternStatus::FailedPrz => counts.failed_prz += 1,
                PatternStatus::Dismissed => counts.dismissed += 1,
            }
        }
        counts
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Side the price approached the band from, read off the previous close.
/// When the previous close is inside the band (or there is no previous
/// bar), fall back to the direction's natural approach: bullish patterns
/// complete into a low, so price arrives from above.
fn approach_side(pattern: &TrackedPattern, bar_index: usize, candles: &[CandleData]) -> ApproachSide {
    if bar_index > 0 {
        let prev_close = candles[bar_index - 1].close;
        if prev_close > pattern.zone_high {
            return ApproachSide::Above;
        }
        if prev_close < pattern.zone_low {
            return ApproachSide::Below;
        }
    }
    match pattern.candidate.direction {
        Direction::Bullish => ApproachSide::Above,
        Direction::Bearish => ApproachSide::Below,
    }
}

/// First touched price inside the band: the bar extreme that landed in the
/// zone, or the approach-side boundary when the bar engulfs the whole band.
fn entry_price(candle: &CandleData, zone_low: f64, zone_high: f64, approach: ApproachSide) -> f64 {
    if candle.low >= zone_low && candle.low <= zone_high {
        candle.low
    } else if candle.high >= zone_low && candle.high <= zone_high {
        candle.high
    } else {
        match approach {
            ApproachSide::Above => zone_high,
            ApproachSide::Below => zone_low,
        }
    }
}

/// Zone mechanics for an InZone pattern. Checked in order: full far-side
/// cross, far-side close (flag only), entry-side reversal.
fn apply_zone_rules(pattern: &mut TrackedPattern, candle: &CandleData, bar_index: usize) {
    let approach = match pattern.approach {
        Some(a) => a,
        None => return,
    };

    match approach {
        ApproachSide::Below => {
            // Far boundary above, entry boundary below.
            if candle.low > pattern.zone_high {
                pattern.status = PatternStatus::InvalidPrz;
                pattern.invalid_bar = Some(bar_index);
                pattern.zone_exit_bar = Some(bar_index);
            } else if candle.close > pattern.zone_high {
                pattern.far_exit_seen = true;
                pattern.zone_exit_bar = Some(bar_index);
            } else if candle.close < pattern.zone_low {
                conclude_entry_side_exit(pattern, candle, bar_index);
            }
        }
        ApproachSide::Above => {
            // Far boundary below, entry boundary above.
            if candle.high < pattern.zone_low {
                pattern.status = PatternStatus::InvalidPrz;
                pattern.invalid_bar = Some(bar_index);
                pattern.zone_exit_bar = Some(bar_index);
            } else if candle.close < pattern.zone_low {
                pattern.far_exit_seen = true;
                pattern.zone_exit_bar = Some(bar_index);
            } else if candle.close > pattern.zone_high {
                conclude_entry_side_exit(pattern, candle, bar_index);
            }
        }
    }
}

fn conclude_entry_side_exit(pattern: &mut TrackedPattern, candle: &CandleData, bar_index: usize) {
    if pattern.far_exit_seen {
        // Both sides crossed: whipsaw.
        pattern.status = PatternStatus::FailedPrz;
        pattern.failed_bar = Some(bar_index);
    } else {
        pattern.status = PatternStatus::Success;
        pattern.reversal_bar = Some(bar_index);
        pattern.reversal_price = Some(candle.close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{generate_pattern_id, PatternPoint, PrzZone};
    use std::collections::BTreeMap;

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

    // A bullish ABCD whose fixed legs live in bars 0..=0 (degenerate but
    // contained) and whose PRZ band is [100, 102]. C sits far above the
    // action so the structural check stays quiet unless a test wants it.
    fn zone_candidate(zones: Vec<(f64, f64)>) -> PatternCandidate {
        let mut points = BTreeMap::new();
        points.insert(Role::A, PatternPoint { bar_index: 0, price: 130.0 });
        points.insert(Role::B, PatternPoint { bar_index: 1, price: 104.0 });
        points.insert(Role::C, PatternPoint { bar_index: 2, price: 120.0 });
        let prz_zones = zones
            .into_iter()
            .map(|(min, max)| PrzZone {
                min,
                max,
                source: "AB=CD".to_string(),
                proj_min: min,
                proj_max: max,
            })
            .collect();
        PatternCandidate {
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
            prz_zones,
            d_lines: vec![],
            is_formed: false,
        }
    }

    // Fixed-leg bars: A high 130, B low 104, C high 120 -- contained.
    fn leg_candles() -> Vec<CandleData> {
        vec![
            candle(130.0, 108.0, 110.0),
            candle(108.0, 104.0, 106.0),
            candle(120.0, 106.0, 118.0),
        ]
    }

    fn run_bars(tracker: &mut PatternTracker, candles: &mut Vec<CandleData>, bars: Vec<CandleData>) {
        for bar in bars {
            candles.push(bar);
            tracker.advance(candles.len() - 1, candles);
        }
    }

    #[test]
    fn full_far_cross_is_invalid_prz() {
        let mut candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0)]);
        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.register(&candidate, &candles, 2), 1);

        run_bars(
            &mut tracker,
            &mut candles,
            vec![
                candle(99.0, 98.0, 98.5),    // below the zone
                candle(103.0, 101.0, 101.5), // enters the zone
                candle(106.0, 104.0, 105.0), // fully beyond the far side
            ],
        );

        let pattern = tracker.patterns().next().unwrap();
        assert_eq!(pattern.status, PatternStatus::InvalidPrz);
        assert_eq!(pattern.zone_entry_bar, Some(4));
        assert_eq!(pattern.invalid_bar, Some(5));
    }

    #[test]
    fn reversal_back_through_entry_side_is_success() {
        let mut candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0)]);
        let mut tracker = PatternTracker::new();
        tracker.register(&candidate, &candles, 2);

        run_bars(
            &mut tracker,
            &mut candles,
            vec![
                candle(99.0, 98.0, 98.5),
                candle(103.0, 101.0, 101.5),
                candle(97.0, 96.0, 96.5), // fully back through the entry side
            ],
        );

        let pattern = tracker.patterns().next().unwrap();
        assert_eq!(pattern.status, PatternStatus::Success);
        assert_eq!(pattern.reversal_bar, Some(5));
        assert_eq!(pattern.reversal_price, Some(96.5));
    }

    #[test]
    fn far_close_then_entry_exit_is_failed_prz() {
        let mut candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0)]);
        let mut tracker = PatternTracker::new();
        tracker.register(&candidate, &candles, 2);

        run_bars(
            &mut tracker,
            &mut candles,
            vec![
                candle(99.0, 98.0, 98.5),
                candle(103.0, 101.0, 101.5),  // enters
                candle(103.5, 101.5, 103.0),  // closes beyond far side, wick in zone
                candle(101.0, 99.0, 99.5),    // back out through the entry side
            ],
        );

        let pattern = tracker.patterns().next().unwrap();
        assert_eq!(pattern.status, PatternStatus::FailedPrz);
        assert_eq!(pattern.failed_bar, Some(6));
        assert_eq!(pattern.zone_exit_bar, Some(5));
    }

    #[test]
    fn terminal_states_are_never_reverted() {
        let mut candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0)]);
        let mut tracker = PatternTracker::new();
        tracker.register(&candidate, &candles, 2);

        run_bars(
            &mut tracker,
            &mut candles,
            vec![
                candle(99.0, 98.0, 98.5),
                candle(103.0, 101.0, 101.5),
                candle(97.0, 96.0, 96.5), // success
            ],
        );
        assert_eq!(tracker.patterns().next().unwrap().status, PatternStatus::Success);

        // Throw every kind of bar at it afterwards.
        run_bars(
            &mut tracker,
            &mut candles,
            vec![
                candle(140.0, 95.0, 139.0), // would dismiss and far-cross
                candle(106.0, 104.0, 105.0),
                candle(97.0, 96.0, 96.5),
            ],
        );

        let pattern = tracker.patterns().next().unwrap();
        assert_eq!(pattern.status, PatternStatus::Success);
        assert_eq!(pattern.reversal_bar, Some(5));
    }

    #[test]
    fn c_pivot_violation_dismisses_before_zone_outcome() {
        let mut candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0)]);
        let mut tracker = PatternTracker::new();
        tracker.register(&candidate, &candles, 2);

        run_bars(
            &mut tracker,
            &mut candles,
            vec![
                candle(99.0, 98.0, 98.5),
                candle(121.0, 101.0, 101.5), // high exceeds C=120
            ],
        );

        let pattern = tracker.patterns().next().unwrap();
        assert_eq!(pattern.status, PatternStatus::Dismissed);
        assert_eq!(pattern.dismissed_bar, Some(4));
        assert!(pattern.zone_entry_bar.is_none());
    }

    #[test]
    fn multiple_prz_zones_become_separate_instances() {
        let candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0), (96.0, 98.0)]);
        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.register(&candidate, &candles, 2), 2);

        let ids: Vec<&str> = tracker.patterns().map(|p| p.tracking_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids[0].ends_with("#0"));
        assert!(ids[1].ends_with("#1"));
        assert!(ids[0].starts_with(&candidate.pattern_id));
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0)]);
        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.register(&candidate, &candles, 2), 1);
        assert_eq!(tracker.register(&candidate, &candles, 2), 0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn xabcd_without_d_lines_is_discarded_with_warning() {
        let candles = vec![
            candle(103.0, 100.0, 102.0),
            candle(110.0, 104.0, 109.0),
            candle(106.0, 103.0, 104.0),
            candle(108.0, 105.0, 107.0),
        ];
        let mut points = BTreeMap::new();
        points.insert(Role::X, PatternPoint { bar_index: 0, price: 100.0 });
        points.insert(Role::A, PatternPoint { bar_index: 1, price: 110.0 });
        points.insert(Role::B, PatternPoint { bar_index: 2, price: 103.0 });
        points.insert(Role::C, PatternPoint { bar_index: 3, price: 108.0 });
        let candidate = PatternCandidate {
            pattern_id: "deadbeef00000000".to_string(),
            shape: PatternShape::Xabcd,
            subtype: "Gartley".to_string(),
            direction: Direction::Bullish,
            points,
            ratios: HashMap::new(),
            prz_zones: vec![],
            d_lines: vec![],
            is_formed: false,
        };

        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.register(&candidate, &candles, 3), 0);
        assert!(tracker.is_empty());
        assert_eq!(tracker.warnings().len(), 1);
        assert!(tracker.warnings()[0].contains("no D-lines"));
    }

    #[test]
    fn formed_candidates_are_not_tracked() {
        let candles = leg_candles();
        let mut candidate = zone_candidate(vec![(100.0, 102.0)]);
        candidate.is_formed = true;
        let mut tracker = PatternTracker::new();
        assert_eq!(tracker.register(&candidate, &candles, 2), 0);
    }

    #[test]
    fn unresolved_patterns_stay_open() {
        let mut candles = leg_candles();
        let candidate = zone_candidate(vec![(100.0, 102.0)]);
        let mut tracker = PatternTracker::new();
        tracker.register(&candidate, &candles, 2);

        run_bars(
            &mut tracker,
            &mut candles,
            vec![candle(99.0, 98.0, 98.5), candle(103.0, 101.0, 101.5)],
        );

        let counts = tracker.status_counts();
        assert_eq!(counts.in_zone, 1);
        assert_eq!(counts.success_rate(), 0.0);
    }
}

// src/detection/abcd.rs
// ABCD detection over the extremum sequence. Walks consecutive alternating
// swing triples (A, B, C), keeps the ones whose BC/AB retracement sits in
// the harmonic window and whose legs pass price containment, then either
// projects the potential reversal zones (unformed) or pairs the triple with
// an already-realized D swing (formed).

use crate::detection::PatternDetector;
use crate::errors::CoreError;
use crate::types::{
    generate_pattern_id, CandleData, Direction, ExtremumPoint, PatternCandidate, PatternPoint,
    PatternShape, PrzZone, Role,
};
use crate::validation::{validate_abcd, PricePoint};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

const RETRACE_MIN: f64 = 0.382;
const RETRACE_MAX: f64 = 0.886;
const COMPLETION_MIN: f64 = 1.0;
const COMPLETION_MAX: f64 = 1.8;

pub struct AbcdDetector {
    formed: bool,
}

impl AbcdDetector {
    pub fn formed() -> Self {
        Self { formed: true }
    }

    pub fn unformed() -> Self {
        Self { formed: false }
    }

    fn project_zones(direction: Direction, b: f64, c: f64, ab: f64) -> Vec<PrzZone> {
        let bc = (c - b).abs();
        let sign = match direction {
            Direction::Bullish => -1.0,
            Direction::Bearish => 1.0,
        };

        // AB=CD completion paired with the 1.272 BC extension, and the
        // deeper 1.414/1.618 extension band.
        let d_abcd = c + sign * ab;
        let d_127 = c + sign * bc * 1.272;
        let d_141 = c + sign * bc * 1.414;
        let d_162 = c + sign * bc * 1.618;

        let mut zones = vec![
            PrzZone {
                min: d_abcd.min(d_127),
                max: d_abcd.max(d_127),
                source: "AB=CD".to_string(),
                proj_min: d_abcd,
                proj_max: d_127,
            },
            PrzZone {
                min: d_141.min(d_162),
                max: d_141.max(d_162),
                source: "BC extension".to_string(),
                proj_min: d_141,
                proj_max: d_162,
            },
        ];
        zones.retain(|z| z.min.is_finite() && z.max.is_finite() && z.min < z.max);
        zones
    }
}

impl PatternDetector for AbcdDetector {
    fn name(&self) -> &str {
        if self.formed {
            "abcd_formed"
        } else {
            "abcd_unformed"
        }
    }

    fn params(&self) -> Value {
        json!({
            "retrace_min": RETRACE_MIN,
            "retrace_max": RETRACE_MAX,
        })
    }

    fn detect(
        &self,
        extremums: &[ExtremumPoint],
        candles: &[CandleData],
    ) -> Result<Vec<PatternCandidate>, CoreError> {
        let mut candidates = Vec::new();

        for i in 0..extremums.len().saturating_sub(2) {
            let a = &extremums[i];
            let b = &extremums[i + 1];
            let c = &extremums[i + 2];

            if !(a.bar_index < b.bar_index && b.bar_index < c.bar_index) {
                continue;
            }

            let direction = match (a.is_high, b.is_high, c.is_high) {
                (true, false, true) => Direction::Bullish,
                (false, true, false) => Direction::Bearish,
                _ => continue,
            };

            let ab = (a.price - b.price).abs();
            if ab <= f64::EPSILON {
                continue;
            }
            let retrace = (c.price - b.price).abs() / ab;
            if !(RETRACE_MIN..=RETRACE_MAX).contains(&retrace) {
                continue;
            }

            if !validate_abcd(
                candles,
                PricePoint::new(a.bar_index, a.price),
                PricePoint::new(b.bar_index, b.price),
                PricePoint::new(c.bar_index, c.price),
                None,
                direction,
            ) {
                continue;
            }

            let mut points = BTreeMap::new();
            points.insert(Role::A, PatternPoint { bar_index: a.bar_index, price: a.price });
            points.insert(Role::B, PatternPoint { bar_index: b.bar_index, price: b.price });
            points.insert(Role::C, PatternPoint { bar_index: c.bar_index, price: c.price });

            let mut ratios = HashMap::new();
            ratios.insert("bc_ab".to_string(), retrace * 100.0);

            if self.formed {
                // Pair the triple with the next opposite swing that lands in
                // the completion window and keeps the D legs contained.
                let d = extremums[i + 3..]
                    .iter()
                    .find(|p| p.is_high == b.is_high && p.bar_index > c.bar_index);
                let d = match d {
                    Some(d) => d,
                    None => continue,
                };

                let bc = (c.price - b.price).abs();
                if bc <= f64::EPSILON {
                    continue;
                }
                let completion = (c.price - d.price).abs() / bc;
                if !(COMPLETION_MIN..=COMPLETION_MAX).contains(&completion) {
                    continue;
                }

                if !validate_abcd(
                    candles,
                    PricePoint::new(a.bar_index, a.price),
                    PricePoint::new(b.bar_index, b.price),
                    PricePoint::new(c.bar_index, c.price),
                    Some(PricePoint::new(d.bar_index, d.price)),
                    direction,
                ) {
                    continue;
                }

                points.insert(Role::D, PatternPoint { bar_index: d.bar_index, price: d.price });
                ratios.insert("cd_bc".to_string(), completion * 100.0);

                candidates.push(PatternCandidate {
                    pattern_id: generate_pattern_id(
                        PatternShape::Abcd,
                        "AB=CD",
                        direction,
                        &points,
                    ),
                    shape: PatternShape::Abcd,
                    subtype: "AB=CD".to_string(),
                    direction,
                    points,
                    ratios,
                    prz_zones: vec![],
                    d_lines: vec![],
                    is_formed: true,
                });
            } else {
                let prz_zones = Self::project_zones(direction, b.price, c.price, ab);
                if prz_zones.is_empty() {
                    continue;
                }

                candidates.push(PatternCandidate {
                    pattern_id: generate_pattern_id(
                        PatternShape::Abcd,
                        "AB=CD",
                        direction,
                        &points,
                    ),
                    shape: PatternShape::Abcd,
                    subtype: "AB=CD".to_string(),
                    direction,
                    points,
                    ratios,
                    prz_zones,
                    d_lines: vec![],
                    is_formed: false,
                });
            }
        }

        Ok(candidates)
    }
}

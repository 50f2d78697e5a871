// src/detection/xabcd.rs
// XABCD detection. Walks consecutive alternating swing quadruples
// (X, A, B, C), matches the AB/XA retracement against the classic subtype
// table, and projects the D completion from the XA leg (unformed) or pairs
// the structure with a realized D swing (formed). Unformed candidates carry
// discrete D-lines rather than a continuous zone.

use crate::detection::PatternDetector;
use crate::errors::CoreError;
use crate::types::{
    generate_pattern_id, CandleData, Direction, ExtremumPoint, PatternCandidate, PatternPoint,
    PatternShape, Role,
};
use crate::validation::{validate_xabcd, PricePoint};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

struct SubtypeSpec {
    name: &'static str,
    ab_xa_min: f64,
    ab_xa_max: f64,
    d_xa: f64,
}

// AB/XA windows and XA-derived D completion per subtype.
const SUBTYPES: &[SubtypeSpec] = &[
    SubtypeSpec { name: "Gartley", ab_xa_min: 0.568, ab_xa_max: 0.668, d_xa: 0.786 },
    SubtypeSpec { name: "Bat", ab_xa_min: 0.382, ab_xa_max: 0.50, d_xa: 0.886 },
    SubtypeSpec { name: "Butterfly", ab_xa_min: 0.736, ab_xa_max: 0.836, d_xa: 1.272 },
    SubtypeSpec { name: "Crab", ab_xa_min: 0.50, ab_xa_max: 0.618, d_xa: 1.618 },
];

const BC_AB_MIN: f64 = 0.382;
const BC_AB_MAX: f64 = 0.886;
const D_MATCH_TOLERANCE: f64 = 0.05;

pub struct XabcdDetector {
    formed: bool,
}

impl XabcdDetector {
    pub fn formed() -> Self {
        Self { formed: true }
    }

    pub fn unformed() -> Self {
        Self { formed: false }
    }
}

impl PatternDetector for XabcdDetector {
    fn name(&self) -> &str {
        if self.formed {
            "xabcd_formed"
        } else {
            "xabcd_unformed"
        }
    }

    fn params(&self) -> Value {
        json!({
            "bc_ab_min": BC_AB_MIN,
            "bc_ab_max": BC_AB_MAX,
            "d_match_tolerance": D_MATCH_TOLERANCE,
        })
    }

    fn detect(
        &self,
        extremums: &[ExtremumPoint],
        candles: &[CandleData],
    ) -> Result<Vec<PatternCandidate>, CoreError> {
        let mut candidates = Vec::new();

        for i in 0..extremums.len().saturating_sub(3) {
            let x = &extremums[i];
            let a = &extremums[i + 1];
            let b = &extremums[i + 2];
            let c = &extremums[i + 3];

            if !(x.bar_index < a.bar_index
                && a.bar_index < b.bar_index
                && b.bar_index < c.bar_index)
            {
                continue;
            }

            let direction = match (x.is_high, a.is_high, b.is_high, c.is_high) {
                (false, true, false, true) => Direction::Bullish,
                (true, false, true, false) => Direction::Bearish,
                _ => continue,
            };

            let xa = (a.price - x.price).abs();
            let ab = (a.price - b.price).abs();
            if xa <= f64::EPSILON || ab <= f64::EPSILON {
                continue;
            }
            let ab_xa = ab / xa;
            let bc_ab = (c.price - b.price).abs() / ab;
            if !(BC_AB_MIN..=BC_AB_MAX).contains(&bc_ab) {
                continue;
            }

            if !validate_xabcd(
                candles,
                PricePoint::new(x.bar_index, x.price),
                PricePoint::new(a.bar_index, a.price),
                PricePoint::new(b.bar_index, b.price),
                PricePoint::new(c.bar_index, c.price),
                direction,
            ) {
                continue;
            }

            // D completion measured back from A along the XA leg.
            let sign = match direction {
                Direction::Bullish => -1.0,
                Direction::Bearish => 1.0,
            };

            for spec in SUBTYPES {
                if !(spec.ab_xa_min..=spec.ab_xa_max).contains(&ab_xa) {
                    continue;
                }

                let d_primary = a.price + sign * xa * spec.d_xa;
                let d_bc_ext = c.price + sign * (c.price - b.price).abs() * 1.618;

                let mut points = BTreeMap::new();
                points.insert(Role::X, PatternPoint { bar_index: x.bar_index, price: x.price });
                points.insert(Role::A, PatternPoint { bar_index: a.bar_index, price: a.price });
                points.insert(Role::B, PatternPoint { bar_index: b.bar_index, price: b.price });
                points.insert(Role::C, PatternPoint { bar_index: c.bar_index, price: c.price });

                let mut ratios = HashMap::new();
                ratios.insert("ab_xa".to_string(), ab_xa * 100.0);
                ratios.insert("bc_ab".to_string(), bc_ab * 100.0);

                if self.formed {
                    // The realized D must be the next opposite swing, close
                    // enough to the projected completion, with the D leg
                    // still contained.
                    let d = extremums[i + 4..]
                        .iter()
                        .find(|p| p.is_high == b.is_high && p.bar_index > c.bar_index);
                    let d = match d {
                        Some(d) => d,
                        None => continue,
                    };
                    if d.bar_index >= candles.len() {
                        continue;
                    }
                    if (d.price - d_primary).abs() > xa * D_MATCH_TOLERANCE {
                        continue;
                    }
                    let d_leg_contained = match direction {
                        Direction::Bullish => candles
                            [c.bar_index + 1..d.bar_index]
                            .iter()
                            .all(|k| k.low >= d.price && k.high <= c.price),
                        Direction::Bearish => candles
                            [c.bar_index + 1..d.bar_index]
                            .iter()
                            .all(|k| k.high <= d.price && k.low >= c.price),
                    };
                    if !d_leg_contained {
                        continue;
                    }

                    let mut formed_points = points.clone();
                    formed_points
                        .insert(Role::D, PatternPoint { bar_index: d.bar_index, price: d.price });
                    ratios.insert("d_xa".to_string(), spec.d_xa * 100.0);

                    candidates.push(PatternCandidate {
                        pattern_id: generate_pattern_id(
                            PatternShape::Xabcd,
                            spec.name,
                            direction,
                            &formed_points,
                        ),
                        shape: PatternShape::Xabcd,
                        subtype: spec.name.to_string(),
                        direction,
                        points: formed_points,
                        ratios,
                        prz_zones: vec![],
                        d_lines: vec![],
                        is_formed: true,
                    });
                } else {
                    let mut d_lines: Vec<f64> =
                        [d_primary, d_bc_ext].into_iter().filter(|p| p.is_finite()).collect();
                    d_lines.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                    d_lines.dedup();

                    candidates.push(PatternCandidate {
                        pattern_id: generate_pattern_id(
                            PatternShape::Xabcd,
                            spec.name,
                            direction,
                            &points,
                        ),
                        shape: PatternShape::Xabcd,
                        subtype: spec.name.to_string(),
                        direction,
                        points,
                        ratios,
                        prz_zones: vec![],
                        d_lines,
                        is_formed: false,
                    });
                }

                // At most one subtype per structure; windows are disjoint
                // enough that the first match wins.
                break;
            }
        }

        Ok(candidates)
    }
}

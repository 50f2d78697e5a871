// src/types.rs
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CandleData {
    pub time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u32,
}

/// A confirmed swing high or low in the candle series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtremumPoint {
    pub time: String,
    pub price: f64,
    pub is_high: bool,
    pub bar_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternShape {
    Abcd,
    Xabcd,
}

impl PatternShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternShape::Abcd => "abcd",
            PatternShape::Xabcd => "xabcd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
        }
    }
}

/// Pattern roles in leg order. Absent roles (X on ABCD, D on unformed
/// candidates) are simply missing from the points map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub enum Role {
    X,
    A,
    B,
    C,
    D,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::X => "X",
            Role::A => "A",
            Role::B => "B",
            Role::C => "C",
            Role::D => "D",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PatternPoint {
    pub bar_index: usize,
    pub price: f64,
}

/// One projected reversal band for an unformed ABCD candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrzZone {
    pub min: f64,
    pub max: f64,
    pub source: String,
    pub proj_min: f64,
    pub proj_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCandidate {
    pub pattern_id: String,
    pub shape: PatternShape,
    pub subtype: String,
    pub direction: Direction,
    pub points: BTreeMap<Role, PatternPoint>,
    pub ratios: HashMap<String, f64>,
    pub prz_zones: Vec<PrzZone>,
    pub d_lines: Vec<f64>,
    pub is_formed: bool,
}

impl PatternCandidate {
    pub fn point(&self, role: Role) -> Option<&PatternPoint> {
        self.points.get(&role)
    }
}

/// Deterministic pattern id: same shape/subtype/direction and the same
/// role -> bar_index assignment always hash to the same id.
pub fn generate_pattern_id(
    shape: PatternShape,
    subtype: &str,
    direction: Direction,
    points: &BTreeMap<Role, PatternPoint>,
) -> String {
    let mut id_input = format!("{}_{}_{}", shape.as_str(), subtype, direction.as_str());
    for (role, point) in points {
        id_input.push_str(&format!("_{}:{}", role.as_str(), point.bar_index));
    }

    let mut hasher = Sha256::new();
    hasher.update(id_input.as_bytes());
    let result = hasher.finalize();
    let hex_id = format!("{:x}", result);

    hex_id[..16].to_string()
}

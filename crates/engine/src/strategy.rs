//! Scoring strategies
//!
//! One parameterized scan pipeline with the blend mode as a variant: each
//! mode extracts a per-cell value (and optionally transforms the
//! accumulated series) before the correlation blender combines timeframes.
//! The static-weight momentum score and the neutral screens are the
//! simpler, non-correlation scoring paths and live here alongside.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::tdfi::{self, TdfiParams};
use crate::types::{IndicatorSnapshot, Recommendation, Summary, Timeframe};

/// Latest snapshot per timeframe for one symbol
pub type SnapshotRow = BTreeMap<Timeframe, IndicatorSnapshot>;

/// The five pivot midline variants averaged by the pivot mode
pub const PIVOT_COLUMNS: [&str; 5] = [
    "Pivot.M.Classic.Middle",
    "Pivot.M.Fibonacci.Middle",
    "Pivot.M.Camarilla.Middle",
    "Pivot.M.Woodie.Middle",
    "Pivot.M.Demark.Middle",
];

// ============================================================================
// Blend modes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    Momentum,
    Atr,
    Pivot,
    Bollinger,
    Tdfi,
}

impl BlendMode {
    pub const ALL: [BlendMode; 5] = [
        Self::Momentum,
        Self::Atr,
        Self::Pivot,
        Self::Bollinger,
        Self::Tdfi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Momentum => "momentum",
            Self::Atr => "atr",
            Self::Pivot => "pivot",
            Self::Bollinger => "bollinger",
            Self::Tdfi => "tdfi",
        }
    }

    /// Pull this mode's value out of one fetched cell. `None` means the
    /// cell carries no usable data for the mode and is skipped.
    pub fn extract(&self, snap: &IndicatorSnapshot) -> Option<f64> {
        match self {
            Self::Momentum => Some(snap.summary.recommendation.score() as f64),
            Self::Atr => snap.indicator("ATR"),
            Self::Pivot => {
                let present: Vec<f64> = PIVOT_COLUMNS
                    .iter()
                    .filter_map(|c| snap.indicator(c))
                    .collect();
                if present.is_empty() {
                    None
                } else {
                    Some(present.iter().sum::<f64>() / present.len() as f64)
                }
            }
            Self::Bollinger => {
                let lower = snap.indicator("BB.lower")?;
                let upper = snap.indicator("BB.upper")?;
                if lower == 0.0 || upper == 0.0 {
                    None
                } else {
                    Some((lower + upper) / 2.0)
                }
            }
            Self::Tdfi => snap.close(),
        }
    }

    /// Transform an accumulated per-timeframe series before blending.
    /// Only the TDFI mode reshapes its raw closes; every other mode blends
    /// the extracted values as-is.
    pub fn transform_series(&self, raw: Vec<f64>) -> Vec<f64> {
        match self {
            Self::Tdfi => tdfi::tdfi_series(&raw, &TdfiParams::default()),
            _ => raw,
        }
    }

    /// Band half-width for the mode's post-blend proximity filter, where
    /// the source dashboards have one
    pub fn proximity_tolerance(&self) -> Option<f64> {
        match self {
            Self::Pivot => Some(0.001),
            Self::Bollinger => Some(0.015),
            _ => None,
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "momentum" => Ok(Self::Momentum),
            "atr" => Ok(Self::Atr),
            "pivot" => Ok(Self::Pivot),
            "bollinger" | "bb" => Ok(Self::Bollinger),
            "tdfi" => Ok(Self::Tdfi),
            other => Err(format!("unknown blend mode: {other}")),
        }
    }
}

// ============================================================================
// Static interval weights
// ============================================================================

/// User-configured per-timeframe weights for the non-correlation scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalWeights(pub BTreeMap<Timeframe, f64>);

impl IntervalWeights {
    /// Momentum-dashboard defaults
    pub fn momentum_defaults() -> Self {
        Self(BTreeMap::from([
            (Timeframe::M15, 0.2),
            (Timeframe::H1, 0.3),
            (Timeframe::H4, 0.3),
            (Timeframe::D1, 0.2),
        ]))
    }

    /// Ascending ladder used by the neutral screen
    pub fn ladder() -> Self {
        Self(BTreeMap::from([
            (Timeframe::M5, 0.1),
            (Timeframe::M15, 0.2),
            (Timeframe::M30, 0.3),
            (Timeframe::H1, 0.4),
            (Timeframe::H2, 0.5),
            (Timeframe::H4, 0.6),
            (Timeframe::D1, 0.7),
        ]))
    }

    pub fn get(&self, tf: Timeframe) -> f64 {
        self.0.get(&tf).copied().unwrap_or(0.0)
    }

    /// Parse `"15m=0.2,1h=0.3"` style overrides
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut map = BTreeMap::new();
        for part in spec.split(',').filter(|p| !p.trim().is_empty()) {
            let (tf, w) = part
                .split_once('=')
                .ok_or_else(|| format!("bad weight entry: {part}"))?;
            let tf: Timeframe = tf.trim().parse()?;
            let w: f64 = w
                .trim()
                .parse()
                .map_err(|_| format!("bad weight value: {w}"))?;
            map.insert(tf, w);
        }
        if map.is_empty() {
            return Err("no weights given".to_string());
        }
        Ok(Self(map))
    }
}

impl Default for IntervalWeights {
    fn default() -> Self {
        Self::momentum_defaults()
    }
}

// ============================================================================
// Non-correlation scores
// ============================================================================

/// Recommendation momentum score: static weight × recommendation value,
/// summed over timeframes. Missing cells contribute nothing.
pub fn momentum_score(row: &SnapshotRow, weights: &IntervalWeights) -> f64 {
    row.iter()
        .map(|(tf, snap)| weights.get(*tf) * snap.summary.recommendation.score() as f64)
        .sum()
}

/// Weighted average of per-cell signal-count differentials
/// (buy − sell counts), used by the neutral screen. Zero when no weighted
/// cell is present.
pub fn weighted_count_score(row: &SnapshotRow, weights: &IntervalWeights) -> f64 {
    let mut total_score = 0.0;
    let mut total_weight = 0.0;
    for (tf, snap) in row {
        let w = weights.get(*tf);
        if w == 0.0 {
            continue;
        }
        let cell = snap.summary.buy as f64 - snap.summary.sell as f64;
        total_score += w * cell;
        total_weight += w;
    }
    if total_weight > 0.0 {
        total_score / total_weight
    } else {
        0.0
    }
}

/// Consensus rule from the notifier dashboards: an overall NEUTRAL call
/// backed by at least `min_neutral` individual neutral signals
pub fn neutral_consensus(summary: &Summary, min_neutral: u32) -> bool {
    summary.recommendation == Recommendation::Neutral && summary.neutral >= min_neutral
}

/// Signed percent offset of `value` from `reference`
pub fn percent_offset(value: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (value - reference) / reference * 100.0
}

/// True when `value` lies within ±`tolerance` (fractional) of `reference`
pub fn within_band(value: f64, reference: f64, tolerance: f64) -> bool {
    if reference == 0.0 {
        return false;
    }
    let lower = reference * (1.0 - tolerance);
    let upper = reference * (1.0 + tolerance);
    value >= lower && value <= upper
}

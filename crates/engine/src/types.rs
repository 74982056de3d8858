//! Core types for the multi-timeframe scanner

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A sampling timeframe supported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::D1,
    ];

    /// Canonical label used in CSV output and the CLI
    pub fn label(&self) -> &'static str {
        match self {
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Column suffix understood by the scan endpoint (daily is the
    /// unsuffixed default)
    pub fn column_suffix(&self) -> &'static str {
        match self {
            Self::M5 => "|5",
            Self::M15 => "|15",
            Self::M30 => "|30",
            Self::H1 => "|60",
            Self::H2 => "|120",
            Self::H4 => "|240",
            Self::D1 => "",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" => Ok(Self::H1),
            "2h" => Ok(Self::H2),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

/// Categorical consensus label reported per (symbol, timeframe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl Recommendation {
    /// Numeric value used by the momentum score
    pub fn score(&self) -> i32 {
        match self {
            Self::StrongBuy => 2,
            Self::Buy => 1,
            Self::Neutral => 0,
            Self::Sell => -1,
            Self::StrongSell => -2,
        }
    }

    /// Map a composite rating in [-1, 1] to a label using the provider's
    /// standard thresholds
    pub fn from_rating(rating: f64) -> Self {
        if rating > 0.5 {
            Self::StrongBuy
        } else if rating >= 0.1 {
            Self::Buy
        } else if rating > -0.1 {
            Self::Neutral
        } else if rating > -0.5 {
            Self::Sell
        } else {
            Self::StrongSell
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Neutral => "NEUTRAL",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STRONG_BUY" => Ok(Self::StrongBuy),
            "BUY" => Ok(Self::Buy),
            "NEUTRAL" => Ok(Self::Neutral),
            "SELL" => Ok(Self::Sell),
            "STRONG_SELL" => Ok(Self::StrongSell),
            other => Err(format!("unknown recommendation: {other}")),
        }
    }
}

/// Aggregated signal tallies for one (symbol, timeframe)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub recommendation: Recommendation,
    pub buy: u32,
    pub sell: u32,
    pub neutral: u32,
}

/// One fetched cell: every named indicator plus the consensus summary
/// for a (symbol, timeframe) pair. Ephemeral; rebuilt fresh each round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub summary: Summary,
    /// Group recommendation over the oscillator signals
    pub oscillators: Recommendation,
    /// Group recommendation over the moving-average signals
    pub moving_averages: Recommendation,
    pub indicators: BTreeMap<String, f64>,
}

impl IndicatorSnapshot {
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied()
    }

    pub fn close(&self) -> Option<f64> {
        self.indicator("close")
    }
}

/// A ranked per-symbol result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolScore {
    pub symbol: String,
    pub score: f64,
    /// Number of (timeframe, round) cells that contributed
    pub cells: usize,
}

//! TradingView scanner client (public scan endpoint, no authentication)
//!
//! One POST per (symbol, timeframe): the request names the ticker and the
//! per-timeframe column set, the response is a single row of values in
//! column order. The composite rating columns are mapped to categorical
//! recommendations with the provider's standard thresholds.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::types::{IndicatorSnapshot, Recommendation, Summary, Timeframe};

const DEFAULT_BASE_URL: &str = "https://scanner.tradingview.com";

/// Numeric indicator columns requested per timeframe
const VALUE_COLUMNS: [&str; 32] = [
    "Recommend.All",
    "Recommend.Other",
    "Recommend.MA",
    "RSI",
    "Stoch.K",
    "Stoch.D",
    "MACD.macd",
    "MACD.signal",
    "ADX",
    "CCI20",
    "ATR",
    "BB.lower",
    "BB.upper",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "Pivot.M.Classic.Middle",
    "Pivot.M.Fibonacci.Middle",
    "Pivot.M.Camarilla.Middle",
    "Pivot.M.Woodie.Middle",
    "Pivot.M.Demark.Middle",
    "EMA10",
    "EMA20",
    "EMA30",
    "EMA50",
    "EMA100",
    "EMA200",
    "SMA20",
    "SMA50",
    "SMA200",
];

/// Discrete per-indicator signal columns (−1 sell / 0 neutral / +1 buy)
const REC_COLUMNS: [&str; 7] = [
    "Rec.Stoch.RSI",
    "Rec.WR",
    "Rec.BBPower",
    "Rec.UO",
    "Rec.Ichimoku",
    "Rec.VWMA",
    "Rec.HullMA9",
];

/// Fetch failure taxonomy: every variant degrades to "no data for this
/// cell" at the scan level, none is retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scan endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no scan data for {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("malformed scan response: {0}")]
    Decode(String),
}

/// Seam between the engine and the remote provider; lets scans and tests
/// run against anything that can produce snapshots.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, FetchError>;
}

/// Raw scan response: one row per requested ticker
#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    data: Vec<ScanRow>,
}

#[derive(Debug, Deserialize)]
struct ScanRow {
    #[allow(dead_code)]
    s: String,
    d: Vec<Value>,
}

/// TradingView scan client
#[derive(Clone)]
pub struct TradingViewClient {
    client: Client,
    base_url: String,
    exchange: String,
    screener: String,
}

impl TradingViewClient {
    pub fn new(exchange: &str, screener: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: DEFAULT_BASE_URL.to_string(),
            exchange: exchange.to_uppercase(),
            screener: screener.to_lowercase(),
        }
    }

    async fn scan(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, FetchError> {
        let url = format!("{}/{}/scan", self.base_url, self.screener);
        let ticker = format!("{}:{}", self.exchange, symbol);
        let columns = scan_columns(timeframe);

        let body = json!({
            "symbols": { "tickers": [ticker], "query": { "types": [] } },
            "columns": columns,
        });

        debug!(symbol, timeframe = %timeframe, "Fetching scan row");

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let scan: ScanResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let row = scan
            .data
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;

        let mut values = BTreeMap::new();
        for (name, value) in base_column_names().iter().zip(row.d.iter()) {
            if let Some(v) = value.as_f64() {
                values.insert(name.to_string(), v);
            }
        }

        build_snapshot(symbol, timeframe, values)
    }
}

#[async_trait]
impl MarketDataProvider for TradingViewClient {
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, FetchError> {
        self.scan(symbol, timeframe).await
    }
}

/// Unsuffixed column names, in request order
fn base_column_names() -> Vec<&'static str> {
    VALUE_COLUMNS.iter().chain(REC_COLUMNS.iter()).copied().collect()
}

/// Column names with the timeframe suffix applied
pub fn scan_columns(timeframe: Timeframe) -> Vec<String> {
    base_column_names()
        .iter()
        .map(|name| format!("{}{}", name, timeframe.column_suffix()))
        .collect()
}

/// Assemble a snapshot from a parsed value row. The overall rating column
/// is required; everything else degrades gracefully.
pub(crate) fn build_snapshot(
    symbol: &str,
    timeframe: Timeframe,
    values: BTreeMap<String, f64>,
) -> Result<IndicatorSnapshot, FetchError> {
    let rating = values
        .get("Recommend.All")
        .copied()
        .ok_or_else(|| FetchError::Decode(format!("missing overall rating for {symbol}")))?;

    let oscillators =
        Recommendation::from_rating(values.get("Recommend.Other").copied().unwrap_or(0.0));
    let moving_averages =
        Recommendation::from_rating(values.get("Recommend.MA").copied().unwrap_or(0.0));

    let (buy, sell, neutral) = tally_signals(&values);

    Ok(IndicatorSnapshot {
        symbol: symbol.to_string(),
        timeframe,
        summary: Summary {
            recommendation: Recommendation::from_rating(rating),
            buy,
            sell,
            neutral,
        },
        oscillators,
        moving_averages,
        indicators: values,
    })
}

/// Tally buy/sell/neutral counts across the individual signal sources:
/// zone rules for the oscillator values, side-of-average for the MA
/// columns, and the provider's discrete Rec columns as-is.
fn tally_signals(values: &BTreeMap<String, f64>) -> (u32, u32, u32) {
    let mut signals: Vec<i32> = Vec::new();

    if let Some(rsi) = values.get("RSI") {
        signals.push(zone_signal(*rsi, 30.0, 70.0));
    }
    if let Some(k) = values.get("Stoch.K") {
        signals.push(zone_signal(*k, 20.0, 80.0));
    }
    if let Some(cci) = values.get("CCI20") {
        signals.push(zone_signal(*cci, -100.0, 100.0));
    }
    if let (Some(macd), Some(signal)) = (values.get("MACD.macd"), values.get("MACD.signal")) {
        signals.push(if macd > signal {
            1
        } else if macd < signal {
            -1
        } else {
            0
        });
    }

    if let Some(close) = values.get("close") {
        for ma in [
            "EMA10", "EMA20", "EMA30", "EMA50", "EMA100", "EMA200", "SMA20", "SMA50", "SMA200",
        ] {
            if let Some(v) = values.get(ma) {
                signals.push(if close > v {
                    1
                } else if close < v {
                    -1
                } else {
                    0
                });
            }
        }
    }

    for rec in REC_COLUMNS {
        if let Some(v) = values.get(rec) {
            signals.push(if *v >= 0.5 {
                1
            } else if *v <= -0.5 {
                -1
            } else {
                0
            });
        }
    }

    let buy = signals.iter().filter(|&&s| s > 0).count() as u32;
    let sell = signals.iter().filter(|&&s| s < 0).count() as u32;
    let neutral = signals.iter().filter(|&&s| s == 0).count() as u32;
    (buy, sell, neutral)
}

/// Below `low` is a buy, above `high` a sell, in between neutral
fn zone_signal(value: f64, low: f64, high: f64) -> i32 {
    if value < low {
        1
    } else if value > high {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn columns_carry_timeframe_suffix() {
        let cols = scan_columns(Timeframe::H1);
        assert!(cols.contains(&"Recommend.All|60".to_string()));
        assert!(cols.contains(&"close|60".to_string()));

        let daily = scan_columns(Timeframe::D1);
        assert!(daily.contains(&"Recommend.All".to_string()));
        assert_eq!(cols.len(), daily.len());
    }

    #[test]
    fn snapshot_requires_overall_rating() {
        let err = build_snapshot("BTCUSDT", Timeframe::H1, values(&[("close", 100.0)]));
        assert!(matches!(err, Err(FetchError::Decode(_))));
    }

    #[test]
    fn snapshot_maps_ratings_and_counts() {
        let snap = build_snapshot(
            "BTCUSDT",
            Timeframe::H4,
            values(&[
                ("Recommend.All", 0.6),
                ("Recommend.Other", 0.2),
                ("Recommend.MA", -0.2),
                ("RSI", 25.0),       // buy
                ("CCI20", 150.0),    // sell
                ("Stoch.K", 50.0),   // neutral
                ("close", 100.0),
                ("EMA20", 90.0),     // buy
                ("SMA200", 110.0),   // sell
                ("Rec.WR", 1.0),     // buy
                ("Rec.UO", 0.0),     // neutral
            ]),
        )
        .unwrap();

        assert_eq!(snap.summary.recommendation, Recommendation::StrongBuy);
        assert_eq!(snap.oscillators, Recommendation::Buy);
        assert_eq!(snap.moving_averages, Recommendation::Sell);
        assert_eq!(snap.summary.buy, 3);
        assert_eq!(snap.summary.sell, 2);
        assert_eq!(snap.summary.neutral, 2);
        assert_eq!(snap.close(), Some(100.0));
    }

    #[test]
    fn zone_rules() {
        assert_eq!(zone_signal(25.0, 30.0, 70.0), 1);
        assert_eq!(zone_signal(75.0, 30.0, 70.0), -1);
        assert_eq!(zone_signal(50.0, 30.0, 70.0), 0);
    }
}

//! Trend Direction Force Index
//!
//! Derived oscillator over a close-price series: the divergence between a
//! smoothed price and its re-smoothed copy is scaled by the average impetus
//! (first differences) of both, then normalized by a rolling absolute
//! maximum so the output stays in [-1, 1].

use serde::{Deserialize, Serialize};
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::Next;

/// Smoothing flavor for the two moving-average stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaMode {
    Ema,
    Tema,
    Sma,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TdfiParams {
    pub lookback: usize,
    pub mma_length: usize,
    pub mma_mode: MaMode,
    pub smma_length: usize,
    pub smma_mode: MaMode,
    /// Impetus exponent; odd values preserve sign
    pub n_length: u32,
    pub filter_high: f64,
    pub filter_low: f64,
}

impl Default for TdfiParams {
    fn default() -> Self {
        Self {
            lookback: 13,
            mma_length: 13,
            mma_mode: MaMode::Ema,
            smma_length: 13,
            smma_mode: MaMode::Ema,
            n_length: 3,
            filter_high: 0.05,
            filter_low: -0.05,
        }
    }
}

/// Classified TDFI reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TdfiSignal {
    Green,
    Red,
    Gray,
}

fn ema_series(series: &[f64], period: usize) -> Vec<f64> {
    let mut ema = ExponentialMovingAverage::new(period).expect("Invalid EMA period");
    series.iter().map(|&x| ema.next(x)).collect()
}

fn smooth(mode: MaMode, series: &[f64], period: usize) -> Vec<f64> {
    match mode {
        MaMode::Ema => ema_series(series, period),
        MaMode::Sma => {
            let mut sma = SimpleMovingAverage::new(period).expect("Invalid SMA period");
            series.iter().map(|&x| sma.next(x)).collect()
        }
        MaMode::Tema => {
            let e1 = ema_series(series, period);
            let e2 = ema_series(&e1, period);
            let e3 = ema_series(&e2, period);
            e1.iter()
                .zip(e2.iter())
                .zip(e3.iter())
                .map(|((a, b), c)| 3.0 * a - 3.0 * b + c)
                .collect()
        }
    }
}

fn diffs(series: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len());
    for (i, &v) in series.iter().enumerate() {
        if i == 0 {
            out.push(0.0);
        } else {
            out.push(v - series[i - 1]);
        }
    }
    out
}

/// Full TDFI series over a close-price sequence. The normalization window
/// is `lookback * n_length` bars; before the window fills, the running
/// maximum over the available bars is used so short series still produce
/// values.
pub fn tdfi_series(closes: &[f64], params: &TdfiParams) -> Vec<f64> {
    if closes.is_empty() {
        return Vec::new();
    }

    let scaled: Vec<f64> = closes.iter().map(|c| c * 1000.0).collect();
    let mma = smooth(params.mma_mode, &scaled, params.mma_length);
    let smma = smooth(params.smma_mode, &mma, params.smma_length);

    let impet_mma = diffs(&mma);
    let impet_smma = diffs(&smma);

    let tdf: Vec<f64> = (0..mma.len())
        .map(|i| {
            let divergence = (mma[i] - smma[i]).abs();
            let impetus = (impet_mma[i] + impet_smma[i]) / 2.0;
            divergence * impetus.powi(params.n_length as i32)
        })
        .collect();

    let window = (params.lookback * params.n_length as usize).max(1);
    tdf.iter()
        .enumerate()
        .map(|(i, &v)| {
            let start = (i + 1).saturating_sub(window);
            let max_abs = tdf[start..=i]
                .iter()
                .map(|x| x.abs())
                .fold(0.0_f64, f64::max);
            if max_abs > 0.0 {
                v / max_abs
            } else {
                0.0
            }
        })
        .collect()
}

/// Latest TDFI reading for a series, if any
pub fn latest(closes: &[f64], params: &TdfiParams) -> Option<f64> {
    tdfi_series(closes, params).last().copied()
}

pub fn classify(value: f64, params: &TdfiParams) -> TdfiSignal {
    if value > params.filter_high {
        TdfiSignal::Green
    } else if value < params.filter_low {
        TdfiSignal::Red
    } else {
        TdfiSignal::Gray
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_bounded() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        for v in tdfi_series(&closes, &TdfiParams::default()) {
            assert!(v.abs() <= 1.0 + 1e-12, "unbounded value {v}");
        }
    }

    #[test]
    fn rising_series_reads_green() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let params = TdfiParams::default();
        let last = latest(&closes, &params).unwrap();
        assert!(last > 0.0, "expected positive force, got {last}");
        assert_eq!(classify(last, &params), TdfiSignal::Green);
    }

    #[test]
    fn falling_series_reads_red() {
        let closes: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        let params = TdfiParams::default();
        let last = latest(&closes, &params).unwrap();
        assert!(last < 0.0, "expected negative force, got {last}");
        assert_eq!(classify(last, &params), TdfiSignal::Red);
    }

    #[test]
    fn flat_series_reads_gray() {
        let closes = vec![42.0; 50];
        let params = TdfiParams::default();
        let last = latest(&closes, &params).unwrap();
        assert_eq!(last, 0.0);
        assert_eq!(classify(last, &params), TdfiSignal::Gray);
    }

    #[test]
    fn empty_series_yields_nothing() {
        assert!(latest(&[], &TdfiParams::default()).is_none());
    }

    #[test]
    fn tema_smoothing_tracks_trend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let params = TdfiParams {
            mma_mode: MaMode::Tema,
            smma_mode: MaMode::Tema,
            ..TdfiParams::default()
        };
        let last = latest(&closes, &params).unwrap();
        assert!(last > 0.0);
    }
}

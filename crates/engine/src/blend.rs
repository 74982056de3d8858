//! Correlation-weighted blending of per-timeframe observations
//!
//! Timeframes that move together are trusted more than outliers: each
//! timeframe is weighted by the mean of its Pearson correlations with the
//! other timeframes present, then the per-timeframe means are combined
//! under those weights.

use std::collections::BTreeMap;

use crate::types::Timeframe;

/// Per-symbol accumulator: one value sequence per timeframe, extended
/// across sampling rounds.
pub type SeriesBook = BTreeMap<Timeframe, Vec<f64>>;

/// Derived confidence weights, one per timeframe with data
pub type CorrelationWeights = BTreeMap<Timeframe, f64>;

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Pearson correlation coefficient between two sequences.
///
/// Degenerate inputs (fewer than 2 observations, unequal lengths, zero
/// variance on either side) yield 0 rather than an error.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || x.len() != y.len() {
        return 0.0;
    }

    let mx = mean(x);
    let my = mean(y);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mx;
        let dy = b - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return 0.0;
    }

    (cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0)
}

/// Compute the per-timeframe weight: mean correlation against every other
/// timeframe with data, clamped to [0, 1]. Self-correlation is excluded
/// from the mean; a timeframe with no peers gets weight 0.
pub fn correlation_weights(book: &SeriesBook) -> CorrelationWeights {
    let present: Vec<Timeframe> = book
        .iter()
        .filter(|(_, vs)| !vs.is_empty())
        .map(|(tf, _)| *tf)
        .collect();

    let mut weights = CorrelationWeights::new();
    for &tf in &present {
        let peers: Vec<f64> = present
            .iter()
            .filter(|&&other| other != tf)
            .map(|&other| pearson(&book[&tf], &book[&other]))
            .collect();

        let weight = if peers.is_empty() {
            0.0
        } else {
            mean(&peers).clamp(0.0, 1.0)
        };
        weights.insert(tf, weight);
    }
    weights
}

/// Blend per-timeframe sequences into one score.
///
/// Returns `None` when no timeframe has any observation; the caller drops
/// the symbol from scored output. A zero total weight (single timeframe,
/// all-constant data, anticorrelated peers) falls back to the unweighted
/// mean of the per-timeframe means.
pub fn blend(book: &SeriesBook) -> Option<f64> {
    let means: Vec<(Timeframe, f64)> = book
        .iter()
        .filter(|(_, vs)| !vs.is_empty())
        .map(|(tf, vs)| (*tf, mean(vs)))
        .collect();

    if means.is_empty() {
        return None;
    }

    let weights = correlation_weights(book);
    let total: f64 = means.iter().map(|(tf, _)| weights[tf]).sum();

    if total > 0.0 {
        let weighted: f64 = means.iter().map(|(tf, m)| weights[tf] * m).sum();
        Some(weighted / total)
    } else {
        Some(mean(&means.iter().map(|(_, m)| *m).collect::<Vec<_>>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(entries: &[(Timeframe, &[f64])]) -> SeriesBook {
        entries
            .iter()
            .map(|(tf, vs)| (*tf, vs.to_vec()))
            .collect()
    }

    #[test]
    fn correlated_pair_blends_near_joint_mean() {
        let b = book(&[
            (Timeframe::H1, &[10.0, 20.0, 30.0]),
            (Timeframe::H4, &[12.0, 19.0, 31.0]),
        ]);

        let r = pearson(&b[&Timeframe::H1], &b[&Timeframe::H4]);
        assert!(r > 0.98, "expected strong correlation, got {r}");

        let w = correlation_weights(&b);
        assert!((w[&Timeframe::H1] - r).abs() < 1e-12);
        assert!((w[&Timeframe::H4] - r).abs() < 1e-12);

        // Equal weights, so the blend is the mean of 20 and 20.666...
        let score = blend(&b).unwrap();
        assert!((score - 20.333_333).abs() < 1e-3, "got {score}");
    }

    #[test]
    fn constant_sequence_contributes_zero_correlation() {
        let flat = [5.0, 5.0, 5.0];
        let moving = [1.0, 2.0, 3.0];
        assert_eq!(pearson(&flat, &moving), 0.0);
        assert_eq!(pearson(&moving, &flat), 0.0);
        assert_eq!(pearson(&flat, &flat), 0.0);
    }

    #[test]
    fn short_or_mismatched_sequences_are_zero() {
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
        assert_eq!(pearson(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(pearson(&[], &[]), 0.0);
    }

    #[test]
    fn single_timeframe_falls_back_to_raw_mean() {
        let b = book(&[(Timeframe::M15, &[2.0, 4.0, 6.0])]);
        assert_eq!(blend(&b), Some(4.0));
    }

    #[test]
    fn empty_book_yields_none() {
        assert_eq!(blend(&SeriesBook::new()), None);
        let b = book(&[(Timeframe::H1, &[])]);
        assert_eq!(blend(&b), None);
    }

    #[test]
    fn anticorrelated_pair_falls_back_to_unweighted_mean() {
        let b = book(&[
            (Timeframe::H1, &[1.0, 2.0, 3.0]),
            (Timeframe::H4, &[3.0, 2.0, 1.0]),
        ]);
        // Both weights clamp to 0, so the fallback averages the means.
        assert_eq!(blend(&b), Some(2.0));
    }

    #[test]
    fn blend_stays_within_convex_hull_of_means() {
        let b = book(&[
            (Timeframe::M30, &[10.0, 11.0, 12.0]),
            (Timeframe::H1, &[20.0, 21.0, 19.0]),
            (Timeframe::H4, &[15.0, 14.0, 16.0]),
        ]);
        let score = blend(&b).unwrap();
        assert!(score >= 11.0 && score <= 20.0, "got {score}");
    }

    #[test]
    fn blend_is_deterministic() {
        let b = book(&[
            (Timeframe::H1, &[10.0, 20.0, 30.0]),
            (Timeframe::H4, &[12.0, 19.0, 31.0]),
            (Timeframe::D1, &[9.0, 22.0, 28.0]),
        ]);
        assert_eq!(blend(&b), blend(&b));
    }

    #[test]
    fn weights_are_clamped_to_unit_interval() {
        let b = book(&[
            (Timeframe::H1, &[1.0, 2.0, 3.0]),
            (Timeframe::H4, &[3.0, 2.0, 1.0]),
            (Timeframe::D1, &[1.0, 2.0, 3.0]),
        ]);
        for (_, w) in correlation_weights(&b) {
            assert!((0.0..=1.0).contains(&w), "weight {w} out of range");
        }
    }
}

//! Scan runner — fetch cells, accumulate series, blend, rank
//!
//! Serial iteration over symbols × timeframes × rounds with a pacing delay
//! between requests. Fetch failures degrade to missing cells; symbols with
//! no usable data end up in the error list, never scored as zero.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::tradingview::MarketDataProvider;
use crate::blend::{blend, SeriesBook};
use crate::strategy::{
    momentum_score, neutral_consensus, percent_offset, weighted_count_score, within_band,
    BlendMode, IntervalWeights, SnapshotRow,
};
use crate::types::{IndicatorSnapshot, SymbolScore, Timeframe};

const RATE_LIMIT_MS: u64 = 200;

// ============================================================================
// Requests
// ============================================================================

/// Correlation-blend scan over one mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub mode: BlendMode,
    /// Sampling rounds per cell; one round degenerates to the raw-mean
    /// fallback since correlations need sequences
    pub rounds: u32,
    pub top_n: usize,
}

/// Static-weight momentum dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumRequest {
    pub symbols: Vec<String>,
    pub weights: IntervalWeights,
    pub top_n: usize,
}

/// Neutral screen over signal-count consensus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenRequest {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub weights: IntervalWeights,
    /// Half-width of the neutral band around zero
    pub band: f64,
    /// Minimum individual neutral signals for the consensus list
    pub min_neutral: u32,
    /// Timeframe whose cell is checked for consensus
    pub reference: Timeframe,
}

// ============================================================================
// Outcomes
// ============================================================================

/// A symbol whose blended level sits inside the mode's proximity band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandMatch {
    pub symbol: String,
    pub close: f64,
    pub blended: f64,
    pub offset_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub mode: BlendMode,
    /// Ranked descending, truncated to the requested top N
    pub scores: Vec<SymbolScore>,
    pub matches: Vec<BandMatch>,
    pub error_symbols: Vec<String>,
    /// Latest cell per (symbol, timeframe), for CSV export
    pub snapshots: Vec<IndicatorSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumBoard {
    /// Positive scores, descending
    pub long: Vec<SymbolScore>,
    /// Zero and negative scores, ascending
    pub short: Vec<SymbolScore>,
    pub average_score: f64,
    pub error_symbols: Vec<String>,
    pub snapshots: Vec<IndicatorSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenOutcome {
    /// Symbols whose weighted count score sits inside the neutral band
    pub neutral: Vec<String>,
    /// Symbols passing the consensus rule on the reference timeframe
    pub consensus: Vec<String>,
    pub error_symbols: Vec<String>,
    pub snapshots: Vec<IndicatorSnapshot>,
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Idle,
    Fetching,
    Scoring,
    Complete,
    Error,
}

/// Shared progress/state for a running scan
pub struct ScanProgress {
    pub status: RwLock<ScanStatus>,
    pub current_symbol: RwLock<String>,
    pub total_cells: AtomicU32,
    pub completed: AtomicU32,
    pub failed: AtomicU32,
    pub cancelled: AtomicBool,
    pub error_message: RwLock<Option<String>>,
    pub started_at: RwLock<Option<String>>,
    pub last_outcome: RwLock<Option<ScanOutcome>>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ScanStatus::Idle),
            current_symbol: RwLock::new(String::new()),
            total_cells: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            error_message: RwLock::new(None),
            started_at: RwLock::new(None),
            last_outcome: RwLock::new(None),
        }
    }

    /// Full reset for a new user-initiated run; clears cancellation
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
        *self.last_outcome.write().unwrap() = None;
        self.begin_cycle();
    }

    /// Per-cycle reset used by watch mode; leaves cancellation alone
    fn begin_cycle(&self) {
        *self.status.write().unwrap() = ScanStatus::Fetching;
        *self.current_symbol.write().unwrap() = String::new();
        self.total_cells.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        *self.error_message.write().unwrap() = None;
        *self.started_at.write().unwrap() = Some(Utc::now().to_rfc3339());
    }

    pub fn progress_pct(&self) -> f32 {
        let total = self.total_cells.load(Ordering::Relaxed);
        let done = self.completed.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            (done as f32 / total as f32) * 100.0
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.status.read().unwrap(),
            ScanStatus::Fetching | ScanStatus::Scoring
        )
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Cell collection
// ============================================================================

/// Snapshots per symbol per timeframe, in round order
type CellSet = BTreeMap<String, BTreeMap<Timeframe, Vec<IndicatorSnapshot>>>;

async fn collect(
    symbols: &[String],
    timeframes: &[Timeframe],
    rounds: u32,
    provider: &dyn MarketDataProvider,
    progress: &ScanProgress,
) -> CellSet {
    let mut cells = CellSet::new();

    let total = symbols.len() as u32 * timeframes.len() as u32 * rounds;
    progress.total_cells.store(total, Ordering::Relaxed);

    'rounds: for _round in 0..rounds {
        for symbol in symbols {
            if progress.cancelled.load(Ordering::Relaxed) {
                info!("Scan cancelled, keeping partial data");
                break 'rounds;
            }
            *progress.current_symbol.write().unwrap() = symbol.clone();

            for &tf in timeframes {
                match provider.fetch(symbol, tf).await {
                    Ok(snap) => {
                        cells
                            .entry(symbol.clone())
                            .or_default()
                            .entry(tf)
                            .or_default()
                            .push(snap);
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, timeframe = %tf, error = %e, "Fetch failed, cell treated as missing");
                        progress.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                progress.completed.fetch_add(1, Ordering::Relaxed);

                // Rate limit between cells
                tokio::time::sleep(std::time::Duration::from_millis(RATE_LIMIT_MS)).await;
            }
        }
    }

    cells
}

/// Latest snapshot per timeframe for one symbol
fn latest_row(by_tf: &BTreeMap<Timeframe, Vec<IndicatorSnapshot>>) -> SnapshotRow {
    by_tf
        .iter()
        .filter_map(|(tf, snaps)| snaps.last().map(|s| (*tf, s.clone())))
        .collect()
}

/// Reference close for the proximity filters: the 30m cell when present,
/// otherwise the first timeframe carrying a close
fn reference_close(by_tf: &BTreeMap<Timeframe, Vec<IndicatorSnapshot>>) -> Option<f64> {
    if let Some(close) = by_tf
        .get(&Timeframe::M30)
        .and_then(|snaps| snaps.last())
        .and_then(|s| s.close())
    {
        return Some(close);
    }
    by_tf
        .values()
        .filter_map(|snaps| snaps.last())
        .find_map(|s| s.close())
}

fn flatten_latest(cells: &CellSet) -> Vec<IndicatorSnapshot> {
    cells
        .values()
        .flat_map(|by_tf| by_tf.values().filter_map(|snaps| snaps.last().cloned()))
        .collect()
}

// ============================================================================
// Runners
// ============================================================================

/// Run one correlation-blend scan
pub async fn run_scan(
    request: &ScanRequest,
    provider: &dyn MarketDataProvider,
    progress: &ScanProgress,
) -> ScanOutcome {
    progress.begin_cycle();

    info!(
        symbols = request.symbols.len(),
        mode = %request.mode,
        rounds = request.rounds,
        "Starting scan"
    );

    let cells = collect(
        &request.symbols,
        &request.timeframes,
        request.rounds.max(1),
        provider,
        progress,
    )
    .await;

    *progress.status.write().unwrap() = ScanStatus::Scoring;

    let mut scores = Vec::new();
    let mut matches = Vec::new();
    let mut error_symbols = Vec::new();

    for symbol in &request.symbols {
        let Some(by_tf) = cells.get(symbol) else {
            error_symbols.push(symbol.clone());
            continue;
        };

        let mut book = SeriesBook::new();
        let mut observed = 0usize;
        for (tf, snaps) in by_tf {
            let raw: Vec<f64> = snaps.iter().filter_map(|s| request.mode.extract(s)).collect();
            observed += raw.len();
            let series = request.mode.transform_series(raw);
            if !series.is_empty() {
                book.insert(*tf, series);
            }
        }

        match blend(&book) {
            Some(score) => {
                if let Some(tolerance) = request.mode.proximity_tolerance() {
                    if let Some(close) = reference_close(by_tf) {
                        let hit = match request.mode {
                            // The blended pivot must sit near the price
                            BlendMode::Pivot => within_band(score, close, tolerance),
                            // The price must sit near the blended level
                            _ => within_band(close, score, tolerance),
                        };
                        if hit {
                            matches.push(BandMatch {
                                symbol: symbol.clone(),
                                close,
                                blended: score,
                                offset_pct: percent_offset(close, score),
                            });
                        }
                    }
                }
                scores.push(SymbolScore {
                    symbol: symbol.clone(),
                    score,
                    cells: observed,
                });
            }
            None => error_symbols.push(symbol.clone()),
        }
    }

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scores.truncate(request.top_n);
    matches.sort_by(|a, b| {
        a.offset_pct
            .partial_cmp(&b.offset_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let outcome = ScanOutcome {
        mode: request.mode,
        scores,
        matches,
        error_symbols,
        snapshots: flatten_latest(&cells),
    };

    info!(
        scored = outcome.scores.len(),
        matches = outcome.matches.len(),
        errors = outcome.error_symbols.len(),
        "Scan complete"
    );

    *progress.status.write().unwrap() = ScanStatus::Complete;
    *progress.last_outcome.write().unwrap() = Some(outcome.clone());
    outcome
}

/// Repeat scans on an interval until cancelled
pub async fn run_watch(
    request: &ScanRequest,
    provider: &dyn MarketDataProvider,
    progress: &ScanProgress,
    interval_secs: u64,
) {
    info!(interval_secs, "Watch mode starting");

    loop {
        if progress.cancelled.load(Ordering::Relaxed) {
            break;
        }

        run_scan(request, provider, progress).await;

        // Interruptible wait before the next cycle
        for _ in 0..(interval_secs * 2) {
            if progress.cancelled.load(Ordering::Relaxed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }

    *progress.status.write().unwrap() = ScanStatus::Idle;
    info!("Watch mode stopped");
}

/// Run the static-weight momentum dashboard
pub async fn run_momentum(
    request: &MomentumRequest,
    provider: &dyn MarketDataProvider,
    progress: &ScanProgress,
) -> MomentumBoard {
    progress.begin_cycle();

    let timeframes: Vec<Timeframe> = request.weights.0.keys().copied().collect();
    info!(
        symbols = request.symbols.len(),
        timeframes = timeframes.len(),
        "Starting momentum scan"
    );

    let cells = collect(&request.symbols, &timeframes, 1, provider, progress).await;

    *progress.status.write().unwrap() = ScanStatus::Scoring;

    let mut long = Vec::new();
    let mut short = Vec::new();
    let mut error_symbols = Vec::new();
    let mut all_scores = Vec::new();

    for symbol in &request.symbols {
        let row = match cells.get(symbol) {
            Some(by_tf) => latest_row(by_tf),
            None => SnapshotRow::new(),
        };
        if row.is_empty() {
            error_symbols.push(symbol.clone());
            continue;
        }

        let score = momentum_score(&row, &request.weights);
        all_scores.push(score);
        let entry = SymbolScore {
            symbol: symbol.clone(),
            score,
            cells: row.len(),
        };
        if score > 0.0 {
            long.push(entry);
        } else {
            short.push(entry);
        }
    }

    long.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    short.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    long.truncate(request.top_n);
    short.truncate(request.top_n);

    let average_score = if all_scores.is_empty() {
        0.0
    } else {
        all_scores.iter().sum::<f64>() / all_scores.len() as f64
    };

    *progress.status.write().unwrap() = ScanStatus::Complete;

    MomentumBoard {
        long,
        short,
        average_score,
        error_symbols,
        snapshots: flatten_latest(&cells),
    }
}

/// Run the neutral screen
pub async fn run_screen(
    request: &ScreenRequest,
    provider: &dyn MarketDataProvider,
    progress: &ScanProgress,
) -> ScreenOutcome {
    progress.begin_cycle();

    info!(
        symbols = request.symbols.len(),
        reference = %request.reference,
        "Starting neutral screen"
    );

    let cells = collect(&request.symbols, &request.timeframes, 1, provider, progress).await;

    *progress.status.write().unwrap() = ScanStatus::Scoring;

    let mut neutral = Vec::new();
    let mut consensus = Vec::new();
    let mut error_symbols = Vec::new();

    for symbol in &request.symbols {
        let row = match cells.get(symbol) {
            Some(by_tf) => latest_row(by_tf),
            None => SnapshotRow::new(),
        };
        if row.is_empty() {
            error_symbols.push(symbol.clone());
            continue;
        }

        let score = weighted_count_score(&row, &request.weights);
        if score >= -request.band && score <= request.band {
            neutral.push(symbol.clone());
        }

        if let Some(cell) = row.get(&request.reference) {
            if neutral_consensus(&cell.summary, request.min_neutral) {
                consensus.push(symbol.clone());
            }
        }
    }

    *progress.status.write().unwrap() = ScanStatus::Complete;

    ScreenOutcome {
        neutral,
        consensus,
        error_symbols,
        snapshots: flatten_latest(&cells),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tradingview::FetchError;
    use crate::types::{Recommendation, Summary};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Scripted provider: per-cell values follow a call counter so rounds
    /// produce increasing, cross-correlated sequences. Symbols starting
    /// with "BAD" always fail.
    struct StubProvider {
        calls: AtomicU32,
        recommendation: Recommendation,
        neutral_count: u32,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                recommendation: Recommendation::Buy,
                neutral_count: 5,
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for StubProvider {
        async fn fetch(
            &self,
            symbol: &str,
            timeframe: Timeframe,
        ) -> Result<IndicatorSnapshot, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            if symbol.starts_with("BAD") {
                return Err(FetchError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }

            let base = 100.0 + call as f64;
            Ok(IndicatorSnapshot {
                symbol: symbol.to_string(),
                timeframe,
                summary: Summary {
                    recommendation: self.recommendation,
                    buy: 4,
                    sell: 2,
                    neutral: self.neutral_count,
                },
                oscillators: Recommendation::Neutral,
                moving_averages: Recommendation::Neutral,
                indicators: std::collections::BTreeMap::from([
                    ("ATR".to_string(), base),
                    ("close".to_string(), base * 10.0),
                ]),
            })
        }
    }

    fn scan_request(symbols: &[&str]) -> ScanRequest {
        ScanRequest {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            timeframes: vec![Timeframe::H1, Timeframe::H4],
            mode: BlendMode::Atr,
            rounds: 3,
            top_n: 10,
        }
    }

    #[tokio::test]
    async fn failing_symbol_lands_in_error_list() {
        let provider = StubProvider::new();
        let progress = ScanProgress::new();
        let outcome = run_scan(&scan_request(&["BTCUSDT", "BADUSDT"]), &provider, &progress).await;

        assert_eq!(outcome.scores.len(), 1);
        assert_eq!(outcome.scores[0].symbol, "BTCUSDT");
        assert_eq!(outcome.error_symbols, vec!["BADUSDT".to_string()]);
        assert_eq!(progress.failed.load(Ordering::Relaxed), 6);
        assert!(!progress.is_running());
    }

    #[tokio::test]
    async fn scores_count_observed_cells() {
        let provider = StubProvider::new();
        let progress = ScanProgress::new();
        let outcome = run_scan(&scan_request(&["ETHUSDT"]), &provider, &progress).await;

        // 2 timeframes × 3 rounds
        assert_eq!(outcome.scores[0].cells, 6);
        // Increasing series across rounds are positively correlated, so
        // the blend sits between the per-timeframe means.
        assert!(outcome.scores[0].score > 100.0);
        assert_eq!(outcome.snapshots.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_scan_keeps_partial_output() {
        let provider = StubProvider::new();
        let progress = ScanProgress::new();
        progress.cancelled.store(true, Ordering::Relaxed);

        let outcome = run_scan(&scan_request(&["BTCUSDT"]), &provider, &progress).await;
        assert!(outcome.scores.is_empty());
        assert_eq!(outcome.error_symbols, vec!["BTCUSDT".to_string()]);
    }

    #[tokio::test]
    async fn momentum_board_splits_long_and_short() {
        let provider = StubProvider::new();
        let progress = ScanProgress::new();
        let request = MomentumRequest {
            symbols: vec!["BTCUSDT".to_string(), "BADUSDT".to_string()],
            weights: IntervalWeights::momentum_defaults(),
            top_n: 5,
        };

        let board = run_momentum(&request, &provider, &progress).await;
        assert_eq!(board.long.len(), 1);
        assert!(board.short.is_empty());
        // Buy everywhere: 0.2 + 0.3 + 0.3 + 0.2 = 1.0
        assert!((board.long[0].score - 1.0).abs() < 1e-12);
        assert_eq!(board.error_symbols, vec!["BADUSDT".to_string()]);
        assert!((board.average_score - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn screen_flags_neutral_consensus() {
        let provider = StubProvider {
            calls: AtomicU32::new(0),
            recommendation: Recommendation::Neutral,
            neutral_count: 14,
        };
        let progress = ScanProgress::new();
        let request = ScreenRequest {
            symbols: vec!["XRPUSDT".to_string()],
            timeframes: vec![Timeframe::H1],
            weights: IntervalWeights::ladder(),
            band: 2.5,
            min_neutral: 11,
            reference: Timeframe::H1,
        };

        let outcome = run_screen(&request, &provider, &progress).await;
        assert_eq!(outcome.consensus, vec!["XRPUSDT".to_string()]);
        // buy-sell differential is 2, weighted average 2, inside band 2.5
        assert_eq!(outcome.neutral, vec!["XRPUSDT".to_string()]);
    }
}

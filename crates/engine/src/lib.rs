//! MTF-Scan engine — multi-timeframe technical-analysis scanning
//!
//! Provides:
//! - TradingView scan client with a provider trait at the seam
//! - Correlation-weighted blending of per-timeframe observations
//! - Momentum / ATR / pivot / Bollinger / TDFI scan strategies
//! - Long-format CSV export and webhook signal notifications

pub mod api;
pub mod blend;
pub mod notify;
pub mod report;
pub mod scanner;
pub mod strategy;
pub mod tdfi;
pub mod types;
pub mod universe;

// Re-exports for convenience
pub use api::{CachedProvider, FetchError, MarketDataProvider, TradingViewClient};
pub use blend::{blend, correlation_weights, pearson, CorrelationWeights, SeriesBook};
pub use notify::{Embed, WebhookNotifier};
pub use report::{csv_string, export_csv, write_csv};
pub use scanner::{
    run_momentum, run_scan, run_screen, run_watch, MomentumBoard, MomentumRequest, ScanOutcome,
    ScanProgress, ScanRequest, ScanStatus, ScreenOutcome, ScreenRequest,
};
pub use strategy::{BlendMode, IntervalWeights};
pub use tdfi::{TdfiParams, TdfiSignal};
pub use types::{IndicatorSnapshot, Recommendation, Summary, SymbolScore, Timeframe};
pub use universe::{load_symbols, parse_symbols};

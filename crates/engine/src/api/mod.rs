//! Market data providers

pub mod cache;
pub mod tradingview;

pub use cache::CachedProvider;
pub use tradingview::{FetchError, MarketDataProvider, TradingViewClient};

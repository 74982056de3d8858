//! In-memory TTL cache in front of a market data provider
//!
//! Serves unexpired snapshots without touching the network; entries are
//! keyed by (symbol, timeframe) and replaced wholesale on refresh.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::api::tradingview::{FetchError, MarketDataProvider};
use crate::types::{IndicatorSnapshot, Timeframe};

struct Entry {
    fetched_at: Instant,
    snapshot: IndicatorSnapshot,
}

/// Provider wrapper adding a TTL snapshot cache
pub struct CachedProvider<P> {
    inner: P,
    ttl: Duration,
    entries: Mutex<HashMap<(String, Timeframe), Entry>>,
}

impl<P> CachedProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, symbol: &str, timeframe: Timeframe) -> Option<IndicatorSnapshot> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&(symbol.to_string(), timeframe))?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.snapshot.clone())
        } else {
            None
        }
    }

    fn store(&self, snapshot: IndicatorSnapshot) {
        let key = (snapshot.symbol.clone(), snapshot.timeframe);
        self.entries.lock().unwrap().insert(
            key,
            Entry {
                fetched_at: Instant::now(),
                snapshot,
            },
        );
    }
}

#[async_trait]
impl<P: MarketDataProvider> MarketDataProvider for CachedProvider<P> {
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, FetchError> {
        if let Some(hit) = self.lookup(symbol, timeframe) {
            trace!(symbol, timeframe = %timeframe, "Snapshot cache hit");
            return Ok(hit);
        }

        let snapshot = self.inner.fetch(symbol, timeframe).await?;
        self.store(snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Recommendation, Summary};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MarketDataProvider for CountingProvider {
        async fn fetch(
            &self,
            symbol: &str,
            timeframe: Timeframe,
        ) -> Result<IndicatorSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(IndicatorSnapshot {
                symbol: symbol.to_string(),
                timeframe,
                summary: Summary {
                    recommendation: Recommendation::Neutral,
                    buy: 0,
                    sell: 0,
                    neutral: 0,
                },
                oscillators: Recommendation::Neutral,
                moving_averages: Recommendation::Neutral,
                indicators: BTreeMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn repeated_fetches_within_ttl_hit_once() {
        let cached = CachedProvider::new(
            CountingProvider {
                calls: AtomicU32::new(0),
            },
            Duration::from_secs(60),
        );

        cached.fetch("BTCUSDT", Timeframe::H1).await.unwrap();
        cached.fetch("BTCUSDT", Timeframe::H1).await.unwrap();
        cached.fetch("BTCUSDT", Timeframe::H1).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::Relaxed), 1);

        // A different timeframe is a different cell
        cached.fetch("BTCUSDT", Timeframe::H4).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_misses() {
        let cached = CachedProvider::new(
            CountingProvider {
                calls: AtomicU32::new(0),
            },
            Duration::ZERO,
        );

        cached.fetch("ETHUSDT", Timeframe::M15).await.unwrap();
        cached.fetch("ETHUSDT", Timeframe::M15).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::Relaxed), 2);
    }
}

//! Per-instrument rolling price history
//!
//! Every instrument has its own lock: writers for one instrument are serialized
//! while other instruments proceed independently. Snapshots copy under a read lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::models::price::PricePoint;

pub const HISTORY_RETENTION_HOURS: i64 = 24;

type Series = Arc<RwLock<VecDeque<PricePoint>>>;

pub struct HistoryLedger {
    retention: Duration,
    series: RwLock<HashMap<String, Series>>,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::with_retention(Duration::hours(HISTORY_RETENTION_HOURS))
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention,
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Make sure `symbols` have a (possibly empty) series.
    pub async fn register<'a>(&self, symbols: impl IntoIterator<Item = &'a str>) {
        let mut map = self.series.write().await;
        for symbol in symbols {
            map.entry(symbol.to_string()).or_default();
        }
    }

    /// Insert a sample in time order, then drop everything older than
    /// `at - retention`.
    pub async fn record(&self, symbol: &str, price: f64, at: DateTime<Utc>) {
        let series = self.series_for(symbol).await;
        let mut points = series.write().await;

        let idx = points.partition_point(|p| p.timestamp <= at);
        points.insert(idx, PricePoint::new(at, price));

        let cutoff = at - self.retention;
        while points.front().is_some_and(|p| p.timestamp < cutoff) {
            points.pop_front();
        }
    }

    /// Points within the retention window as of now. `None` for unknown symbols.
    pub async fn snapshot(&self, symbol: &str) -> Option<Vec<PricePoint>> {
        self.snapshot_at(symbol, Utc::now()).await
    }

    pub async fn snapshot_at(&self, symbol: &str, now: DateTime<Utc>) -> Option<Vec<PricePoint>> {
        let series = self.series.read().await.get(symbol).cloned()?;
        let points = series.read().await;
        let cutoff = now - self.retention;
        Some(
            points
                .iter()
                .filter(|p| p.timestamp >= cutoff)
                .copied()
                .collect(),
        )
    }

    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    async fn series_for(&self, symbol: &str) -> Series {
        if let Some(series) = self.series.read().await.get(symbol) {
            return series.clone();
        }
        let mut map = self.series.write().await;
        map.entry(symbol.to_string()).or_default().clone()
    }
}

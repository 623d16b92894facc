//! Price sampling interface consumed by the strategy watchers.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::FetchError;

#[async_trait]
pub trait PriceSampler: Send + Sync {
    /// Fetch the current price of `symbol`, giving up after `timeout`.
    ///
    /// Implementations must not retry internally; the caller owns retry policy.
    async fn fetch_price(&self, symbol: &str, timeout: Duration) -> Result<f64, FetchError>;
}

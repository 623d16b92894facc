//! Binance spot REST ticker client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::types::TickerPrice;
use crate::errors::FetchError;
use crate::services::market_data::PriceSampler;

pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";

#[derive(Clone)]
pub struct BinanceRestClient {
    http: Client,
    base_url: String,
}

impl BinanceRestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_proxy(base_url, None)
    }

    /// Build a client that routes requests through `proxy_url` when given.
    pub fn with_proxy(
        base_url: impl Into<String>,
        proxy_url: Option<&str>,
    ) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30));
        if let Some(proxy) = proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self::with_client(base_url, builder.build()?))
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }
}

#[async_trait]
impl PriceSampler for BinanceRestClient {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_price(&self, symbol: &str, timeout: Duration) -> Result<f64, FetchError> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(timeout)
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let ticker: TickerPrice = resp.json().await.map_err(|e| FetchError::Malformed {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })?;

        let price = ticker.price.parse::<f64>().map_err(|e| FetchError::Malformed {
            symbol: symbol.to_string(),
            reason: format!("price {:?}: {}", ticker.price, e),
        })?;
        if !price.is_finite() {
            return Err(FetchError::Malformed {
                symbol: symbol.to_string(),
                reason: format!("non-finite price {:?}", ticker.price),
            });
        }

        debug!(symbol = %ticker.symbol, price = price, "binance ticker fetched");
        Ok(price)
    }
}

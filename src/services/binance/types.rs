use serde::Deserialize;

/// `GET /api/v3/ticker/price?symbol=...` response body
#[derive(Debug, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

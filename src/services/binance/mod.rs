pub mod client;
pub mod types;

pub use client::{BinanceRestClient, DEFAULT_BINANCE_URL};

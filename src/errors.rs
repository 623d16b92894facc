//! Error taxonomy for sampling, delivery, configuration and engine lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A price sample could not be obtained. Always transient from the watcher's
/// point of view: it backs off and tries again.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("malformed price payload for {symbol}: {reason}")]
    Malformed { symbol: String, reason: String },

    #[error("price fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// A notification could not be handed to the downstream sink.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to sign notification: {0}")]
    Signing(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid instrument symbol {0:?}")]
    InvalidInstrument(String),

    #[error("invalid strategy #{index} for {symbol}: {reason}")]
    InvalidStrategy {
        symbol: String,
        index: usize,
        reason: String,
    },

    #[error("invalid route for chat {chat_id}: {reason}")]
    InvalidChannel { chat_id: i64, reason: String },

    #[error("invalid value {value:?} for {name}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("engine is already running")]
    AlreadyRunning,
}

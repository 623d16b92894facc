//! Monitor configuration data models

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::models::channel::ChannelRoute;
use crate::signals::format::format_interval;

/// One sampling schedule and its alert band for a single instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Seconds between two samples
    pub interval: u64,
    /// Percentage rise that triggers an alert
    pub up_threshold: f64,
    /// Percentage drop (as a positive number) that triggers an alert
    pub down_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Strategy {
    pub fn new(interval_secs: u64, up_threshold: f64, down_threshold: f64) -> Self {
        Self {
            interval: interval_secs,
            up_threshold,
            down_threshold,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Name used in logs and task names; falls back to the rendered interval.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("every {}", format_interval(self.interval)),
        }
    }

    pub fn validate(&self, symbol: &str, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidStrategy {
            symbol: symbol.to_string(),
            index,
            reason,
        };

        if self.interval == 0 {
            return Err(invalid("interval must be positive".to_string()));
        }
        if !self.up_threshold.is_finite() || self.up_threshold <= 0.0 {
            return Err(invalid(format!(
                "up_threshold must be a positive percentage, got {}",
                self.up_threshold
            )));
        }
        if !self.down_threshold.is_finite() || self.down_threshold <= 0.0 {
            return Err(invalid(format!(
                "down_threshold must be a positive percentage, got {}",
                self.down_threshold
            )));
        }
        Ok(())
    }
}

/// Immutable snapshot of everything the engine monitors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub instruments: BTreeMap<String, Vec<Strategy>>,
    #[serde(default)]
    pub channels: Vec<ChannelRoute>,
}

impl MonitorConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read and parse a JSON config file. Validation is a separate step.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn with_strategy(mut self, symbol: impl Into<String>, strategy: Strategy) -> Self {
        self.instruments
            .entry(symbol.into())
            .or_default()
            .push(strategy);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (symbol, strategies) in &self.instruments {
            if !is_valid_symbol(symbol) {
                return Err(ConfigError::InvalidInstrument(symbol.clone()));
            }
            for (index, strategy) in strategies.iter().enumerate() {
                strategy.validate(symbol, index)?;
            }
        }
        for route in &self.channels {
            route.validate()?;
        }
        Ok(())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(String::as_str)
    }

    pub fn strategy_count(&self) -> usize {
        self.instruments.values().map(Vec::len).sum()
    }
}

fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

//! Threshold-crossing events handed from watchers to the dispatcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    /// Direction implied by the sign of a percentage change.
    pub fn from_change(change_pct: f64) -> Self {
        if change_pct > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
        }
    }
}

/// A detected crossing: the current sample moved past one of the strategy's
/// thresholds relative to the previous sample of the same strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityEvent {
    pub symbol: String,
    pub strategy: Strategy,
    pub price: f64,
    pub last_price: f64,
    pub change_pct: f64,
    pub observed_at: DateTime<Utc>,
}

impl VolatilityEvent {
    pub fn trend(&self) -> Trend {
        Trend::from_change(self.change_pct)
    }

    /// The configured threshold on the side that was crossed
    pub fn threshold(&self) -> f64 {
        match self.trend() {
            Trend::Up => self.strategy.up_threshold,
            Trend::Down => self.strategy.down_threshold,
        }
    }
}

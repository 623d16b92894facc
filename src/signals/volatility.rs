//! Percentage-change evaluation against a strategy's own previous sample.

use chrono::{DateTime, Utc};

use crate::models::alert::Trend;
use crate::models::strategy::Strategy;

/// Percentage change from `old` to `new`. A zero baseline yields `0.0`.
pub fn price_change_pct(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return 0.0;
    }
    (new - old) / old * 100.0
}

/// Threshold side crossed by `change_pct`, if any. Both bounds are inclusive.
pub fn crossing(change_pct: f64, strategy: &Strategy) -> Option<Trend> {
    if change_pct >= strategy.up_threshold {
        Some(Trend::Up)
    } else if change_pct <= -strategy.down_threshold {
        Some(Trend::Down)
    } else {
        None
    }
}

/// Outcome of feeding one successful sample into a [`WatcherState`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// No previous sample to compare against
    First,
    Evaluated {
        previous: f64,
        change_pct: f64,
        crossing: Option<Trend>,
    },
}

/// Last observation of one (instrument, strategy) pair. Owned by a single watcher.
#[derive(Debug, Clone, Default)]
pub struct WatcherState {
    last_price: Option<f64>,
    last_checked: Option<DateTime<Utc>>,
}

impl WatcherState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `price` against the previous sample and make it the new baseline.
    pub fn observe(&mut self, price: f64, at: DateTime<Utc>, strategy: &Strategy) -> Observation {
        let observation = match self.last_price {
            None => Observation::First,
            Some(previous) => {
                let change_pct = price_change_pct(previous, price);
                Observation::Evaluated {
                    previous,
                    change_pct,
                    crossing: crossing(change_pct, strategy),
                }
            }
        };

        self.last_price = Some(price);
        self.last_checked = Some(at);
        observation
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }
}

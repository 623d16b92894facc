//! Crossing detection and alert rendering.

pub mod format;
pub mod volatility;

pub use format::{format_interval, render_alert};
pub use volatility::{crossing, price_change_pct, Observation, WatcherState};

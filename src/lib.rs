//! Voltwatch: volatility monitoring and alerting engine.
//!
//! Independently scheduled watchers sample instrument prices, keep a rolling
//! 24h history per instrument and hand threshold crossings to a decoupled
//! alert dispatcher.

pub mod channels;
pub mod config;
pub mod core;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod signals;

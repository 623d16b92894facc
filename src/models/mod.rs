//! Shared data models spanning the engine layers.

pub mod alert;
pub mod channel;
pub mod price;
pub mod strategy;

pub use alert::{Trend, VolatilityEvent};
pub use channel::{ChannelMessage, ChannelRoute, HandlerConfig, MediaAttachment};
pub use price::PricePoint;
pub use strategy::{MonitorConfig, Strategy};

//! External collaborators: price sources and notification sinks.

pub mod binance;
pub mod market_data;
pub mod notifier;

pub use binance::BinanceRestClient;
pub use market_data::PriceSampler;
pub use notifier::{LogNotifier, NotificationSink, WebhookNotifier};

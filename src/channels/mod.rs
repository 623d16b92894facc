//! Keyword forwarding for broadcast channel messages.

pub mod router;

pub use router::{render_content, ChannelHandler, ChannelRouter, KeywordForwarder, RouteOutcome};

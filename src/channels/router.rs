//! Routes broadcast channel messages to the handler configured for their chat.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::errors::DeliveryError;
use crate::metrics::Metrics;
use crate::models::channel::{ChannelMessage, ChannelRoute, HandlerConfig, MediaAttachment};
use crate::services::notifier::NotificationSink;

const FORWARD_TITLE: &str = "Channel update";
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelHandler {
    Keyword(KeywordForwarder),
    Ignore,
}

impl From<&HandlerConfig> for ChannelHandler {
    fn from(config: &HandlerConfig) -> Self {
        match config {
            HandlerConfig::Keyword { keywords } => {
                ChannelHandler::Keyword(KeywordForwarder::new(keywords.clone()))
            }
            HandlerConfig::Ignore => ChannelHandler::Ignore,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordForwarder {
    keywords: Vec<String>,
}

impl KeywordForwarder {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }

    pub fn matches(&self, content: &str) -> bool {
        self.keywords.iter().any(|k| content.contains(k.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum RouteOutcome {
    Forwarded,
    NotOfInterest,
    Ignored,
    Unrouted,
    Failed(String),
}

pub struct ChannelRouter {
    routes: RwLock<HashMap<i64, ChannelHandler>>,
    sink: Arc<dyn NotificationSink>,
    retry_delay: Duration,
    max_retries: usize,
    metrics: Option<Arc<Metrics>>,
}

impl ChannelRouter {
    /// Resolve the route table. A later route for the same chat wins.
    pub fn new(routes: &[ChannelRoute], sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            routes: RwLock::new(resolve(routes)),
            sink,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            metrics: None,
        }
    }

    pub fn with_retry(mut self, delay: Duration, max_retries: usize) -> Self {
        self.retry_delay = delay;
        self.max_retries = max_retries;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the whole route table. Forwards already in progress finish with
    /// the handler they started with.
    pub async fn reload(&self, routes: &[ChannelRoute]) {
        let resolved = resolve(routes);
        info!(routes = resolved.len(), "channel routes reloaded");
        *self.routes.write().await = resolved;
    }

    pub async fn routed_chats(&self) -> Vec<i64> {
        let mut chats: Vec<i64> = self.routes.read().await.keys().copied().collect();
        chats.sort_unstable();
        chats
    }

    pub async fn handle(&self, message: &ChannelMessage) -> RouteOutcome {
        if let Some(ref metrics) = self.metrics {
            metrics.channel_messages_total.inc();
        }

        let handler = self.routes.read().await.get(&message.chat_id).cloned();
        let Some(handler) = handler else {
            debug!(chat_id = message.chat_id, "message from unrouted chat");
            return RouteOutcome::Unrouted;
        };

        match handler {
            ChannelHandler::Ignore => RouteOutcome::Ignored,
            ChannelHandler::Keyword(forwarder) => {
                let content = render_content(message);
                if !forwarder.matches(&content) {
                    info!(
                        chat_id = message.chat_id,
                        content = %content.replace('\n', " "),
                        "channel message not of interest"
                    );
                    return RouteOutcome::NotOfInterest;
                }
                self.forward(message.chat_id, &content).await
            }
        }
    }

    async fn forward(&self, chat_id: i64, content: &str) -> RouteOutcome {
        let body = format!("**{}**\n\n{}\n", FORWARD_TITLE, content);
        let sink = &self.sink;
        let body = body.as_str();

        let result = (|| async move { sink.send(FORWARD_TITLE, body).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.retry_delay)
                    .with_max_times(self.max_retries),
            )
            .sleep(tokio::time::sleep)
            .notify(|e: &DeliveryError, after: Duration| {
                warn!(chat_id = chat_id, error = %e, retry_in = ?after, "channel forward failed, retrying");
            })
            .await;

        match result {
            Ok(()) => {
                info!(chat_id = chat_id, "channel message forwarded");
                if let Some(ref metrics) = self.metrics {
                    metrics.channel_forwards_total.inc();
                }
                RouteOutcome::Forwarded
            }
            Err(e) => {
                error!(chat_id = chat_id, error = %e, "channel forward gave up");
                RouteOutcome::Failed(e.to_string())
            }
        }
    }
}

fn resolve(routes: &[ChannelRoute]) -> HashMap<i64, ChannelHandler> {
    routes
        .iter()
        .map(|route| (route.chat_id, ChannelHandler::from(&route.handler)))
        .collect()
}

/// Plain-text rendering used both for keyword matching and the forwarded body
pub fn render_content(message: &ChannelMessage) -> String {
    let mut lines = vec![
        format!("Time: {}", message.posted_at.format("%Y-%m-%d %H:%M")),
        format!("Source: {}", message.chat_id),
    ];

    match message.text.as_deref() {
        Some(text) if !text.trim().is_empty() => lines.push(format!("Content:\n{}", text)),
        _ => lines.push("Content: [non-text content]".to_string()),
    }

    if let Some(media) = &message.media {
        lines.push(match media {
            MediaAttachment::Photo { width, height } => format!("Photo: {}x{}", width, height),
            MediaAttachment::Document { file_name } => format!("File: {}", file_name),
            MediaAttachment::Video { duration_secs } => format!("Video: {}s", duration_secs),
        });
    }

    lines.join("\n")
}

//! Broadcast channel messages and their routing configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// A message received from a broadcast channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub chat_id: i64,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaAttachment {
    Photo { width: u32, height: u32 },
    Document { file_name: String },
    Video { duration_secs: u32 },
}

/// Which handler a chat is routed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRoute {
    pub chat_id: i64,
    pub handler: HandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Forward messages containing any of the keywords
    Keyword { keywords: Vec<String> },
    /// Accept and drop everything from this chat
    Ignore,
}

impl ChannelRoute {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let HandlerConfig::Keyword { keywords } = &self.handler {
            if keywords.is_empty() || keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::InvalidChannel {
                    chat_id: self.chat_id,
                    reason: "keyword handler needs at least one non-empty keyword".to_string(),
                });
            }
        }
        Ok(())
    }
}

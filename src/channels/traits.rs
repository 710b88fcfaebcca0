use async_trait::async_trait;
use serde::Serialize;

use crate::routing::AgentName;

/// A bot's own identity on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BotProfile {
    pub id: Option<i64>,
    /// Lower-cased, without the leading `@`. Empty when unknown.
    pub username: String,
}

/// Extra options for an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reply_to_message_id: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Configuration problem; retrying cannot help.
    #[error("Missing Telegram token for agent \"{agent}\".")]
    MissingToken { agent: String },
    #[error("Telegram API {method} failed: {detail}")]
    Api { method: String, detail: String },
    #[error("Telegram API {method} returned non-JSON response.")]
    InvalidResponse { method: String },
    #[error("Telegram API {method} timed out")]
    Timeout { method: String },
    #[error("Telegram API {method} request failed: {detail}")]
    Transport { method: String, detail: String },
}

impl PlatformError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingToken { .. })
    }

    /// The platform refused a reply because the quoted message is gone.
    pub fn is_reply_target_missing(&self) -> bool {
        match self {
            Self::Api { detail, .. } => detail
                .to_lowercase()
                .contains("message to be replied not found"),
            _ => false,
        }
    }
}

/// The two platform operations the router needs.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Send `text` to `chat_id` as the bot belonging to `agent`.
    async fn deliver(
        &self,
        agent: &AgentName,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), PlatformError>;

    /// Fetch (and cache for the process lifetime) the bot identity for `agent`.
    async fn identity(&self, agent: &AgentName) -> Result<BotProfile, PlatformError>;

    fn name(&self) -> &str;
}

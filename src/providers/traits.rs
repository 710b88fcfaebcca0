use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AgentModelConfig;
use crate::memory::{HistoryEntry, Role};
use crate::routing::AgentName;

/// Role of a provider-bound chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

/// A chat message in the normalized, provider-neutral shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a provider needs to produce one reply.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub agent: AgentName,
    pub user_message: String,
    pub history: Vec<HistoryEntry>,
    pub system_prompt: Option<String>,
    pub config: AgentModelConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider}: missing API key")]
    MissingApiKey { provider: String },
    #[error("{provider}: no user or assistant messages to send")]
    NoMessages { provider: String },
    #[error("{provider}: HTTP {status}: {detail}")]
    Http {
        provider: String,
        status: u16,
        detail: String,
    },
    #[error("{provider}: request timed out")]
    Timeout { provider: String },
    #[error("{provider}: request failed: {detail}")]
    Transport { provider: String, detail: String },
    #[error("{provider}: empty reply")]
    EmptyReply { provider: String },
    #[error("{provider}: invalid response: {detail}")]
    InvalidResponse { provider: String, detail: String },
}

/// A reply-generation backend.
///
/// Implementations never retry internally; a failure is returned as-is and
/// the registry decides what to try next.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Display name used in error messages and logs.
    fn name(&self) -> &str;

    /// Produce a non-empty, trimmed reply.
    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("be kind")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be kind"}"#);
    }

    #[test]
    fn memory_roles_map_to_chat_roles() {
        assert_eq!(ChatRole::from(Role::User), ChatRole::User);
        assert_eq!(ChatRole::from(Role::Assistant), ChatRole::Assistant);
    }

    #[test]
    fn http_error_includes_status_and_detail() {
        let err = ProviderError::Http {
            provider: "Claude".into(),
            status: 529,
            detail: "Overloaded".into(),
        };
        assert_eq!(err.to_string(), "Claude: HTTP 529: Overloaded");
    }
}

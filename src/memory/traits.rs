use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::routing::ConversationKey;

/// Speaker of a stored conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Which tier answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySource {
    Cache,
    Remote,
    Default,
}

/// A value tagged with the tier it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: MemorySource,
}

/// Result of mirroring a write to the remote tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    /// No remote store configured.
    Skipped,
    Mirrored,
    Failed(String),
}

/// Outcome of a short-memory write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// The stored value after trimming and capping; empty means cleared.
    pub value: String,
    pub remote: RemoteWrite,
}

/// Durable short-memory backing keyed by `(agent, chat, user)`.
///
/// Writes are upserts on the composite key, so repeating one is harmless.
#[async_trait]
pub trait RemoteMemory: Send + Sync {
    /// Stored note, or `None` when no row exists.
    async fn fetch(&self, key: &ConversationKey) -> anyhow::Result<Option<String>>;

    async fn upsert(&self, key: &ConversationKey, memory: &str) -> anyhow::Result<()>;

    async fn delete(&self, key: &ConversationKey) -> anyhow::Result<()>;

    /// Return the backend name.
    fn name(&self) -> &str;
}

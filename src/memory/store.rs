//! Dual-tier conversation memory.
//!
//! Short memory reads through to the remote tier when one is configured and
//! writes are mirrored to it best-effort. Conversation history lives only in
//! the in-process cache. Remote failures are logged and never surface to
//! callers of the plain accessors; the `*_sourced` / `try_*` variants expose
//! which tier answered and whether a mirror write landed.

use std::sync::Arc;

use super::cache::MemoryCache;
use super::traits::{
    HistoryEntry, MemorySource, RemoteMemory, RemoteWrite, Role, SetOutcome, Sourced,
};
use crate::config::MAX_CONVERSATION_MESSAGES_LIMIT;
use crate::routing::ConversationKey;

/// Maximum stored short-memory length, in characters.
pub const MAX_SHORT_MEMORY_CHARS: usize = 1000;
const FALLBACK_HISTORY_LIMIT: usize = 20;

pub struct MemoryStore {
    cache: MemoryCache,
    remote: Option<Arc<dyn RemoteMemory>>,
    default_limit: usize,
}

impl MemoryStore {
    pub fn new(remote: Option<Arc<dyn RemoteMemory>>, default_limit: usize) -> Self {
        Self {
            cache: MemoryCache::new(),
            remote,
            default_limit: clamp_limit(Some(default_limit)),
        }
    }

    /// In-process only.
    pub fn local(default_limit: usize) -> Self {
        Self::new(None, default_limit)
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote_name(&self) -> Option<&str> {
        self.remote.as_deref().map(|remote| remote.name())
    }

    pub async fn get_short(&self, key: &ConversationKey) -> String {
        self.get_short_sourced(key).await.value
    }

    /// Short memory tagged with the tier that produced it.
    pub async fn get_short_sourced(&self, key: &ConversationKey) -> Sourced<String> {
        let cached = self.cache.short(key).filter(|value| !value.is_empty());

        if let Some(remote) = &self.remote {
            match remote.fetch(key).await {
                Ok(Some(value)) if !value.is_empty() => {
                    self.cache.set_short(key, value.clone());
                    return Sourced {
                        value,
                        source: MemorySource::Remote,
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "remote short memory read failed; using cache");
                }
            }
        }

        match cached {
            Some(value) => Sourced {
                value,
                source: MemorySource::Cache,
            },
            None => Sourced {
                value: String::new(),
                source: MemorySource::Default,
            },
        }
    }

    /// Store `value` (trimmed, capped). A blank value clears the key.
    /// Returns what was stored.
    pub async fn set_short(&self, key: &ConversationKey, value: &str) -> String {
        self.try_set_short(key, value).await.value
    }

    pub async fn try_set_short(&self, key: &ConversationKey, value: &str) -> SetOutcome {
        let memory: String = value.trim().chars().take(MAX_SHORT_MEMORY_CHARS).collect();
        let memory = memory.trim_end().to_string();
        if memory.is_empty() {
            let remote = self.try_clear(key).await;
            return SetOutcome {
                value: String::new(),
                remote,
            };
        }

        self.cache.set_short(key, memory.clone());

        let remote = match &self.remote {
            None => RemoteWrite::Skipped,
            Some(remote) => match remote.upsert(key, &memory).await {
                Ok(()) => RemoteWrite::Mirrored,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "remote short memory upsert failed");
                    RemoteWrite::Failed(e.to_string())
                }
            },
        };

        SetOutcome {
            value: memory,
            remote,
        }
    }

    /// Remove short memory and history for `key`.
    pub async fn clear(&self, key: &ConversationKey) {
        self.try_clear(key).await;
    }

    pub async fn try_clear(&self, key: &ConversationKey) -> RemoteWrite {
        self.cache.remove(key);

        match &self.remote {
            None => RemoteWrite::Skipped,
            Some(remote) => match remote.delete(key).await {
                Ok(()) => RemoteWrite::Mirrored,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "remote short memory delete failed");
                    RemoteWrite::Failed(e.to_string())
                }
            },
        }
    }

    /// Most recent turns, oldest first. `limit` is clamped to `[1, 100]`;
    /// `None` uses the configured cap.
    pub async fn get_conversation(
        &self,
        key: &ConversationKey,
        limit: Option<usize>,
    ) -> Vec<HistoryEntry> {
        let limit = limit.map_or(self.default_limit, |n| clamp_limit(Some(n)));
        self.cache.history(key, limit)
    }

    /// Append one turn (blank content is dropped) and enforce the cap.
    /// Returns the resulting history length.
    pub async fn append_conversation(
        &self,
        key: &ConversationKey,
        role: Role,
        content: &str,
        max_messages: Option<usize>,
    ) -> usize {
        let cap = max_messages.map_or(self.default_limit, |n| clamp_limit(Some(n)));
        self.cache.append(key, HistoryEntry::new(role, content), cap)
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    match limit {
        Some(n) if n > 0 => n.min(MAX_CONVERSATION_MESSAGES_LIMIT),
        _ => FALLBACK_HISTORY_LIMIT,
    }
}

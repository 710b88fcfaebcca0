//! In-process cache tier.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::traits::HistoryEntry;
use crate::routing::ConversationKey;

/// Mutex-protected maps for short memory and rolling transcripts.
///
/// Each operation takes the lock once, so a history append and its cap
/// enforcement cannot interleave with another request on the same key.
#[derive(Default)]
pub struct MemoryCache {
    short: Mutex<HashMap<ConversationKey, String>>,
    conversations: Mutex<HashMap<ConversationKey, VecDeque<HistoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn short(&self, key: &ConversationKey) -> Option<String> {
        self.short.lock().get(key).cloned()
    }

    pub fn set_short(&self, key: &ConversationKey, value: String) {
        self.short.lock().insert(key.clone(), value);
    }

    /// Drop both the short note and the transcript for `key`.
    pub fn remove(&self, key: &ConversationKey) {
        self.short.lock().remove(key);
        self.conversations.lock().remove(key);
    }

    /// The most recent `limit` turns, oldest first.
    pub fn history(&self, key: &ConversationKey, limit: usize) -> Vec<HistoryEntry> {
        let conversations = self.conversations.lock();
        let Some(entries) = conversations.get(key) else {
            return Vec::new();
        };
        let start = entries.len().saturating_sub(limit);
        entries.iter().skip(start).cloned().collect()
    }

    /// Push `entry` (unless blank) and evict from the front down to `cap`.
    /// Returns the resulting transcript length.
    pub fn append(&self, key: &ConversationKey, entry: HistoryEntry, cap: usize) -> usize {
        let mut conversations = self.conversations.lock();
        let entries = conversations.entry(key.clone()).or_default();
        if !entry.content.trim().is_empty() {
            entries.push_back(entry);
        }
        while entries.len() > cap {
            entries.pop_front();
        }
        entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::traits::Role;
    use crate::routing::AgentName;

    fn key() -> ConversationKey {
        ConversationKey::new(AgentName::parse("claude").unwrap(), 1, 2)
    }

    #[test]
    fn history_returns_tail_in_order() {
        let cache = MemoryCache::new();
        for i in 0..5 {
            cache.append(&key(), HistoryEntry::new(Role::User, format!("m{i}")), 10);
        }
        let tail: Vec<String> = cache
            .history(&key(), 2)
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(tail, vec!["m3", "m4"]);
    }

    #[test]
    fn append_evicts_oldest_first() {
        let cache = MemoryCache::new();
        for i in 0..7 {
            cache.append(&key(), HistoryEntry::new(Role::User, format!("m{i}")), 3);
        }
        let all: Vec<String> = cache
            .history(&key(), 100)
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(all, vec!["m4", "m5", "m6"]);
    }

    #[test]
    fn blank_entries_are_not_stored() {
        let cache = MemoryCache::new();
        assert_eq!(cache.append(&key(), HistoryEntry::new(Role::User, "  "), 5), 0);
        assert_eq!(cache.append(&key(), HistoryEntry::new(Role::User, "x"), 5), 1);
    }

    #[test]
    fn remove_clears_both_maps() {
        let cache = MemoryCache::new();
        cache.set_short(&key(), "note".into());
        cache.append(&key(), HistoryEntry::new(Role::User, "x"), 5);
        cache.remove(&key());
        assert!(cache.short(&key()).is_none());
        assert!(cache.history(&key(), 5).is_empty());
    }
}

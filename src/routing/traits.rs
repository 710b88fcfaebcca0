//! Routing types: agent identity, conversation addressing, and the handle gate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::channels::{BotProfile, Message};

/// Normalized agent name (trimmed, lower-cased, never empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AgentName(String);

impl AgentName {
    /// Normalize a raw agent name. Returns `None` when nothing is left after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Environment key fragment: runs of characters outside `[a-z0-9]`
    /// collapse to a single `_`, then the result is upper-cased.
    ///
    /// `my-bot` becomes `MY_BOT`, `gpt 4.1` becomes `GPT_4_1`.
    pub fn env_key(&self) -> String {
        let mut key = String::with_capacity(self.0.len());
        let mut in_run = false;
        for c in self.0.chars() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                key.push(c.to_ascii_uppercase());
                in_run = false;
            } else if !in_run {
                key.push('_');
                in_run = true;
            }
        }
        key
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Addressing scheme for all memory operations: `(agent, chat, user)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub agent: AgentName,
    pub chat_id: String,
    pub user_id: String,
}

impl ConversationKey {
    pub fn new(agent: AgentName, chat_id: impl ToString, user_id: impl ToString) -> Self {
        Self {
            agent,
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.agent, self.chat_id, self.user_id)
    }
}

/// Telegram chat kind as reported on inbound updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
    #[serde(other)]
    Other,
}

impl ChatType {
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// Outcome of the should-handle gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Handle,
    Ignore(&'static str),
}

/// Decides whether an authenticated, authorized message deserves a reply.
pub trait HandleGate: Send + Sync {
    fn evaluate(&self, message: &Message, text: &str, bot: &BotProfile) -> GateDecision;

    /// The name of this gate implementation.
    fn name(&self) -> &str;
}

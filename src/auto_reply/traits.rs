use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::memory::MemoryStore;
use crate::routing::ConversationKey;

/// A leading `/command[@target] args` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Lower-cased, with the leading `/`.
    pub name: String,
    /// Addressed bot username, normalized. Empty when not addressed.
    pub target: String,
    pub args: String,
}

/// What a command handler may touch. Commands never reach a provider.
pub struct CommandContext<'a> {
    pub key: &'a ConversationKey,
    pub memory: &'a MemoryStore,
}

#[async_trait]
pub trait SlashCommandHandler: Send + Sync {
    fn command(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, args: &str, context: &CommandContext<'_>) -> Result<String>;
}

//! Reply construction: slash commands, mention cleanup, and delivery retry.

pub mod commands;
pub mod directives;
pub mod dispatcher;
pub mod reply;
pub mod traits;

pub use commands::{ClearCommand, HelpCommand, IdCommand, MemoryCommand, StartCommand};
pub use directives::{parse_command, strip_bot_mentions, truncate};
pub use dispatcher::{CommandDispatcher, UNKNOWN_COMMAND_REPLY};
pub use reply::{deliver_with_retry, Delivered, RetryPolicy};
pub use traits::{CommandContext, ParsedCommand, SlashCommandHandler};

use crate::routing::AgentName;

pub fn create_dispatcher() -> CommandDispatcher {
    CommandDispatcher::with_default_commands()
}

/// System prompt used when the agent has none configured.
pub fn default_system_prompt(agent: &AgentName) -> String {
    format!(
        "You are {agent}, an assistant responding in Telegram. Keep replies concise, useful, and action-oriented."
    )
}

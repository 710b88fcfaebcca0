use anyhow::Result;
use async_trait::async_trait;

use super::directives::truncate;
use super::traits::{CommandContext, SlashCommandHandler};

pub const MEMORY_PREVIEW_CHARS: usize = 240;
pub const CLEARED_REPLY: &str = "Conversation and short memory cleared.";

pub struct StartCommand;

#[async_trait]
impl SlashCommandHandler for StartCommand {
    fn command(&self) -> &str {
        "/start"
    }

    fn description(&self) -> &str {
        "router status"
    }

    async fn execute(&self, _args: &str, context: &CommandContext<'_>) -> Result<String> {
        Ok(format!(
            "Router is online for \"{}\". Use /help for available commands.",
            context.key.agent
        ))
    }
}

/// Lists `(usage, description)` pairs.
pub struct HelpCommand {
    available_commands: Vec<(String, String)>,
}

impl HelpCommand {
    pub fn new(available_commands: Vec<(String, String)>) -> Self {
        Self { available_commands }
    }
}

#[async_trait]
impl SlashCommandHandler for HelpCommand {
    fn command(&self) -> &str {
        "/help"
    }

    fn description(&self) -> &str {
        "this message"
    }

    async fn execute(&self, _args: &str, _context: &CommandContext<'_>) -> Result<String> {
        let mut lines = vec!["Commands:".to_string()];
        for (usage, description) in &self.available_commands {
            lines.push(format!("{usage} - {description}"));
        }
        Ok(lines.join("\n"))
    }
}

pub struct IdCommand;

#[async_trait]
impl SlashCommandHandler for IdCommand {
    fn command(&self) -> &str {
        "/id"
    }

    fn description(&self) -> &str {
        "show your Telegram user/chat IDs"
    }

    async fn execute(&self, _args: &str, context: &CommandContext<'_>) -> Result<String> {
        let key = context.key;
        Ok(format!(
            "user_id={}\nchat_id={}\nagent={}",
            key.user_id, key.chat_id, key.agent
        ))
    }
}

pub struct ClearCommand;

#[async_trait]
impl SlashCommandHandler for ClearCommand {
    fn command(&self) -> &str {
        "/clear"
    }

    fn description(&self) -> &str {
        "clear conversation + short memory"
    }

    async fn execute(&self, _args: &str, context: &CommandContext<'_>) -> Result<String> {
        context.memory.clear(context.key).await;
        Ok(CLEARED_REPLY.to_string())
    }
}

/// `/memory` shows, `/memory clear|reset` clears, `/memory <text>` sets.
pub struct MemoryCommand;

#[async_trait]
impl SlashCommandHandler for MemoryCommand {
    fn command(&self) -> &str {
        "/memory"
    }

    fn description(&self) -> &str {
        "show short memory"
    }

    async fn execute(&self, args: &str, context: &CommandContext<'_>) -> Result<String> {
        let arg = args.trim();

        if arg.is_empty() {
            let current = context.memory.get_short(context.key).await;
            let history = context.memory.get_conversation(context.key, None).await;
            return Ok(if current.is_empty() {
                format!("No short memory set.\nHistory messages: {}", history.len())
            } else {
                format!(
                    "Short memory: \"{}\"\nHistory messages: {}",
                    truncate(&current, MEMORY_PREVIEW_CHARS),
                    history.len()
                )
            });
        }

        if arg == "clear" || arg == "reset" {
            context.memory.clear(context.key).await;
            return Ok(CLEARED_REPLY.to_string());
        }

        let saved = context.memory.set_short(context.key, arg).await;
        Ok(format!(
            "Short memory saved: \"{}\"",
            truncate(&saved, MEMORY_PREVIEW_CHARS)
        ))
    }
}

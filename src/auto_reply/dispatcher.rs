use anyhow::Result;

use super::commands::{ClearCommand, HelpCommand, IdCommand, MemoryCommand, StartCommand};
use super::traits::{CommandContext, ParsedCommand, SlashCommandHandler};

pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command. Use /help for supported commands.";

/// Routes parsed slash commands to their handlers.
pub struct CommandDispatcher {
    commands: Vec<Box<dyn SlashCommandHandler>>,
}

impl CommandDispatcher {
    pub fn new(commands: Vec<Box<dyn SlashCommandHandler>>) -> Self {
        Self { commands }
    }

    /// `/start`, `/help`, `/id`, `/clear` and `/memory`.
    pub fn with_default_commands() -> Self {
        let help = HelpCommand::new(
            [
                ("/start", "router status"),
                ("/help", "this message"),
                ("/id", "show your Telegram user/chat IDs"),
                ("/clear", "clear conversation + short memory"),
                ("/memory", "show short memory"),
                ("/memory <text>", "set short memory"),
            ]
            .into_iter()
            .map(|(usage, description)| (usage.to_string(), description.to_string()))
            .collect(),
        );

        Self::new(vec![
            Box::new(StartCommand),
            Box::new(help),
            Box::new(IdCommand),
            Box::new(ClearCommand),
            Box::new(MemoryCommand),
        ])
    }

    pub fn supports(&self, name: &str) -> bool {
        self.commands.iter().any(|handler| handler.command() == name)
    }

    /// `(command, description)` for every registered handler.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.commands
            .iter()
            .map(|handler| (handler.command(), handler.description()))
            .collect()
    }

    /// Run the matching handler, or answer with the unknown-command reply.
    pub async fn dispatch(
        &self,
        command: &ParsedCommand,
        context: &CommandContext<'_>,
    ) -> Result<String> {
        match self
            .commands
            .iter()
            .find(|handler| handler.command() == command.name)
        {
            Some(handler) => handler.execute(&command.args, context).await,
            None => Ok(UNKNOWN_COMMAND_REPLY.to_string()),
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::with_default_commands()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_reply::directives::parse_command;
    use crate::memory::MemoryStore;
    use crate::routing::{AgentName, ConversationKey};

    fn key() -> ConversationKey {
        ConversationKey::new(AgentName::parse("grok").unwrap(), 5, 6)
    }

    async fn run(text: &str, memory: &MemoryStore) -> String {
        let dispatcher = CommandDispatcher::with_default_commands();
        let key = key();
        let context = CommandContext {
            key: &key,
            memory,
        };
        let command = parse_command(text).unwrap();
        dispatcher.dispatch(&command, &context).await.unwrap()
    }

    #[tokio::test]
    async fn dispatch_help_lists_every_command() {
        let output = run("/help", &MemoryStore::local(20)).await;
        assert_eq!(
            output,
            [
                "Commands:",
                "/start - router status",
                "/help - this message",
                "/id - show your Telegram user/chat IDs",
                "/clear - clear conversation + short memory",
                "/memory - show short memory",
                "/memory <text> - set short memory",
            ]
            .join("\n")
        );
    }

    #[tokio::test]
    async fn dispatch_unknown_command() {
        let output = run("/weather today", &MemoryStore::local(20)).await;
        assert_eq!(output, UNKNOWN_COMMAND_REPLY);
    }

    #[tokio::test]
    async fn dispatch_is_case_insensitive_on_name() {
        let memory = MemoryStore::local(20);
        run("/MEMORY remember this", &memory).await;
        assert_eq!(memory.get_short(&key()).await, "remember this");
    }

    #[test]
    fn default_dispatcher_supports_builtin_commands() {
        let dispatcher = CommandDispatcher::default();
        for name in ["/start", "/help", "/id", "/clear", "/memory"] {
            assert!(dispatcher.supports(name), "{name} should be supported");
        }
        assert!(!dispatcher.supports("/weather"));
        assert_eq!(dispatcher.list().len(), 5);
    }
}

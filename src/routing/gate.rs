//! Group-chat mention gate.

use regex::RegexBuilder;

use super::traits::{ChatType, GateDecision, HandleGate};
use crate::channels::{BotProfile, Message};
use crate::config::normalize_username;

pub const IGNORE_MENTION_REQUIRED: &str = "Mention required in group.";

/// Private chats are always handled. Groups and supergroups are handled
/// for commands, replies to the bot, and messages that mention it.
/// Every other chat type is ignored.
pub struct MentionGate;

impl HandleGate for MentionGate {
    fn evaluate(&self, message: &Message, text: &str, bot: &BotProfile) -> GateDecision {
        let handled = match message.chat_type() {
            ChatType::Private => true,
            kind if kind.is_group() => {
                text.starts_with('/')
                    || is_reply_to_bot(message, bot)
                    || mentions_bot(message, text, &bot.username)
            }
            _ => false,
        };

        if handled {
            GateDecision::Handle
        } else {
            GateDecision::Ignore(IGNORE_MENTION_REQUIRED)
        }
    }

    fn name(&self) -> &str {
        "mention"
    }
}

/// Whether `message` replies to something the bot itself sent.
pub fn is_reply_to_bot(message: &Message, bot: &BotProfile) -> bool {
    let Some(author) = message
        .reply_to_message
        .as_ref()
        .and_then(|original| original.from.as_ref())
    else {
        return false;
    };

    if bot.id.is_some_and(|id| Some(id) == author.id) {
        return true;
    }

    !bot.username.is_empty()
        && author
            .username
            .as_deref()
            .is_some_and(|name| normalize_username(name) == bot.username)
}

/// Textual (`@name`) or structural (entity) mention of `username`.
pub fn mentions_bot(message: &Message, text: &str, username: &str) -> bool {
    let username = normalize_username(username);
    if username.is_empty() {
        return false;
    }

    let pattern = format!(r"(^|\s)@{}(\b|\s|$)", regex::escape(&username));
    let textual = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .is_ok_and(|re| re.is_match(text));
    if textual {
        return true;
    }

    let (source, entities) = message.payload_entities();
    entities.iter().any(|entity| match entity.kind.as_str() {
        "mention" => normalize_username(&entity.slice(source)) == username,
        "text_mention" => entity
            .user
            .as_ref()
            .and_then(|user| user.username.as_deref())
            .is_some_and(|name| normalize_username(name) == username),
        _ => false,
    })
}

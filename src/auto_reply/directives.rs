use super::traits::ParsedCommand;
use crate::config::normalize_username;

/// Parse a leading slash command. Returns `None` unless the trimmed text
/// starts with `/`.
///
/// The command token ends at the first space; an `@` inside it splits the
/// name from the addressed bot (`/help@other_bot`).
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('/')?;

    let (token, args) = match rest.split_once(' ') {
        Some((token, args)) => (token, args.trim()),
        None => (rest, ""),
    };
    let (name, target) = token.split_once('@').unwrap_or((token, ""));

    Some(ParsedCommand {
        name: format!("/{}", name.to_lowercase()),
        target: normalize_username(target),
        args: args.to_string(),
    })
}

/// Remove every `@word` token. Falls back to the trimmed input when nothing
/// would remain.
pub fn strip_bot_mentions(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '@' && chars.peek().is_some_and(|next| is_word_char(*next)) {
            while chars.peek().is_some_and(|next| is_word_char(*next)) {
                chars.next();
            }
            continue;
        }
        stripped.push(c);
    }

    let stripped = stripped.trim();
    if stripped.is_empty() {
        text.trim().to_string()
    } else {
        stripped.to_string()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Trim, then cap at `limit` chars with a trailing `...`.
pub fn truncate(value: &str, limit: usize) -> String {
    let normalized = value.trim();
    if normalized.chars().count() <= limit {
        return normalized.to_string();
    }
    let kept: String = normalized.chars().take(limit.saturating_sub(3)).collect();
    format!("{kept}...")
}

//! `POST {prefix}/{agent}`: authenticate, filter, build a reply, deliver.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::traits::{render, WebhookError, WebhookOutcome};
use super::AppState;
use crate::auto_reply::{
    default_system_prompt, deliver_with_retry, parse_command, strip_bot_mentions, CommandContext,
};
use crate::channels::{BotProfile, Update};
use crate::config::RouteConfig;
use crate::infra::DeadLetter;
use crate::memory::Role;
use crate::providers::ReplyRequest;
use crate::routing::{AgentName, ConversationKey, GateDecision};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub const IGNORE_NO_MESSAGE: &str = "No message payload.";
pub const IGNORE_NO_TEXT: &str = "No text payload.";
pub const IGNORE_NO_PARTICIPANTS: &str = "Missing chat or sender.";
pub const IGNORE_OTHER_BOT: &str = "Command addressed to another bot.";
pub const IGNORE_NO_REPLY: &str = "No reply generated.";

pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(raw_agent): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = uuid::Uuid::new_v4().to_string();
    let result = process(&state, &raw_agent, &headers, &body, &trace_id).await;

    match &result {
        Ok(WebhookOutcome::Ignored(reason)) => {
            tracing::debug!(trace_id = %trace_id, agent = %raw_agent, reason, "webhook ignored");
        }
        Err(WebhookError::Rejected { status, message }) => {
            tracing::info!(trace_id = %trace_id, agent = %raw_agent, status = status.as_u16(), %message, "webhook rejected");
        }
        Err(WebhookError::Failed(err)) => {
            tracing::warn!(trace_id = %trace_id, agent = %raw_agent, error = %err, "webhook failed");
            let letter = DeadLetter::now(
                &trace_id,
                &err.to_string(),
                &state.config.webhook_route_label(),
            );
            state.dead_letters.record(&letter).await;
        }
        Ok(WebhookOutcome::Delivered) => {}
    }

    render(&result, &trace_id)
}

async fn process(
    state: &AppState,
    raw_agent: &str,
    headers: &HeaderMap,
    body: &[u8],
    trace_id: &str,
) -> Result<WebhookOutcome, WebhookError> {
    let config = state.config.as_ref();

    let agent = AgentName::parse(raw_agent)
        .ok_or_else(|| WebhookError::rejected(StatusCode::BAD_REQUEST, "Missing agent in path."))?;

    if config.agent_token(&agent).is_empty() {
        return Err(WebhookError::rejected(
            StatusCode::NOT_FOUND,
            format!("Unknown agent \"{agent}\"."),
        ));
    }

    verify_secret(config, &agent, headers)
        .map_err(|message| WebhookError::rejected(StatusCode::UNAUTHORIZED, message))?;

    let update = parse_update(body)?;
    let Some(message) = update.into_message() else {
        return Ok(WebhookOutcome::Ignored(IGNORE_NO_MESSAGE));
    };
    let Some(text) = message.text_payload() else {
        return Ok(WebhookOutcome::Ignored(IGNORE_NO_TEXT));
    };
    let (Some(chat_id), Some(user_id)) = (
        message.chat.as_ref().and_then(|chat| chat.id),
        message.from.as_ref().and_then(|user| user.id),
    ) else {
        return Ok(WebhookOutcome::Ignored(IGNORE_NO_PARTICIPANTS));
    };

    if !config.is_user_allowed(user_id) {
        return Err(WebhookError::rejected(
            StatusCode::FORBIDDEN,
            format!("User {user_id} is not allowed."),
        ));
    }
    if !config.is_chat_allowed(chat_id) {
        return Err(WebhookError::rejected(
            StatusCode::FORBIDDEN,
            format!("Chat {chat_id} is not allowed."),
        ));
    }

    let bot = resolve_bot_profile(state, &agent).await;

    let command = parse_command(text);
    if let Some(command) = &command {
        if !command.target.is_empty()
            && !bot.username.is_empty()
            && command.target != bot.username
        {
            return Ok(WebhookOutcome::Ignored(IGNORE_OTHER_BOT));
        }
    }

    if let GateDecision::Ignore(reason) = state.gate.evaluate(&message, text, &bot) {
        return Ok(WebhookOutcome::Ignored(reason));
    }

    let key = ConversationKey::new(agent.clone(), chat_id, user_id);
    let reply = match &command {
        Some(command) => {
            let context = CommandContext {
                key: &key,
                memory: state.memory.as_ref(),
            };
            state.commands.dispatch(command, &context).await?
        }
        None => generate(state, &key, text).await,
    };

    if reply.trim().is_empty() {
        return Ok(WebhookOutcome::Ignored(IGNORE_NO_REPLY));
    }

    let delivered = deliver_with_retry(
        state.platform.as_ref(),
        &agent,
        chat_id,
        &reply,
        message.message_id,
        &state.retry,
    )
    .await
    .map_err(anyhow::Error::from)?;

    tracing::info!(
        event = "telegram_router_delivery",
        ok = true,
        trace_id,
        agent = %agent,
        chat_id,
        user_id,
        attempts = delivered.attempts,
        dropped_reply_target = delivered.dropped_reply_target,
        "telegram_router_delivery"
    );

    Ok(WebhookOutcome::Delivered)
}

/// An empty body is treated as an empty update.
fn parse_update(body: &[u8]) -> Result<Update, WebhookError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Update::default());
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|_| WebhookError::rejected(StatusCode::BAD_REQUEST, "Invalid JSON body."))?;
    serde_json::from_value(value)
        .map_err(|_| WebhookError::rejected(StatusCode::BAD_REQUEST, "Malformed update payload."))
}

/// `Err` carries the 401 message.
fn verify_secret(config: &RouteConfig, agent: &AgentName, headers: &HeaderMap) -> Result<(), String> {
    let expected = config.webhook_secret(agent);
    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if expected.is_empty() {
        if config.require_webhook_secret {
            return Err(format!("Missing webhook secret for agent \"{agent}\"."));
        }
        return Ok(());
    }

    if provided.is_empty() || !token_eq(provided, &expected) {
        return Err("Invalid webhook secret header.".to_string());
    }
    Ok(())
}

/// Constant-time comparison; hashing first hides length differences.
fn token_eq(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.as_slice().ct_eq(b.as_slice()).into()
}

/// Identity lookup failures degrade to the configured username.
async fn resolve_bot_profile(state: &AppState, agent: &AgentName) -> BotProfile {
    match state.platform.identity(agent).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(agent = %agent, error = %e, "bot identity lookup failed; using configured username");
            BotProfile {
                id: None,
                username: state.config.bot_username(agent),
            }
        }
    }
}

async fn generate(state: &AppState, key: &ConversationKey, text: &str) -> String {
    let config = state.config.as_ref();
    let agent = &key.agent;
    let clean = strip_bot_mentions(text);
    let model_config = config.agent_model_config(agent);
    let history = state
        .memory
        .get_conversation(key, Some(config.max_conversation_messages))
        .await;

    let request = ReplyRequest {
        agent: agent.clone(),
        user_message: clean.clone(),
        history,
        system_prompt: Some(
            model_config
                .system_prompt
                .clone()
                .unwrap_or_else(|| default_system_prompt(agent)),
        ),
        config: model_config,
    };

    let outcome = state.providers.generate_traced(&request).await;
    tracing::debug!(
        agent = %agent,
        tier = outcome.tier.as_str(),
        provider = %outcome.provider,
        failures = outcome.failures.len(),
        "reply generated"
    );

    let cap = Some(config.max_conversation_messages);
    state
        .memory
        .append_conversation(key, Role::User, &clean, cap)
        .await;
    state
        .memory
        .append_conversation(key, Role::Assistant, &outcome.reply, cap)
        .await;
    state.memory.set_short(key, &clean).await;

    outcome.reply
}

//! Environment-derived route configuration.
//!
//! [`RouteConfig`] is resolved once from a snapshot of key/value pairs and is
//! read-only afterwards. Resolution never fails: malformed numbers fall back
//! to defaults and missing per-agent values resolve to empty strings.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::routing::AgentName;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PATH_PREFIX: &str = "/telegram/webhook";
const DEFAULT_MAX_CONVERSATION_MESSAGES: usize = 20;
pub const MAX_CONVERSATION_MESSAGES_LIMIT: usize = 100;
const DEFAULT_MEMORY_TABLE: &str = "telegram_short_memory";
const DEFAULT_DEAD_LETTER_FILE: &str = "logs/telegram_dead_letters.jsonl";
const DEFAULT_LEGACY_AGENT: &str = "safa";
const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Remote short-memory store connection (Supabase PostgREST).
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    pub url: String,
    pub key: String,
    pub table: String,
    pub timeout: Duration,
}

impl RemoteStoreConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty() && !self.key.is_empty()
    }
}

/// Outbound platform API settings.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub api_base_url: String,
    pub timeout: Duration,
}

/// Delivery retry tuning.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

/// Per-agent model overrides. Unset fields defer to the provider defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentModelConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Process-wide bridge provider credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

/// Resolved, read-only view of the router's environment.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    env: HashMap<String, String>,
    pub port: u16,
    pub host: String,
    pub require_webhook_secret: bool,
    pub webhook_path_prefix: String,
    pub allowed_user_ids: Vec<i64>,
    pub allowed_chat_ids: Vec<i64>,
    pub max_conversation_messages: usize,
    pub remote_store: RemoteStoreConfig,
    pub platform: PlatformConfig,
    pub delivery: DeliveryConfig,
    pub provider_timeout: Duration,
    pub dead_letter_path: PathBuf,
    pub allow_global_token_fallback: bool,
    pub legacy_default_agent: String,
}

impl RouteConfig {
    /// Resolve from the current process environment.
    pub fn from_process_env() -> Self {
        Self::from_env(std::env::vars())
    }

    /// Resolve from an explicit key/value snapshot.
    pub fn from_env<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let lookup = |keys: &[&str]| first_non_empty(&env, keys);

        let port = lookup(&["TELEGRAM_ROUTER_PORT", "PORT"])
            .and_then(|raw| raw.parse::<u16>().ok())
            .filter(|port| *port > 0)
            .unwrap_or(DEFAULT_PORT);

        let max_conversation_messages = lookup(&["TELEGRAM_MAX_CONVERSATION_MESSAGES"])
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .map_or(DEFAULT_MAX_CONVERSATION_MESSAGES, |n| {
                usize::try_from(n)
                    .unwrap_or(MAX_CONVERSATION_MESSAGES_LIMIT)
                    .min(MAX_CONVERSATION_MESSAGES_LIMIT)
            });

        let remote_store = RemoteStoreConfig {
            url: lookup(&["TELEGRAM_SUPABASE_URL", "SUPABASE_URL"])
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            key: lookup(&[
                "TELEGRAM_SUPABASE_KEY",
                "SUPABASE_SERVICE_ROLE_KEY",
                "SUPABASE_ANON_KEY",
                "SUPABASE_KEY",
            ])
            .unwrap_or_default(),
            table: lookup(&["TELEGRAM_MEMORY_TABLE"])
                .unwrap_or_else(|| DEFAULT_MEMORY_TABLE.to_string()),
            timeout: millis_or(&env, "TELEGRAM_SUPABASE_TIMEOUT_MS", 10_000, 1),
        };

        let platform = PlatformConfig {
            api_base_url: lookup(&["TELEGRAM_API_BASE_URL"])
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API.to_string()),
            timeout: millis_or(&env, "TELEGRAM_API_TIMEOUT_MS", 15_000, 1),
        };

        let max_attempts = lookup(&["TELEGRAM_SEND_MAX_ATTEMPTS"])
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(3)
            .max(1);

        let delivery = DeliveryConfig {
            max_attempts,
            base_delay: millis_or(&env, "TELEGRAM_SEND_RETRY_BASE_MS", 300, 100),
        };

        Self {
            port,
            host: lookup(&["TELEGRAM_ROUTER_HOST"]).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            require_webhook_secret: env
                .get("TELEGRAM_REQUIRE_WEBHOOK_SECRET")
                .map_or(true, |raw| raw.trim() != "0"),
            webhook_path_prefix: normalize_path_prefix(
                lookup(&["TELEGRAM_WEBHOOK_PATH_PREFIX"]).as_deref(),
            ),
            allowed_user_ids: parse_id_list(
                env.get("TELEGRAM_ALLOWED_USER_IDS").map_or("", String::as_str),
                false,
            ),
            allowed_chat_ids: parse_id_list(
                env.get("TELEGRAM_ALLOWED_CHAT_IDS").map_or("", String::as_str),
                true,
            ),
            max_conversation_messages,
            remote_store,
            platform,
            delivery,
            provider_timeout: millis_or(&env, "TELEGRAM_PROVIDER_TIMEOUT_MS", 45_000, 1),
            dead_letter_path: lookup(&["TELEGRAM_DEAD_LETTER_FILE"])
                .map_or_else(|| PathBuf::from(DEFAULT_DEAD_LETTER_FILE), PathBuf::from),
            allow_global_token_fallback: env
                .get("TELEGRAM_ALLOW_GLOBAL_TOKEN_FALLBACK")
                .is_some_and(|raw| raw.trim() == "1"),
            legacy_default_agent: lookup(&["TELEGRAM_LEGACY_DEFAULT_AGENT"])
                .and_then(|raw| AgentName::parse(&raw))
                .map_or_else(|| DEFAULT_LEGACY_AGENT.to_string(), |a| a.to_string()),
            env,
        }
    }

    /// First non-empty (trimmed) value among `keys`.
    pub fn lookup(&self, keys: &[&str]) -> Option<String> {
        first_non_empty(&self.env, keys)
    }

    /// Bot token for `agent`, or an empty string when none is configured.
    pub fn agent_token(&self, agent: &AgentName) -> String {
        let key = agent.env_key();
        if let Some(token) = self.lookup(&[
            &format!("TELEGRAM_{key}_BOT_TOKEN"),
            &format!("{key}_BOT_TOKEN"),
            &format!("TELEGRAM_{key}_GAING_BOT_TOKEN"),
            &format!("TELEGRAM_{key}_TOKEN"),
        ]) {
            return token;
        }

        if self.allow_global_token_fallback || agent.as_str() == self.legacy_default_agent {
            return self
                .lookup(&["TELEGRAM_BOT_TOKEN", "GAING_TELEGRAM_BOT_TOKEN"])
                .unwrap_or_default();
        }

        String::new()
    }

    /// Webhook secret for `agent`, or an empty string when none is configured.
    pub fn webhook_secret(&self, agent: &AgentName) -> String {
        let key = agent.env_key();
        self.lookup(&[
            &format!("TELEGRAM_SECRET_{key}"),
            &format!("TELEGRAM_{key}_WEBHOOK_SECRET"),
            &format!("TELEGRAM_{key}_SECRET"),
            "TELEGRAM_WEBHOOK_SECRET",
        ])
        .unwrap_or_default()
    }

    /// Configured bot username without the leading `@`, lower-cased.
    pub fn bot_username(&self, agent: &AgentName) -> String {
        let key = agent.env_key();
        self.lookup(&[
            &format!("TELEGRAM_{key}_BOT_USERNAME"),
            &format!("TELEGRAM_{key}_USERNAME"),
            "TELEGRAM_BOT_USERNAME",
        ])
        .map(|raw| normalize_username(&raw))
        .unwrap_or_default()
    }

    pub fn agent_model_config(&self, agent: &AgentName) -> AgentModelConfig {
        let key = agent.env_key();
        AgentModelConfig {
            api_key: self.lookup(&[&format!("TELEGRAM_{key}_API_KEY"), &format!("{key}_API_KEY")]),
            model: self.lookup(&[&format!("TELEGRAM_{key}_MODEL"), &format!("{key}_MODEL")]),
            base_url: self.lookup(&[
                &format!("TELEGRAM_{key}_BASE_URL"),
                &format!("{key}_BASE_URL"),
            ]),
            system_prompt: self.lookup(&[
                &format!("TELEGRAM_{key}_SYSTEM_PROMPT"),
                "TELEGRAM_SYSTEM_PROMPT",
            ]),
            temperature: self
                .lookup(&[&format!("TELEGRAM_{key}_TEMPERATURE")])
                .and_then(|raw| raw.parse::<f64>().ok())
                .filter(|t| t.is_finite() && (0.0..=2.0).contains(t)),
            max_tokens: self
                .lookup(&[&format!("TELEGRAM_{key}_MAX_TOKENS")])
                .and_then(|raw| raw.parse::<u32>().ok())
                .filter(|n| *n > 0),
        }
    }

    /// Shared bridge credentials (OpenAI).
    pub fn bridge(&self) -> BridgeConfig {
        BridgeConfig {
            api_key: self.lookup(&["OPENAI_API_KEY"]),
            model: self
                .lookup(&["OPENAI_MODEL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: self
                .lookup(&["OPENAI_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        }
    }

    /// Empty allow-list means every user is allowed.
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }

    /// Empty allow-list means every chat is allowed.
    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }

    /// Axum route pattern for the webhook endpoint.
    pub fn webhook_route(&self) -> String {
        format!("{}/{{agent}}", self.webhook_path_prefix)
    }

    /// Route label recorded in dead letters.
    pub fn webhook_route_label(&self) -> String {
        format!("{}/:agent", self.webhook_path_prefix)
    }
}

fn first_non_empty(env: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        env.get(*key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

fn millis_or(env: &HashMap<String, String>, key: &str, default: u64, min: u64) -> Duration {
    let ms = first_non_empty(env, &[key])
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(default)
        .max(min);
    Duration::from_millis(ms)
}

fn normalize_path_prefix(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or(DEFAULT_PATH_PREFIX).trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_PATH_PREFIX.to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Strip a leading `@` and lower-case.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

/// Parse a comma-separated numeric ID list.
///
/// Tokens that are not plain integers (or are negative when `allow_negative`
/// is false) are dropped. Duplicates are removed, first occurrence wins.
pub fn parse_id_list(raw: &str, allow_negative: bool) -> Vec<i64> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|token| is_id_token(token, allow_negative))
        .filter_map(|token| token.parse::<i64>().ok())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn is_id_token(token: &str, allow_negative: bool) -> bool {
    let digits = match token.strip_prefix('-') {
        Some(rest) if allow_negative => rest,
        Some(_) => return false,
        None => token,
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

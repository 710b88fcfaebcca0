//! Provider subsystem for reply generation.
//!
//! Each backend implements the [`Provider`] trait defined in [`traits`] and is
//! constructed by [`create_provider`] from its canonical name. The
//! [`ProviderRegistry`] maps agent names onto providers and owns the fallback
//! chain (primary, then the shared bridge, then the local apology).
//!
//! # Extension
//!
//! To add a provider, implement [`Provider`] in a new submodule, add it to
//! [`list_providers`], and construct it in [`create_provider`].

pub mod anthropic;
pub mod compatible;
pub mod gemini;
pub mod local_safe;
pub mod registry;
pub mod traits;

pub use traits::{ChatMessage, ChatRole, Provider, ProviderError, ReplyRequest};
pub use local_safe::LocalSafeProvider;
pub use registry::{ProviderRegistry, ReplyOutcome, ReplyTier};

use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;

use crate::config::{AgentModelConfig, RouteConfig};

const MAX_API_ERROR_CHARS: usize = 400;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts tokens with prefixes like `sk-`, `sk-ant-`, `xai-`, `AIza`, and
/// `ghp_`.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 5] = ["sk-", "xai-", "pplx-", "AIza", "ghp_"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Best-effort detail for a failed call: `error.message`, then `message`,
/// then the raw body (first 400 chars), then the status reason.
pub fn error_detail(json: Option<&Value>, raw: &str, status: StatusCode) -> String {
    let from_json = json.and_then(|body| {
        body.pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| body.get("message").and_then(Value::as_str))
            .filter(|message| !message.trim().is_empty())
    });

    let detail = match from_json {
        Some(message) => message.to_string(),
        None if !raw.trim().is_empty() => raw.chars().take(MAX_API_ERROR_CHARS).collect(),
        None => status.canonical_reason().unwrap_or("Unknown Status").to_string(),
    };

    sanitize_api_error(&detail)
}

fn transport_error(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        ProviderError::Transport {
            provider: provider.to_string(),
            // Some endpoints carry the API key in the query string.
            detail: sanitize_api_error(&err.without_url().to_string()),
        }
    }
}

/// Send a JSON POST and return the parsed response body.
pub(crate) async fn post_json(provider: &str, request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    let raw = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;
    let json: Option<Value> = serde_json::from_str(&raw).ok();

    if !status.is_success() {
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: status.as_u16(),
            detail: error_detail(json.as_ref(), &raw, status),
        });
    }

    json.ok_or_else(|| ProviderError::InvalidResponse {
        provider: provider.to_string(),
        detail: "expected a JSON body".to_string(),
    })
}

/// Normalize a request into `[system?, ...history, user?]`.
///
/// The system prompt comes from the request context, falling back to the
/// agent config. Blank history turns and a blank user message are dropped.
pub fn build_messages(request: &ReplyRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);

    let system = [
        request.system_prompt.as_deref(),
        request.config.system_prompt.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|prompt| !prompt.is_empty());
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }

    messages.extend(request.history.iter().filter_map(|entry| {
        let content = entry.content.trim();
        (!content.is_empty()).then(|| ChatMessage {
            role: entry.role.into(),
            content: content.to_string(),
        })
    }));

    let prompt = request.user_message.trim();
    if !prompt.is_empty() {
        messages.push(ChatMessage::user(prompt));
    }

    messages
}

/// Provider-level defaults resolved from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefaults {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl ProviderDefaults {
    pub fn from_env(
        config: &RouteConfig,
        key_vars: &[&str],
        model_var: &str,
        default_model: &str,
        base_url_var: Option<&str>,
        default_base_url: &str,
    ) -> Self {
        Self {
            api_key: config.lookup(key_vars),
            model: config
                .lookup(&[model_var])
                .unwrap_or_else(|| default_model.to_string()),
            base_url: base_url_var
                .and_then(|var| config.lookup(&[var]))
                .unwrap_or_else(|| default_base_url.to_string()),
        }
    }

    /// Apply per-agent overrides for one call.
    pub(crate) fn resolve(
        &self,
        provider: &str,
        overrides: &AgentModelConfig,
    ) -> Result<CallSettings, ProviderError> {
        let api_key = overrides
            .api_key
            .clone()
            .or_else(|| self.api_key.clone())
            .ok_or_else(|| ProviderError::MissingApiKey {
                provider: provider.to_string(),
            })?;

        Ok(CallSettings {
            api_key,
            model: overrides.model.clone().unwrap_or_else(|| self.model.clone()),
            base_url: overrides
                .base_url
                .as_deref()
                .unwrap_or(&self.base_url)
                .trim_end_matches('/')
                .to_string(),
            temperature: overrides.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: overrides.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }
}

/// Effective settings for a single provider call.
#[derive(Debug, Clone)]
pub(crate) struct CallSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name, also the agent name that routes to it (e.g. `"claude"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Other agent names routed to the same provider
    pub aliases: &'static [&'static str],
    /// Environment variables holding the provider's API key, in lookup order
    pub key_env: &'static [&'static str],
}

/// Return the list of all known providers for display in `agent-router providers`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
            aliases: &["codex", "grav"],
            key_env: &["OPENAI_API_KEY"],
        },
        ProviderInfo {
            name: "claude",
            display_name: "Claude",
            aliases: &["anthropic"],
            key_env: &["ANTHROPIC_API_KEY"],
        },
        ProviderInfo {
            name: "gemini",
            display_name: "Gemini",
            aliases: &[],
            key_env: &["GEMINI_API_KEY"],
        },
        ProviderInfo {
            name: "grok",
            display_name: "Grok",
            aliases: &[],
            key_env: &["GROK_API_KEY"],
        },
        ProviderInfo {
            name: "perplexity",
            display_name: "Perplexity",
            aliases: &[],
            key_env: &["PERPLEXITY_API_KEY"],
        },
        ProviderInfo {
            name: "deepseek",
            display_name: "DeepSeek",
            aliases: &[],
            key_env: &["DEEPSEEK_API_KEY"],
        },
        ProviderInfo {
            name: "kimi",
            display_name: "Kimi",
            aliases: &[],
            key_env: &["KIMI_API_KEY", "MOONSHOT_API_KEY"],
        },
    ]
}

/// Canonical provider name for an agent name or alias.
pub fn canonical_provider_name(name: &str) -> Option<&'static str> {
    let name = name.trim().to_ascii_lowercase();
    list_providers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name.as_str()))
        .map(|p| p.name)
}

/// Factory: create the provider registered under `name` (or one of its aliases).
pub fn create_provider(name: &str, config: &RouteConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let timeout = config.provider_timeout;
    let provider: Arc<dyn Provider> = match canonical_provider_name(name) {
        Some("openai") => Arc::new(compatible::OpenAiCompatibleProvider::openai(config)),
        Some("claude") => Arc::new(anthropic::AnthropicProvider::new(
            anthropic::AnthropicProvider::defaults(config),
            timeout,
        )),
        Some("gemini") => Arc::new(gemini::GeminiProvider::new(
            gemini::GeminiProvider::defaults(config),
            timeout,
        )),
        Some("grok") => Arc::new(compatible::OpenAiCompatibleProvider::grok(config)),
        Some("perplexity") => Arc::new(compatible::OpenAiCompatibleProvider::perplexity(config)),
        Some("deepseek") => Arc::new(compatible::OpenAiCompatibleProvider::deepseek(config)),
        Some("kimi") => Arc::new(compatible::OpenAiCompatibleProvider::kimi(config)),
        _ => anyhow::bail!("Unknown provider: {name}. Run `agent-router providers` for the list."),
    };
    Ok(provider)
}

/// Factory: the registry every webhook request generates replies through.
///
/// Every catalogue provider is registered under its name and aliases, unknown
/// agents use OpenAI, and the OpenAI bridge is attached when `OPENAI_API_KEY`
/// is set.
pub fn create_registry(config: &RouteConfig) -> anyhow::Result<ProviderRegistry> {
    let default = create_provider("openai", config)?;
    let mut registry = ProviderRegistry::new(Arc::clone(&default));

    for info in list_providers() {
        let provider = if info.name == "openai" {
            Arc::clone(&default)
        } else {
            create_provider(info.name, config)?
        };
        registry.register(info.name, Arc::clone(&provider));
        for alias in info.aliases {
            registry.register(alias, Arc::clone(&provider));
        }
    }

    let bridge = config.bridge();
    if bridge.api_key.is_some() {
        registry = registry.with_bridge(default, bridge);
    }

    Ok(registry)
}

//! Generic OpenAI-compatible provider.
//! OpenAI, Grok, Perplexity, DeepSeek and Kimi all accept the same
//! `/chat/completions` payload; each is a preset over this one adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::traits::{ChatMessage, Provider, ProviderError, ReplyRequest};
use super::{build_messages, post_json, ProviderDefaults};
use crate::config::RouteConfig;

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) defaults: ProviderDefaults,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, defaults: ProviderDefaults, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            defaults,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn openai(config: &RouteConfig) -> Self {
        let defaults = ProviderDefaults::from_env(
            config,
            &["OPENAI_API_KEY"],
            "OPENAI_MODEL",
            "gpt-4o-mini",
            Some("OPENAI_BASE_URL"),
            "https://api.openai.com/v1",
        );
        Self::new("OpenAI", defaults, config.provider_timeout)
    }

    pub fn grok(config: &RouteConfig) -> Self {
        let defaults = ProviderDefaults::from_env(
            config,
            &["GROK_API_KEY"],
            "GROK_MODEL",
            "grok-beta",
            None,
            "https://api.x.ai/v1",
        );
        Self::new("Grok", defaults, config.provider_timeout)
    }

    pub fn perplexity(config: &RouteConfig) -> Self {
        let defaults = ProviderDefaults::from_env(
            config,
            &["PERPLEXITY_API_KEY"],
            "PERPLEXITY_MODEL",
            "sonar-pro",
            None,
            "https://api.perplexity.ai",
        );
        Self::new("Perplexity", defaults, config.provider_timeout)
    }

    pub fn deepseek(config: &RouteConfig) -> Self {
        let defaults = ProviderDefaults::from_env(
            config,
            &["DEEPSEEK_API_KEY"],
            "DEEPSEEK_MODEL",
            "deepseek-chat",
            Some("DEEPSEEK_BASE_URL"),
            "https://api.deepseek.com/v1",
        );
        Self::new("DeepSeek", defaults, config.provider_timeout)
    }

    pub fn kimi(config: &RouteConfig) -> Self {
        let defaults = ProviderDefaults::from_env(
            config,
            &["KIMI_API_KEY", "MOONSHOT_API_KEY"],
            "KIMI_MODEL",
            "moonshot-v1-8k",
            Some("KIMI_BASE_URL"),
            "https://api.moonshot.cn/v1",
        );
        Self::new("Kimi", defaults, config.provider_timeout)
    }
}

/// Build the full URL for chat completions, detecting if `base_url` already
/// includes the path.
pub(crate) fn chat_completions_url(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let has_full_endpoint = reqwest::Url::parse(base_url)
        .map(|url| {
            url.path()
                .trim_end_matches('/')
                .ends_with("/chat/completions")
        })
        .unwrap_or_else(|_| base_url.ends_with("/chat/completions"));

    if has_full_endpoint {
        base_url.to_string()
    } else {
        format!("{base_url}/chat/completions")
    }
}

/// Reply text from `choices[0].message.content`: a string, or an array of
/// parts (strings or `{text}` objects) joined with spaces.
pub(crate) fn extract_openai_content(json: &Value) -> String {
    match json.pointer("/choices/0/message/content") {
        Some(Value::String(content)) => content.trim().to_string(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| match part {
                Value::String(text) => text.as_str(),
                other => other.get("text").and_then(Value::as_str).unwrap_or(""),
            })
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ProviderError> {
        let settings = self.defaults.resolve(&self.name, &request.config)?;

        let messages = build_messages(request);
        if messages.is_empty() {
            return Err(ProviderError::NoMessages {
                provider: self.name.clone(),
            });
        }

        let body = ChatRequest {
            model: &settings.model,
            messages: &messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };

        let json = post_json(
            &self.name,
            self.client
                .post(chat_completions_url(&settings.base_url))
                .bearer_auth(&settings.api_key)
                .json(&body),
        )
        .await?;

        let reply = extract_openai_content(&json);
        if reply.is_empty() {
            return Err(ProviderError::EmptyReply {
                provider: self.name.clone(),
            });
        }
        Ok(reply)
    }
}

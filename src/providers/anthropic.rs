use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::traits::{ChatRole, Provider, ProviderError, ReplyRequest};
use super::{build_messages, post_json, ProviderDefaults};
use crate::config::RouteConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    defaults: ProviderDefaults,
    client: Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: ChatRole,
    content: &'a str,
}

impl AnthropicProvider {
    pub fn new(defaults: ProviderDefaults, timeout: Duration) -> Self {
        Self {
            defaults,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn defaults(config: &RouteConfig) -> ProviderDefaults {
        ProviderDefaults::from_env(
            config,
            &["ANTHROPIC_API_KEY"],
            "ANTHROPIC_MODEL",
            "claude-3-5-sonnet-20241022",
            Some("ANTHROPIC_BASE_URL"),
            "https://api.anthropic.com",
        )
    }
}

fn messages_url(base_url: &str) -> String {
    if base_url.ends_with("/v1/messages") {
        base_url.to_string()
    } else if base_url.ends_with("/v1") {
        format!("{base_url}/messages")
    } else {
        format!("{base_url}/v1/messages")
    }
}

/// Text blocks of a Messages API response joined with newlines.
fn extract_text(json: &Value) -> String {
    json.get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "Claude"
    }

    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ProviderError> {
        let settings = self.defaults.resolve(self.name(), &request.config)?;
        let normalized = build_messages(request);

        let mut system = None;
        let mut messages = Vec::with_capacity(normalized.len());
        for message in &normalized {
            if message.role == ChatRole::System {
                system = Some(message.content.as_str());
            } else {
                messages.push(Message {
                    role: message.role,
                    content: &message.content,
                });
            }
        }

        if messages.is_empty() {
            return Err(ProviderError::NoMessages {
                provider: self.name().to_string(),
            });
        }

        let body = MessagesRequest {
            model: &settings.model,
            messages,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            system,
        };

        let json = post_json(
            self.name(),
            self.client
                .post(messages_url(&settings.base_url))
                .header("x-api-key", &settings.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        let reply = extract_text(&json);
        if reply.is_empty() {
            return Err(ProviderError::EmptyReply {
                provider: self.name().to_string(),
            });
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentModelConfig;
    use crate::routing::AgentName;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn provider(base_url: &str, key: Option<&str>) -> AnthropicProvider {
        AnthropicProvider::new(
            ProviderDefaults {
                api_key: key.map(str::to_string),
                model: "claude-test".into(),
                base_url: base_url.into(),
            },
            Duration::from_secs(5),
        )
    }

    fn request(user: &str, system: Option<&str>) -> ReplyRequest {
        ReplyRequest {
            agent: AgentName::parse("claude").unwrap(),
            user_message: user.into(),
            history: Vec::new(),
            system_prompt: system.map(str::to_string),
            config: AgentModelConfig::default(),
        }
    }

    async fn spawn_mock(
        status: StatusCode,
        response: Value,
    ) -> (String, Arc<Mutex<Option<(HeaderMap, Value)>>>) {
        let captured = Arc::new(Mutex::new(None));
        let state = Arc::clone(&captured);
        let app = Router::new().route(
            "/v1/messages",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let state = Arc::clone(&state);
                let response = response.clone();
                async move {
                    *state.lock() = Some((headers, body));
                    (status, Json(response))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    #[test]
    fn messages_url_variants() {
        assert_eq!(
            messages_url("https://api.anthropic.com"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            messages_url("https://proxy.example.com/v1"),
            "https://proxy.example.com/v1/messages"
        );
        assert_eq!(
            messages_url("https://proxy.example.com/v1/messages"),
            "https://proxy.example.com/v1/messages"
        );
    }

    #[tokio::test]
    async fn fails_without_key() {
        let err = provider("https://api.anthropic.com", None)
            .generate_reply(&request("hi", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Claude: missing API key");
    }

    #[tokio::test]
    async fn system_only_request_has_no_messages() {
        let err = provider("https://api.anthropic.com", Some("k"))
            .generate_reply(&request("  ", Some("be kind")))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Claude: no user or assistant messages to send"
        );
    }

    #[tokio::test]
    async fn sends_system_separately_and_joins_text_blocks() {
        let (base, captured) = spawn_mock(
            StatusCode::OK,
            json!({"content": [
                {"type": "text", "text": "line one"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "line two"}
            ]}),
        )
        .await;
        let reply = provider(&base, Some("ant-key"))
            .generate_reply(&request("hello", Some("be kind")))
            .await
            .unwrap();
        assert_eq!(reply, "line one\nline two");

        let (headers, body) = captured.lock().clone().unwrap();
        assert_eq!(headers["x-api-key"], "ant-key");
        assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
        assert_eq!(body["system"], "be kind");
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hello"}]));
    }

    #[tokio::test]
    async fn omits_system_when_absent() {
        let (base, captured) =
            spawn_mock(StatusCode::OK, json!({"content": [{"type": "text", "text": "ok"}]})).await;
        provider(&base, Some("k"))
            .generate_reply(&request("hello", None))
            .await
            .unwrap();
        let (_, body) = captured.lock().clone().unwrap();
        assert!(body.get("system").is_none());
    }

    #[tokio::test]
    async fn overloaded_maps_to_http_error() {
        let (base, _) = spawn_mock(
            StatusCode::from_u16(529).unwrap(),
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        )
        .await;
        let err = provider(&base, Some("k"))
            .generate_reply(&request("hello", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Claude: HTTP 529: Overloaded");
    }
}

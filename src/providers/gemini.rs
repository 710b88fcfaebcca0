//! Google Gemini `generateContent` adapter.
//!
//! The API key travels in the `key` query parameter, so transport errors are
//! stripped of their URL before they are reported.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::traits::{ChatRole, Provider, ProviderError, ReplyRequest};
use super::{build_messages, post_json, ProviderDefaults};
use crate::config::RouteConfig;

pub struct GeminiProvider {
    defaults: ProviderDefaults,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

impl GeminiProvider {
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
            &["GEMINI_API_KEY"],
            "GEMINI_MODEL",
            "gemini-2.0-flash",
            Some("GEMINI_BASE_URL"),
            "https://generativelanguage.googleapis.com",
        )
    }
}

fn extract_text(json: &Value) -> String {
    json.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|part| part.get("text").and_then(Value::as_str).unwrap_or(""))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ProviderError> {
        let settings = self.defaults.resolve(self.name(), &request.config)?;
        let normalized = build_messages(request);

        let mut system_instruction = None;
        let mut contents = Vec::with_capacity(normalized.len());
        for message in &normalized {
            let part = [Part {
                text: &message.content,
            }];
            match message.role {
                ChatRole::System => {
                    system_instruction = Some(Content {
                        role: None,
                        parts: part,
                    });
                }
                ChatRole::Assistant => contents.push(Content {
                    role: Some("model"),
                    parts: part,
                }),
                ChatRole::User => contents.push(Content {
                    role: Some("user"),
                    parts: part,
                }),
            }
        }

        if contents.is_empty() {
            return Err(ProviderError::NoMessages {
                provider: self.name().to_string(),
            });
        }

        let body = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_tokens,
            },
            system_instruction,
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            settings.base_url, settings.model
        );
        let json = post_json(
            self.name(),
            self.client
                .post(url)
                .query(&[("key", settings.api_key.as_str())])
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
    use crate::memory::{HistoryEntry, Role};
    use crate::routing::AgentName;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    type Seen = Arc<Mutex<Option<(String, HashMap<String, String>, Value)>>>;

    async fn spawn_mock(status: StatusCode, response: Value) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(None));
        let state = Arc::clone(&seen);
        let app = Router::new().route(
            "/v1beta/models/{call}",
            post(
                move |Path(call): Path<String>,
                      Query(query): Query<HashMap<String, String>>,
                      Json(body): Json<Value>| {
                    let state = Arc::clone(&state);
                    let response = response.clone();
                    async move {
                        *state.lock() = Some((call, query, body));
                        (status, Json(response))
                    }
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn provider(base_url: &str) -> GeminiProvider {
        GeminiProvider::new(
            ProviderDefaults {
                api_key: Some("AIza-test".into()),
                model: "gemini-test".into(),
                base_url: base_url.into(),
            },
            Duration::from_secs(5),
        )
    }

    fn request() -> ReplyRequest {
        ReplyRequest {
            agent: AgentName::parse("gemini").unwrap(),
            user_message: "and you?".into(),
            history: vec![
                HistoryEntry::new(Role::User, "hi"),
                HistoryEntry::new(Role::Assistant, "hello"),
            ],
            system_prompt: Some("be kind".into()),
            config: AgentModelConfig::default(),
        }
    }

    #[tokio::test]
    async fn maps_roles_and_system_instruction() {
        let (base, seen) = spawn_mock(
            StatusCode::OK,
            json!({"candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]}),
        )
        .await;
        let reply = provider(&base).generate_reply(&request()).await.unwrap();
        assert_eq!(reply, "a\nb");

        let (call, query, body) = seen.lock().clone().unwrap();
        assert_eq!(call, "gemini-test:generateContent");
        assert_eq!(query["key"], "AIza-test");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be kind");
        assert!(body["systemInstruction"].get("role").is_none());
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["user", "model", "user"]);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2000);
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
    }

    #[tokio::test]
    async fn no_candidates_is_an_empty_reply() {
        let (base, _) = spawn_mock(StatusCode::OK, json!({"candidates": []})).await;
        let err = provider(&base).generate_reply(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Gemini: empty reply");
    }

    #[tokio::test]
    async fn http_errors_do_not_leak_the_key() {
        let (base, _) = spawn_mock(
            StatusCode::BAD_REQUEST,
            json!({"error": {"message": "API key not valid: AIza-test"}}),
        )
        .await;
        let err = provider(&base).generate_reply(&request()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("Gemini: HTTP 400: "));
        assert!(!text.contains("AIza-test"));
    }

    #[tokio::test]
    async fn missing_key_fails_fast() {
        let p = GeminiProvider::new(
            ProviderDefaults {
                api_key: None,
                model: "m".into(),
                base_url: "http://127.0.0.1:9".into(),
            },
            Duration::from_secs(1),
        );
        let err = p.generate_reply(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey { .. }));
    }
}

//! Telegram Bot API client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use super::traits::{BotProfile, PlatformApi, PlatformError, SendOptions};
use crate::config::{normalize_username, RouteConfig};
use crate::routing::AgentName;

pub struct TelegramClient {
    config: Arc<RouteConfig>,
    api_base: String,
    client: Client,
    identities: Mutex<HashMap<AgentName, Arc<OnceCell<BotProfile>>>>,
}

impl TelegramClient {
    pub fn new(config: Arc<RouteConfig>) -> Self {
        let api_base = config.platform.api_base_url.clone();
        let client = Client::builder()
            .timeout(config.platform.timeout)
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            config,
            api_base,
            client,
            identities: Mutex::new(HashMap::new()),
        }
    }

    fn token_for(&self, agent: &AgentName) -> Result<String, PlatformError> {
        let token = self.config.agent_token(agent);
        if token.is_empty() {
            return Err(PlatformError::MissingToken {
                agent: agent.to_string(),
            });
        }
        Ok(token)
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{token}/{method}", self.api_base)
    }

    /// POST `body` to `method` and return the `result` field.
    async fn call(&self, token: &str, method: &str, body: &Value) -> Result<Value, PlatformError> {
        let response = self
            .client
            .post(self.method_url(token, method))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(method, e))?;

        let payload: Value =
            serde_json::from_str(&text).map_err(|_| PlatformError::InvalidResponse {
                method: method.to_string(),
            })?;

        if !status.is_success() || payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let detail = payload
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("status {}", status.as_u16()));
            return Err(PlatformError::Api {
                method: method.to_string(),
                detail,
            });
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn fetch_identity(&self, agent: &AgentName) -> Result<BotProfile, PlatformError> {
        let token = self.token_for(agent)?;
        let result = self.call(&token, "getMe", &json!({})).await?;
        let username = result
            .get("username")
            .and_then(Value::as_str)
            .map(normalize_username)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.bot_username(agent));
        Ok(BotProfile {
            id: result.get("id").and_then(Value::as_i64),
            username,
        })
    }
}

fn transport_error(method: &str, err: reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout {
            method: method.to_string(),
        }
    } else {
        // The URL embeds the bot token.
        PlatformError::Transport {
            method: method.to_string(),
            detail: err.without_url().to_string(),
        }
    }
}

#[async_trait]
impl PlatformApi for TelegramClient {
    async fn deliver(
        &self,
        agent: &AgentName,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), PlatformError> {
        let token = self.token_for(agent)?;
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(reply_to) = options.reply_to_message_id {
            body["reply_to_message_id"] = json!(reply_to);
        }
        self.call(&token, "sendMessage", &body).await?;
        Ok(())
    }

    async fn identity(&self, agent: &AgentName) -> Result<BotProfile, PlatformError> {
        let cell = {
            let mut identities = self.identities.lock();
            Arc::clone(identities.entry(agent.clone()).or_default())
        };
        cell.get_or_try_init(|| self.fetch_identity(agent))
            .await
            .cloned()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

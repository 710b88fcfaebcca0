//! Supabase (PostgREST) backing for short memory.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use super::traits::RemoteMemory;
use crate::config::RemoteStoreConfig;
use crate::routing::ConversationKey;

pub struct SupabaseMemory {
    base_url: String,
    key: String,
    table: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct MemoryRow {
    #[serde(default)]
    memory: Option<String>,
}

impl SupabaseMemory {
    pub fn new(config: &RemoteStoreConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            table: config.table.clone(),
            client: Client::builder()
                .timeout(config.timeout)
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
    }

    fn key_filters(key: &ConversationKey) -> [(&'static str, String); 3] {
        [
            ("agent", format!("eq.{}", key.agent)),
            ("chat_id", format!("eq.{}", key.chat_id)),
            ("user_id", format!("eq.{}", key.user_id)),
        ]
    }
}

#[async_trait]
impl RemoteMemory for SupabaseMemory {
    async fn fetch(&self, key: &ConversationKey) -> Result<Option<String>> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[("select", "memory")])
            .query(&Self::key_filters(key))
            .query(&[("limit", "1")])
            .send()
            .await
            .context("Supabase read request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Supabase read failed with status {}", status.as_u16());
        }

        let rows: Vec<MemoryRow> = response
            .json()
            .await
            .context("Supabase read returned an unexpected body")?;
        Ok(rows.into_iter().next().and_then(|row| row.memory))
    }

    async fn upsert(&self, key: &ConversationKey, memory: &str) -> Result<()> {
        let payload = json!([{
            "agent": key.agent.as_str(),
            "chat_id": key.chat_id,
            "user_id": key.user_id,
            "memory": memory,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        }]);

        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&payload)
            .send()
            .await
            .context("Supabase upsert request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Supabase upsert failed with status {}", status.as_u16());
        }
        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.table_url()))
            .query(&Self::key_filters(key))
            .send()
            .await
            .context("Supabase delete request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Supabase delete failed with status {}", status.as_u16());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "supabase"
    }
}

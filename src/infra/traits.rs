use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One failed webhook, as persisted for offline inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub trace_id: String,
    pub error: String,
    /// RFC 3339 timestamp.
    pub ts: String,
    pub route: String,
}

impl DeadLetter {
    pub fn now(trace_id: &str, error: &str, route: &str) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            error: error.to_string(),
            ts: chrono::Utc::now().to_rfc3339(),
            route: route.to_string(),
        }
    }
}

/// Append-only failure log. Writes are best-effort and never fail the caller.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: &DeadLetter);
    fn name(&self) -> &str;
}

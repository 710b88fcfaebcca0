use async_trait::async_trait;

use super::traits::{Provider, ProviderError, ReplyRequest};
use crate::routing::AgentName;

/// Terminal fallback. Never fails and makes no network calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSafeProvider;

impl LocalSafeProvider {
    pub fn apology(agent: &AgentName) -> String {
        format!("I could not reach {agent} right now. Please try again in a moment.")
    }
}

#[async_trait]
impl Provider for LocalSafeProvider {
    fn name(&self) -> &str {
        "local-safe"
    }

    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ProviderError> {
        Ok(Self::apology(&request.agent))
    }
}

//! Agent-to-provider routing with an ordered fallback chain.
//!
//! A reply is attempted against each candidate in order: the agent's primary
//! provider, then the shared bridge (when configured and distinct from the
//! primary). When every candidate fails the local apology is returned, so
//! [`ProviderRegistry::generate_reply`] always yields a non-empty string.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use super::local_safe::LocalSafeProvider;
use super::traits::{Provider, ReplyRequest};
use crate::config::BridgeConfig;
use crate::routing::AgentName;

/// Prefix marking replies produced by the bridge.
pub const BRIDGE_PREFIX: &str = "(Cloud Bridge) ";

/// Which link of the chain produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTier {
    Primary,
    Bridge,
    Terminal,
}

impl ReplyTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Bridge => "bridge",
            Self::Terminal => "terminal",
        }
    }
}

/// A generated reply plus how it was obtained.
#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    pub reply: String,
    pub tier: ReplyTier,
    pub provider: String,
    /// Errors from candidates tried before the one that answered.
    pub failures: Vec<String>,
}

struct Candidate<'a> {
    tier: ReplyTier,
    provider: &'a dyn Provider,
    request: Cow<'a, ReplyRequest>,
}

pub struct ProviderRegistry {
    routes: HashMap<String, Arc<dyn Provider>>,
    default: Arc<dyn Provider>,
    bridge: Option<(Arc<dyn Provider>, BridgeConfig)>,
    terminal: LocalSafeProvider,
}

impl ProviderRegistry {
    /// `default` serves agents without a registered route.
    pub fn new(default: Arc<dyn Provider>) -> Self {
        Self {
            routes: HashMap::new(),
            default,
            bridge: None,
            terminal: LocalSafeProvider,
        }
    }

    /// Route agent `name` to `provider`. Re-registering a name replaces it.
    pub fn register(&mut self, name: &str, provider: Arc<dyn Provider>) {
        self.routes.insert(name.trim().to_ascii_lowercase(), provider);
    }

    /// Attach the process-wide bridge. `config` replaces the request's
    /// credentials, model, and base URL when the bridge is tried.
    #[must_use]
    pub fn with_bridge(mut self, provider: Arc<dyn Provider>, config: BridgeConfig) -> Self {
        self.bridge = Some((provider, config));
        self
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge.is_some()
    }

    /// Registered agent names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Primary provider for `agent`.
    pub fn resolve(&self, agent: &AgentName) -> &Arc<dyn Provider> {
        self.routes.get(agent.as_str()).unwrap_or(&self.default)
    }

    fn candidates<'a>(&'a self, request: &'a ReplyRequest) -> Vec<Candidate<'a>> {
        let primary = self.resolve(&request.agent);
        let mut candidates = vec![Candidate {
            tier: ReplyTier::Primary,
            provider: primary.as_ref(),
            request: Cow::Borrowed(request),
        }];

        if let Some((bridge, config)) = &self.bridge {
            if bridge.name() != primary.name() {
                let mut bridged = request.clone();
                bridged.config.api_key.clone_from(&config.api_key);
                bridged.config.model = Some(config.model.clone());
                bridged.config.base_url = Some(config.base_url.clone());
                candidates.push(Candidate {
                    tier: ReplyTier::Bridge,
                    provider: bridge.as_ref(),
                    request: Cow::Owned(bridged),
                });
            }
        }

        candidates
    }

    /// Generate a reply. Never fails.
    pub async fn generate_reply(&self, request: &ReplyRequest) -> String {
        self.generate_traced(request).await.reply
    }

    /// Generate a reply and report which tier answered.
    pub async fn generate_traced(&self, request: &ReplyRequest) -> ReplyOutcome {
        let mut failures = Vec::new();

        for candidate in self.candidates(request) {
            match candidate.provider.generate_reply(&candidate.request).await {
                Ok(reply) if !reply.trim().is_empty() => {
                    let reply = reply.trim();
                    let reply = match candidate.tier {
                        ReplyTier::Bridge => format!("{BRIDGE_PREFIX}{reply}"),
                        _ => reply.to_string(),
                    };
                    return ReplyOutcome {
                        reply,
                        tier: candidate.tier,
                        provider: candidate.provider.name().to_string(),
                        failures,
                    };
                }
                Ok(_) => {
                    let error = format!("{}: empty reply", candidate.provider.name());
                    tracing::warn!(agent = %request.agent, tier = candidate.tier.as_str(), %error, "provider failed");
                    failures.push(error);
                }
                Err(e) => {
                    tracing::warn!(agent = %request.agent, tier = candidate.tier.as_str(), error = %e, "provider failed");
                    failures.push(e.to_string());
                }
            }
        }

        ReplyOutcome {
            reply: LocalSafeProvider::apology(&request.agent),
            tier: ReplyTier::Terminal,
            provider: self.terminal.name().to_string(),
            failures,
        }
    }
}

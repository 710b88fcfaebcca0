//! Reply delivery with bounded retry.

use std::time::Duration;

use rand::Rng;

use crate::channels::{PlatformApi, PlatformError, SendOptions};
use crate::config::DeliveryConfig;
use crate::routing::AgentName;

const DEFAULT_JITTER: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random delay added to each backoff.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            jitter: DEFAULT_JITTER,
        }
    }

    /// Wait after failed attempt `attempt` (1-based): linear in the attempt
    /// number plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.base_delay.saturating_mul(attempt) + jitter
    }
}

/// A successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    /// Attempts counted against the policy.
    pub attempts: u32,
    /// Whether the reply target was dropped because the platform no longer
    /// had the original message.
    pub dropped_reply_target: bool,
}

/// Send `text`, threading it under `reply_to` when given.
///
/// If the platform reports the reply target missing, the target is dropped
/// and the send is repeated at once without counting an attempt; this
/// happens at most once. Other failures back off and retry up to the
/// policy limit, except configuration errors, which fail immediately. No
/// sleep follows the final attempt.
pub async fn deliver_with_retry(
    platform: &dyn PlatformApi,
    agent: &AgentName,
    chat_id: i64,
    text: &str,
    reply_to: Option<i64>,
    policy: &RetryPolicy,
) -> Result<Delivered, PlatformError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut options = SendOptions {
        reply_to_message_id: reply_to,
    };
    let mut dropped_reply_target = false;
    let mut attempt = 1;

    loop {
        match platform.deliver(agent, chat_id, text, &options).await {
            Ok(()) => {
                return Ok(Delivered {
                    attempts: attempt,
                    dropped_reply_target,
                })
            }
            Err(e) if options.reply_to_message_id.is_some() && e.is_reply_target_missing() => {
                tracing::debug!(agent = %agent, chat_id, "reply target missing; resending without it");
                options.reply_to_message_id = None;
                dropped_reply_target = true;
            }
            Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                let wait = policy.delay_for(attempt);
                tracing::warn!(
                    agent = %agent,
                    chat_id,
                    attempt,
                    max_attempts,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "delivery failed; retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::BotProfile;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Pops one scripted result per call; succeeds once the script runs out.
    #[derive(Default)]
    struct ScriptedPlatform {
        script: Mutex<VecDeque<PlatformError>>,
        calls: Mutex<Vec<SendOptions>>,
    }

    impl ScriptedPlatform {
        fn failing_with(errors: Vec<PlatformError>) -> Self {
            Self {
                script: Mutex::new(errors.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PlatformApi for ScriptedPlatform {
        async fn deliver(
            &self,
            _agent: &AgentName,
            _chat_id: i64,
            _text: &str,
            options: &SendOptions,
        ) -> Result<(), PlatformError> {
            self.calls.lock().push(options.clone());
            match self.script.lock().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn identity(&self, _agent: &AgentName) -> Result<BotProfile, PlatformError> {
            Ok(BotProfile::default())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            jitter: Duration::ZERO,
        }
    }

    fn api_error(detail: &str) -> PlatformError {
        PlatformError::Api {
            method: "sendMessage".into(),
            detail: detail.into(),
        }
    }

    fn agent() -> AgentName {
        AgentName::parse("claude").unwrap()
    }

    #[tokio::test]
    async fn first_attempt_success() {
        let platform = ScriptedPlatform::default();
        let delivered = deliver_with_retry(&platform, &agent(), 1, "hi", Some(9), &policy(3))
            .await
            .unwrap();
        assert_eq!(delivered.attempts, 1);
        assert!(!delivered.dropped_reply_target);
        assert_eq!(platform.calls.lock()[0].reply_to_message_id, Some(9));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let platform = ScriptedPlatform::failing_with(vec![
            api_error("Too Many Requests"),
            PlatformError::Timeout {
                method: "sendMessage".into(),
            },
        ]);
        let delivered = deliver_with_retry(&platform, &agent(), 1, "hi", None, &policy(3))
            .await
            .unwrap();
        assert_eq!(delivered.attempts, 3);
        assert_eq!(platform.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_return_last_error() {
        let platform = ScriptedPlatform::failing_with(vec![
            api_error("first"),
            api_error("second"),
            api_error("third"),
        ]);
        let err = deliver_with_retry(&platform, &agent(), 1, "hi", None, &policy(2))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Telegram API sendMessage failed: second");
        assert_eq!(platform.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn missing_reply_target_is_dropped_without_consuming_an_attempt() {
        let platform = ScriptedPlatform::failing_with(vec![api_error(
            "Bad Request: message to be replied not found",
        )]);
        let delivered = deliver_with_retry(&platform, &agent(), 1, "hi", Some(77), &policy(1))
            .await
            .unwrap();
        assert_eq!(delivered.attempts, 1);
        assert!(delivered.dropped_reply_target);

        let calls = platform.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].reply_to_message_id, Some(77));
        assert_eq!(calls[1].reply_to_message_id, None);
    }

    #[tokio::test]
    async fn reply_target_is_dropped_at_most_once() {
        let missing = || api_error("Bad Request: message to be replied not found");
        let platform = ScriptedPlatform::failing_with(vec![missing(), missing(), missing()]);
        let err = deliver_with_retry(&platform, &agent(), 1, "hi", Some(77), &policy(2))
            .await
            .unwrap_err();
        assert!(err.is_reply_target_missing());
        // one free resend plus two counted attempts
        assert_eq!(platform.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn missing_token_is_not_retried() {
        let platform = ScriptedPlatform::failing_with(vec![PlatformError::MissingToken {
            agent: "claude".into(),
        }]);
        let err = deliver_with_retry(&platform, &agent(), 1, "hi", None, &policy(5))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::MissingToken { .. }));
        assert_eq!(platform.calls.lock().len(), 1);
    }

    #[test]
    fn delay_grows_linearly_with_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(300));
        assert_eq!(policy.delay_for(2), Duration::from_millis(600));
    }

    #[test]
    fn jitter_stays_below_bound() {
        let policy = RetryPolicy::from_config(&DeliveryConfig {
            max_attempts: 0,
            base_delay: Duration::from_millis(100),
        });
        assert_eq!(policy.max_attempts, 1);
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(220));
        }
    }
}

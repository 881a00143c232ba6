//! Text generation gateway contract.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Generated text plus the token usage the provider billed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u32,
}

/// Stateless text generation: one call per invocation.
///
/// Failure is always an error, never a malformed success.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion, GatewayError>;
}

// =============================================================================
// Scripted implementation
// =============================================================================

/// Completion gateway that replays queued replies.
///
/// Once the queue is empty every call returns the fallback reply. Every
/// prompt is recorded for inspection.
#[derive(Debug)]
pub struct ScriptedCompletionGateway {
    replies: Mutex<VecDeque<Result<Completion, GatewayError>>>,
    fallback: Result<Completion, GatewayError>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedCompletionGateway {
    /// Gateway whose fallback reply is `text`.
    pub fn replying(text: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(Completion {
                text: text.to_string(),
                tokens_used: estimate_tokens(text),
            }),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Gateway whose fallback is a failure.
    pub fn failing(err: GatewayError) -> Self {
        Self {
            fallback: Err(err),
            ..Self::replying("")
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, text: &str) {
        self.push(Ok(Completion {
            text: text.to_string(),
            tokens_used: estimate_tokens(text),
        }));
    }

    pub fn push_error(&self, err: GatewayError) {
        self.push(Err(err));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn push(&self, reply: Result<Completion, GatewayError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }
}

fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

#[async_trait]
impl CompletionGateway for ScriptedCompletionGateway {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion, GatewayError> {
        let reply = {
            let mut prompts = self
                .prompts
                .lock()
                .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
            prompts.push(prompt.to_string());
            let mut replies = self
                .replies
                .lock()
                .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
            replies.pop_front().unwrap_or_else(|| self.fallback.clone())
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        tracing::debug!(prompt_chars = prompt.len(), max_tokens, "Scripted completion served");
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_replies_then_fallback() {
        let gateway = ScriptedCompletionGateway::replying("fallback");
        gateway.push_reply("first");
        gateway.push_error(GatewayError::RequestFailed("boom".to_string()));

        assert_eq!(gateway.complete("p1", 10).await.unwrap().text, "first");
        assert!(gateway.complete("p2", 10).await.is_err());
        assert_eq!(gateway.complete("p3", 10).await.unwrap().text, "fallback");
        assert_eq!(gateway.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_failing_gateway() {
        let gateway = ScriptedCompletionGateway::failing(GatewayError::Unavailable("down".into()));
        let err = gateway.complete("p", 10).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_token_estimate() {
        let gateway = ScriptedCompletionGateway::replying("abcdefgh");
        let completion = gateway.complete("p", 10).await.unwrap();
        assert_eq!(completion.tokens_used, 2);
    }
}

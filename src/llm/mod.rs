//! Hosted language model boundary
//!
//! The router, the synthesizer and two of the bundled tools talk to the model
//! only through [`LanguageModel`]: text in, text out. Filing search also uses
//! an [`Embedder`]. Every call goes through
//! [`with_retry`], which bounds it with a timeout and a fixed number of
//! attempts so callers can fall back deterministically.

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod embeddings;
pub mod openai;
pub use embeddings::{cosine_similarity, Embedder, OpenAiEmbeddings};
pub use openai::OpenAiClient;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short identifier used in logs and status output.
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Bounds for one model-backed step.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, timeout: Duration, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            timeout,
            backoff,
        }
    }

    /// Delay before retry number `attempt` (1-based): backoff, 2x, 4x, ...
    fn delay_before(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(6);
        self.backoff * factor
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Each attempt is cut off after `policy.timeout`. The last error is returned
/// as an [`OrchestrationError::LlmError`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=policy.attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay_before(attempt - 1)).await;
        }

        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => {
                debug!(label, attempt, "Model call succeeded");
                return Ok(value);
            }
            Ok(Err(e)) => {
                warn!(label, attempt, error = %e, "Model call failed");
                last_error = e.to_string();
            }
            Err(_) => {
                warn!(label, attempt, timeout_ms = policy.timeout.as_millis() as u64, "Model call timed out");
                last_error = format!("timed out after {} ms", policy.timeout.as_millis());
            }
        }
    }

    Err(OrchestrationError::LlmError(format!(
        "{} failed after {} attempt(s): {}",
        label, policy.attempts, last_error
    )))
}

/// Build the hosted model client when an API key is configured.
pub fn model_from_config(config: &AgentConfig) -> Result<Option<Arc<dyn LanguageModel>>> {
    if !config.llm.is_configured() {
        return Ok(None);
    }

    let client = OpenAiClient::new(config.llm.clone())?;
    Ok(Some(Arc::new(client)))
}

/// Build the embeddings client when an API key is configured.
pub fn embedder_from_config(config: &AgentConfig) -> Result<Option<Arc<dyn Embedder>>> {
    if !config.llm.is_configured() {
        return Ok(None);
    }

    let embeddings = OpenAiEmbeddings::new(&config.llm)?;
    Ok(Some(Arc::new(embeddings)))
}

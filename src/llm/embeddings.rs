//! Text embeddings for semantic passage search
//!
//! OpenAI-compatible `/embeddings` endpoint over the same pooled reqwest
//! client setup as the chat client.

use crate::config::LlmConfig;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Maximum inputs sent in one request.
pub const MAX_BATCH_SIZE: usize = 256;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embeddings client (connection-pooled)
pub struct OpenAiEmbeddings {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestrationError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.api_base)
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OrchestrationError::LlmError(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Embeddings error response: {}", error_text);
            let reason = if status == StatusCode::TOO_MANY_REQUESTS {
                "quota or rate limit exceeded"
            } else {
                "request rejected"
            };
            return Err(OrchestrationError::LlmError(format!(
                "embeddings {} ({}): {}",
                reason, status, error_text
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| OrchestrationError::LlmError(format!("embedding parse error: {}", e)))?;

        into_vectors(body, batch.len())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.api_key.trim().is_empty() {
            return Err(OrchestrationError::LlmError(
                "OPENAI_API_KEY not configured".to_string(),
            ));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            debug!(model = %self.model, inputs = batch.len(), "Requesting embeddings");
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Order vectors by their `index` field and check the count.
fn into_vectors(body: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = body.data;
    if data.len() != expected {
        return Err(OrchestrationError::LlmError(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

/// Cosine similarity; 0 when either vector is zero or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiEmbeddings {
        OpenAiEmbeddings::new(&LlmConfig {
            api_base: "https://proxy.example.com/v1/".to_string(),
            api_key: "test-key".to_string(),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_body() {
        let input = vec!["net sales".to_string(), "risk factors".to_string()];
        let json = serde_json::to_value(EmbeddingRequest {
            model: "text-embedding-ada-002",
            input: &input,
        })
        .unwrap();

        assert_eq!(json["model"], "text-embedding-ada-002");
        assert_eq!(json["input"][1], "risk factors");
        assert_eq!(client().endpoint(), "https://proxy.example.com/v1/embeddings");
        assert_eq!(client().name(), "text-embedding-ada-002");
    }

    #[test]
    fn test_response_sorted_by_index() {
        let body: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"embedding":[0.0,1.0],"index":1,"object":"embedding"},{"embedding":[1.0,0.0],"index":0,"object":"embedding"}],"model":"m"}"#,
        )
        .unwrap();

        let vectors = into_vectors(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let body: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[1.0],"index":0}]}"#).unwrap();
        assert!(into_vectors(body, 3).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast() {
        let embeddings = OpenAiEmbeddings::new(&LlmConfig::default()).unwrap();
        assert!(embeddings.embed(&["x".to_string()]).await.is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}

//! Embedding service abstraction
//!
//! Provides a unified interface for multiple embedding providers:
//! - Google Gemini (text-embedding-004)
//! - OpenAI-compatible endpoints (text-embedding-3-small, ...)
//! - Feature hashing (offline, deterministic; used for tests and local runs)
//!
//! Providers make exactly one attempt per call. Every failure is reported as
//! `AppError::EmbeddingUnavailable`; retry policy belongs to the caller.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single, non-empty text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

fn ensure_not_empty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "cannot embed empty text".to_string(),
            field: Some("text".to_string()),
        });
    }
    Ok(())
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError::EmbeddingUnavailable {
        message: message.into(),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

// ============================================================================
// Gemini
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// `batchEmbedContents` accepts at most 100 requests
const GEMINI_BATCH_SIZE: usize = 100;

/// Gemini embedding client
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiEmbedRequest {
    model: String,
    content: GeminiContent,
}

#[derive(Serialize)]
struct GeminiBatchRequest {
    requests: Vec<GeminiEmbedRequest>,
}

#[derive(Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiValues,
}

#[derive(Deserialize)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiValues>,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| GEMINI_API_BASE.to_string()),
        })
    }

    fn request_for(&self, text: &str) -> GeminiEmbedRequest {
        GeminiEmbedRequest {
            model: format!("models/{}", self.model),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        }
    }

    async fn post<B: Serialize + Sync, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API error {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| unavailable(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_not_empty(text)?;

        let response: GeminiEmbedResponse = self.post("embedContent", &self.request_for(text)).await?;
        if response.embedding.values.is_empty() {
            return Err(unavailable("Empty embedding returned"));
        }
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            ensure_not_empty(text)?;
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(GEMINI_BATCH_SIZE) {
            let request = GeminiBatchRequest {
                requests: chunk.iter().map(|t| self.request_for(t)).collect(),
            };
            let response: GeminiBatchResponse = self.post("batchEmbedContents", &request).await?;

            if response.embeddings.len() != chunk.len() {
                return Err(unavailable(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    response.embeddings.len()
                )));
            }
            all_embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API error {}: {}", status, body)));
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("Failed to parse response: {}", e)))?;

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_not_empty(text)?;

        let embeddings = self.make_request(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| unavailable("Empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // OpenAI accepts up to 2048 inputs per request
        const BATCH_SIZE: usize = 100;

        for text in texts {
            ensure_not_empty(text)?;
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.make_request(chunk).await?;
            if embeddings.len() != chunk.len() {
                return Err(unavailable("Embedding count mismatch"));
            }
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Feature hashing
// ============================================================================

/// Deterministic bag-of-words embedder.
///
/// Each lower-cased alphanumeric token is hashed (SHA-256) into one of
/// `dimension` buckets; the bucket counts are L2-normalized. Texts sharing
/// vocabulary point in similar directions, which is enough for local runs and
/// for ranking assertions in tests.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dimension as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_not_empty(text)?;
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration.
///
/// Returns `Ok(None)` when embeddings are switched off (`disabled`, or a
/// remote provider without an API key); callers treat that as "RAG disabled".
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());

    match (config.provider.as_str(), api_key) {
        ("disabled", _) => Ok(None),
        ("hashing", _) => Ok(Some(Arc::new(HashingEmbedder::new(config.dimension)))),
        ("gemini", Some(key)) => Ok(Some(Arc::new(GeminiEmbedder::new(config, key)?))),
        ("openai", Some(key)) => Ok(Some(Arc::new(OpenAIEmbedder::new(config, key)?))),
        ("gemini" | "openai", None) => {
            tracing::warn!(
                provider = %config.provider,
                "No embedding API key configured, embeddings disabled"
            );
            Ok(None)
        }
        (other, _) => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(768);
        let a = embedder.embed("Fix login bug").await.unwrap();
        let b = embedder.embed("fix LOGIN bug").await.unwrap();
        assert_eq!(a.len(), 768);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hashing_embedder_shares_vocabulary() {
        let embedder = HashingEmbedder::new(768);
        let query = embedder.embed("login problem").await.unwrap();
        let related = embedder
            .embed("Task: Fix login bug\n\nUsers cannot log in on mobile")
            .await
            .unwrap();
        let unrelated = embedder
            .embed("Task: Quarterly budget review\n\nPrepare the Q3 budget numbers for finance")
            .await
            .unwrap();
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_hashing_batch() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["text one".to_string(), "text two".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 32);
    }

    #[test]
    fn test_create_embedder_without_key_is_disabled() {
        let config = EmbeddingConfig::default();
        assert!(create_embedder(&config).unwrap().is_none());

        let config = EmbeddingConfig {
            provider: "disabled".into(),
            api_key: Some("key".into()),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).unwrap().is_none());
    }

    #[test]
    fn test_create_embedder_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_create_hashing_embedder() {
        let config = EmbeddingConfig {
            provider: "hashing".into(),
            dimension: 64,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap().unwrap();
        assert_eq!(embedder.dimension(), 64);
        assert_eq!(embedder.model_name(), "feature-hashing");
    }

    /// Local stand-in for `batchEmbedContents` that rejects oversized batches
    async fn serve_gemini_batches() -> (String, Arc<std::sync::Mutex<Vec<usize>>>) {
        use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

        async fn batch(
            State(sizes): State<Arc<std::sync::Mutex<Vec<usize>>>>,
            Json(body): Json<serde_json::Value>,
        ) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
            let count = body["requests"].as_array().map(Vec::len).unwrap_or_default();
            sizes.lock().unwrap().push(count);
            if count > GEMINI_BATCH_SIZE {
                return Err(StatusCode::BAD_REQUEST);
            }
            let embeddings: Vec<_> = (0..count)
                .map(|i| serde_json::json!({ "values": [i as f32, 1.0] }))
                .collect();
            Ok(Json(serde_json::json!({ "embeddings": embeddings })))
        }

        let sizes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/models/{method}", post(batch))
            .with_state(sizes.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), sizes)
    }

    #[tokio::test]
    async fn test_gemini_batches_are_split() {
        let (base, sizes) = serve_gemini_batches().await;
        let config = EmbeddingConfig {
            provider: "gemini".into(),
            api_base: Some(base),
            ..EmbeddingConfig::default()
        };
        let embedder = GeminiEmbedder::new(&config, "test-key".into()).unwrap();

        let texts: Vec<String> = (0..150).map(|i| format!("chunk {i}")).collect();
        let embeddings = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 150);
        assert_eq!(*sizes.lock().unwrap(), vec![100, 50]);
        // order follows the input across sub-batches
        assert_eq!(embeddings[100], vec![0.0, 1.0]);
        assert_eq!(embeddings[149], vec![49.0, 1.0]);
    }
}

//! Embedding providers.
//!
//! The index only depends on the [`EmbeddingProvider`] contract: a batch of
//! strings goes in, one vector per string comes back in the same order, and
//! the whole batch fails as a unit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Default hosted embedding model.
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token accounting reported by a provider.
///
/// Missing fields deserialize as zero, so partial usage blocks from
/// OpenAI-compatible servers are accepted as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// Sum two usage records.
    pub fn add(self, other: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

/// Result of embedding one batch of texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingBatch {
    /// One vector per input text, in input order.
    pub embeddings: Vec<Embedding>,

    /// Model that produced the vectors.
    pub model: String,

    /// Token usage (if reported).
    pub usage: Option<Usage>,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model used when the caller has no preference.
    fn default_model(&self) -> &str;

    /// Embed a batch of texts with the given model.
    ///
    /// Implementations must return exactly one vector per input, in input
    /// order, or fail for the whole batch.
    async fn embed_batch(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch>;

    /// Check if the provider is usable (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// OpenAI-compatible embedding provider.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Default model.
    default_model: String,
}

impl OpenAIProvider {
    /// Create a provider with no API key and the public OpenAI endpoint.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            default_model: DEFAULT_EMBED_MODEL.to_string(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn embed_batch(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch> {
        let model = if model.trim().is_empty() {
            self.default_model.as_str()
        } else {
            model
        };

        if texts.is_empty() {
            return Ok(EmbeddingBatch {
                embeddings: Vec::new(),
                model: model.to_string(),
                usage: None,
            });
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        debug!(
            "Requesting embeddings for {} texts with model: {model}",
            texts.len()
        );

        let request = OpenAIEmbeddingRequest {
            input: texts,
            model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "{status}: {error_text}"
            )));
        }

        let mut result: OpenAIEmbeddingResponse = response.json().await?;
        result.data.sort_by_key(|item| item.index);

        if result.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        let embeddings: Vec<Embedding> = result
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect();

        info!(
            "Generated {} embeddings with model {}",
            embeddings.len(),
            result.model
        );

        Ok(EmbeddingBatch {
            embeddings,
            model: result.model,
            usage: result.usage,
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// OpenAI API request format.
#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Offline lexical embedder.
///
/// Hashes lowercase word unigrams into a fixed number of buckets. It knows
/// nothing about meaning, but it is deterministic and needs no network, which
/// makes it a usable fallback for exact-wording questions and for tests.
pub struct LocalProvider {
    dimension: usize,
}

impl LocalProvider {
    /// Default bucket count.
    pub const DEFAULT_DIMENSION: usize = 256;

    /// Create a local provider with the default dimension.
    pub fn new() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }

    /// Set the number of hash buckets. Zero is bumped to one.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension.max(1);
        self
    }

    /// Output dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> (Embedding, u64) {
        let mut vector = vec![0.0f32; self.dimension];
        let mut words = 0u64;
        for token in tokenize(text) {
            let bucket = (fnv1a(&token) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
            words += 1;
        }
        (vector, words)
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn default_model(&self) -> &str {
        "local-hashing"
    }

    async fn embed_batch(&self, texts: &[String], _model: &str) -> Result<EmbeddingBatch> {
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut words = 0u64;
        for text in texts {
            let (vector, count) = self.embed_one(text);
            embeddings.push(vector);
            words += count;
        }

        Ok(EmbeddingBatch {
            embeddings,
            model: self.default_model().to_string(),
            usage: Some(Usage {
                prompt_tokens: words,
                completion_tokens: 0,
                total_tokens: words,
            }),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

// 64-bit FNV-1a, stable across platforms and releases.
fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

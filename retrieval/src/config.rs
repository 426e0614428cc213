//! Configuration for the retrieval layer.
//!
//! Every component takes an explicit config value. The environment is read
//! once, at the edge, by [`PolyglotConfig::from_env`].

use std::str::FromStr;

use polyglot_embeddings::IndexConfig;
use polyglot_embeddings::provider::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};

use crate::chunker::ChunkerConfig;
use crate::error::{Result, RetrievalError};
use crate::qa::QaConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolyglotConfig {
    /// Provider credentials and endpoint.
    pub openai: OpenAIConfig,

    /// Chunking parameters.
    pub chunker: ChunkerConfig,

    /// Similarity index parameters.
    pub index: IndexConfig,

    /// Question answering parameters.
    pub qa: QaConfig,
}

impl PolyglotConfig {
    /// Read configuration from process environment variables.
    ///
    /// | Variable            | Field                    |
    /// |---------------------|--------------------------|
    /// | `OPENAI_API_KEY`    | `openai.api_key`         |
    /// | `OPENAI_BASE_URL`   | `openai.base_url`        |
    /// | `EMBED_MODEL`       | `index.embedding_model`  |
    /// | `RAG_BATCH_SIZE`    | `index.batch_size`       |
    /// | `RAG_CHUNK_SIZE`    | `chunker.chunk_size`     |
    /// | `RAG_CHUNK_OVERLAP` | `chunker.overlap`        |
    /// | `MODEL`             | `qa.chat_model`          |
    /// | `RAG_TOP_K`         | `qa.top_k`               |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Unset or blank
    /// values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(key) = get("OPENAI_API_KEY") {
            config.openai.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai.base_url = url.trim().to_string();
        }
        if let Some(model) = get("EMBED_MODEL") {
            config.index.embedding_model = model.trim().to_string();
        }
        if let Some(model) = get("MODEL") {
            config.qa.chat_model = model.trim().to_string();
        }
        if let Some(value) = get("RAG_BATCH_SIZE") {
            config.index.batch_size = parse("RAG_BATCH_SIZE", &value)?;
        }
        if let Some(value) = get("RAG_CHUNK_SIZE") {
            config.chunker.chunk_size = parse("RAG_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = get("RAG_CHUNK_OVERLAP") {
            config.chunker.overlap = parse("RAG_CHUNK_OVERLAP", &value)?;
        }
        if let Some(value) = get("RAG_TOP_K") {
            config.qa.top_k = parse("RAG_TOP_K", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check all sections.
    pub fn validate(&self) -> Result<()> {
        self.chunker.validate()?;
        self.index.validate()?;
        if self.qa.top_k == 0 {
            return Err(RetrievalError::Config(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.qa.chat_model.trim().is_empty() {
            return Err(RetrievalError::Config(
                "chat model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Credentials and endpoint for an OpenAI-compatible API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// API key.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL.
    pub base_url: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

// Keep the key out of logs.
impl std::fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RetrievalError::Config(format!("{key} has an invalid value: {value:?}")))
}

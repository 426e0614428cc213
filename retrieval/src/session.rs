//! A question-answering session over one loaded text.

use std::sync::Arc;

use polyglot_embeddings::{
    BuildStats, EmbeddingProvider, IndexConfig, OpenAIProvider, Segment, SimilarityIndex,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::chunker::TextChunker;
use crate::config::PolyglotConfig;
use crate::error::{Result, RetrievalError};
use crate::qa::{self, Answer, ChatProvider, OpenAIChatProvider, QaConfig, RetrievedSegment};
use crate::transcript::Transcript;

/// Chunks a text, indexes it and answers questions about it.
///
/// The index sits behind a `RwLock`: searches share a read lock, and a load
/// embeds into a fresh index before taking the write lock to swap it in, so
/// searches never see a half-built corpus. Concurrent loads race; the last
/// one to finish wins.
pub struct QaSession {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index_config: IndexConfig,
    index: RwLock<SimilarityIndex>,
    chat: Option<Arc<dyn ChatProvider>>,
    qa: QaConfig,
}

impl QaSession {
    /// Create a session with explicit providers.
    pub fn new(
        config: &PolyglotConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Option<Arc<dyn ChatProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let index = SimilarityIndex::new(embedder.clone(), config.index.clone())?;
        Ok(Self {
            chunker: TextChunker::new(config.chunker)?,
            embedder,
            index_config: config.index.clone(),
            index: RwLock::new(index),
            chat,
            qa: config.qa.clone(),
        })
    }

    /// Create a session backed by OpenAI-compatible embedding and chat APIs.
    pub fn from_config(config: &PolyglotConfig, client: reqwest::Client) -> Result<Self> {
        let api_key = config
            .openai
            .api_key
            .clone()
            .ok_or_else(|| RetrievalError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let embedder = OpenAIProvider::new()
            .with_api_key(api_key.clone())
            .with_base_url(config.openai.base_url.clone())
            .with_model(config.index.embedding_model.clone())
            .with_client(client.clone());
        let chat = OpenAIChatProvider::new()
            .with_api_key(api_key)
            .with_base_url(config.openai.base_url.clone())
            .with_client(client);

        Self::new(config, Arc::new(embedder), Some(Arc::new(chat)))
    }

    /// The chunker used for plain text.
    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    /// Number of indexed segments.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Whether nothing has been indexed.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Chunk and index plain text, replacing whatever was loaded before.
    pub async fn load_text(&self, text: &str) -> Result<BuildStats> {
        let segments = self
            .chunker
            .chunk(text)
            .into_iter()
            .map(|chunk| chunk.into_segment().map_err(RetrievalError::from))
            .collect::<Result<Vec<_>>>()?;
        self.load_segments(segments).await
    }

    /// Index a transcript, replacing whatever was loaded before.
    pub async fn load_transcript(&self, transcript: &Transcript) -> Result<BuildStats> {
        let segments = transcript.to_segments(&self.chunker)?;
        self.load_segments(segments).await
    }

    /// Index prepared segments, replacing whatever was loaded before.
    ///
    /// On error the previous corpus stays searchable.
    pub async fn load_segments(&self, segments: Vec<Segment>) -> Result<BuildStats> {
        if !self.embedder.is_available() {
            return Err(RetrievalError::Config(format!(
                "embedding provider {} is not configured",
                self.embedder.name()
            )));
        }

        let mut fresh = SimilarityIndex::new(self.embedder.clone(), self.index_config.clone())?;
        let stats = fresh.build(segments).await?;

        *self.index.write().await = fresh;
        info!("Loaded {} segments into session", stats.segments);
        Ok(stats)
    }

    /// Return the `top_k` segments most similar to `question`.
    ///
    /// Returns an empty list if nothing has been loaded.
    pub async fn search(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedSegment>> {
        let index = self.index.read().await;
        let hits = index.query(question, top_k).await?;
        debug!("Retrieved {} segments", hits.len());

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedSegment {
                position: hit.position,
                score: hit.score,
                segment: hit.segment.clone(),
            })
            .collect())
    }

    /// Answer `question` from the loaded text.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| RetrievalError::Config("no chat provider configured".to_string()))?;
        if !chat.is_available() {
            return Err(RetrievalError::Config(format!(
                "chat provider {} is not configured",
                chat.name()
            )));
        }

        let sources = self.search(question, self.qa.top_k).await?;
        if sources.is_empty() {
            return Err(RetrievalError::NothingIndexed);
        }

        qa::answer(chat.as_ref(), &self.qa.chat_model, question, sources).await
    }
}

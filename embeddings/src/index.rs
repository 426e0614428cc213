//! In-memory similarity index over embedded segments.
//!
//! The index is built once per corpus and queried many times. A build embeds
//! every segment before touching the stored state, so a failed build leaves
//! the previous corpus queryable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{DEFAULT_EMBED_MODEL, EmbeddingProvider, Usage};
use crate::segment::Segment;
use crate::similarity::{DEFAULT_EPSILON, normalize, rank_top_k};

/// Texts sent per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Configuration for a [`SimilarityIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Model identifier passed to the provider.
    pub embedding_model: String,

    /// Maximum texts per provider call.
    pub batch_size: usize,

    /// Added to vector norms before normalizing.
    pub epsilon: f32,
}

impl IndexConfig {
    /// Create a configuration for the given model with default batching.
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            ..Self::default()
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the normalization epsilon.
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Check the configuration before it is used.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_model.trim().is_empty() {
            return Err(EmbeddingError::InvalidArgument(
                "embedding model must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EmbeddingError::InvalidArgument(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(EmbeddingError::InvalidArgument(format!(
                "epsilon must be a finite non-negative number, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBED_MODEL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Summary of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Number of segments stored.
    pub segments: usize,

    /// Number of provider calls made.
    pub batches: usize,

    /// Vector dimension (zero for an empty build).
    pub dimension: usize,

    /// Tokens reported by the provider across all batches.
    pub usage: Usage,
}

/// A query match: a stored segment and its cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit<'a> {
    /// Position of the segment in the most recent build.
    pub position: usize,

    /// Cosine similarity to the query.
    pub score: f32,

    /// The stored segment.
    pub segment: &'a Segment,
}

/// Embedded segments that can be searched by cosine similarity.
///
/// `build` takes `&mut self` and `query` takes `&self`. Hosts that share an
/// index across tasks must wrap it in a lock; the index itself does no
/// internal synchronization.
pub struct SimilarityIndex {
    provider: Arc<dyn EmbeddingProvider>,
    config: IndexConfig,

    /// Segments in build order; position is the lookup key.
    segments: Vec<Segment>,

    /// Normalized vectors, parallel to `segments`.
    embeddings: Vec<Embedding>,

    /// Shared dimension of `embeddings`, zero while empty.
    dimension: usize,
}

impl SimilarityIndex {
    /// Create an empty index.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            config,
            segments: Vec::new(),
            embeddings: Vec::new(),
            dimension: 0,
        })
    }

    /// The index configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of stored segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the index holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Vector dimension of the current build, zero while empty.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Stored segments in build order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Replace the index contents with `segments`.
    ///
    /// All segments are embedded first; the stored state is swapped only if
    /// every batch succeeds. On error the previous contents stay in place.
    pub async fn build(&mut self, segments: Vec<Segment>) -> Result<BuildStats> {
        let (embeddings, stats) = self.embed_segments(&segments).await?;

        self.segments = segments;
        self.embeddings = embeddings;
        self.dimension = stats.dimension;

        info!(
            "Built similarity index with {} segments ({} batches, dimension {})",
            stats.segments, stats.batches, stats.dimension
        );
        Ok(stats)
    }

    /// Return up to `top_k` stored segments most similar to `text`.
    ///
    /// An index that has never been built returns an empty result without
    /// contacting the provider.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit<'_>>> {
        if top_k == 0 {
            return Err(EmbeddingError::InvalidArgument(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.is_empty() {
            debug!("Query against empty index");
            return Ok(Vec::new());
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidArgument(
                "query text is empty".to_string(),
            ));
        }

        let batch = self
            .provider
            .embed_batch(&[text.to_string()], &self.config.embedding_model)
            .await?;
        let mut query = match <[Embedding; 1]>::try_from(batch.embeddings) {
            Ok([query]) => query,
            Err(embeddings) => {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected 1 query embedding, got {}",
                    embeddings.len()
                )));
            }
        };
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        normalize(&mut query, self.config.epsilon);

        let ranked = rank_top_k(&query, &self.embeddings, top_k)?;
        debug!("Query matched {} of {} segments", ranked.len(), self.len());

        Ok(ranked
            .into_iter()
            .filter_map(|(position, score)| {
                self.segments.get(position).map(|segment| SearchHit {
                    position,
                    score,
                    segment,
                })
            })
            .collect())
    }

    /// Embed and normalize all segment texts, batch by batch, in order.
    async fn embed_segments(&self, segments: &[Segment]) -> Result<(Vec<Embedding>, BuildStats)> {
        let texts: Vec<String> = segments.iter().map(|s| s.text().to_string()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut stats = BuildStats {
            segments: texts.len(),
            ..BuildStats::default()
        };
        let mut dimension: Option<usize> = None;

        for batch in texts.chunks(self.config.batch_size) {
            debug!(
                "Embedding batch {} ({} texts) with {}",
                stats.batches + 1,
                batch.len(),
                self.provider.name()
            );
            let response = self
                .provider
                .embed_batch(batch, &self.config.embedding_model)
                .await?;

            if response.embeddings.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }

            for mut embedding in response.embeddings {
                if embedding.is_empty() {
                    return Err(EmbeddingError::InvalidResponse(
                        "provider returned an empty embedding".to_string(),
                    ));
                }
                let expected = *dimension.get_or_insert(embedding.len());
                if embedding.len() != expected {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                normalize(&mut embedding, self.config.epsilon);
                embeddings.push(embedding);
            }

            if let Some(usage) = response.usage {
                stats.usage = stats.usage.add(usage);
            }
            stats.batches += 1;
        }

        stats.dimension = dimension.unwrap_or(0);
        Ok((embeddings, stats))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::provider::{EmbeddingBatch, LocalProvider};

    fn segments(texts: &[&str]) -> Vec<Segment> {
        texts.iter().map(|t| Segment::new(*t).unwrap()).collect()
    }

    fn local_index() -> SimilarityIndex {
        SimilarityIndex::new(Arc::new(LocalProvider::new()), IndexConfig::default()).unwrap()
    }

    /// Wraps the local provider and fails every call after `ok_calls`.
    struct FailingProvider {
        inner: LocalProvider,
        ok_calls: usize,
        calls: AtomicUsize,
    }

    impl FailingProvider {
        fn new(ok_calls: usize) -> Self {
            Self {
                inner: LocalProvider::new(),
                ok_calls,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn default_model(&self) -> &str {
            "failing"
        }

        async fn embed_batch(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.ok_calls {
                return Err(EmbeddingError::ApiRequest("503: unavailable".to_string()));
            }
            self.inner.embed_batch(texts, model).await
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    /// Returns 3-dimensional vectors on the first call and 2 afterwards.
    struct ShrinkingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for ShrinkingProvider {
        fn name(&self) -> &str {
            "shrinking"
        }

        fn default_model(&self) -> &str {
            "shrinking"
        }

        async fn embed_batch(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch> {
            let dim = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                3
            } else {
                2
            };
            Ok(EmbeddingBatch {
                embeddings: texts.iter().map(|_| vec![1.0; dim]).collect(),
                model: model.to_string(),
                usage: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    /// Records the size of every batch it receives.
    struct RecordingProvider {
        inner: LocalProvider,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn default_model(&self) -> &str {
            "recording"
        }

        async fn embed_batch(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch> {
            self.batches.lock().unwrap().push(texts.len());
            self.inner.embed_batch(texts, model).await
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_query_before_build_is_empty() {
        let provider = Arc::new(FailingProvider::new(0));
        let index = SimilarityIndex::new(provider.clone(), IndexConfig::default()).unwrap();

        let hits = index.query("anything", 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capital_of_france() {
        let mut index = local_index();
        index
            .build(segments(&[
                "The cat sat on the mat.",
                "Paris is the capital of France.",
            ]))
            .await
            .unwrap();

        let hits = index
            .query("Where is the capital of France?", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[0].segment.text(), "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn test_self_similarity_is_one() {
        let mut index = local_index();
        index
            .build(segments(&["Ich lerne Deutsch.", "Yo aprendo español."]))
            .await
            .unwrap();

        let hits = index.query("Yo aprendo español.", 1).await.unwrap();
        assert_eq!(hits[0].position, 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_results_bounded_and_ordered() {
        let mut index = local_index();
        let texts = [
            "the train leaves at noon",
            "the train is late",
            "we eat at noon",
            "my sister plays the piano",
        ];
        index.build(segments(&texts)).await.unwrap();

        for k in 1..=6 {
            let hits = index.query("when does the train leave", k).await.unwrap();
            assert!(hits.len() <= k);
            assert!(hits.len() <= texts.len());
            for pair in hits.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
            for hit in &hits {
                assert!(texts.contains(&hit.segment.text()));
            }
        }
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let provider = Arc::new(RecordingProvider {
            inner: LocalProvider::new(),
            batches: Mutex::new(Vec::new()),
        });
        let config = IndexConfig::default().with_batch_size(2);
        let mut index = SimilarityIndex::new(provider.clone(), config).unwrap();

        let texts = ["alpha one", "bravo two", "charlie three", "delta four", "echo five"];
        let stats = index.build(segments(&texts)).await.unwrap();

        assert_eq!(*provider.batches.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.segments, 5);
        assert_eq!(stats.dimension, LocalProvider::DEFAULT_DIMENSION);

        for (position, text) in texts.iter().enumerate() {
            let hits = index.query(text, 1).await.unwrap();
            assert_eq!(hits[0].position, position);
            assert_eq!(index.segments()[position].text(), *text);
        }
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_state() {
        // The build, the query and the first rebuild batch succeed; the second batch fails.
        let provider = Arc::new(FailingProvider::new(3));
        let config = IndexConfig::default().with_batch_size(1);
        let mut index = SimilarityIndex::new(provider, config).unwrap();

        index
            .build(segments(&["der Hund bellt"]))
            .await
            .unwrap();
        let before: Vec<String> = index
            .query("Hund", 1)
            .await
            .unwrap()
            .iter()
            .map(|h| h.segment.text().to_string())
            .collect();

        let err = index
            .build(segments(&["die Katze schläft", "der Vogel singt"]))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ApiRequest(_)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.segments()[0].text(), "der Hund bellt");
        assert_eq!(before, vec!["der Hund bellt".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_first_build_leaves_index_empty() {
        let provider = Arc::new(FailingProvider::new(0));
        let mut index = SimilarityIndex::new(provider, IndexConfig::default()).unwrap();

        assert!(index.build(segments(&["hola"])).await.is_err());
        assert!(index.is_empty());
        assert!(index.query("hola", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_across_batches() {
        let provider = Arc::new(ShrinkingProvider {
            calls: AtomicUsize::new(0),
        });
        let config = IndexConfig::default().with_batch_size(1);
        let mut index = SimilarityIndex::new(provider, config).unwrap();

        let err = index.build(segments(&["a", "b"])).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_contents() {
        let mut index = local_index();
        index.build(segments(&["one", "two", "three"])).await.unwrap();
        index.build(segments(&["uno"])).await.unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.query("two", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].segment.text(), "uno");
    }

    #[tokio::test]
    async fn test_empty_build_clears_index() {
        let mut index = local_index();
        index.build(segments(&["one"])).await.unwrap();
        let stats = index.build(Vec::new()).await.unwrap();

        assert_eq!(stats, BuildStats::default());
        assert!(index.query("one", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_query_arguments() {
        let mut index = local_index();
        index.build(segments(&["one"])).await.unwrap();

        assert!(matches!(
            index.query("one", 0).await,
            Err(EmbeddingError::InvalidArgument(_))
        ));
        assert!(matches!(
            index.query("   ", 1).await,
            Err(EmbeddingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(IndexConfig::default().validate().is_ok());
        assert!(IndexConfig::default().with_batch_size(0).validate().is_err());
        assert!(IndexConfig::new(" ").validate().is_err());
        assert!(
            IndexConfig::default()
                .with_epsilon(f32::NAN)
                .validate()
                .is_err()
        );
        assert!(
            SimilarityIndex::new(
                Arc::new(LocalProvider::new()),
                IndexConfig::default().with_batch_size(0)
            )
            .is_err()
        );
    }

    #[test]
    fn test_build_from_sync_context() {
        let mut index = local_index();
        let stats = tokio_test::block_on(index.build(segments(&["bonjour", "merci"]))).unwrap();
        assert_eq!(stats.segments, 2);
        assert_eq!(stats.usage.total_tokens, 2);
    }
}

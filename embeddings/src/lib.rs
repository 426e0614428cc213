//! # Embeddings
//!
//! Embedding providers and the in-memory similarity index used by Polyglot's
//! question-answering tab.
//!
//! ## Features
//!
//! - **Embedding Generation**: OpenAI-compatible HTTP provider plus an offline
//!   lexical fallback
//! - **Similarity Index**: build-once, query-many cosine search over segments
//! - **Atomic Rebuilds**: a failed build never replaces the previous corpus
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Segment[] ──► EmbeddingProvider ──► normalize ──► SimilarityIndex │
//! │                   │                                   │         │
//! │                   ▼                                   ▼         │
//! │            OpenAI / Local                      top-k SearchHit  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod index;
pub mod provider;
pub mod segment;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use index::{BuildStats, IndexConfig, SearchHit, SimilarityIndex};
pub use provider::{EmbeddingBatch, EmbeddingProvider, LocalProvider, OpenAIProvider, Usage};
pub use segment::{Segment, SegmentMetadata};
pub use similarity::{dot_product, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

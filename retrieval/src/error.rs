//! Error types for chunking, transcripts and question answering.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval layer.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Chunking parameters out of range.
    #[error("invalid chunking parameters: chunk_size={chunk_size}, overlap={overlap}")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    /// Embedding or index error.
    #[error("embedding error: {0}")]
    Embedding(#[from] polyglot_embeddings::EmbeddingError),

    /// A question was asked before any text was indexed.
    #[error("no text has been indexed yet")]
    NothingIndexed,

    /// Chat completion failed.
    #[error("chat completion failed: {0}")]
    Chat(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transcript file could not be interpreted.
    #[error("invalid transcript: {0}")]
    Transcript(String),

    /// Regex compilation failed.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

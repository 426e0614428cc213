//! # Polyglot Retrieval
//!
//! Question answering over a text the learner is studying:
//!
//! - **Chunker**: overlapping fixed-size character windows
//! - **Transcripts**: timestamped segments from the transcription tab
//! - **QA**: retrieval-augmented prompts sent to a chat model
//!
//! ## Architecture
//!
//! ```text
//! text / transcript
//!        │
//!        ▼
//! ┌──────────────┐    ┌──────────────────┐    ┌──────────────┐
//! │ TextChunker  │───▶│ SimilarityIndex  │───▶│ ChatProvider │
//! │  (segments)  │    │ (embed + top-k)  │    │   (answer)   │
//! └──────────────┘    └──────────────────┘    └──────────────┘
//!        └──────────────── QaSession ──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use polyglot_retrieval::{PolyglotConfig, QaSession};
//!
//! let config = PolyglotConfig::from_env()?;
//! let session = QaSession::from_config(&config, reqwest::Client::new())?;
//!
//! session.load_text("Paris is the capital of France.").await?;
//! let answer = session.ask("What is the capital of France?").await?;
//! ```

pub mod chunker;
pub mod config;
pub mod error;
pub mod qa;
pub mod session;
pub mod transcript;

pub use chunker::{Chunk, ChunkerConfig, TextChunker, chunk_text};
pub use config::{OpenAIConfig, PolyglotConfig};
pub use error::{Result, RetrievalError};
pub use qa::{
    Answer, ChatCompletion, ChatMessage, ChatProvider, OpenAIChatProvider, QaConfig,
    RetrievedSegment, Role,
};
pub use session::QaSession;
pub use transcript::{Transcript, TranscriptSegment};

// Re-export from dependencies for convenience
pub use polyglot_embeddings::{
    BuildStats, EmbeddingProvider, LocalProvider, OpenAIProvider, Segment, SegmentMetadata,
    SimilarityIndex,
};

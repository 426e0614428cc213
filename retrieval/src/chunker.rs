//! Fixed-size character chunking with overlap.
//!
//! Text is cleaned (whitespace runs that end in a newline collapse to a single
//! newline, then the whole text is trimmed) and cut into windows of
//! `chunk_size` characters. Each window starts `overlap` characters before the
//! previous one ended, so consecutive chunks share exactly `overlap`
//! characters.

use polyglot_embeddings::{Segment, SegmentMetadata};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Window size in characters.
    pub chunk_size: usize,

    /// Characters shared by consecutive windows. Must be below `chunk_size`.
    pub overlap: usize,
}

impl ChunkerConfig {
    /// Create a chunker configuration.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Reject sizes that would stall or never produce a window.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(RetrievalError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A window of cleaned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Index in the chunker output.
    pub position: usize,

    /// The window text, untrimmed.
    pub text: String,

    /// First character offset in the cleaned text.
    pub start: usize,

    /// One past the last character offset in the cleaned text.
    pub end: usize,
}

impl Chunk {
    /// Convert into an index segment that remembers its character range.
    pub fn into_segment(self) -> polyglot_embeddings::Result<Segment> {
        let metadata = SegmentMetadata {
            char_range: Some((self.start, self.end)),
            ..SegmentMetadata::default()
        };
        Segment::with_metadata(self.text, metadata)
    }
}

/// Splits text into overlapping fixed-size windows.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkerConfig,
    newline_run: Regex,
}

impl TextChunker {
    /// Create a chunker, validating the configuration.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            newline_run: Regex::new(r"\s+\n")?,
        })
    }

    /// The chunker configuration.
    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Collapse whitespace before newlines and trim.
    pub fn clean(&self, text: &str) -> String {
        self.newline_run.replace_all(text, "\n").trim().to_string()
    }

    /// Chunk text content.
    ///
    /// Windows that contain only whitespace are dropped, so the number of
    /// chunks can be smaller than the stride arithmetic suggests.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let cleaned = self.clean(text);

        // Byte offset of every character boundary, including the end.
        let boundaries: Vec<usize> = cleaned
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(cleaned.len()))
            .collect();
        let total = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + self.config.chunk_size).min(total);
            let window = &cleaned[boundaries[start]..boundaries[end]];
            if !window.trim().is_empty() {
                chunks.push(Chunk {
                    position: chunks.len(),
                    text: window.to_string(),
                    start,
                    end,
                });
            }
            if end == total {
                break;
            }
            start = end - self.config.overlap;
        }

        chunks
    }
}

/// Chunk `text` in one call.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = TextChunker::new(ChunkerConfig::new(chunk_size, overlap))?;
    Ok(chunker.chunk(text))
}

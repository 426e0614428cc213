//! Transcript files as written by the transcription tab.
//!
//! A transcript is JSON of the form
//! `{ "text": "...", "segments": [{ "start", "end", "text", "speaker"? }], "language"? }`.
//! Timestamped segments are indexed directly when present; otherwise the
//! plain text is chunked.

use std::path::Path;

use polyglot_embeddings::{Segment, SegmentMetadata};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunker::TextChunker;
use crate::error::{Result, RetrievalError};

/// One timestamped span of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// A transcription result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Transcript {
    /// A transcript with only plain text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Parse a transcript from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a transcript file. Files that are not JSON objects are treated
    /// as plain text.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;

        if content.trim_start().starts_with('{') {
            debug!("Reading JSON transcript from {}", path.display());
            Self::from_json(&content)
        } else {
            debug!("Reading plain-text transcript from {}", path.display());
            Ok(Self::from_text(content))
        }
    }

    /// Turn the transcript into index segments.
    ///
    /// Blank timestamped spans are skipped. Returns an empty list when the
    /// transcript has neither segments nor text.
    pub fn to_segments(&self, chunker: &TextChunker) -> Result<Vec<Segment>> {
        if self.segments.is_empty() {
            return chunker
                .chunk(&self.text)
                .into_iter()
                .map(|chunk| chunk.into_segment().map_err(RetrievalError::from))
                .collect();
        }

        self.segments
            .iter()
            .filter(|span| !span.text.trim().is_empty())
            .map(|span| {
                let metadata = SegmentMetadata {
                    start_secs: Some(span.start),
                    end_secs: Some(span.end),
                    speaker: span.speaker.clone(),
                    ..SegmentMetadata::default()
                };
                Segment::with_metadata(span.text.trim(), metadata).map_err(|err| {
                    RetrievalError::Transcript(format!(
                        "segment at {:.2}s: {err}",
                        span.start
                    ))
                })
            })
            .collect()
    }
}

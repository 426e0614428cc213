//! Segments: the unit of text stored in a [`SimilarityIndex`](crate::SimilarityIndex).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

/// Provenance carried alongside a segment's text.
///
/// The index never reads these fields; they are handed back untouched with
/// query results so callers can cite where an excerpt came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// Start time in the source audio, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_secs: Option<f64>,

    /// End time in the source audio, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_secs: Option<f64>,

    /// Speaker label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,

    /// Character range `[start, end)` in the cleaned source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_range: Option<(usize, usize)>,

    /// Free-form string attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SegmentMetadata {
    fn validate(&self) -> Result<()> {
        for (name, value) in [("start", self.start_secs), ("end", self.end_secs)] {
            match value {
                Some(secs) if !secs.is_finite() || secs < 0.0 => {
                    return Err(EmbeddingError::InvalidSegment(format!(
                        "{name} time must be a non-negative number, got {secs}"
                    )));
                }
                _ => {}
            }
        }

        match (self.start_secs, self.end_secs) {
            (Some(start), Some(end)) if start > end => {
                return Err(EmbeddingError::InvalidSegment(format!(
                    "start time {start} is after end time {end}"
                )));
            }
            _ => {}
        }

        match self.char_range {
            Some((start, end)) if start > end => Err(EmbeddingError::InvalidSegment(format!(
                "character range {start}..{end} is reversed"
            ))),
            _ => Ok(()),
        }
    }
}

/// A piece of text to embed, with optional provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSegment")]
pub struct Segment {
    text: String,
    metadata: SegmentMetadata,
}

/// Wire shape of a segment before validation.
#[derive(Deserialize)]
struct RawSegment {
    text: String,
    #[serde(default)]
    metadata: SegmentMetadata,
}

impl TryFrom<RawSegment> for Segment {
    type Error = EmbeddingError;

    fn try_from(raw: RawSegment) -> Result<Self> {
        Segment::with_metadata(raw.text, raw.metadata)
    }
}

impl Segment {
    /// Create a segment without metadata. Blank text is rejected.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        Self::with_metadata(text, SegmentMetadata::default())
    }

    /// Create a segment with metadata, validating both.
    pub fn with_metadata(text: impl Into<String>, metadata: SegmentMetadata) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidSegment(
                "segment text is empty".to_string(),
            ));
        }
        metadata.validate()?;
        Ok(Self { text, metadata })
    }

    /// The segment text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The segment provenance.
    pub fn metadata(&self) -> &SegmentMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_text_rejected() {
        assert!(Segment::new("").is_err());
        assert!(Segment::new(" \n\t").is_err());
        assert_eq!(Segment::new(" hi ").unwrap().text(), " hi ");
    }

    #[test]
    fn test_timestamps_validated() {
        let reversed = SegmentMetadata {
            start_secs: Some(4.0),
            end_secs: Some(1.5),
            ..Default::default()
        };
        assert!(Segment::with_metadata("hallo", reversed).is_err());

        let negative = SegmentMetadata {
            start_secs: Some(-1.0),
            ..Default::default()
        };
        assert!(Segment::with_metadata("hallo", negative).is_err());

        let nan = SegmentMetadata {
            end_secs: Some(f64::NAN),
            ..Default::default()
        };
        assert!(Segment::with_metadata("hallo", nan).is_err());
    }

    #[test]
    fn test_metadata_passes_through() {
        let metadata = SegmentMetadata {
            start_secs: Some(1.0),
            end_secs: Some(2.5),
            speaker: Some("Speaker A".to_string()),
            ..Default::default()
        };
        let segment = Segment::with_metadata("Bonjour", metadata.clone()).unwrap();
        assert_eq!(segment.metadata(), &metadata);
    }

    #[test]
    fn test_deserialize_without_metadata() {
        let segment: Segment = serde_json::from_str(r#"{"text": "Ciao"}"#).unwrap();
        assert_eq!(segment.text(), "Ciao");
        assert_eq!(segment.metadata(), &SegmentMetadata::default());
    }

    #[test]
    fn test_deserialize_validates() {
        let result: std::result::Result<Segment, _> = serde_json::from_str(
            r#"{"text": "Ciao", "metadata": {"start_secs": 3.0, "end_secs": 1.0}}"#,
        );
        assert!(result.is_err());
        let blank: std::result::Result<Segment, _> = serde_json::from_str(r#"{"text": "  "}"#);
        assert!(blank.is_err());
    }
}

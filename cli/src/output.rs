//! Human-readable and JSON rendering of command results.

use polyglot_embeddings::Segment;
use polyglot_retrieval::{Answer, RetrievedSegment};

/// Render segments as `#position [provenance]` followed by the text.
pub fn format_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(position, segment)| {
            format!(
                "#{position} {}\n{}\n",
                provenance(segment),
                segment.text().trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render search hits with their scores.
pub fn format_hits(query: &str, hits: &[RetrievedSegment]) -> String {
    if hits.is_empty() {
        return format!("No matches for \"{query}\".");
    }

    let mut out = format!("Top {} excerpts for \"{query}\":\n\n", hits.len());
    for hit in hits {
        out.push_str(&format!(
            "#{} score={:.3} {}\n{}\n\n",
            hit.position,
            hit.score,
            provenance(&hit.segment),
            hit.segment.text().trim()
        ));
    }
    out.trim_end().to_string()
}

/// Render an answer followed by the excerpts it cites.
pub fn format_answer(answer: &Answer) -> String {
    let mut out = format!("{}\n\n--- Sources ---\n", answer.content.trim());
    for (n, source) in answer.sources.iter().enumerate() {
        out.push_str(&format!(
            "[{}] #{} {}\n",
            n + 1,
            source.position,
            provenance(&source.segment)
        ));
    }
    out.push_str(&format!(
        "\n{} ({} tokens)",
        answer.model, answer.usage.total_tokens
    ));
    out
}

/// Serialize any result as pretty JSON.
pub fn format_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn provenance(segment: &Segment) -> String {
    let metadata = segment.metadata();
    let mut parts = Vec::new();
    if let Some(speaker) = &metadata.speaker {
        parts.push(speaker.clone());
    }
    if let (Some(start), Some(end)) = (metadata.start_secs, metadata.end_secs) {
        parts.push(format!("{start:.1}s-{end:.1}s"));
    }
    if let Some((start, end)) = metadata.char_range {
        parts.push(format!("chars {start}..{end}"));
    }
    format!("[{}]", parts.join(", "))
}

//! Similarity computation for embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Default epsilon added to the norm before dividing.
pub const DEFAULT_EPSILON: f32 = 1e-12;

/// Compute the dot product between two embeddings.
///
/// For unit-length vectors this equals their cosine similarity.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Euclidean norm of a vector.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale an embedding to unit length.
///
/// `epsilon` is added to the norm so an all-zero vector stays all-zero
/// instead of turning into NaNs.
pub fn normalize(embedding: &mut Embedding, epsilon: f32) {
    let norm = magnitude(embedding) + epsilon;
    for x in embedding.iter_mut() {
        *x /= norm;
    }
}

/// Score every candidate against `query` and keep the `k` best.
///
/// Returns `(position, score)` pairs ordered by descending score; equal
/// scores keep ascending position order so results are reproducible.
/// Candidates must already be normalized.
pub fn rank_top_k(query: &[f32], candidates: &[Embedding], k: usize) -> Result<Vec<(usize, f32)>> {
    let mut scores: Vec<(usize, OrderedFloat<f32>)> = Vec::with_capacity(candidates.len());

    for (position, embedding) in candidates.iter().enumerate() {
        let score = dot_product(query, embedding)?;
        scores.push((position, OrderedFloat(score)));
    }

    // Stable sort keeps insertion order among ties.
    scores.sort_by_key(|(_, score)| Reverse(*score));
    scores.truncate(k);

    Ok(scores
        .into_iter()
        .map(|(position, score)| (position, score.0))
        .collect())
}

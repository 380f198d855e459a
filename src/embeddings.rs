//! Deterministic local text embeddings.
//!
//! Text is hashed character by character into a fixed number of buckets and
//! the bucket counts are scaled to unit length. No model and no network call
//! is involved, so the same text always yields the same vector.

use thiserror::Error;

/// Number of components in every embedding handled by the toolbox.
pub const EMBEDDING_DIMENSION: usize = 128;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding dimension mismatch: expected {expected}, received {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Convert a signed dimension from an untyped boundary (JSON, CLI) into a
/// usable one.
pub fn checked_dimension(raw: i64) -> Result<usize, EmbeddingError> {
    if raw <= 0 {
        return Err(EmbeddingError::InvalidArgument(format!(
            "dimension must be positive, got {raw}"
        )));
    }
    usize::try_from(raw)
        .map_err(|_| EmbeddingError::InvalidArgument(format!("dimension {raw} is too large")))
}

/// Build a unit-length bag-of-characters vector for `text`.
///
/// Each non-whitespace character lands in bucket
/// `(code_point + position) % dimension`, where `position` counts every
/// character of the lower-cased text. Empty or whitespace-only text yields
/// the all-zero vector.
pub fn generate_embedding(text: &str, dimension: usize) -> Result<Vec<f32>, EmbeddingError> {
    if dimension == 0 {
        return Err(EmbeddingError::InvalidArgument(
            "dimension must be positive, got 0".into(),
        ));
    }

    let mut vector = vec![0.0f32; dimension];
    if text.is_empty() {
        return Ok(vector);
    }

    let lowered = text.to_lowercase();
    for (index, ch) in lowered.chars().enumerate() {
        if is_space(ch) {
            continue;
        }
        let bucket = (ch as usize + index) % dimension;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|c| c * c).sum::<f32>().sqrt();
    if norm == 0.0 {
        return Ok(vector);
    }
    for component in &mut vector {
        *component /= norm;
    }
    Ok(vector)
}

/// Unicode whitespace plus the ASCII file, group, record and unit
/// separators, which also count as space for stored vectors.
fn is_space(ch: char) -> bool {
    ch.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&ch)
}

/// Reject vectors whose length differs from `dimension`.
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<(), EmbeddingError> {
    if embedding.len() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    Ok(())
}

//! Cosine similarity calculations

use ndarray::ArrayView1;

use crate::error::{EmbeddingError, Result};

/// Calculate cosine similarity between two embeddings
///
/// Returns a value between -1.0 (opposite) and 1.0 (identical direction).
/// A zero vector on either side yields 0.0: a degenerate embedding
/// contributes no similarity instead of failing.
///
/// Formula: cos(θ) = (A · B) / (||A|| ||B||)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(EmbeddingError::EmptyEmbedding);
    }
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let a_view = ArrayView1::from(a);
    let b_view = ArrayView1::from(b);

    let dot_product = a_view.dot(&b_view) as f64;
    let norm_a = (a_view.dot(&a_view) as f64).sqrt();
    let norm_b = (b_view.dot(&b_view) as f64).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

//! Error types for embedding operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("Text to embed cannot be empty")]
    EmptyText,

    #[error("Embeddings cannot be empty")]
    EmptyEmbedding,

    #[error("Embedding dimensions do not match: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

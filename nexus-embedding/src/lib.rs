//! Embeddings and Semantic Similarity for NeighborNexus
//!
//! This crate provides the semantic half of matching: turning the free text
//! of Needs and Volunteers into vectors and comparing those vectors.
//!
//! ## Features
//! - Generate embeddings through OpenAI's text-embedding-3-small model
//! - Build the embedding source text for Needs and Volunteers
//! - Calculate cosine similarity between embeddings

pub mod client;
pub mod error;
pub mod similarity;
pub mod types;

pub use client::{Embedder, EmbeddingClient, MAX_INPUT_CHARS};
pub use error::{EmbeddingError, Result};
pub use similarity::cosine_similarity;
pub use types::{need_embedding_text, volunteer_embedding_text, EmbeddingVector};

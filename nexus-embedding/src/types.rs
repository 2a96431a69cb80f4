//! Core types for embeddings

pub use nexus_core::EmbeddingVector;

/// Build the text embedded for a Need
///
/// Title, description and category are combined so the category keyword
/// contributes to the vector.
pub fn need_embedding_text(title: &str, description: &str, category: &str) -> String {
    format!(
        "Title: {}\nDescription: {}\nCategory: {}",
        title, description, category
    )
}

/// Build the text embedded for a Volunteer profile
pub fn volunteer_embedding_text(skills: &[String], interests: &[String], description: &str) -> String {
    format!(
        "Skills: {}\nInterests: {}\nDescription: {}",
        skills.join(", "),
        interests.join(", "),
        description
    )
}

//! OpenAI embedding client

use async_openai::{
    config::OpenAIConfig,
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{EmbeddingError, Result},
    types::{need_embedding_text, volunteer_embedding_text, EmbeddingVector},
};
use nexus_core::{Need, Volunteer};

/// Longest input submitted to the provider; longer text is truncated
pub const MAX_INPUT_CHARS: usize = 8000;

/// Default embedding model
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Dimension produced by the default model
pub const DEFAULT_DIMENSION: usize = 1536;

/// Text-to-vector embedding capability
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Whether calls can currently succeed
    fn is_available(&self) -> bool {
        true
    }

    /// Embed a Need's title, description and category
    async fn embed_need(&self, need: &Need) -> Result<EmbeddingVector> {
        let text = need_embedding_text(&need.title, &need.description, &need.category);
        self.embed(&text).await
    }

    /// Embed a Volunteer's skills, interests and description
    async fn embed_volunteer(&self, volunteer: &Volunteer) -> Result<EmbeddingVector> {
        let text = volunteer_embedding_text(
            &volunteer.skills,
            &volunteer.interests,
            &volunteer.description,
        );
        self.embed(&text).await
    }
}

/// Trim and cap text before submission
///
/// Fails on empty input; truncates on a char boundary past `MAX_INPUT_CHARS`.
pub fn prepare_input(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EmbeddingError::EmptyText);
    }

    match text.char_indices().nth(MAX_INPUT_CHARS) {
        Some((cut, _)) => {
            debug!(
                "Truncating embedding input from {} bytes to {} bytes",
                text.len(),
                cut
            );
            Ok(text[..cut].to_string())
        }
        None => Ok(text.to_string()),
    }
}

/// OpenAI embedding client
///
/// Constructed without an API key the client is unavailable and every call
/// fails with [`EmbeddingError::Unavailable`].
pub struct EmbeddingClient {
    client: Option<Client<OpenAIConfig>>,
    model: String,
    dimension: usize,
}

impl EmbeddingClient {
    /// Create a new embedding client
    ///
    /// Uses text-embedding-3-small model (1536 dimensions)
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL, DEFAULT_DIMENSION)
    }

    /// Create a client for a specific model and expected dimension
    pub fn with_model(api_key: Option<String>, model: impl Into<String>, dimension: usize) -> Self {
        let client = match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Some(Client::with_config(OpenAIConfig::new().with_api_key(key))),
            None => {
                warn!("OpenAI API key not provided, embedding service will not work");
                None
            }
        };

        Self {
            client,
            model: model.into(),
            dimension,
        }
    }

    fn client(&self) -> Result<&Client<OpenAIConfig>> {
        self.client
            .as_ref()
            .ok_or_else(|| EmbeddingError::Unavailable("OpenAI client not initialized".to_string()))
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::InvalidDimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Low-level embedding generation
    async fn generate_embedding(&self, text: &str) -> Result<EmbeddingVector> {
        let client = self.client()?;
        let input = prepare_input(text)?;

        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::String(input),
            encoding_format: None,
            dimensions: None,
            user: None,
        };

        let response = client.embeddings().create(request).await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Unavailable("No embeddings returned from API".to_string()))?;

        self.check_dimension(&embedding)?;

        info!(
            "Generated embedding: dimension={}, model={}",
            embedding.len(),
            self.model
        );

        Ok(embedding)
    }

    /// Get the embedding model name
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.generate_embedding(text).await
    }

    fn is_available(&self) -> bool {
        self.client.is_some()
    }
}

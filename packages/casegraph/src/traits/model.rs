//! Model client seams.
//!
//! Embedding and generation services are pure request/response
//! collaborators. Implementations wrap a specific provider; tests
//! substitute [`crate::testing::MockModel`].

use async_trait::async_trait;

use crate::error::ModelResult;

/// Client for the embedding model service.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> ModelResult<Vec<f32>>;
}

/// Client for the generation model service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Free-form text generation.
    async fn generate(&self, prompt: &str) -> ModelResult<String>;

    /// Generation constrained to a JSON response, used by the extractor.
    ///
    /// Providers without a JSON response mode fall back to plain
    /// generation; the extractor's strict parse catches drift either way.
    async fn generate_json(&self, prompt: &str) -> ModelResult<String> {
        self.generate(prompt).await
    }
}

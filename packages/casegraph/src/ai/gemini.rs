//! Gemini REST client for generation and embeddings.
//!
//! Speaks the `generativelanguage.googleapis.com` v1beta surface directly:
//! `generateContent` for text, `embedContent` for vectors. Rate limiting is
//! reported as a quota error so the retry layer backs off instead of giving
//! up.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{CaseError, ModelError, ModelResult};
use crate::traits::model::{EmbeddingClient, GenerationClient};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-005";

/// Client for Gemini generation and embedding endpoints.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    generation_model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    /// Create from the `GOOGLE_API_KEY` environment variable.
    pub fn from_env() -> crate::error::Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| CaseError::Config("GOOGLE_API_KEY not set".into()))?;
        Ok(Self::new(SecretString::from(api_key)))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> ModelResult<serde_json::Value> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(format!("gemini request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::QuotaExceeded);
        }
        if status.is_server_error() {
            return Err(ModelError::Unavailable(format!(
                "gemini returned status {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Malformed(format!(
                "gemini returned status {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(format!("gemini response unreadable: {e}")))
    }

    async fn generate_with_config(
        &self,
        prompt: &str,
        generation_config: serde_json::Value,
    ) -> ModelResult<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.generation_model
        );
        debug!(model = %self.generation_model, chars = prompt.len(), "generating");

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });
        let value = self.post(&url, body).await?;
        let response: GenerateResponse = serde_json::from_value(value)
            .map_err(|e| ModelError::Malformed(format!("unexpected generate shape: {e}")))?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ModelError::Malformed("empty generation response".into()))
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> ModelResult<String> {
        self.generate_with_config(prompt, json!({})).await
    }

    async fn generate_json(&self, prompt: &str) -> ModelResult<String> {
        self.generate_with_config(prompt, json!({ "responseMimeType": "application/json" }))
            .await
    }
}

#[async_trait]
impl EmbeddingClient for GeminiClient {
    async fn embed(&self, text: &str) -> ModelResult<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent",
            self.base_url, self.embedding_model
        );
        debug!(model = %self.embedding_model, chars = text.len(), "embedding");

        let body = json!({ "content": { "parts": [{ "text": text }] } });
        let value = self.post(&url, body).await?;
        let response: EmbedResponse = serde_json::from_value(value)
            .map_err(|e| ModelError::Malformed(format!("unexpected embedding shape: {e}")))?;

        if response.embedding.values.is_empty() {
            return Err(ModelError::Malformed("empty embedding response".into()));
        }
        Ok(response.embedding.values)
    }
}

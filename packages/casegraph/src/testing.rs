//! Testing utilities: a mock model client with deterministic behavior.
//!
//! Useful for exercising ingestion and query flows without real model
//! calls. Embeddings are derived from a content hash so the same text
//! always embeds to the same vector.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{ModelError, ModelResult};
use crate::traits::model::{EmbeddingClient, GenerationClient};

const DEFAULT_EMBEDDING_DIM: usize = 8;

/// Record of a call made to the mock model.
#[derive(Debug, Clone)]
pub enum MockModelCall {
    Generate { prompt: String },
    Embed { text: String },
}

/// A mock embedding and generation client.
///
/// Responses are configured by prompt substring. Unmatched generation
/// prompts fall back to an empty extraction object, so ingestion flows
/// run without per-chunk setup.
#[derive(Clone, Default)]
pub struct MockModel {
    /// Responses keyed by a substring of the prompt
    responses: Arc<RwLock<Vec<(String, String)>>>,

    /// Predefined embeddings by exact text
    embeddings: Arc<RwLock<HashMap<String, Vec<f32>>>>,

    /// Number of upcoming generation calls that return unparseable text.
    /// Shared across clones, like the call log.
    malformed_remaining: Arc<AtomicU32>,

    /// Number of upcoming calls (any kind) that fail as unavailable
    failures_remaining: Arc<AtomicU32>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockModelCall>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `response` for any generation prompt containing `key`.
    /// Used for both extraction and answer prompts; earlier entries win.
    pub fn with_extraction(self, key: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .write()
            .unwrap()
            .push((key.into(), response.into()));
        self
    }

    /// Return `answer` for any generation prompt containing `key`.
    pub fn with_answer(self, key: impl Into<String>, answer: impl Into<String>) -> Self {
        self.with_extraction(key, answer)
    }

    /// Pin the embedding for an exact text.
    pub fn with_embedding(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.embeddings.write().unwrap().insert(text.into(), vector);
        self
    }

    /// Make the next `n` generation calls return unparseable text.
    pub fn with_malformed_responses(self, n: u32) -> Self {
        self.malformed_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Make the next `n` calls fail with a transient unavailable error.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockModelCall> {
        self.calls.read().unwrap().clone()
    }

    /// Prompts of every generation call, in order.
    pub fn generation_prompts(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                MockModelCall::Generate { prompt } => Some(prompt.clone()),
                MockModelCall::Embed { .. } => None,
            })
            .collect()
    }

    /// Texts of every embedding call, in order.
    pub fn embedded_texts(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                MockModelCall::Embed { text } => Some(text.clone()),
                MockModelCall::Generate { .. } => None,
            })
            .collect()
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn respond(&self, prompt: &str) -> ModelResult<String> {
        self.calls.write().unwrap().push(MockModelCall::Generate {
            prompt: prompt.to_string(),
        });

        if Self::take(&self.failures_remaining) {
            return Err(ModelError::Unavailable("mock failure injected".into()));
        }
        if Self::take(&self.malformed_remaining) {
            return Ok("this is not the JSON you were promised".to_string());
        }

        let responses = self.responses.read().unwrap();
        for (key, response) in responses.iter() {
            if prompt.contains(key.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(r#"{"entities": [], "relationships": []}"#.to_string())
    }
}

/// Deterministic embedding derived from a content hash, unit-length so
/// cosine scores stay in range.
fn hashed_embedding(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let raw: Vec<f32> = digest
        .iter()
        .take(DEFAULT_EMBEDDING_DIM)
        .map(|b| f32::from(*b) / 255.0)
        .collect();
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return raw;
    }
    raw.into_iter().map(|v| v / norm).collect()
}

#[async_trait]
impl GenerationClient for MockModel {
    async fn generate(&self, prompt: &str) -> ModelResult<String> {
        self.respond(prompt)
    }
}

#[async_trait]
impl EmbeddingClient for MockModel {
    async fn embed(&self, text: &str) -> ModelResult<Vec<f32>> {
        self.calls.write().unwrap().push(MockModelCall::Embed {
            text: text.to_string(),
        });

        if Self::take(&self.failures_remaining) {
            return Err(ModelError::Unavailable("mock failure injected".into()));
        }

        if let Some(vector) = self.embeddings.read().unwrap().get(text) {
            return Ok(vector.clone());
        }
        Ok(hashed_embedding(text))
    }
}

//! VectorIndex adapter contract.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::traits::graph::UpsertOutcome;

/// A chunk returned by similarity search, with score in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
}

/// Adapter over the external vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently upsert a chunk embedding keyed by chunk id.
    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        vector: &[f32],
        text: &str,
    ) -> StoreResult<UpsertOutcome>;

    /// The `k` most similar chunks to the query vector, best first.
    async fn query_top_k(&self, vector: &[f32], k: usize) -> StoreResult<Vec<ScoredChunk>>;

    /// Whether a chunk id is already indexed. Re-ingestion uses this to
    /// make repeated runs a no-op.
    async fn contains(&self, chunk_id: &str) -> StoreResult<bool>;

    async fn chunk_count(&self) -> StoreResult<usize>;
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

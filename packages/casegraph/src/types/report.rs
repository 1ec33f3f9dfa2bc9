//! Ingestion run reporting.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chunk that could not be fully ingested, with the reason.
///
/// Skips are chunk-scoped: one chunk's unrecoverable failure never aborts
/// the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedChunk {
    pub chunk_id: String,
    pub source_document: String,
    pub reason: String,
}

/// Counts of what an ingestion run created, merged, and skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: Uuid,

    /// Hash of the extraction prompt template this run used, so stored
    /// data can be traced back to the template that produced it
    #[serde(default)]
    pub prompt_hash: String,

    /// Chunks produced from the corpus
    pub chunks_processed: usize,

    /// Chunks newly embedded and indexed this run
    pub chunks_indexed: usize,

    /// Chunks whose content hash was already indexed (re-ingestion no-op)
    pub chunks_already_indexed: usize,

    pub entities_created: usize,
    pub entities_merged: usize,
    pub relationships_created: usize,
    pub relationships_existing: usize,

    pub skipped_chunks: Vec<SkippedChunk>,
}

impl IngestReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            prompt_hash: String::new(),
            chunks_processed: 0,
            chunks_indexed: 0,
            chunks_already_indexed: 0,
            entities_created: 0,
            entities_merged: 0,
            relationships_created: 0,
            relationships_existing: 0,
            skipped_chunks: Vec::new(),
        }
    }

    /// True when no chunk had to be skipped.
    pub fn is_clean(&self) -> bool {
        self.skipped_chunks.is_empty()
    }

    pub fn skip(
        &mut self,
        chunk_id: impl Into<String>,
        source_document: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.skipped_chunks.push(SkippedChunk {
            chunk_id: chunk_id.into(),
            source_document: source_document.into(),
            reason: reason.into(),
        });
    }
}

impl Default for IngestReport {
    fn default() -> Self {
        Self::new()
    }
}

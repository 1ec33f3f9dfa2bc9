//! Pipeline configuration.

use std::time::Duration;

use crate::types::entity::RelationLabel;

/// Configuration for ingestion runs.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Concurrent extraction calls (chunk-level worker bound)
    pub concurrency: usize,

    /// Character budget per evidence chunk
    pub max_chunk_chars: usize,

    /// Extraction attempts per chunk before it is skipped; attempts after
    /// the first carry a clarifying re-prompt
    pub max_parse_attempts: u32,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_chunk_chars: 4_000,
            max_parse_attempts: 3,
        }
    }
}

impl IngestOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars.max(1);
        self
    }

    pub fn with_max_parse_attempts(mut self, attempts: u32) -> Self {
        self.max_parse_attempts = attempts.max(1);
        self
    }
}

/// Configuration for hybrid retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Top-k evidence chunks from the vector arm
    pub vector_top_k: usize,

    /// Maximum hop depth for graph traversal
    pub max_hops: u8,

    /// Minimum fused score for a question to count as groundable
    pub min_relevance: f32,

    /// Character budget for the fused context bundle
    pub context_budget_chars: usize,

    /// Per-arm deadline; one responsive arm still yields a partial bundle
    pub timeout: Option<Duration>,

    /// Restrict traversal to these labels, if set
    pub label_filter: Option<Vec<RelationLabel>>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            vector_top_k: 5,
            max_hops: 2,
            min_relevance: 0.1,
            context_budget_chars: 6_000,
            timeout: None,
            label_filter: None,
        }
    }
}

impl RetrievalOptions {
    pub fn with_vector_top_k(mut self, k: usize) -> Self {
        self.vector_top_k = k.max(1);
        self
    }

    pub fn with_max_hops(mut self, hops: u8) -> Self {
        self.max_hops = hops;
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn with_context_budget_chars(mut self, budget: usize) -> Self {
        self.context_budget_chars = budget;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_label_filter(mut self, labels: Vec<RelationLabel>) -> Self {
        self.label_filter = Some(labels);
        self
    }
}

//! GraphStore adapter contract.
//!
//! A thin, stateless wrapper over the external graph database: upserts
//! keyed by canonical identity, pattern-based traversal, and the lookups
//! the canonicalizer and retriever need. No business logic; failures map
//! to [`crate::error::StoreError`].

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::chunk::EvidenceChunk;
use crate::types::entity::{Entity, EntityId, RelationLabel, Relationship};

/// Whether an upsert created new state or found it already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Merged,
}

impl UpsertOutcome {
    pub fn is_created(self) -> bool {
        matches!(self, UpsertOutcome::Created)
    }
}

/// Pattern-based traversal request: start ids, hop bound, optional label
/// filter.
#[derive(Debug, Clone)]
pub struct TraversalQuery {
    pub start: Vec<EntityId>,
    pub max_hops: u8,
    pub labels: Option<Vec<RelationLabel>>,
}

impl TraversalQuery {
    pub fn new(start: Vec<EntityId>, max_hops: u8) -> Self {
        Self {
            start,
            max_hops,
            labels: None,
        }
    }

    pub fn with_labels(mut self, labels: Vec<RelationLabel>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Whether a relationship label passes the filter.
    pub fn allows(&self, label: RelationLabel) -> bool {
        match &self.labels {
            Some(labels) => labels.contains(&label),
            None => true,
        }
    }
}

/// A node reached during traversal.
#[derive(Debug, Clone)]
pub enum TraversalNode {
    Entity(Entity),

    /// An evidence chunk reached through a mention link
    Chunk { chunk_id: String, text: String },
}

/// One traversal result: the node, the edge it was reached through (absent
/// for mention hops), and its hop distance from the nearest start entity.
#[derive(Debug, Clone)]
pub struct TraversalHit {
    pub node: TraversalNode,
    pub via: Option<Relationship>,
    pub distance: u8,
}

/// Adapter over the external graph database.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Idempotently upsert a canonical entity.
    async fn upsert_entity(&self, entity: &Entity) -> StoreResult<UpsertOutcome>;

    /// Idempotently upsert a relationship. Both endpoints must already
    /// exist; `(source, target, label)` is the identity key.
    async fn upsert_relationship(&self, rel: &Relationship) -> StoreResult<UpsertOutcome>;

    /// Record that a chunk mentions an entity, materializing the chunk
    /// node if needed.
    async fn upsert_mention(&self, chunk: &EvidenceChunk, entity: &EntityId)
        -> StoreResult<UpsertOutcome>;

    /// Every canonical entity, ordered by creation sequence. Used by the
    /// canonicalizer to rebuild its registry at the start of a run.
    async fn all_entities(&self) -> StoreResult<Vec<Entity>>;

    /// Entities whose canonical name or alias equals one of the given
    /// normalized terms.
    async fn entities_matching(&self, normalized_terms: &[String]) -> StoreResult<Vec<Entity>>;

    /// Number of relationships attached to an entity (corroboration count
    /// for merge tie-breaks).
    async fn relationship_count(&self, id: &EntityId) -> StoreResult<usize>;

    /// Traverse outward from the start entities up to the hop bound.
    /// Start entities themselves are not returned.
    async fn traverse(&self, query: &TraversalQuery) -> StoreResult<Vec<TraversalHit>>;

    async fn entity_count(&self) -> StoreResult<usize>;

    async fn relationship_total(&self) -> StoreResult<usize>;
}

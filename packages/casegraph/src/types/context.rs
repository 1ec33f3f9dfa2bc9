//! Retrieval candidates and the fused context bundle.
//!
//! Everything here is transient: created per query, consumed by the
//! synthesizer, never persisted.

use serde::{Deserialize, Serialize};

use crate::types::entity::{EntityId, EntityKind, RelationLabel};

/// Which retrieval arm produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Vector,
    Graph,
    Both,
}

impl Provenance {
    /// Tie-break priority: `both > graph > vector`.
    pub fn priority(self) -> u8 {
        match self {
            Provenance::Both => 2,
            Provenance::Graph => 1,
            Provenance::Vector => 0,
        }
    }

    /// Provenance after a candidate is seen from a second arm.
    pub fn merged_with(self, other: Provenance) -> Provenance {
        if self == other {
            self
        } else {
            Provenance::Both
        }
    }
}

/// A single supporting fact in the context bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fact {
    /// An evidence text chunk
    Chunk {
        chunk_id: String,
        source_document: Option<String>,
        text: String,
    },

    /// A canonical entity
    Entity {
        id: EntityId,
        name: String,
        kind: EntityKind,
    },

    /// A typed edge, rendered with endpoint display names
    Edge {
        source_id: EntityId,
        target_id: EntityId,
        source_name: String,
        target_name: String,
        label: RelationLabel,
    },
}

/// Identity key for fusing candidates across retrieval arms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FactKey {
    Chunk(String),
    Entity(EntityId),
    Edge(EntityId, EntityId, RelationLabel),
}

impl Fact {
    pub fn key(&self) -> FactKey {
        match self {
            Fact::Chunk { chunk_id, .. } => FactKey::Chunk(chunk_id.clone()),
            Fact::Entity { id, .. } => FactKey::Entity(id.clone()),
            Fact::Edge {
                source_id,
                target_id,
                label,
                ..
            } => FactKey::Edge(source_id.clone(), target_id.clone(), *label),
        }
    }

    /// Render the fact the way the synthesizer prompt embeds it.
    pub fn render(&self) -> String {
        match self {
            Fact::Chunk {
                source_document,
                text,
                ..
            } => match source_document {
                Some(doc) => format!("EVIDENCE ({doc}): {text}"),
                None => format!("EVIDENCE: {text}"),
            },
            Fact::Entity { name, kind, .. } => format!("{name} ({kind})"),
            Fact::Edge {
                source_name,
                target_name,
                label,
                ..
            } => format!("{source_name} --[{label}]--> {target_name}"),
        }
    }
}

/// A fact with its fused relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub fact: Fact,
    pub score: f32,
    pub provenance: Provenance,
}

/// The ranked set of graph and vector retrieval results passed to the
/// synthesizer. Order is the final fused ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    pub candidates: Vec<RetrievalCandidate>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Highest fused score in the bundle.
    pub fn top_score(&self) -> f32 {
        self.candidates.first().map(|c| c.score).unwrap_or(0.0)
    }

    /// A question is groundable when at least one fact cleared the
    /// relevance threshold.
    pub fn is_groundable(&self, min_relevance: f32) -> bool {
        self.top_score() >= min_relevance && !self.is_empty()
    }

    /// Graph facts (entities and edges) rendered one per line.
    pub fn render_graph_facts(&self) -> String {
        self.candidates
            .iter()
            .filter(|c| !matches!(c.fact, Fact::Chunk { .. }))
            .map(|c| c.fact.render())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Evidence excerpts rendered one per line.
    pub fn render_evidence(&self) -> String {
        self.candidates
            .iter()
            .filter(|c| matches!(c.fact, Fact::Chunk { .. }))
            .map(|c| c.fact.render())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The answer to a question, with the context used for traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub context: ContextBundle,
    pub groundable: bool,
}

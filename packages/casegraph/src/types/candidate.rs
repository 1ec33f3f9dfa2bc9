//! Extraction candidates, before canonicalization.
//!
//! These are the validated output of the extractor: structurally sound, but
//! names are still raw surface forms that the canonicalizer has to merge.

use serde::{Deserialize, Serialize};

use crate::types::entity::{EntityKind, RelationLabel};

/// An entity mention proposed by the extraction model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEntity {
    /// Surface form as it appeared in model output
    pub name: String,
    pub kind: EntityKind,
}

impl CandidateEntity {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A typed relationship between two candidate entity names.
///
/// Endpoints reference candidate names from the same extraction; they are
/// rewritten to canonical ids during merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRelationship {
    pub source: String,
    pub target: String,
    pub label: RelationLabel,
}

impl CandidateRelationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        label: RelationLabel,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label,
        }
    }
}

/// Validated extraction output for one evidence chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkExtraction {
    pub chunk_id: String,
    pub entities: Vec<CandidateEntity>,
    pub relationships: Vec<CandidateRelationship>,
}

impl ChunkExtraction {
    pub fn new(chunk_id: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            entities: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

//! In-memory graph store and vector index.
//!
//! Backs tests and local development; data is lost on drop. BTreeMaps keep
//! iteration (and therefore traversal and search results) deterministic.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::traits::graph::{
    GraphStore, TraversalHit, TraversalNode, TraversalQuery, UpsertOutcome,
};
use crate::traits::vector::{cosine_similarity, ScoredChunk, VectorIndex};
use crate::types::chunk::EvidenceChunk;
use crate::types::entity::{Entity, EntityId, RelationLabel, Relationship};

type EdgeKey = (EntityId, EntityId, RelationLabel);

#[derive(Debug, Clone, Default)]
struct MentionedChunk {
    text: String,
    entities: BTreeSet<EntityId>,
}

/// In-memory knowledge graph.
#[derive(Default)]
pub struct MemoryGraph {
    entities: RwLock<BTreeMap<EntityId, Entity>>,
    edges: RwLock<BTreeMap<EdgeKey, Relationship>>,
    mentions: RwLock<BTreeMap<String, MentionedChunk>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all stored data.
    pub fn clear(&self) {
        self.entities.write().unwrap().clear();
        self.edges.write().unwrap().clear();
        self.mentions.write().unwrap().clear();
    }

    fn neighbors_of_entity(
        &self,
        id: &EntityId,
        query: &TraversalQuery,
    ) -> Vec<(NodeKey, Option<Relationship>)> {
        let mut out = Vec::new();
        for rel in self.edges.read().unwrap().values() {
            if !query.allows(rel.label) {
                continue;
            }
            // Edges are traversed in both directions.
            let other = if &rel.source == id {
                &rel.target
            } else if &rel.target == id {
                &rel.source
            } else {
                continue;
            };
            out.push((NodeKey::Entity(other.clone()), Some(rel.clone())));
        }
        for (chunk_id, chunk) in self.mentions.read().unwrap().iter() {
            if chunk.entities.contains(id) {
                out.push((NodeKey::Chunk(chunk_id.clone()), None));
            }
        }
        out
    }

    fn neighbors_of_chunk(&self, chunk_id: &str) -> Vec<(NodeKey, Option<Relationship>)> {
        self.mentions
            .read()
            .unwrap()
            .get(chunk_id)
            .map(|chunk| {
                chunk
                    .entities
                    .iter()
                    .map(|id| (NodeKey::Entity(id.clone()), None))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NodeKey {
    Entity(EntityId),
    Chunk(String),
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn upsert_entity(&self, entity: &Entity) -> crate::error::StoreResult<UpsertOutcome> {
        let mut entities = self.entities.write().unwrap();
        match entities.get_mut(&entity.id) {
            Some(existing) => {
                existing.aliases.extend(entity.aliases.iter().cloned());
                for (key, value) in &entity.attributes {
                    existing
                        .attributes
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                Ok(UpsertOutcome::Merged)
            }
            None => {
                entities.insert(entity.id.clone(), entity.clone());
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn upsert_relationship(
        &self,
        rel: &Relationship,
    ) -> crate::error::StoreResult<UpsertOutcome> {
        let mut edges = self.edges.write().unwrap();
        let key = rel.key();
        if edges.contains_key(&key) {
            Ok(UpsertOutcome::Merged)
        } else {
            edges.insert(key, rel.clone());
            Ok(UpsertOutcome::Created)
        }
    }

    async fn upsert_mention(
        &self,
        chunk: &EvidenceChunk,
        entity: &EntityId,
    ) -> crate::error::StoreResult<UpsertOutcome> {
        let mut mentions = self.mentions.write().unwrap();
        let entry = mentions.entry(chunk.chunk_id.clone()).or_default();
        entry.text = chunk.text.clone();
        if entry.entities.insert(entity.clone()) {
            Ok(UpsertOutcome::Created)
        } else {
            Ok(UpsertOutcome::Merged)
        }
    }

    async fn all_entities(&self) -> crate::error::StoreResult<Vec<Entity>> {
        let mut entities: Vec<Entity> = self.entities.read().unwrap().values().cloned().collect();
        entities.sort_by_key(|e| e.created_seq);
        Ok(entities)
    }

    async fn entities_matching(
        &self,
        normalized_terms: &[String],
    ) -> crate::error::StoreResult<Vec<Entity>> {
        let entities = self.entities.read().unwrap();
        let mut matched: Vec<Entity> = entities
            .values()
            .filter(|e| normalized_terms.iter().any(|term| e.answers_to(term)))
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.created_seq);
        Ok(matched)
    }

    async fn relationship_count(&self, id: &EntityId) -> crate::error::StoreResult<usize> {
        Ok(self
            .edges
            .read()
            .unwrap()
            .values()
            .filter(|rel| &rel.source == id || &rel.target == id)
            .count())
    }

    async fn traverse(
        &self,
        query: &TraversalQuery,
    ) -> crate::error::StoreResult<Vec<TraversalHit>> {
        let mut visited: BTreeSet<NodeKey> = query
            .start
            .iter()
            .map(|id| NodeKey::Entity(id.clone()))
            .collect();
        let mut frontier: VecDeque<(NodeKey, u8)> = query
            .start
            .iter()
            .map(|id| (NodeKey::Entity(id.clone()), 0))
            .collect();
        let mut hits = Vec::new();

        while let Some((key, distance)) = frontier.pop_front() {
            if distance >= query.max_hops {
                continue;
            }
            let neighbors = match &key {
                NodeKey::Entity(id) => self.neighbors_of_entity(id, query),
                NodeKey::Chunk(chunk_id) => self.neighbors_of_chunk(chunk_id),
            };
            for (neighbor, via) in neighbors {
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                let node = match &neighbor {
                    NodeKey::Entity(id) => {
                        match self.entities.read().unwrap().get(id) {
                            Some(entity) => TraversalNode::Entity(entity.clone()),
                            // Dangling endpoint; nothing to report.
                            None => continue,
                        }
                    }
                    NodeKey::Chunk(chunk_id) => {
                        let mentions = self.mentions.read().unwrap();
                        match mentions.get(chunk_id) {
                            Some(chunk) => TraversalNode::Chunk {
                                chunk_id: chunk_id.clone(),
                                text: chunk.text.clone(),
                            },
                            None => continue,
                        }
                    }
                };
                hits.push(TraversalHit {
                    node,
                    via,
                    distance: distance + 1,
                });
                frontier.push_back((neighbor, distance + 1));
            }
        }

        Ok(hits)
    }

    async fn entity_count(&self) -> crate::error::StoreResult<usize> {
        Ok(self.entities.read().unwrap().len())
    }

    async fn relationship_total(&self) -> crate::error::StoreResult<usize> {
        Ok(self.edges.read().unwrap().len())
    }
}

/// In-memory vector index with brute-force cosine search.
#[derive(Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<BTreeMap<String, (Vec<f32>, String)>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        vector: &[f32],
        text: &str,
    ) -> crate::error::StoreResult<UpsertOutcome> {
        let mut entries = self.entries.write().unwrap();
        let outcome = if entries.contains_key(chunk_id) {
            UpsertOutcome::Merged
        } else {
            UpsertOutcome::Created
        };
        entries.insert(chunk_id.to_string(), (vector.to_vec(), text.to_string()));
        Ok(outcome)
    }

    async fn query_top_k(
        &self,
        vector: &[f32],
        k: usize,
    ) -> crate::error::StoreResult<Vec<ScoredChunk>> {
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .map(|(chunk_id, (embedding, text))| ScoredChunk {
                chunk_id: chunk_id.clone(),
                text: text.clone(),
                // Negative similarity reads as irrelevant, not anti-relevant.
                score: cosine_similarity(vector, embedding).max(0.0),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn contains(&self, chunk_id: &str) -> crate::error::StoreResult<bool> {
        Ok(self.entries.read().unwrap().contains_key(chunk_id))
    }

    async fn chunk_count(&self) -> crate::error::StoreResult<usize> {
        Ok(self.entries.read().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::entity::EntityKind;

    fn person(name: &str, seq: u64) -> Entity {
        Entity::new(EntityKind::Person, name, name.to_lowercase(), seq)
    }

    #[tokio::test]
    async fn entity_upsert_is_idempotent_and_merges_aliases() {
        let graph = MemoryGraph::new();
        let base = person("Layla", 0);
        assert_eq!(
            graph.upsert_entity(&base).await.unwrap(),
            UpsertOutcome::Created
        );

        let updated = base.clone().with_alias("layla hassan");
        assert_eq!(
            graph.upsert_entity(&updated).await.unwrap(),
            UpsertOutcome::Merged
        );

        let all = graph.all_entities().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].aliases.contains("layla hassan"));
    }

    #[tokio::test]
    async fn relationship_upsert_deduplicates_by_key() {
        let graph = MemoryGraph::new();
        let a = person("A", 0);
        let b = person("B", 1);
        graph.upsert_entity(&a).await.unwrap();
        graph.upsert_entity(&b).await.unwrap();

        let rel = Relationship::new(a.id.clone(), b.id.clone(), RelationLabel::CausedDeath);
        assert_eq!(
            graph.upsert_relationship(&rel).await.unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            graph.upsert_relationship(&rel).await.unwrap(),
            UpsertOutcome::Merged
        );
        assert_eq!(graph.relationship_total().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn traversal_respects_hop_limit_and_skips_start() {
        let graph = MemoryGraph::new();
        let a = person("A", 0);
        let b = person("B", 1);
        let c = person("C", 2);
        for entity in [&a, &b, &c] {
            graph.upsert_entity(entity).await.unwrap();
        }
        graph
            .upsert_relationship(&Relationship::new(
                a.id.clone(),
                b.id.clone(),
                RelationLabel::AssociatedWith,
            ))
            .await
            .unwrap();
        graph
            .upsert_relationship(&Relationship::new(
                b.id.clone(),
                c.id.clone(),
                RelationLabel::AssociatedWith,
            ))
            .await
            .unwrap();

        let one_hop = graph
            .traverse(&TraversalQuery::new(vec![a.id.clone()], 1))
            .await
            .unwrap();
        assert_eq!(one_hop.len(), 1);
        assert!(matches!(
            &one_hop[0].node,
            TraversalNode::Entity(e) if e.id == b.id
        ));

        let two_hops = graph
            .traverse(&TraversalQuery::new(vec![a.id.clone()], 2))
            .await
            .unwrap();
        assert_eq!(two_hops.len(), 2);
        assert_eq!(two_hops[1].distance, 2);
    }

    #[tokio::test]
    async fn traversal_reaches_chunks_through_mentions() {
        let graph = MemoryGraph::new();
        let a = person("A", 0);
        graph.upsert_entity(&a).await.unwrap();
        let chunk = EvidenceChunk::new("report.txt", "A was seen at the docks.");
        graph.upsert_mention(&chunk, &a.id).await.unwrap();

        let hits = graph
            .traverse(&TraversalQuery::new(vec![a.id.clone()], 1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(matches!(
            &hits[0].node,
            TraversalNode::Chunk { chunk_id, .. } if *chunk_id == chunk.chunk_id
        ));
        assert!(hits[0].via.is_none());
    }

    #[tokio::test]
    async fn traversal_label_filter_blocks_edges() {
        let graph = MemoryGraph::new();
        let a = person("A", 0);
        let b = person("B", 1);
        graph.upsert_entity(&a).await.unwrap();
        graph.upsert_entity(&b).await.unwrap();
        graph
            .upsert_relationship(&Relationship::new(
                a.id.clone(),
                b.id.clone(),
                RelationLabel::AssociatedWith,
            ))
            .await
            .unwrap();

        let query = TraversalQuery::new(vec![a.id.clone()], 2)
            .with_labels(vec![RelationLabel::CausedDeath]);
        let hits = graph.traverse(&query).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn top_k_ranks_by_similarity() {
        let index = MemoryVectorIndex::new();
        index
            .upsert_embedding("close", &[1.0, 0.0], "close text")
            .await
            .unwrap();
        index
            .upsert_embedding("far", &[0.0, 1.0], "far text")
            .await
            .unwrap();
        index
            .upsert_embedding("middle", &[0.7, 0.7], "middle text")
            .await
            .unwrap();

        let hits = index.query_top_k(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "close");
        assert_eq!(hits[1].chunk_id, "middle");
    }

    #[tokio::test]
    async fn opposite_vectors_score_zero() {
        let index = MemoryVectorIndex::new();
        index
            .upsert_embedding("opposite", &[-1.0, 0.0], "text")
            .await
            .unwrap();
        let hits = index.query_top_k(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].score, 0.0);
    }
}

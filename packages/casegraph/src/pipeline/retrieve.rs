//! Hybrid retrieval: vector search and graph traversal run concurrently,
//! then fuse into one ranked context bundle.
//!
//! Scoring: entities matched directly from the question get 1.0, traversal
//! hits decay as `1 / (1 + hops)`, vector hits carry their similarity.
//! A fact surfaced by both arms sums its scores and is marked accordingly,
//! which pushes corroborated facts up the ranking.

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{CaseError, Result};
use crate::pipeline::canonical::normalize_name;
use crate::retry::RetryPolicy;
use crate::traits::graph::{GraphStore, TraversalHit, TraversalNode, TraversalQuery};
use crate::traits::model::EmbeddingClient;
use crate::traits::vector::{ScoredChunk, VectorIndex};
use crate::types::context::{ContextBundle, Fact, FactKey, Provenance, RetrievalCandidate};
use crate::types::config::RetrievalOptions;
use crate::types::entity::{Entity, EntityId};

/// Longest n-gram tried against entity names.
const MAX_TERM_TOKENS: usize = 3;

/// What the graph arm found: directly matched entities plus their
/// neighborhood.
#[derive(Debug, Default)]
pub struct GraphArm {
    pub matched: Vec<Entity>,
    pub hits: Vec<TraversalHit>,
}

/// Normalized n-grams of the question, longest first so multi-word names
/// are tried before their fragments.
pub fn question_terms(question: &str) -> Vec<String> {
    let normalized = normalize_name(question);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let mut terms = Vec::new();
    for len in (1..=MAX_TERM_TOKENS.min(tokens.len())).rev() {
        for window in tokens.windows(len) {
            let term = window.join(" ");
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
    }
    terms
}

/// The two-arm retriever over a graph store and a vector index.
pub struct Retriever<'a, G: ?Sized, V: ?Sized, E: ?Sized> {
    graph: &'a G,
    vector: &'a V,
    embedder: &'a E,
    retry: &'a RetryPolicy,
}

impl<'a, G, V, E> Retriever<'a, G, V, E>
where
    G: GraphStore + ?Sized,
    V: VectorIndex + ?Sized,
    E: EmbeddingClient + ?Sized,
{
    pub fn new(graph: &'a G, vector: &'a V, embedder: &'a E, retry: &'a RetryPolicy) -> Self {
        Self {
            graph,
            vector,
            embedder,
            retry,
        }
    }

    /// Run both arms and fuse. A single failed arm degrades to a partial
    /// bundle; the query fails only when both arms fail.
    pub async fn retrieve(
        &self,
        question: &str,
        options: &RetrievalOptions,
    ) -> Result<ContextBundle> {
        let (vector_result, graph_result) = tokio::join!(
            bounded(options.timeout, self.vector_arm(question, options)),
            bounded(options.timeout, self.graph_arm(question, options)),
        );

        let (vector_hits, graph_arm) = match (vector_result, graph_result) {
            (Ok(v), Ok(g)) => (v, g),
            (Ok(v), Err(error)) => {
                warn!(%error, "graph retrieval arm failed, answering from vector hits only");
                (v, GraphArm::default())
            }
            (Err(error), Ok(g)) => {
                warn!(%error, "vector retrieval arm failed, answering from graph only");
                (Vec::new(), g)
            }
            (Err(first), Err(second)) => {
                warn!(vector_error = %first, graph_error = %second, "both retrieval arms failed");
                return Err(first);
            }
        };

        debug!(
            vector_hits = vector_hits.len(),
            matched_entities = graph_arm.matched.len(),
            traversal_hits = graph_arm.hits.len(),
            "fusing retrieval arms"
        );

        Ok(fuse(
            vector_hits,
            graph_arm,
            options.context_budget_chars,
        ))
    }

    async fn vector_arm(
        &self,
        question: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<ScoredChunk>> {
        let embedding = self
            .retry
            .run("question embedding", || self.embedder.embed(question))
            .await?;
        let hits = self
            .retry
            .run("vector search", || {
                self.vector.query_top_k(&embedding, options.vector_top_k)
            })
            .await?;
        Ok(hits)
    }

    async fn graph_arm(&self, question: &str, options: &RetrievalOptions) -> Result<GraphArm> {
        let terms = question_terms(question);
        let matched = self
            .retry
            .run("entity match", || self.graph.entities_matching(&terms))
            .await?;
        if matched.is_empty() {
            return Ok(GraphArm::default());
        }

        let start: Vec<EntityId> = matched.iter().map(|e| e.id.clone()).collect();
        let mut query = TraversalQuery::new(start, options.max_hops);
        if let Some(labels) = &options.label_filter {
            query = query.with_labels(labels.clone());
        }
        let hits = self
            .retry
            .run("graph traversal", || self.graph.traverse(&query))
            .await?;
        Ok(GraphArm { matched, hits })
    }
}

async fn bounded<T>(
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| CaseError::Timeout)?,
        None => fut.await,
    }
}

/// Fuse the two arms into a ranked, budget-truncated bundle.
pub fn fuse(vector_hits: Vec<ScoredChunk>, graph: GraphArm, budget_chars: usize) -> ContextBundle {
    let mut fused: IndexMap<FactKey, RetrievalCandidate> = IndexMap::new();

    let mut names: HashMap<EntityId, String> = HashMap::new();
    for entity in &graph.matched {
        names.insert(entity.id.clone(), entity.display_name.clone());
    }
    for hit in &graph.hits {
        if let TraversalNode::Entity(entity) = &hit.node {
            names.insert(entity.id.clone(), entity.display_name.clone());
        }
    }
    let name_of = |id: &EntityId| {
        names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.name_part().to_string())
    };

    for entity in &graph.matched {
        push(
            &mut fused,
            Fact::Entity {
                id: entity.id.clone(),
                name: entity.display_name.clone(),
                kind: entity.kind,
            },
            1.0,
            Provenance::Graph,
        );
    }

    for hit in &graph.hits {
        let score = 1.0 / (1.0 + f32::from(hit.distance));
        match &hit.node {
            TraversalNode::Entity(entity) => {
                push(
                    &mut fused,
                    Fact::Entity {
                        id: entity.id.clone(),
                        name: entity.display_name.clone(),
                        kind: entity.kind,
                    },
                    score,
                    Provenance::Graph,
                );
            }
            TraversalNode::Chunk { chunk_id, text } => {
                push(
                    &mut fused,
                    Fact::Chunk {
                        chunk_id: chunk_id.clone(),
                        source_document: None,
                        text: text.clone(),
                    },
                    score,
                    Provenance::Graph,
                );
            }
        }
        if let Some(rel) = &hit.via {
            push(
                &mut fused,
                Fact::Edge {
                    source_name: name_of(&rel.source),
                    target_name: name_of(&rel.target),
                    source_id: rel.source.clone(),
                    target_id: rel.target.clone(),
                    label: rel.label,
                },
                score,
                Provenance::Graph,
            );
        }
    }

    for chunk in vector_hits {
        push(
            &mut fused,
            Fact::Chunk {
                chunk_id: chunk.chunk_id,
                source_document: None,
                text: chunk.text,
            },
            chunk.score,
            Provenance::Vector,
        );
    }

    let mut ranked: Vec<(usize, RetrievalCandidate)> =
        fused.into_values().enumerate().map(|(i, c)| (i, c)).collect();
    ranked.sort_by(|(ia, a), (ib, b)| {
        b.score
            .total_cmp(&a.score)
            .then(b.provenance.priority().cmp(&a.provenance.priority()))
            .then(ia.cmp(ib))
    });

    // Truncate lowest-ranked facts until the rendered bundle fits.
    let mut used = 0usize;
    let mut candidates = Vec::new();
    for (_, candidate) in ranked {
        let cost = candidate.fact.render().chars().count();
        if used + cost > budget_chars && !candidates.is_empty() {
            break;
        }
        used += cost;
        candidates.push(candidate);
    }

    ContextBundle { candidates }
}

fn push(
    fused: &mut IndexMap<FactKey, RetrievalCandidate>,
    fact: Fact,
    score: f32,
    provenance: Provenance,
) {
    match fused.entry(fact.key()) {
        indexmap::map::Entry::Occupied(mut entry) => {
            let existing = entry.get_mut();
            existing.score += score;
            existing.provenance = existing.provenance.merged_with(provenance);
        }
        indexmap::map::Entry::Vacant(entry) => {
            entry.insert(RetrievalCandidate {
                fact,
                score,
                provenance,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::stores::memory::{MemoryGraph, MemoryVectorIndex};
    use crate::testing::MockModel;
    use crate::traits::graph::UpsertOutcome;
    use crate::types::entity::{EntityKind, RelationLabel, Relationship};

    fn entity(name: &str, seq: u64) -> Entity {
        Entity::new(EntityKind::Person, name, normalize_name(name), seq)
    }

    /// Vector index whose next N similarity queries fail transiently.
    struct FlakyVectorIndex {
        inner: MemoryVectorIndex,
        query_failures: AtomicU32,
    }

    impl FlakyVectorIndex {
        fn failing_queries(n: u32) -> Self {
            Self {
                inner: MemoryVectorIndex::new(),
                query_failures: AtomicU32::new(n),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FlakyVectorIndex {
        async fn upsert_embedding(
            &self,
            chunk_id: &str,
            vector: &[f32],
            text: &str,
        ) -> StoreResult<UpsertOutcome> {
            self.inner.upsert_embedding(chunk_id, vector, text).await
        }

        async fn query_top_k(&self, vector: &[f32], k: usize) -> StoreResult<Vec<ScoredChunk>> {
            let failed = self
                .query_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(StoreError::Unavailable("index briefly down".into()));
            }
            self.inner.query_top_k(vector, k).await
        }

        async fn contains(&self, chunk_id: &str) -> StoreResult<bool> {
            self.inner.contains(chunk_id).await
        }

        async fn chunk_count(&self) -> StoreResult<usize> {
            self.inner.chunk_count().await
        }
    }

    #[tokio::test]
    async fn transient_vector_failure_is_retried() {
        let graph = MemoryGraph::new();
        let vector = FlakyVectorIndex::failing_queries(1);
        vector
            .upsert_embedding("c1", &[1.0, 0.0], "the knife was in the pantry")
            .await
            .unwrap();
        let model = MockModel::new().with_embedding("where was the knife", vec![1.0, 0.0]);
        let retry = RetryPolicy::immediate(3);
        let retriever = Retriever::new(&graph, &vector, &model, &retry);

        let bundle = retriever
            .retrieve("where was the knife", &RetrievalOptions::default())
            .await
            .unwrap();

        // The first query failed transiently; the retry still fills the arm.
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.candidates[0].provenance, Provenance::Vector);
    }

    #[test]
    fn question_terms_prefer_longer_ngrams() {
        let terms = question_terms("Who killed Chef Firass?");
        // Trigram windows come first, then bigrams, then single tokens.
        let firass_pos = terms.iter().position(|t| t == "firass").unwrap();
        let phrase_pos = terms
            .iter()
            .position(|t| t == "killed chef firass")
            .unwrap();
        assert!(phrase_pos < firass_pos);
        // Windows never exceed the n-gram cap.
        assert!(terms
            .iter()
            .all(|t| t.split_whitespace().count() <= MAX_TERM_TOKENS));
    }

    #[test]
    fn cross_arm_fact_is_marked_both_and_scores_sum() {
        let chunk_hit = ScoredChunk {
            chunk_id: "c1".into(),
            text: "the knife was found".into(),
            score: 0.8,
        };
        let graph = GraphArm {
            matched: vec![],
            hits: vec![TraversalHit {
                node: TraversalNode::Chunk {
                    chunk_id: "c1".into(),
                    text: "the knife was found".into(),
                },
                via: None,
                distance: 1,
            }],
        };

        let bundle = fuse(vec![chunk_hit], graph, 10_000);
        assert_eq!(bundle.len(), 1);
        let top = &bundle.candidates[0];
        assert_eq!(top.provenance, Provenance::Both);
        assert!((top.score - 1.3).abs() < 1e-6);
    }

    #[test]
    fn matched_entities_outrank_distant_hits() {
        let firass = entity("Chef Firass", 0);
        let layla = entity("Layla", 1);
        let graph = GraphArm {
            matched: vec![firass.clone()],
            hits: vec![TraversalHit {
                node: TraversalNode::Entity(layla.clone()),
                via: Some(Relationship::new(
                    firass.id.clone(),
                    layla.id.clone(),
                    RelationLabel::CausedDeath,
                )),
                distance: 1,
            }],
        };

        let bundle = fuse(vec![], graph, 10_000);
        assert_eq!(bundle.candidates[0].fact.key(), FactKey::Entity(firass.id));
        // The killing edge carries the hop-1 score and renders with names.
        let edge = bundle
            .candidates
            .iter()
            .find(|c| matches!(c.fact, Fact::Edge { .. }))
            .unwrap();
        assert_eq!(
            edge.fact.render(),
            "Chef Firass --[CAUSED_DEATH]--> Layla"
        );
        assert!((edge.score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn ties_break_toward_stronger_provenance() {
        let chunk = ScoredChunk {
            chunk_id: "c1".into(),
            text: "x".into(),
            score: 0.5,
        };
        let graph = GraphArm {
            matched: vec![],
            hits: vec![TraversalHit {
                node: TraversalNode::Entity(entity("Layla", 0)),
                via: None,
                distance: 1,
            }],
        };

        let bundle = fuse(vec![chunk], graph, 10_000);
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.candidates[0].provenance, Provenance::Graph);
        assert_eq!(bundle.candidates[1].provenance, Provenance::Vector);
    }

    #[test]
    fn budget_drops_lowest_ranked_facts() {
        let hits = vec![
            ScoredChunk {
                chunk_id: "c1".into(),
                text: "a".repeat(50),
                score: 0.9,
            },
            ScoredChunk {
                chunk_id: "c2".into(),
                text: "b".repeat(50),
                score: 0.1,
            },
        ];

        let bundle = fuse(hits, GraphArm::default(), 80);
        assert_eq!(bundle.len(), 1);
        assert!(matches!(
            &bundle.candidates[0].fact,
            Fact::Chunk { chunk_id, .. } if chunk_id == "c1"
        ));
    }

    #[test]
    fn first_fact_is_kept_even_when_over_budget() {
        let hits = vec![ScoredChunk {
            chunk_id: "c1".into(),
            text: "z".repeat(500),
            score: 0.9,
        }];
        let bundle = fuse(hits, GraphArm::default(), 10);
        assert_eq!(bundle.len(), 1);
    }
}

//! Corpus ingestion: chunk, embed, extract concurrently, then merge into
//! the graph through the single-writer canonicalizer.
//!
//! Chunk failures are chunk-scoped: a malformed extraction or a failed
//! embedding skips that chunk (recorded on the report) and the batch keeps
//! going. Graph writes happen on one task, in chunk order, so repeated runs
//! over the same corpus produce the same canonical entities.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::{CaseError, Result};
use crate::pipeline::canonical::Canonicalizer;
use crate::pipeline::chunk::split_document;
use crate::pipeline::extract::Extractor;
use crate::pipeline::prompts::extraction_prompt_hash;
use crate::retry::RetryPolicy;
use crate::traits::graph::GraphStore;
use crate::traits::model::{EmbeddingClient, GenerationClient};
use crate::traits::vector::VectorIndex;
use crate::types::candidate::ChunkExtraction;
use crate::types::chunk::{Corpus, EvidenceChunk};
use crate::types::config::IngestOptions;
use crate::types::report::IngestReport;

enum ChunkOutcome {
    AlreadyIndexed(EvidenceChunk),
    Extracted {
        chunk: EvidenceChunk,
        embedding: Vec<f32>,
        extraction: ChunkExtraction,
    },
    Failed {
        chunk: EvidenceChunk,
        error: CaseError,
    },
}

/// Ingest a corpus end to end, returning the run report.
pub async fn ingest_corpus<G, V, E, N>(
    graph: &G,
    vector: &V,
    embedder: &E,
    model: &N,
    corpus: &Corpus,
    options: &IngestOptions,
    retry: &RetryPolicy,
) -> Result<IngestReport>
where
    G: GraphStore + ?Sized,
    V: VectorIndex + ?Sized,
    E: EmbeddingClient + ?Sized,
    N: GenerationClient + ?Sized,
{
    let mut report = IngestReport::new();
    report.prompt_hash = extraction_prompt_hash();
    let extractor = Extractor::new(model, retry, options.max_parse_attempts);

    let chunks: Vec<EvidenceChunk> = corpus
        .documents
        .iter()
        .flat_map(|doc| split_document(doc, options.max_chunk_chars))
        .collect();
    report.chunks_processed = chunks.len();

    info!(
        run_id = %report.run_id,
        documents = corpus.documents.len(),
        chunks = chunks.len(),
        "starting ingest"
    );

    let mut canonicalizer = Canonicalizer::load(graph, retry).await?;

    // Embedding and extraction fan out; buffered() keeps chunk order so the
    // merge below stays deterministic.
    let mut outcomes = stream::iter(chunks)
        .map(|chunk| process_chunk(chunk, vector, embedder, &extractor, retry))
        .buffered(options.concurrency.max(1));

    while let Some(outcome) = outcomes.next().await {
        match outcome {
            ChunkOutcome::AlreadyIndexed(chunk) => {
                report.chunks_already_indexed += 1;
                info!(chunk_id = %chunk.chunk_id, "chunk already indexed, skipping");
            }
            ChunkOutcome::Extracted {
                chunk,
                embedding,
                extraction,
            } => {
                match canonicalizer.merge_chunk(graph, &chunk, &extraction, retry).await {
                    Ok(stats) => {
                        report.entities_created += stats.entities_created;
                        report.entities_merged += stats.entities_merged;
                        report.relationships_created += stats.relationships_created;
                        report.relationships_existing += stats.relationships_existing;

                        // The embedding is written last: presence in the vector
                        // index marks the chunk fully ingested, so a chunk whose
                        // merge failed stays retryable on the next run.
                        let marked = retry
                            .run("embedding upsert", || {
                                vector.upsert_embedding(&chunk.chunk_id, &embedding, &chunk.text)
                            })
                            .await;
                        match marked {
                            Ok(_) => report.chunks_indexed += 1,
                            Err(error) => {
                                warn!(chunk_id = %chunk.chunk_id, %error, "embedding upsert failed, chunk will be retried");
                                report.skip(&chunk.chunk_id, &chunk.source_document, error.to_string());
                            }
                        }
                    }
                    Err(error) => {
                        warn!(chunk_id = %chunk.chunk_id, %error, "graph merge failed, skipping chunk");
                        report.skip(&chunk.chunk_id, &chunk.source_document, error.to_string());
                    }
                }
            }
            ChunkOutcome::Failed { chunk, error } => {
                warn!(chunk_id = %chunk.chunk_id, %error, "chunk failed, skipping");
                report.skip(&chunk.chunk_id, &chunk.source_document, error.to_string());
            }
        }
    }

    info!(
        run_id = %report.run_id,
        indexed = report.chunks_indexed,
        already_indexed = report.chunks_already_indexed,
        entities_created = report.entities_created,
        relationships_created = report.relationships_created,
        skipped = report.skipped_chunks.len(),
        "ingest complete"
    );

    Ok(report)
}

async fn process_chunk<V, E, N>(
    chunk: EvidenceChunk,
    vector: &V,
    embedder: &E,
    extractor: &Extractor<'_, N>,
    retry: &RetryPolicy,
) -> ChunkOutcome
where
    V: VectorIndex + ?Sized,
    E: EmbeddingClient + ?Sized,
    N: GenerationClient + ?Sized,
{
    match retry.run("index lookup", || vector.contains(&chunk.chunk_id)).await {
        Ok(true) => return ChunkOutcome::AlreadyIndexed(chunk),
        Ok(false) => {}
        Err(error) => {
            return ChunkOutcome::Failed {
                chunk,
                error: error.into(),
            }
        }
    }

    let embedding = match retry
        .run("chunk embedding", || embedder.embed(&chunk.text))
        .await
    {
        Ok(vector) => vector,
        Err(error) => {
            return ChunkOutcome::Failed {
                chunk,
                error: error.into(),
            }
        }
    };

    let extraction = match extractor.extract_chunk(&chunk).await {
        Ok(extraction) => extraction,
        Err(error) => return ChunkOutcome::Failed { chunk, error },
    };

    ChunkOutcome::Extracted {
        chunk,
        embedding,
        extraction,
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
    use crate::traits::graph::{TraversalHit, TraversalQuery, UpsertOutcome};
    use crate::types::entity::{Entity, EntityId, Relationship};

    /// Graph whose next N entity upserts fail with a transient error.
    struct UnreliableGraph {
        inner: MemoryGraph,
        upsert_failures: AtomicU32,
    }

    impl UnreliableGraph {
        fn new() -> Self {
            Self {
                inner: MemoryGraph::new(),
                upsert_failures: AtomicU32::new(0),
            }
        }

        fn fail_next_upserts(&self, n: u32) {
            self.upsert_failures.store(n, Ordering::SeqCst);
        }

        fn take_failure(&self) -> bool {
            self.upsert_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl GraphStore for UnreliableGraph {
        async fn upsert_entity(&self, entity: &Entity) -> StoreResult<UpsertOutcome> {
            if self.take_failure() {
                return Err(StoreError::Unavailable("graph briefly down".into()));
            }
            self.inner.upsert_entity(entity).await
        }

        async fn upsert_relationship(&self, rel: &Relationship) -> StoreResult<UpsertOutcome> {
            self.inner.upsert_relationship(rel).await
        }

        async fn upsert_mention(
            &self,
            chunk: &EvidenceChunk,
            entity: &EntityId,
        ) -> StoreResult<UpsertOutcome> {
            self.inner.upsert_mention(chunk, entity).await
        }

        async fn all_entities(&self) -> StoreResult<Vec<Entity>> {
            self.inner.all_entities().await
        }

        async fn entities_matching(&self, normalized_terms: &[String]) -> StoreResult<Vec<Entity>> {
            self.inner.entities_matching(normalized_terms).await
        }

        async fn relationship_count(&self, id: &EntityId) -> StoreResult<usize> {
            self.inner.relationship_count(id).await
        }

        async fn traverse(&self, query: &TraversalQuery) -> StoreResult<Vec<TraversalHit>> {
            self.inner.traverse(query).await
        }

        async fn entity_count(&self) -> StoreResult<usize> {
            self.inner.entity_count().await
        }

        async fn relationship_total(&self) -> StoreResult<usize> {
            self.inner.relationship_total().await
        }
    }

    const EXTRACTION: &str = r#"{
        "entities": [
            {"name": "Chef Firass", "type": "person"},
            {"name": "Layla", "type": "person"}
        ],
        "relationships": [
            {"source": "Chef Firass", "target": "Layla", "type": "CAUSED_DEATH"}
        ]
    }"#;

    #[tokio::test]
    async fn single_document_populates_both_indexes() {
        let graph = MemoryGraph::new();
        let vector = MemoryVectorIndex::new();
        let model = MockModel::new().with_extraction("Firass", EXTRACTION);
        let corpus = Corpus::new().with_document("report.txt", "Chef Firass poisoned Layla.");

        let report = ingest_corpus(
            &graph,
            &vector,
            &model,
            &model,
            &corpus,
            &IngestOptions::default(),
            &RetryPolicy::immediate(1),
        )
        .await
        .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.chunks_processed, 1);
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(report.entities_created, 2);
        assert_eq!(report.relationships_created, 1);
        assert_eq!(report.prompt_hash, extraction_prompt_hash());
        assert_eq!(graph.entity_count().await.unwrap(), 2);
        assert_eq!(vector.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reingestion_is_a_no_op() {
        let graph = MemoryGraph::new();
        let vector = MemoryVectorIndex::new();
        let model = MockModel::new().with_extraction("Firass", EXTRACTION);
        let corpus = Corpus::new().with_document("report.txt", "Chef Firass poisoned Layla.");
        let options = IngestOptions::default();
        let retry = RetryPolicy::immediate(1);

        ingest_corpus(&graph, &vector, &model, &model, &corpus, &options, &retry)
            .await
            .unwrap();
        let second = ingest_corpus(&graph, &vector, &model, &model, &corpus, &options, &retry)
            .await
            .unwrap();

        assert_eq!(second.chunks_already_indexed, 1);
        assert_eq!(second.chunks_indexed, 0);
        assert_eq!(second.entities_created, 0);
        assert_eq!(second.relationships_created, 0);
        assert_eq!(graph.entity_count().await.unwrap(), 2);
        assert_eq!(vector.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_chunk_is_skipped_without_stopping_the_batch() {
        let graph = MemoryGraph::new();
        let vector = MemoryVectorIndex::new();
        // First document's extraction never parses; second one is fine.
        let model = MockModel::new()
            .with_extraction("garbled", "this is not json")
            .with_extraction("Firass", EXTRACTION);
        let corpus = Corpus::new()
            .with_document("a_bad.txt", "garbled testimony")
            .with_document("b_good.txt", "Chef Firass poisoned Layla.");

        let report = ingest_corpus(
            &graph,
            &vector,
            &model,
            &model,
            &corpus,
            &IngestOptions::default(),
            &RetryPolicy::immediate(1),
        )
        .await
        .unwrap();

        assert_eq!(report.skipped_chunks.len(), 1);
        assert_eq!(report.skipped_chunks[0].source_document, "a_bad.txt");
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(graph.entity_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn transient_graph_failure_during_merge_is_retried() {
        let graph = UnreliableGraph::new();
        graph.fail_next_upserts(1);
        let vector = MemoryVectorIndex::new();
        let model = MockModel::new().with_extraction("Firass", EXTRACTION);
        let corpus = Corpus::new().with_document("report.txt", "Chef Firass poisoned Layla.");

        let report = ingest_corpus(
            &graph,
            &vector,
            &model,
            &model,
            &corpus,
            &IngestOptions::default(),
            &RetryPolicy::immediate(3),
        )
        .await
        .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(graph.entity_count().await.unwrap(), 2);
        assert_eq!(vector.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn chunk_with_failed_merge_is_reingested_on_the_next_run() {
        let graph = UnreliableGraph::new();
        let vector = MemoryVectorIndex::new();
        let model = MockModel::new().with_extraction("Firass", EXTRACTION);
        let corpus = Corpus::new().with_document("report.txt", "Chef Firass poisoned Layla.");
        let options = IngestOptions::default();
        let retry = RetryPolicy::immediate(2);

        // Graph is down for the whole first run: the chunk is skipped and,
        // crucially, NOT marked ingested in the vector index.
        graph.fail_next_upserts(u32::MAX);
        let first = ingest_corpus(&graph, &vector, &model, &model, &corpus, &options, &retry)
            .await
            .unwrap();
        assert_eq!(first.skipped_chunks.len(), 1);
        assert_eq!(first.chunks_indexed, 0);
        assert_eq!(vector.chunk_count().await.unwrap(), 0);
        assert_eq!(graph.entity_count().await.unwrap(), 0);

        // Graph recovers; the next run picks the chunk up again.
        graph.fail_next_upserts(0);
        let second = ingest_corpus(&graph, &vector, &model, &model, &corpus, &options, &retry)
            .await
            .unwrap();
        assert!(second.is_clean());
        assert_eq!(second.chunks_already_indexed, 0);
        assert_eq!(second.chunks_indexed, 1);
        assert_eq!(graph.entity_count().await.unwrap(), 2);
        assert_eq!(vector.chunk_count().await.unwrap(), 1);
    }
}

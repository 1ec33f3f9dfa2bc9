//! `CaseIndex`: the facade tying ingestion, retrieval, and synthesis
//! together over pluggable stores and model clients.

use std::path::Path;

use crate::error::Result;
use crate::pipeline::ingest::ingest_corpus;
use crate::pipeline::retrieve::Retriever;
use crate::pipeline::synthesize::synthesize;
use crate::retry::RetryPolicy;
use crate::traits::graph::GraphStore;
use crate::traits::model::{EmbeddingClient, GenerationClient};
use crate::traits::vector::VectorIndex;
use crate::types::chunk::Corpus;
use crate::types::config::{IngestOptions, RetrievalOptions};
use crate::types::context::{ContextBundle, QueryOutcome};
use crate::types::report::IngestReport;

/// A case evidence index over a graph store, a vector index, and the two
/// model clients. All heavy lifting lives in the pipeline modules; this
/// type wires them together with shared options and retry policy.
pub struct CaseIndex<G, V, E, N> {
    graph: G,
    vector: V,
    embedder: E,
    model: N,
    ingest_options: IngestOptions,
    retrieval_options: RetrievalOptions,
    retry: RetryPolicy,
}

impl<G, V, E, N> CaseIndex<G, V, E, N>
where
    G: GraphStore,
    V: VectorIndex,
    E: EmbeddingClient,
    N: GenerationClient,
{
    pub fn new(graph: G, vector: V, embedder: E, model: N) -> Self {
        Self {
            graph,
            vector,
            embedder,
            model,
            ingest_options: IngestOptions::default(),
            retrieval_options: RetrievalOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_ingest_options(mut self, options: IngestOptions) -> Self {
        self.ingest_options = options;
        self
    }

    pub fn with_retrieval_options(mut self, options: RetrievalOptions) -> Self {
        self.retrieval_options = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ingest a corpus: chunk, embed, extract, and merge into the graph.
    pub async fn ingest_corpus(&self, corpus: &Corpus) -> Result<IngestReport> {
        ingest_corpus(
            &self.graph,
            &self.vector,
            &self.embedder,
            &self.model,
            corpus,
            &self.ingest_options,
            &self.retry,
        )
        .await
    }

    /// Ingest every `.txt` file in a directory.
    pub async fn ingest_dir(&self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let corpus = Corpus::from_dir(path)?;
        self.ingest_corpus(&corpus).await
    }

    /// Retrieve the fused context bundle for a question without answering.
    pub async fn retrieve(&self, question: &str) -> Result<ContextBundle> {
        Retriever::new(&self.graph, &self.vector, &self.embedder, &self.retry)
            .retrieve(question, &self.retrieval_options)
            .await
    }

    /// Answer a question grounded in the ingested evidence.
    pub async fn ask(&self, question: &str) -> Result<QueryOutcome> {
        let context = self.retrieve(question).await?;
        synthesize(
            &self.model,
            &self.retry,
            question,
            context,
            &self.retrieval_options,
        )
        .await
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn vector(&self) -> &V {
        &self.vector
    }
}

//! Evidence-Grounded Case Question Answering
//!
//! A knowledge-graph-plus-vector-index library that ingests case evidence
//! documents and answers natural language questions grounded in what the
//! evidence actually says.
//!
//! # Design Philosophy
//!
//! **"Answer from the case files, or not at all"**
//!
//! - Structured extraction into a typed knowledge graph
//! - Hybrid retrieval: semantic search fused with graph traversal
//! - Every answer traceable to the facts that produced it
//! - Questions the evidence cannot ground get an explicit refusal
//! - Library handles mechanics, adapters handle backends
//!
//! # Usage
//!
//! ```rust,ignore
//! use casegraph::{CaseIndex, Corpus, MemoryGraph, MemoryVectorIndex};
//! use casegraph::testing::MockModel;
//!
//! let model = MockModel::new();
//! let index = CaseIndex::new(
//!     MemoryGraph::new(),
//!     MemoryVectorIndex::new(),
//!     model.clone(),
//!     model,
//! );
//!
//! // Ingest every .txt file in the case directory
//! let report = index.ingest_dir("data/").await?;
//!
//! // Ask a grounded question
//! let outcome = index.ask("Who had a motive to kill the chef?").await?;
//! println!("{}", outcome.answer);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (GraphStore, VectorIndex, model clients)
//! - [`types`] - Domain data types (entities, chunks, context bundles)
//! - [`pipeline`] - Ingestion and query pipeline
//! - [`stores`] - Storage implementations (in-memory, Neo4j)
//! - [`testing`] - Mock model client for testing

pub mod ai;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{CaseError, ModelError, Result, StoreError};
pub use pipeline::index::CaseIndex;
pub use retry::RetryPolicy;
pub use stores::memory::{MemoryGraph, MemoryVectorIndex};
pub use traits::{
    graph::{GraphStore, TraversalHit, TraversalNode, TraversalQuery, UpsertOutcome},
    model::{EmbeddingClient, GenerationClient},
    vector::{ScoredChunk, VectorIndex},
};
pub use types::{
    chunk::{Corpus, EvidenceChunk, EvidenceDocument},
    config::{IngestOptions, RetrievalOptions},
    context::{ContextBundle, Fact, Provenance, QueryOutcome, RetrievalCandidate},
    entity::{Entity, EntityId, EntityKind, RelationLabel, Relationship},
    report::{IngestReport, SkippedChunk},
};

#[cfg(feature = "gemini")]
pub use ai::gemini::GeminiClient;

#[cfg(feature = "neo4j")]
pub use stores::neo4j::Neo4jStore;

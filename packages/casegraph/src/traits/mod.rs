//! Trait seams for external collaborators.
//!
//! All four external services (graph database, vector index, embedding
//! model, generation model) are injected through these traits so tests can
//! substitute in-memory fakes.

pub mod graph;
pub mod model;
pub mod vector;

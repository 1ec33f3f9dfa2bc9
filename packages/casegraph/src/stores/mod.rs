//! Storage adapters behind the [`crate::traits::graph::GraphStore`] and
//! [`crate::traits::vector::VectorIndex`] seams.

pub mod memory;

#[cfg(feature = "neo4j")]
pub mod neo4j;

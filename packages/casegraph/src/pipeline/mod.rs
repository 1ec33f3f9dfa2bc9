//! The ingestion and query pipeline.

pub mod canonical;
pub mod chunk;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod prompts;
pub mod retrieve;
pub mod synthesize;

//! Core data types.

pub mod candidate;
pub mod chunk;
pub mod config;
pub mod context;
pub mod entity;
pub mod report;

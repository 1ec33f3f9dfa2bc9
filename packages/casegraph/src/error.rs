//! Typed errors for the casegraph library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Transience (whether a failure
//! is worth retrying) is expressed through [`crate::retry::Transient`] so a
//! single retry policy covers every external call category.

use thiserror::Error;

use crate::retry::Transient;

/// Errors surfaced by graph and vector store adapters.
///
/// Adapters translate backend responses into these variants and nothing
/// else; retry and fusion logic live above the adapter layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or returned a server-side failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Write conflicted with existing state
    #[error("store conflict: {0}")]
    Conflict(String),

    /// Referenced node, edge, or chunk does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors surfaced by embedding and generation model clients.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model service unreachable or returned a transient failure
    #[error("model service unavailable: {0}")]
    Unavailable(String),

    /// Request quota exhausted
    #[error("model quota exceeded")]
    QuotaExceeded,

    /// Response did not match the expected wire shape
    #[error("malformed model response: {0}")]
    Malformed(String),
}

/// Errors that can occur during ingestion and query operations.
#[derive(Debug, Error)]
pub enum CaseError {
    /// Graph or vector backend failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Embedding or generation service failure
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Model extraction output failed strict schema validation.
    ///
    /// Recoverable: the chunk is re-prompted up to a bound, then skipped.
    #[error("extraction parse failure: {reason}")]
    ExtractionParse { reason: String },

    /// Corpus files could not be read
    #[error("failed to read corpus at {path}: {source}")]
    Corpus {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Retrieval timed out with neither source responding
    #[error("retrieval timed out before any source responded")]
    Timeout,

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl Transient for ModelError {
    fn is_transient(&self) -> bool {
        matches!(self, ModelError::Unavailable(_) | ModelError::QuotaExceeded)
    }
}

impl Transient for CaseError {
    fn is_transient(&self) -> bool {
        match self {
            CaseError::Store(e) => e.is_transient(),
            CaseError::Model(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for casegraph operations.
pub type Result<T> = std::result::Result<T, CaseError>;

/// Result type alias for store adapter operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for model client operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_unavailable_is_transient() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(!StoreError::NotFound("x".into()).is_transient());
        assert!(!StoreError::Conflict("y".into()).is_transient());
    }

    #[test]
    fn parse_failure_is_not_transient() {
        let err = CaseError::ExtractionParse {
            reason: "bad json".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn quota_exceeded_is_transient_through_case_error() {
        let err = CaseError::Model(ModelError::QuotaExceeded);
        assert!(err.is_transient());
    }
}

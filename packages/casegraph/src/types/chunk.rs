//! Evidence chunks and corpus loading.
//!
//! Chunk identity is the SHA-256 hash of `(source document, text)`, so
//! re-ingesting the same material is a no-op rather than a duplicate
//! insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::{CaseError, Result};

/// A bounded slice of evidence text with a stable content-hash identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub chunk_id: String,

    /// Name of the document this chunk came from
    pub source_document: String,

    pub text: String,

    pub ingested_at: DateTime<Utc>,
}

impl EvidenceChunk {
    pub fn new(source_document: impl Into<String>, text: impl Into<String>) -> Self {
        let source_document = source_document.into();
        let text = text.into();
        let chunk_id = Self::hash_content(&source_document, &text);
        Self {
            chunk_id,
            source_document,
            text,
            ingested_at: Utc::now(),
        }
    }

    /// Stable content-hash identity for a chunk.
    pub fn hash_content(source_document: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_document.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A single evidence document before chunking.
#[derive(Debug, Clone)]
pub struct EvidenceDocument {
    pub name: String,
    pub text: String,
}

impl EvidenceDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// A fixed set of evidence documents to ingest.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub documents: Vec<EvidenceDocument>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: impl IntoIterator<Item = EvidenceDocument>) -> Self {
        Self {
            documents: documents.into_iter().collect(),
        }
    }

    /// Add a document.
    pub fn with_document(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.push(EvidenceDocument::new(name, text));
        self
    }

    /// Load every `.txt` file in a directory, sorted by file name so runs
    /// are deterministic.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let read_err = |source: std::io::Error| CaseError::Corpus {
            path: path.display().to_string(),
            source,
        };

        let mut files: Vec<_> = std::fs::read_dir(path)
            .map_err(read_err)?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(read_err)?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let text = std::fs::read_to_string(&file).map_err(|source| CaseError::Corpus {
                path: file.display().to_string(),
                source,
            })?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            documents.push(EvidenceDocument::new(name, text));
        }

        Ok(Self { documents })
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_stable() {
        let a = EvidenceChunk::new("report.txt", "The knife was found.");
        let b = EvidenceChunk::new("report.txt", "The knife was found.");
        assert_eq!(a.chunk_id, b.chunk_id);
        assert_eq!(a.chunk_id.len(), 64);
    }

    #[test]
    fn chunk_id_depends_on_source_document() {
        let a = EvidenceChunk::new("report.txt", "Same text");
        let b = EvidenceChunk::new("witness.txt", "Same text");
        assert_ne!(a.chunk_id, b.chunk_id);
    }

    #[test]
    fn corpus_builder_collects_documents() {
        let corpus = Corpus::new()
            .with_document("a.txt", "First")
            .with_document("b.txt", "Second");
        assert_eq!(corpus.documents.len(), 2);
        assert_eq!(corpus.documents[0].name, "a.txt");
    }
}

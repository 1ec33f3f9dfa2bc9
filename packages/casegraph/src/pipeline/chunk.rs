//! Document chunking.
//!
//! Paragraphs (blank-line separated) are packed into chunks under a
//! character budget; a single oversized paragraph is hard-split at char
//! boundaries.

use crate::types::chunk::{EvidenceChunk, EvidenceDocument};

/// Split a document into evidence chunks under `max_chars`.
pub fn split_document(doc: &EvidenceDocument, max_chars: usize) -> Vec<EvidenceChunk> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in doc.text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() > max_chars {
            flush(&mut chunks, doc, &mut current);
            for piece in hard_split(paragraph, max_chars) {
                chunks.push(EvidenceChunk::new(&doc.name, piece));
            }
            continue;
        }

        let would_be = if current.is_empty() {
            paragraph.chars().count()
        } else {
            current.chars().count() + 2 + paragraph.chars().count()
        };

        if would_be > max_chars {
            flush(&mut chunks, doc, &mut current);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    flush(&mut chunks, doc, &mut current);
    chunks
}

fn flush(chunks: &mut Vec<EvidenceChunk>, doc: &EvidenceDocument, current: &mut String) {
    if !current.is_empty() {
        chunks.push(EvidenceChunk::new(&doc.name, current.as_str()));
        current.clear();
    }
}

fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_paragraphs_under_budget() {
        let doc = EvidenceDocument::new("a.txt", "one\n\ntwo\n\nthree");
        let chunks = split_document(&doc, 10);
        // "one\n\ntwo" fits (8 chars), "three" starts a new chunk
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one\n\ntwo");
        assert_eq!(chunks[1].text, "three");
    }

    #[test]
    fn single_small_document_is_one_chunk() {
        let doc = EvidenceDocument::new("a.txt", "The knife was found.\n");
        let chunks = split_document(&doc, 4_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The knife was found.");
        assert_eq!(chunks[0].source_document, "a.txt");
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let doc = EvidenceDocument::new("a.txt", "abcdefghij");
        let chunks = split_document(&doc, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "abcd");
        assert_eq!(chunks[2].text, "ij");
    }

    #[test]
    fn chunking_is_deterministic() {
        let doc = EvidenceDocument::new("a.txt", "alpha\n\nbeta\n\ngamma");
        let a = split_document(&doc, 8);
        let b = split_document(&doc, 8);
        let ids_a: Vec<_> = a.iter().map(|c| c.chunk_id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|c| c.chunk_id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let doc = EvidenceDocument::new("a.txt", "\n\n  \n\n");
        assert!(split_document(&doc, 100).is_empty());
    }
}

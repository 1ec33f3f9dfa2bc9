//! Extractor: turn one evidence chunk into candidate entities and typed
//! relationships.
//!
//! Model output is free-form until it crosses this boundary: raw JSON is
//! deserialized and validated into [`ChunkExtraction`] immediately, and
//! anything non-conforming is a recoverable parse failure. The chunk is
//! re-prompted with a clarifying suffix up to a bound and otherwise skipped
//! by the orchestrator.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CaseError, Result};
use crate::pipeline::prompts::format_extraction_prompt;
use crate::retry::RetryPolicy;
use crate::traits::model::GenerationClient;
use crate::types::candidate::{CandidateEntity, CandidateRelationship, ChunkExtraction};
use crate::types::chunk::EvidenceChunk;
use crate::types::entity::{EntityKind, RelationLabel};

/// Raw extraction response, before validation.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default, alias = "nodes")]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source: String,
    target: String,
    #[serde(rename = "type", alias = "label")]
    label: String,
}

fn parse_error(reason: impl Into<String>) -> CaseError {
    CaseError::ExtractionParse {
        reason: reason.into(),
    }
}

/// Strip markdown code fences some models wrap around JSON output.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate one extraction response.
///
/// Validation is strict: unknown entity types, labels outside the
/// enumerated set, empty names, and relationship endpoints that do not
/// appear in the entity list are all parse failures.
pub fn parse_extraction(chunk_id: &str, raw: &str) -> Result<ChunkExtraction> {
    let raw: RawExtraction = serde_json::from_str(strip_fences(raw))
        .map_err(|e| parse_error(format!("invalid JSON: {e}")))?;

    let mut extraction = ChunkExtraction::new(chunk_id);

    for entity in raw.entities {
        let name = entity.name.trim();
        if name.is_empty() {
            return Err(parse_error("entity with empty name"));
        }
        let kind = EntityKind::parse(&entity.kind)
            .ok_or_else(|| parse_error(format!("unknown entity type {:?}", entity.kind)))?;
        extraction.entities.push(CandidateEntity::new(name, kind));
    }

    let known_name = |name: &str| {
        let folded = name.trim().to_lowercase();
        extraction
            .entities
            .iter()
            .any(|e| e.name.to_lowercase() == folded)
    };

    for rel in raw.relationships {
        let label = RelationLabel::parse(&rel.label)
            .ok_or_else(|| parse_error(format!("unknown relationship label {:?}", rel.label)))?;
        if !known_name(&rel.source) {
            return Err(parse_error(format!(
                "relationship source {:?} not in entities",
                rel.source
            )));
        }
        if !known_name(&rel.target) {
            return Err(parse_error(format!(
                "relationship target {:?} not in entities",
                rel.target
            )));
        }
        extraction.relationships.push(CandidateRelationship::new(
            rel.source.trim(),
            rel.target.trim(),
            label,
        ));
    }

    Ok(extraction)
}

/// Drives extraction calls for one chunk, with the bounded re-prompt loop.
pub struct Extractor<'a, N: GenerationClient + ?Sized> {
    model: &'a N,
    retry: &'a RetryPolicy,
    max_parse_attempts: u32,
}

impl<'a, N: GenerationClient + ?Sized> Extractor<'a, N> {
    pub fn new(model: &'a N, retry: &'a RetryPolicy, max_parse_attempts: u32) -> Self {
        Self {
            model,
            retry,
            max_parse_attempts: max_parse_attempts.max(1),
        }
    }

    /// Extract candidates from one chunk.
    ///
    /// Transient model failures are retried by the shared policy inside
    /// each attempt; parse failures consume attempts and re-prompt with the
    /// failure reason.
    pub async fn extract_chunk(&self, chunk: &EvidenceChunk) -> Result<ChunkExtraction> {
        let mut clarify: Option<String> = None;

        for attempt in 1..=self.max_parse_attempts {
            let prompt = format_extraction_prompt(&chunk.text, clarify.as_deref());
            let response = self
                .retry
                .run("extraction generate", || self.model.generate_json(&prompt))
                .await
                .map_err(CaseError::Model)?;

            match parse_extraction(&chunk.chunk_id, &response) {
                Ok(extraction) => {
                    debug!(
                        chunk_id = %chunk.chunk_id,
                        entities = extraction.entities.len(),
                        relationships = extraction.relationships.len(),
                        "extracted chunk"
                    );
                    return Ok(extraction);
                }
                Err(CaseError::ExtractionParse { reason }) => {
                    warn!(
                        chunk_id = %chunk.chunk_id,
                        attempt,
                        max_attempts = self.max_parse_attempts,
                        %reason,
                        "extraction output failed validation"
                    );
                    clarify = Some(reason);
                }
                Err(other) => return Err(other),
            }
        }

        Err(parse_error(format!(
            "unparseable after {} attempts: {}",
            self.max_parse_attempts,
            clarify.unwrap_or_default()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockModel;

    const VALID: &str = r#"{
        "entities": [
            {"name": "Layla", "type": "Person"},
            {"name": "Knife", "type": "Object"}
        ],
        "relationships": [
            {"source": "Layla", "target": "Knife", "type": "POSSESSES"}
        ]
    }"#;

    #[test]
    fn parses_valid_response() {
        let extraction = parse_extraction("c1", VALID).unwrap();
        assert_eq!(extraction.entities.len(), 2);
        assert_eq!(extraction.relationships.len(), 1);
        assert_eq!(
            extraction.relationships[0].label,
            RelationLabel::Possesses
        );
    }

    #[test]
    fn strips_markdown_fences() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_extraction("c1", &fenced).is_ok());
    }

    #[test]
    fn rejects_unknown_label() {
        let raw = r#"{
            "entities": [{"name": "A", "type": "Person"}, {"name": "B", "type": "Person"}],
            "relationships": [{"source": "A", "target": "B", "type": "ADMIRES"}]
        }"#;
        let err = parse_extraction("c1", raw).unwrap_err();
        assert!(matches!(err, CaseError::ExtractionParse { .. }));
    }

    #[test]
    fn rejects_unknown_entity_type() {
        let raw = r#"{"entities": [{"name": "A", "type": "Ghost"}], "relationships": []}"#;
        assert!(parse_extraction("c1", raw).is_err());
    }

    #[test]
    fn rejects_dangling_endpoint() {
        let raw = r#"{
            "entities": [{"name": "A", "type": "Person"}],
            "relationships": [{"source": "A", "target": "Nobody", "type": "WITNESSED"}]
        }"#;
        let err = parse_extraction("c1", raw).unwrap_err();
        let CaseError::ExtractionParse { reason } = err else {
            panic!("expected parse error");
        };
        assert!(reason.contains("Nobody"));
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let extraction = parse_extraction("c1", "{}").unwrap();
        assert!(extraction.is_empty());
    }

    #[tokio::test]
    async fn reprompts_after_malformed_then_succeeds() {
        let model = MockModel::new()
            .with_malformed_responses(1)
            .with_extraction("knife", VALID);
        let retry = RetryPolicy::immediate(3);
        let extractor = Extractor::new(&model, &retry, 3);

        let chunk = EvidenceChunk::new("a.txt", "The knife belonged to Layla.");
        let extraction = extractor.extract_chunk(&chunk).await.unwrap();
        assert_eq!(extraction.entities.len(), 2);

        // Second prompt carried the clarifying suffix
        let prompts = model.generation_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("previous answer was not valid"));
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let model = MockModel::new().with_malformed_responses(10);
        let retry = RetryPolicy::immediate(3);
        let extractor = Extractor::new(&model, &retry, 2);

        let chunk = EvidenceChunk::new("a.txt", "Some text.");
        let err = extractor.extract_chunk(&chunk).await.unwrap_err();
        assert!(matches!(err, CaseError::ExtractionParse { .. }));
        assert_eq!(model.generation_prompts().len(), 2);
    }
}

//! Model prompts for extraction and answer synthesis.
//!
//! Prompts are fixed templates with `{placeholder}` substitution; the
//! extraction prompt hash identifies which template produced stored data.

use sha2::{Digest, Sha256};

/// Prompt for structured entity/relationship extraction from one chunk.
pub const EXTRACTION_PROMPT: &str = r#"You are a detective analyzing evidence for a case investigation.

Extract from the text below:
1. Persons (suspects, witnesses, victims)
2. Objects (weapons, physical evidence)
3. Locations
4. Events (arguments, movements, discoveries)
5. Organizations

Identify relationships using ONLY these labels:
HAS_MOTIVE, CAUSED_DEATH, LOCATED_AT, ASSOCIATED_WITH, WITNESSED, POSSESSES, WAS_AT, RELATED_TO

Rules:
- Only extract what the text itself supports; never invent entities.
- Every relationship source and target must appear in the entities list.
- Entity "type" must be one of: Person, Object, Location, Event, Organization.

Output STRICT JSON only:
{
  "entities": [{"name": "Name", "type": "Type"}],
  "relationships": [{"source": "Name", "target": "Name", "type": "LABEL"}]
}

Evidence text:
{text}"#;

/// Appended on re-prompt after a parse failure.
pub const CLARIFY_SUFFIX: &str = r#"

IMPORTANT: your previous answer was not valid against the schema ({reason}).
Respond with exactly one JSON object, no markdown fences, no commentary,
using only the listed entity types and relationship labels."#;

/// Prompt assembling the fused context into a grounded answer request.
pub const ANSWER_PROMPT: &str = r#"You are a case analyst. Answer the question using ONLY the facts below.
If the facts are insufficient to answer, say so explicitly instead of guessing.

[Evidence Board (graph connections)]
{graph_facts}

[Case Files (text evidence)]
{evidence}

QUESTION: {question}"#;

/// Canonical answer for questions the corpus cannot ground.
pub const INSUFFICIENT_EVIDENCE_ANSWER: &str =
    "Insufficient evidence: the case files contain no facts relevant to this question.";

/// Hash identifying the extraction prompt template.
pub fn extraction_prompt_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(EXTRACTION_PROMPT.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Format the extraction prompt for a chunk; `clarify_reason` adds the
/// re-prompt suffix after a failed parse.
pub fn format_extraction_prompt(text: &str, clarify_reason: Option<&str>) -> String {
    let mut prompt = EXTRACTION_PROMPT.replace("{text}", text);
    if let Some(reason) = clarify_reason {
        prompt.push_str(&CLARIFY_SUFFIX.replace("{reason}", reason));
    }
    prompt
}

/// Format the answer prompt from the fused context.
pub fn format_answer_prompt(question: &str, graph_facts: &str, evidence: &str) -> String {
    ANSWER_PROMPT
        .replace("{graph_facts}", graph_facts)
        .replace("{evidence}", evidence)
        .replace("{question}", question)
}

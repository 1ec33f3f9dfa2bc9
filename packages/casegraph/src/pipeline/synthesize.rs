//! Answer synthesis from the fused context bundle.
//!
//! Ungroundable questions short-circuit to a fixed refusal without ever
//! touching the generation model, so the system cannot hallucinate an
//! answer out of thin air.

use tracing::{debug, info};

use crate::error::Result;
use crate::pipeline::prompts::{format_answer_prompt, INSUFFICIENT_EVIDENCE_ANSWER};
use crate::retry::RetryPolicy;
use crate::traits::model::GenerationClient;
use crate::types::config::RetrievalOptions;
use crate::types::context::{ContextBundle, QueryOutcome};

/// Synthesize an answer for `question` from `context`, or refuse when the
/// bundle does not ground the question.
pub async fn synthesize<N>(
    model: &N,
    retry: &RetryPolicy,
    question: &str,
    context: ContextBundle,
    options: &RetrievalOptions,
) -> Result<QueryOutcome>
where
    N: GenerationClient + ?Sized,
{
    if !context.is_groundable(options.min_relevance) {
        info!(
            top_score = context.top_score(),
            min_relevance = options.min_relevance,
            "question not groundable, refusing without generation"
        );
        return Ok(QueryOutcome {
            answer: INSUFFICIENT_EVIDENCE_ANSWER.to_string(),
            context,
            groundable: false,
        });
    }

    let prompt = format_answer_prompt(
        question,
        &context.render_graph_facts(),
        &context.render_evidence(),
    );
    debug!(facts = context.len(), "generating grounded answer");

    let answer = retry
        .run("answer generation", || model.generate(&prompt))
        .await?;

    Ok(QueryOutcome {
        answer: answer.trim().to_string(),
        context,
        groundable: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockModel;
    use crate::types::context::{Fact, Provenance, RetrievalCandidate};

    fn bundle_with_score(score: f32) -> ContextBundle {
        ContextBundle {
            candidates: vec![RetrievalCandidate {
                fact: Fact::Chunk {
                    chunk_id: "c1".into(),
                    source_document: Some("report.txt".into()),
                    text: "Chef Firass held the knife.".into(),
                },
                score,
                provenance: Provenance::Vector,
            }],
        }
    }

    #[tokio::test]
    async fn ungroundable_question_skips_the_model() {
        let model = MockModel::new();
        let options = RetrievalOptions::default().with_min_relevance(0.5);

        let outcome = synthesize(
            &model,
            &RetryPolicy::immediate(1),
            "Who stole the moon?",
            bundle_with_score(0.01),
            &options,
        )
        .await
        .unwrap();

        assert!(!outcome.groundable);
        assert_eq!(outcome.answer, INSUFFICIENT_EVIDENCE_ANSWER);
        assert!(model.generation_prompts().is_empty());
    }

    #[tokio::test]
    async fn groundable_question_reaches_the_model_with_evidence() {
        let model = MockModel::new().with_answer("knife", "Chef Firass did it.");
        let options = RetrievalOptions::default();

        let outcome = synthesize(
            &model,
            &RetryPolicy::immediate(1),
            "Who held the knife?",
            bundle_with_score(0.9),
            &options,
        )
        .await
        .unwrap();

        assert!(outcome.groundable);
        assert_eq!(outcome.answer, "Chef Firass did it.");
        let prompts = model.generation_prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("EVIDENCE (report.txt): Chef Firass held the knife."));
        assert!(prompts[0].contains("Who held the knife?"));
    }
}

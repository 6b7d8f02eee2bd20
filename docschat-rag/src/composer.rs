//! Prompt construction and answer generation.

use std::sync::Arc;

use tracing::debug;

use crate::document::{Answer, RetrievalResult};
use crate::error::{RagError, Result};
use crate::generation::GenerativeModel;

/// Sampling temperature for every answer (greedy decoding).
pub const TEMPERATURE: f32 = 0.0;

/// Renders the answer prompt and invokes the generative model.
///
/// The prompt is a literal context block (retrieved passages in ranked order,
/// separated by blank lines), the question, and an `Answer:` cue:
///
/// ```text
/// Context:
/// <passage 1>
///
/// <passage 2>
///
/// Question: <query>
///
/// Answer:
/// ```
#[derive(Clone)]
pub struct AnswerComposer {
    generator: Arc<dyn GenerativeModel>,
    max_output_tokens: u32,
}

impl AnswerComposer {
    /// Create a composer with a fixed output ceiling.
    pub fn new(generator: Arc<dyn GenerativeModel>, max_output_tokens: u32) -> Self {
        Self { generator, max_output_tokens }
    }

    /// Render the prompt for `query` over `contexts`.
    pub fn prompt(query: &str, contexts: &RetrievalResult) -> String {
        format!("Context:\n{}\n\nQuestion: {query}\n\nAnswer:", contexts.contexts().join("\n\n"))
    }

    /// Generate an answer to `query` conditioned on `contexts`.
    ///
    /// # Errors
    ///
    /// Returns the generator's error unchanged, or
    /// [`RagError::GenerationError`] if the model produced only whitespace.
    pub async fn compose(&self, query: &str, contexts: RetrievalResult) -> Result<Answer> {
        let prompt = Self::prompt(query, &contexts);
        debug!(
            model = self.generator.name(),
            prompt_chars = prompt.len(),
            contexts = contexts.len(),
            "generating answer"
        );

        let text = self.generator.generate(&prompt, self.max_output_tokens, TEMPERATURE).await?;
        if text.trim().is_empty() {
            return Err(RagError::GenerationError {
                provider: self.generator.name().to_string(),
                message: "model returned an empty answer".to_string(),
            });
        }

        Ok(Answer { query: query.to_string(), contexts, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, SearchResult};
    use crate::mock::MockGenerator;

    fn contexts(texts: &[&str]) -> RetrievalResult {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| SearchResult {
                chunk: Chunk {
                    content: t.to_string(),
                    source_document: "d".to_string(),
                    position: i,
                },
                score: 1.0 - i as f32 * 0.1,
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn prompt_lists_contexts_in_rank_order() {
        let prompt = AnswerComposer::prompt("Why?", &contexts(&["first", "second"]));
        assert_eq!(prompt, "Context:\nfirst\n\nsecond\n\nQuestion: Why?\n\nAnswer:");
    }

    #[test]
    fn prompt_with_no_contexts_keeps_the_template() {
        let prompt = AnswerComposer::prompt("Why?", &RetrievalResult::default());
        assert_eq!(prompt, "Context:\n\n\nQuestion: Why?\n\nAnswer:");
    }

    #[tokio::test]
    async fn generator_is_called_greedily_with_the_ceiling() {
        let generator = Arc::new(MockGenerator::new("Because."));
        let composer = AnswerComposer::new(generator.clone(), 4000);

        let answer = composer.compose("Why?", contexts(&["ctx"])).await.unwrap();
        assert_eq!(answer.text, "Because.");
        assert_eq!(answer.contexts.contexts(), vec!["ctx"]);

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].max_tokens, 4000);
        assert_eq!(calls[0].temperature, 0.0);
        assert!(calls[0].prompt.ends_with("Question: Why?\n\nAnswer:"));
    }

    #[tokio::test]
    async fn blank_answer_is_a_generation_error() {
        let composer = AnswerComposer::new(Arc::new(MockGenerator::new("   ")), 10);
        let err = composer.compose("Why?", RetrievalResult::default()).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationError { .. }));
    }

    #[tokio::test]
    async fn provider_errors_pass_through_unchanged() {
        let composer = AnswerComposer::new(Arc::new(MockGenerator::failing("quota exceeded")), 10);
        let err = composer.compose("Why?", RetrievalResult::default()).await.unwrap_err();
        assert!(
            matches!(err, RagError::GenerationError { message, .. } if message == "quota exceeded")
        );
    }
}

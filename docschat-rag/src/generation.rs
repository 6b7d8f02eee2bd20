//! Generative model trait used to turn retrieved context into an answer.

use async_trait::async_trait;

use crate::error::Result;

/// A text-generation backend.
///
/// The answer composer calls [`generate`](GenerativeModel::generate) once per
/// question with a fully rendered prompt. Implementations must report provider
/// failures as [`RagError::GenerationError`](crate::RagError::GenerationError)
/// and must not retry on their own.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

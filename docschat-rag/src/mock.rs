//! Deterministic providers for tests and offline runs.
//!
//! - [`HashingEmbedder`] - bag-of-words feature hashing, so texts sharing
//!   words are close in embedding space
//! - [`MockGenerator`] - returns a scripted answer and records every call
//! - [`MockProviderFactory`] - hands out the two above for any API key

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerativeModel;
use crate::service::ProviderFactory;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Embeds text by hashing lowercase alphanumeric words into buckets.
///
/// The output is L2-normalised. Identical input always yields identical
/// output, which makes index builds reproducible.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model: String,
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-long vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { model: "hashing-bow".to_string(), dimensions }
    }

    /// Override the reported model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn bucket(&self, word: &str) -> usize {
        let hash = word
            .bytes()
            .fold(FNV_OFFSET, |acc, b| (acc ^ u64::from(b)).wrapping_mul(FNV_PRIME));
        (hash % self.dimensions.max(1) as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return Ok(vector);
        }
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            vector[self.bucket(&word.to_lowercase())] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Arguments of one [`MockGenerator::generate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCall {
    /// The rendered prompt.
    pub prompt: String,
    /// The output ceiling passed by the caller.
    pub max_tokens: u32,
    /// The sampling temperature passed by the caller.
    pub temperature: f32,
}

/// A [`GenerativeModel`] returning a fixed response (or a fixed error).
#[derive(Debug)]
pub struct MockGenerator {
    response: std::result::Result<String, String>,
    calls: Mutex<Vec<GenerationCall>>,
}

impl MockGenerator {
    /// A generator that always answers `response`.
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: Ok(response.into()), calls: Mutex::new(Vec::new()) }
    }

    /// A generator that always fails with a [`RagError::GenerationError`].
    pub fn failing(message: impl Into<String>) -> Self {
        Self { response: Err(message.into()), calls: Mutex::new(Vec::new()) }
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl GenerativeModel for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(GenerationCall {
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
        });
        self.response.clone().map_err(|message| RagError::GenerationError {
            provider: "mock".to_string(),
            message,
        })
    }
}

/// A [`ProviderFactory`] that ignores the API key and returns shared mocks.
pub struct MockProviderFactory {
    embedder: Arc<HashingEmbedder>,
    generator: Arc<MockGenerator>,
    created: AtomicUsize,
}

impl MockProviderFactory {
    /// Build a factory around the given mocks.
    pub fn new(embedder: HashingEmbedder, generator: MockGenerator) -> Self {
        Self {
            embedder: Arc::new(embedder),
            generator: Arc::new(generator),
            created: AtomicUsize::new(0),
        }
    }

    /// The shared generator, for inspecting recorded calls.
    pub fn generator(&self) -> &Arc<MockGenerator> {
        &self.generator
    }

    /// How many provider clients have been handed out.
    pub fn clients_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for MockProviderFactory {
    fn embedder(&self, _api_key: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.embedder.clone())
    }

    fn generator(&self, _api_key: &str) -> Result<Arc<dyn GenerativeModel>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.generator.clone())
    }
}

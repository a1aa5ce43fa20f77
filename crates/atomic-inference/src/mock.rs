//! Mock inference backends.
//!
//! [`MockEmbedding`] generates embeddings without a network call.
//! Deterministic mode hashes the text with SHA-256, seeds a ChaCha8 stream
//! from the first four digest bytes (little-endian), draws Gaussian
//! components by Box–Muller and L2-normalizes. The same text gives
//! bit-identical vectors on every call and in every process.
//!
//! Random mode draws from the thread RNG and exists for load testing only.
//!
//! [`ScriptedGeneration`] replays canned chat responses in order and records
//! every prompt, for driving the oracles in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use atomic_core::{defaults, EmbeddingBackend, Error, GenerationBackend, Result, Vector};

/// Vector source of a [`MockEmbedding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    Deterministic,
    Random,
}

/// Embedding backend producing unit-length pseudo-random vectors.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimension: usize,
    mode: MockMode,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl MockEmbedding {
    pub fn deterministic() -> Self {
        Self {
            dimension: defaults::EMBED_DIMENSION,
            mode: MockMode::Deterministic,
        }
    }

    pub fn random() -> Self {
        Self {
            dimension: defaults::EMBED_DIMENSION,
            mode: MockMode::Random,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn mode(&self) -> MockMode {
        self.mode
    }

    fn embed_one(&self, text: &str) -> Vector {
        let values = match self.mode {
            MockMode::Deterministic => deterministic_values(text, self.dimension),
            MockMode::Random => unit_gaussian(&mut rand::thread_rng(), self.dimension),
        };
        Vector::from(values)
    }
}

/// Deterministic unit vector for `text` at the default dimension.
pub fn mock_embedding(text: &str) -> Vector {
    Vector::from(deterministic_values(text, defaults::EMBED_DIMENSION))
}

fn text_seed(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    u64::from(u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

fn deterministic_values(text: &str, dimension: usize) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(text_seed(text));
    unit_gaussian(&mut rng, dimension)
}

/// `dimension` standard-normal samples scaled to unit L2 norm.
fn unit_gaussian<R: Rng + ?Sized>(rng: &mut R, dimension: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dimension);
    while values.len() < dimension {
        // u1 in (0, 1] keeps ln(u1) finite
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen::<f64>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        values.push(radius * theta.cos());
        if values.len() < dimension {
            values.push(radius * theta.sin());
        }
    }

    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        let mut unit = vec![0.0f32; dimension];
        if let Some(first) = unit.first_mut() {
            *first = 1.0;
        }
        return unit;
    }
    values.into_iter().map(|v| (v / norm) as f32).collect()
}

#[async_trait]
impl EmbeddingBackend for MockEmbedding {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        match self.mode {
            MockMode::Deterministic => "mock-deterministic",
            MockMode::Random => "mock-random",
        }
    }
}

/// A prompt received by [`ScriptedGeneration`].
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub system: String,
    pub prompt: String,
}

/// Generation backend that returns queued responses in order.
///
/// Once the queue is empty every call fails with an `Inference` error.
#[derive(Clone, Default)]
pub struct ScriptedGeneration {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<Mutex<Vec<ScriptedCall>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedGeneration {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::default(),
        }
    }

    /// Queue another response.
    pub fn push(&self, response: Result<String>) {
        lock(&self.responses).push_back(response);
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        lock(&self.calls).clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.prompt.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGeneration {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        lock(&self.calls).push(ScriptedCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
        });
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(Error::Inference("no scripted response left".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

//! OpenAI-compatible embedding and chat backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use atomic_core::{defaults, EmbeddingBackend, Error, GenerationBackend, Result, Vector};

use super::error::{to_atomic_error, OpenAIErrorCode, Operation};
use super::types::*;

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    /// API key; `None` for local endpoints.
    pub api_key: Option<String>,
    pub embed_model: String,
    pub gen_model: String,
    pub embed_dimension: usize,
    /// Largest number of inputs sent in one embeddings request.
    pub embed_max_batch: usize,
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            embed_model: defaults::EMBED_MODEL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            embed_max_batch: defaults::EMBED_MAX_BATCH,
            timeout_seconds: defaults::OPENAI_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Read `OPENAI_*` variables, falling back to defaults.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(base.base_url),
            api_key: api_key_from_env(),
            embed_model: std::env::var("OPENAI_EMBED_MODEL").unwrap_or(base.embed_model),
            gen_model: std::env::var("OPENAI_GEN_MODEL").unwrap_or(base.gen_model),
            embed_dimension: std::env::var("OPENAI_EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.embed_dimension),
            embed_max_batch: base.embed_max_batch,
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.timeout_seconds),
        }
    }
}

/// `OPENAI_API_KEY`, treating blank values and the template placeholder as unset.
pub fn api_key_from_env() -> Option<String> {
    normalize_api_key(std::env::var("OPENAI_API_KEY").ok())
}

fn normalize_api_key(raw: Option<String>) -> Option<String> {
    raw.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && !k.contains(defaults::OPENAI_PLACEHOLDER_KEY))
}

/// OpenAI-compatible inference backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a POST request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Turn a non-success response into a classified error.
    async fn upstream_error(op: Operation, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (kind, message) = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
            Ok(parsed) => (
                parsed
                    .error
                    .code
                    .or(parsed.error.error_type)
                    .unwrap_or_default(),
                parsed.error.message,
            ),
            Err(_) => (String::new(), format!("HTTP {}", status)),
        };
        let code = OpenAIErrorCode::from_response(status.as_u16(), &kind);
        to_atomic_error(op, code, &message)
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(Operation::Embedding, response).await);
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Provider returned {} embeddings for {} inputs",
                result.data.len(),
                texts.len()
            )));
        }

        // Sort by index to restore input order
        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| Vector::from(d.embedding)).collect())
    }

    async fn chat(&self, system: &str, prompt: &str, json_mode: bool) -> Result<String> {
        let start = Instant::now();
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: None,
            response_format: json_mode.then(ResponseFormat::json_object),
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(Operation::Generation, response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "chat",
            model = %self.config.gen_model,
            prompt_len = prompt.len(),
            response_len = content.len(),
            json_mode,
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished"
        );
        Ok(content)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    /// Embed in chunks of at most `embed_max_batch` inputs. Any chunk failure
    /// fails the whole call.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();
        let batch = self.config.embed_max_batch.max(1);

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed",
            model = %self.config.embed_model,
            input_count = texts.len(),
            chunks = texts.len().div_ceil(batch),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embeddings generated"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt, false).await
    }

    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt, true).await
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}

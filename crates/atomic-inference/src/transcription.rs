//! Audio transcription through a Whisper-compatible HTTP API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use atomic_core::{defaults, Error, Result, TranscriptSegment};

use crate::openai::api_key_from_env;

/// Result of transcribing one audio file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionResult {
    /// Full transcribed text.
    pub full_text: String,
    /// Timestamped segments, relative to the start of the submitted audio.
    pub segments: Vec<TranscriptSegment>,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    /// Total audio duration in seconds.
    pub duration_secs: Option<f64>,
}

/// Backend for transcribing audio.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;

    fn model_name(&self) -> &str;
}

/// OpenAI-compatible Whisper backend (OpenAI, Speaches, faster-whisper-server).
pub struct WhisperBackend {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhisperBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
            timeout_secs: defaults::OPENAI_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// `WHISPER_BASE_URL` / `WHISPER_MODEL`, authenticating with `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        let base_url = std::env::var(defaults::ENV_WHISPER_BASE_URL)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::DEFAULT_WHISPER_BASE_URL.to_string());
        let model = std::env::var(defaults::ENV_WHISPER_MODEL)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::DEFAULT_WHISPER_MODEL.to_string());
        info!(
            subsystem = "inference",
            component = "whisper",
            base_url = %base_url,
            model = %model,
            "Initializing Whisper backend"
        );
        Self::new(base_url, model).with_api_key(api_key_from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// File extension sent with the upload for a MIME type.
fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/aac" => "aac",
        "audio/webm" => "webm",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        _ => "wav",
    }
}

/// Whisper `verbose_json` response.
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let start = Instant::now();
        let url = format!(
            "{}/v1/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );

        let file_part = reqwest::multipart::Part::bytes(audio_data.to_vec())
            .file_name(format!("audio.{}", extension_for(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| Error::Transcription(format!("Failed to create multipart: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let mut request = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Transcription request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "Whisper API returned {}: {}",
                status, body
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            Error::Transcription(format!("Failed to parse whisper response: {}", e))
        })?;

        let segments: Vec<TranscriptSegment> = result
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptSegment {
                start_secs: s.start,
                end_secs: s.end,
                text: s.text.trim().to_string(),
            })
            .collect();

        debug!(
            subsystem = "inference",
            component = "whisper",
            op = "transcribe",
            model = %self.model,
            input_bytes = audio_data.len(),
            segment_count = segments.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Audio transcribed"
        );

        Ok(TranscriptionResult {
            full_text: result.text.trim().to_string(),
            segments,
            language: result.language,
            duration_secs: result.duration,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_result_serialization() {
        let result = TranscriptionResult {
            full_text: "Hello world. This is a test.".to_string(),
            segments: vec![TranscriptSegment {
                start_secs: 0.0,
                end_secs: 2.5,
                text: "Hello world.".to_string(),
            }],
            language: Some("en".to_string()),
            duration_secs: Some(5.0),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["segments"][0]["start_secs"], 0.0);
        assert_eq!(json["duration_secs"], 5.0);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("audio/mpeg"), "mp3");
        assert_eq!(extension_for("audio/x-m4a"), "m4a");
        assert_eq!(extension_for("application/octet-stream"), "wav");
    }

    #[test]
    fn test_builder() {
        let backend = WhisperBackend::new("http://localhost:9000", "whisper-1")
            .with_api_key(Some("k".into()))
            .with_timeout_secs(10);
        assert_eq!(backend.base_url(), "http://localhost:9000");
        assert_eq!(backend.model_name(), "whisper-1");
        assert_eq!(backend.timeout_secs, 10);
    }
}

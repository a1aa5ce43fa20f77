//! Transcript summarization into an atomic summary plus key topics.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use atomic_core::{
    defaults, prefix_chars, Error, GenerationBackend, Result, TranscriptSummarizer,
    TranscriptSummary,
};

use crate::json::{parse_json_object, str_field};

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes video transcripts into atomic notes.";

/// [`TranscriptSummarizer`] backed by one JSON-mode chat call.
pub struct LlmSummarizer {
    backend: Arc<dyn GenerationBackend>,
    max_chars: usize,
}

impl LlmSummarizer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            max_chars: defaults::SUMMARY_MAX_CHARS,
        }
    }
}

fn build_prompt(transcript: &str) -> String {
    format!(
        "You are an expert at creating atomic notes and knowledge graphs.\n\
         Analyze the following video transcript and create a structured summary.\n\n\
         Transcript:\n{}\n\n\
         Your task:\n\
         1. Write a concise summary (2-3 paragraphs) capturing the main arguments.\n\
         2. List the key topics and entities mentioned in the video.\n\n\
         Return JSON of the form {{\"summary\": \"...\", \"key_topics\": [\"Topic 1\", \"Topic 2\"]}}",
        transcript
    )
}

/// Parse a summarizer response; a missing summary is an error.
pub fn parse_summary(raw: &str) -> Result<TranscriptSummary> {
    let map = parse_json_object(raw, "summary")?;
    let object = JsonValue::Object(map);
    let summary = str_field(&object, "summary")
        .ok_or_else(|| Error::Extraction("Summary response has no 'summary' text".to_string()))?
        .to_string();
    let key_topics = object
        .get("key_topics")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok(TranscriptSummary { summary, key_topics })
}

#[async_trait]
impl TranscriptSummarizer for LlmSummarizer {
    #[instrument(skip_all, fields(subsystem = "inference", component = "summarizer", op = "summarize"))]
    async fn summarize(&self, transcript: &str) -> Result<TranscriptSummary> {
        let prompt = build_prompt(prefix_chars(transcript, self.max_chars));
        let raw = self
            .backend
            .generate_json(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| Error::Extraction(format!("Summary call failed: {}", e)))?;
        let summary = parse_summary(&raw)?;
        info!(
            summary_len = summary.summary.len(),
            topic_count = summary.key_topics.len(),
            "Transcript summarized"
        );
        Ok(summary)
    }
}

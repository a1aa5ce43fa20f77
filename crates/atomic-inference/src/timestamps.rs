//! Entity → transcript offset mapping through a bounded-context chat call.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use atomic_core::{
    defaults, prefix_chars, Error, GenerationBackend, Result, TimestampMap, TimestampMapper,
    TranscriptSegment,
};

use crate::json::parse_json_object;

const SYSTEM_PROMPT: &str = "You are an expert at finding relevant timestamps in video \
transcripts. Always return valid JSON.";

#[derive(Serialize)]
struct PromptSegment<'a> {
    start: f64,
    end: f64,
    text: &'a str,
}

/// [`TimestampMapper`] that asks the LLM for each entity's best start time.
///
/// Only the first segments are offered (each truncated) to cap token cost;
/// the answer is filtered down to names that were asked about.
pub struct LlmTimestampMapper {
    backend: Arc<dyn GenerationBackend>,
    max_segments: usize,
    segment_chars: usize,
}

impl LlmTimestampMapper {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            max_segments: defaults::TIMESTAMP_MAX_SEGMENTS,
            segment_chars: defaults::TIMESTAMP_SEGMENT_TEXT_CHARS,
        }
    }

    fn build_prompt(&self, entity_names: &[String], segments: &[TranscriptSegment]) -> Result<String> {
        let offered: Vec<PromptSegment<'_>> = segments
            .iter()
            .take(self.max_segments)
            .map(|s| PromptSegment {
                start: s.start_secs,
                end: s.end_secs,
                text: prefix_chars(&s.text, self.segment_chars),
            })
            .collect();

        Ok(format!(
            "Given these entities and transcript segments with timestamps, find the best timestamp for each entity.\n\n\
             Entities to find:\n{}\n\n\
             Transcript segments (start/end in seconds and the text):\n{}\n\n\
             For each entity, pick the segment where it is first mentioned or most prominently discussed \
             and give its start time in whole seconds.\n\
             Return ONLY a JSON object mapping entity names to integer timestamps.",
            serde_json::to_string_pretty(entity_names)?,
            serde_json::to_string_pretty(&offered)?,
        ))
    }
}

/// Seconds from a number or numeric string; negatives and non-numbers are dropped.
fn seconds(value: &JsonValue) -> Option<i32> {
    let secs = match value {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (secs.is_finite() && secs >= 0.0 && secs <= f64::from(i32::MAX)).then(|| secs.round() as i32)
}

/// Parse the mapper response, keeping only entries for `entity_names`.
pub fn parse_timestamp_map(raw: &str, entity_names: &[String]) -> Result<TimestampMap> {
    if raw.trim().is_empty() {
        return Err(Error::Extraction("Empty timestamp mapping response".to_string()));
    }
    let map = parse_json_object(raw, "timestamp mapping")?;
    let mut out = TimestampMap::new();
    for name in entity_names {
        match map.get(name) {
            Some(value) => match seconds(value) {
                Some(secs) => {
                    out.insert(name.clone(), secs);
                }
                None => warn!(
                    subsystem = "inference",
                    component = "timestamps",
                    entity = %name,
                    partial_data = true,
                    "Ignoring non-numeric timestamp"
                ),
            },
            None => debug!(
                subsystem = "inference",
                component = "timestamps",
                entity = %name,
                "No timestamp for entity"
            ),
        }
    }
    Ok(out)
}

#[async_trait]
impl TimestampMapper for LlmTimestampMapper {
    #[instrument(skip_all, fields(subsystem = "inference", component = "timestamps", op = "map_timestamps"))]
    async fn map_timestamps(
        &self,
        entity_names: &[String],
        segments: &[TranscriptSegment],
    ) -> Result<TimestampMap> {
        if entity_names.is_empty() || segments.is_empty() {
            return Ok(TimestampMap::new());
        }
        let prompt = self.build_prompt(entity_names, segments)?;
        let raw = self
            .backend
            .generate_json(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| Error::Extraction(format!("Timestamp mapping call failed: {}", e)))?;
        let mapped = parse_timestamp_map(&raw, entity_names)?;
        debug!(
            input_count = entity_names.len(),
            result_count = mapped.len(),
            "Timestamps mapped"
        );
        Ok(mapped)
    }
}

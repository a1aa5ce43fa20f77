//! LLM-backed entity extraction and relationship detection.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use atomic_core::{
    clamp_strength, defaults, DetectedRelationship, Error, ExtractedEntity, ExtractionOracle,
    GenerationBackend, Result,
};

use crate::json::{array_field, parse_json_object, str_field};

const ENTITY_SYSTEM_PROMPT: &str = "You are an expert at extracting structured information from \
technical notes. Respond with a single JSON object of the form \
{\"entities\": [{\"name\": string, \"entity_type\": string, \"description\": string}]}. \
Use entity types such as concept, technology, idea, person, technique, architecture, pattern or tool.";

const RELATIONSHIP_SYSTEM_PROMPT: &str = "You are an expert at identifying relationships between \
entities. Respond with a single JSON object of the form \
{\"relationships\": [{\"source\": string, \"target\": string, \"relationship_type\": string, \
\"strength\": number between 0 and 1, \"explanation\": string}]}. \
Only use entity names from the provided list.";

/// [`ExtractionOracle`] over any JSON-capable [`GenerationBackend`].
pub struct LlmExtractionOracle {
    backend: Arc<dyn GenerationBackend>,
}

impl LlmExtractionOracle {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    async fn ask(&self, system: &str, prompt: &str, what: &str) -> Result<String> {
        self.backend
            .generate_json(system, prompt)
            .await
            .map_err(|e| match e {
                Error::Extraction(_) => e,
                other => Error::Extraction(format!("{} call failed: {}", what, other)),
            })
    }
}

/// Turn one raw entity item into an [`ExtractedEntity`] with defaults applied.
fn entity_from_json(item: &JsonValue) -> ExtractedEntity {
    let name = str_field(item, "name").unwrap_or(defaults::UNKNOWN_ENTITY_NAME);
    let entity_type = str_field(item, "entity_type")
        .or_else(|| str_field(item, "type"))
        .unwrap_or(defaults::DEFAULT_ENTITY_TYPE);
    let description = str_field(item, "description").unwrap_or("");
    ExtractedEntity::new(name, entity_type, description)
}

/// Strength as a number or numeric string, clamped; anything else is the default.
fn parse_strength(value: Option<&JsonValue>) -> f32 {
    let raw = match value {
        Some(JsonValue::Number(n)) => n.as_f64().map(|f| f as f32),
        Some(JsonValue::String(s)) => s.trim().parse::<f32>().ok(),
        _ => None,
    };
    raw.map(clamp_strength)
        .unwrap_or(defaults::DEFAULT_RELATIONSHIP_STRENGTH)
}

/// Turn one raw relationship item into a [`DetectedRelationship`]; items
/// without both endpoints are dropped.
fn relationship_from_json(item: &JsonValue) -> Option<DetectedRelationship> {
    let source = str_field(item, "source")?;
    let target = str_field(item, "target")?;
    let relationship_type = str_field(item, "relationship_type")
        .or_else(|| str_field(item, "type"))
        .unwrap_or(defaults::DEFAULT_RELATIONSHIP_TYPE);
    Some(DetectedRelationship {
        source: source.to_string(),
        target: target.to_string(),
        relationship_type: relationship_type.to_string(),
        strength: parse_strength(item.get("strength")),
        explanation: str_field(item, "explanation").map(str::to_string),
    })
}

/// Parse an entity-extraction response.
pub fn parse_entities(raw: &str) -> Result<Vec<ExtractedEntity>> {
    if raw.trim().is_empty() {
        return Ok(vec![]);
    }
    let map = parse_json_object(raw, "entity extraction")?;
    let items = array_field(&map, "entities", "entity extraction")?;
    Ok(items
        .iter()
        .filter(|item| {
            let ok = item.is_object();
            if !ok {
                warn!(
                    subsystem = "inference",
                    component = "oracle",
                    partial_data = true,
                    "Skipping non-object entity item"
                );
            }
            ok
        })
        .map(entity_from_json)
        .collect())
}

/// Parse a relationship-detection response.
pub fn parse_relationships(raw: &str) -> Result<Vec<DetectedRelationship>> {
    if raw.trim().is_empty() {
        return Ok(vec![]);
    }
    let map = parse_json_object(raw, "relationship detection")?;
    let items = array_field(&map, "relationships", "relationship detection")?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match relationship_from_json(item) {
            Some(rel) => out.push(rel),
            None => warn!(
                subsystem = "inference",
                component = "oracle",
                partial_data = true,
                "Skipping relationship without source or target"
            ),
        }
    }
    Ok(out)
}

#[async_trait]
impl ExtractionOracle for LlmExtractionOracle {
    #[instrument(skip(self, text), fields(subsystem = "inference", component = "oracle", op = "extract_entities"))]
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        let start = Instant::now();
        let prompt = format!("Extract entities from these notes:\n\n{}", text);
        let raw = self.ask(ENTITY_SYSTEM_PROMPT, &prompt, "Entity extraction").await?;
        let entities = parse_entities(&raw)?;
        debug!(
            model = self.backend.model_name(),
            entity_count = entities.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Entities extracted"
        );
        Ok(entities)
    }

    #[instrument(skip(self, entity_names, context), fields(subsystem = "inference", component = "oracle", op = "detect_relationships"))]
    async fn detect_relationships(
        &self,
        entity_names: &[String],
        context: &str,
    ) -> Result<Vec<DetectedRelationship>> {
        if entity_names.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();
        let names = serde_json::to_string(entity_names)?;
        let prompt = format!(
            "Identify meaningful relationships between these entities based on the context.\n\
             Entities: {}\n\
             Context: {}\n",
            names, context
        );
        let raw = self
            .ask(RELATIONSHIP_SYSTEM_PROMPT, &prompt, "Relationship detection")
            .await?;
        let relationships = parse_relationships(&raw)?;
        debug!(
            model = self.backend.model_name(),
            input_count = entity_names.len(),
            relationship_count = relationships.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Relationships detected"
        );
        Ok(relationships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedGeneration;

    #[test]
    fn test_parse_entities_applies_defaults() {
        let raw = r#"{"entities": [
            {"name": "Tokio", "entity_type": "Technology", "description": "Async runtime"},
            {"entity_type": "idea"},
            {"name": "Ownership"}
        ]}"#;
        let entities = parse_entities(raw).unwrap();
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].entity_type, "technology");
        assert_eq!(entities[0].color, "#FF9770");
        assert_eq!(entities[1].name, "Unknown");
        assert_eq!(entities[1].description, "");
        assert_eq!(entities[2].entity_type, "concept");
        assert_eq!(entities[2].color, "#FF70A6");
    }

    #[test]
    fn test_parse_entities_unknown_type_gets_default_color() {
        let entities = parse_entities(r#"{"entities": [{"name": "X", "entity_type": "gizmo"}]}"#).unwrap();
        assert_eq!(entities[0].color, "#9CA3AF");
    }

    #[test]
    fn test_parse_entities_invalid_json_is_error() {
        assert!(matches!(parse_entities("not json at all"), Err(Error::Extraction(_))));
    }

    #[test]
    fn test_parse_entities_missing_key_is_empty() {
        assert!(parse_entities("{}").unwrap().is_empty());
        assert!(parse_entities("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_relationships_defaults_and_clamping() {
        let raw = r#"{"relationships": [
            {"source": "A", "target": "B", "relationship_type": "enables", "strength": 0.9, "explanation": "A enables B"},
            {"source": "A", "target": "C"},
            {"source": "B", "target": "C", "strength": 3.5},
            {"source": "C", "target": "A", "strength": "0.25"},
            {"source": "C", "target": "B", "strength": "strong"},
            {"target": "B"}
        ]}"#;
        let rels = parse_relationships(raw).unwrap();
        assert_eq!(rels.len(), 5);
        assert_eq!(rels[0].relationship_type, "enables");
        assert!((rels[0].strength - 0.9).abs() < 1e-6);
        assert_eq!(rels[0].explanation.as_deref(), Some("A enables B"));
        assert_eq!(rels[1].relationship_type, "related_to");
        assert_eq!(rels[1].strength, 0.5);
        assert_eq!(rels[2].strength, 1.0);
        assert_eq!(rels[3].strength, 0.25);
        assert_eq!(rels[4].strength, 0.5);
    }

    #[tokio::test]
    async fn test_detect_relationships_skips_call_for_no_entities() {
        let backend = Arc::new(ScriptedGeneration::new(vec![]));
        let oracle = LlmExtractionOracle::new(backend.clone());
        let rels = oracle.detect_relationships(&[], "context").await.unwrap();
        assert!(rels.is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_extract_entities_sends_text_in_prompt() {
        let backend = Arc::new(ScriptedGeneration::new(vec![Ok(
            r#"{"entities": [{"name": "Rust", "entity_type": "technology", "description": "Language"}]}"#.to_string(),
        )]));
        let oracle = LlmExtractionOracle::new(backend.clone());
        let entities = oracle.extract_entities("Rust is a language").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert!(backend.prompts()[0].contains("Rust is a language"));
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_extraction_error() {
        let backend = Arc::new(ScriptedGeneration::new(vec![Err(Error::Inference(
            "rate limited".to_string(),
        ))]));
        let oracle = LlmExtractionOracle::new(backend);
        let err = oracle.extract_entities("text").await.unwrap_err();
        assert!(matches!(err, Error::Extraction(ref m) if m.contains("rate limited")));
    }
}

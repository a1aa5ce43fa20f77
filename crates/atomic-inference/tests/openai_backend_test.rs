//! HTTP-level tests for the OpenAI-compatible backend and the oracles built on it.

use std::sync::Arc;

use atomic_inference::{
    EmbeddingBackend, Error, ExtractionOracle, GenerationBackend, LlmExtractionOracle,
    OpenAIBackend, OpenAIConfig,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OpenAIConfig {
    OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        embed_model: "test-embed".to_string(),
        gen_model: "test-gen".to_string(),
        embed_dimension: 3,
        embed_max_batch: 2,
        timeout_seconds: 10,
    }
}

fn chat_response(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

#[tokio::test]
async fn test_embeddings_chunked_and_reordered_by_index() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"input": ["note", "A - first"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"embedding": [0.0, 1.0, 0.0], "index": 1},
                {"embedding": [1.0, 0.0, 0.0], "index": 0}
            ],
            "model": "test-embed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(json!({"input": ["B - second"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.0, 0.0, 1.0], "index": 0}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config(&server)).unwrap();
    let texts = vec![
        "note".to_string(),
        "A - first".to_string(),
        "B - second".to_string(),
    ];
    let vectors = backend.embed_texts(&texts).await.unwrap();

    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[0].as_slice(), &[1.0, 0.0, 0.0]);
    assert_eq!(vectors[1].as_slice(), &[0.0, 1.0, 0.0]);
    assert_eq!(vectors[2].as_slice(), &[0.0, 0.0, 1.0]);
}

#[tokio::test]
async fn test_embedding_count_mismatch_fails_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [1.0, 0.0, 0.0], "index": 0}]
        })))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config(&server)).unwrap();
    let err = backend
        .embed_texts(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)), "got {err:?}");
}

#[tokio::test]
async fn test_rate_limit_maps_to_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Slow down", "type": "rate_limit_exceeded"}
        })))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config(&server)).unwrap();
    let err = backend.embed_texts(&["a".to_string()]).await.unwrap_err();
    match err {
        Error::Embedding(msg) => assert!(msg.contains("Slow down")),
        other => panic!("expected embedding error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_auth_failure_is_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key", "type": "invalid_request_error", "code": "invalid_api_key"}
        })))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config(&server)).unwrap();
    let err = backend.generate_with_system("", "hi").await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[tokio::test]
async fn test_oracle_uses_json_mode_end_to_end() {
    let server = MockServer::start().await;
    let content = json!({
        "entities": [
            {"name": "X", "entity_type": "concept", "description": "thing x"},
            {"name": "Y", "entity_type": "technology", "description": "thing y"}
        ]
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-gen",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(&content)))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(OpenAIBackend::new(config(&server)).unwrap());
    let oracle = LlmExtractionOracle::new(backend);
    let entities = oracle.extract_entities("X enables Y").await.unwrap();

    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].name, "X");
    assert_eq!(entities[1].color, "#FF9770");
}

#[tokio::test]
async fn test_oracle_surfaces_invalid_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_response("Sure! Here are the entities:")),
        )
        .mount(&server)
        .await;

    let backend = Arc::new(OpenAIBackend::new(config(&server)).unwrap());
    let oracle = LlmExtractionOracle::new(backend);
    let err = oracle.extract_entities("text").await.unwrap_err();
    assert!(matches!(err, Error::Extraction(_)), "got {err:?}");
}

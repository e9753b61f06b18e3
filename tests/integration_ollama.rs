#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client against a mock embedding server

use qa_search::QaError;
use qa_search::config::{Config, OllamaConfig};
use qa_search::embeddings::{EmbeddingProvider, OllamaClient, encode_normalized, l2_norm};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TEST_MODEL: &str = "bge-m3:latest";
const DIMENSION: u32 = 4;

fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
    let config = Config {
        ollama: OllamaConfig {
            protocol: "http".to_string(),
            host: server.address().ip().to_string(),
            port: server.address().port(),
            model: TEST_MODEL.to_string(),
            batch_size,
            embedding_dimension: DIMENSION,
        },
        ..Config::default()
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(3)
        .with_retry_delay(Duration::ZERO)
}

/// Answers every embed request with one vector per input, derived from its length
fn echo_embeddings(request: &Request) -> ResponseTemplate {
    let body: serde_json::Value = request.body_json().expect("embed request is JSON");
    let embeddings: Vec<Vec<f32>> = body["input"]
        .as_array()
        .expect("input is an array")
        .iter()
        .map(|text| {
            let len = text.as_str().unwrap_or_default().chars().count() as f32;
            vec![len, 1.0, 0.0, 2.0]
        })
        .collect();
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "embeddings": embeddings }))
}

#[tokio::test]
async fn embeddings_are_returned_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(serde_json::json!({ "model": TEST_MODEL })))
        .respond_with(echo_embeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let texts = vec!["保修期".to_string(), "How long is the warranty?".to_string()];

    let vectors = client
        .generate_embeddings_batch(&texts)
        .expect("embedding succeeds");

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![3.0, 1.0, 0.0, 2.0]);
    assert_eq!(vectors[1][0], 25.0);
}

#[tokio::test]
async fn large_inputs_are_split_by_batch_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(echo_embeddings)
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let texts: Vec<String> = (1..=5).map(|i| "q".repeat(i)).collect();

    let vectors = client.encode(&texts).expect("embedding succeeds");

    let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
    assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[tokio::test]
async fn normalized_encoding_has_unit_length() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(echo_embeddings)
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let texts = vec!["退货政策".to_string(), "store hours".to_string()];

    let vectors = encode_normalized(&client, &texts).expect("embedding succeeds");
    for vector in &vectors {
        assert!((l2_norm(vector) - 1.0).abs() < 1e-5);
    }
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(echo_embeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let vector = client
        .generate_embedding("warranty")
        .expect("third attempt succeeds");

    assert_eq!(vector.len(), DIMENSION as usize);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let result = client.encode(&["warranty".to_string()]);

    assert!(matches!(result, Err(QaError::Embedding(_))));
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embeddings": [[0.1, 0.2]] })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let err = client
        .generate_embedding("warranty")
        .expect_err("dimension mismatch");

    assert!(format!("{err:#}").contains("2 dimensions"));
}

#[tokio::test]
async fn missing_vectors_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "embeddings": [] })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let result = client.generate_embeddings_batch(&["a".to_string(), "b".to_string()]);

    assert!(result.is_err());
}

#[tokio::test]
async fn model_listing_and_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                { "name": TEST_MODEL, "size": 1_200_000_000_u64, "digest": "abc123" },
                { "name": "nomic-embed-text:latest" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);

    let models = client.list_models().expect("listing succeeds");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].digest.as_deref(), Some("abc123"));
    assert_eq!(models[1].size, None);

    client.validate_model().expect("configured model is present");
    client.health_check().expect("health check passes");
}

#[tokio::test]
async fn missing_model_fails_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [{ "name": "llama3:latest" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let err = client.validate_model().expect_err("model is absent");

    assert!(err.to_string().contains(TEST_MODEL));
}

//! HTTP index client against a mock data plane and control plane.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vector_bridge::config::IndexConfig;
use vector_bridge::pinecone::PineconeIndex;
use vector_bridge_core::index::{resolve_descriptor, IndexQuery, VectorIndex};
use vector_bridge_core::ErrorKind;

fn client(server: &MockServer) -> PineconeIndex {
    PineconeIndex::new(&server.uri(), "pc-key", 5).unwrap()
}

fn index_config(control_url: String) -> IndexConfig {
    IndexConfig {
        name: "policies".to_string(),
        host: None,
        control_url,
        namespace: None,
        dimension: 1024,
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn query_sends_wire_fields_and_parses_matches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(header("Api-Key", "pc-key"))
        .and(header("X-Pinecone-API-Version", "2024-07"))
        .and(body_partial_json(json!({
            "topK": 3,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": "docs",
            "filter": { "company": "acme" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "a", "score": 0.91, "metadata": { "text": "alpha" } },
                { "id": "b", "score": 0.42 }
            ],
            "namespace": "docs"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = json!({ "company": "acme" }).as_object().cloned();
    let matches = client(&server)
        .query(&IndexQuery {
            vector: vec![0.0, 1.0],
            top_k: 3,
            include_values: false,
            include_metadata: true,
            filter,
            namespace: Some("docs".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "a");
    assert!((matches[0].score - 0.91).abs() < 1e-6);
    assert_eq!(matches[0].metadata["text"], "alpha");
    assert!(matches[0].values.is_none());
    assert!(matches[1].metadata.is_empty());
}

#[tokio::test]
async fn fetch_passes_ids_and_namespace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vectors/fetch"))
        .and(query_param("ids", "a"))
        .and(query_param("ids", "b"))
        .and(query_param("namespace", "docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vectors": {
                "a": { "id": "a", "values": [0.6, 0.8], "metadata": { "text": "alpha" } }
            },
            "namespace": "docs"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = client(&server)
        .fetch(&["a".to_string(), "b".to_string()], Some("docs"))
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched["a"].values, vec![0.6, 0.8]);
    assert_eq!(fetched["a"].metadata["text"], "alpha");
}

#[tokio::test]
async fn stats_feed_descriptor_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dimension": 768,
            "totalVectorCount": 12,
            "namespaces": {
                "": { "vectorCount": 5 },
                "docs": { "vectorCount": 7 }
            }
        })))
        .mount(&server)
        .await;

    let index = client(&server);
    let stats = index.describe_stats().await.unwrap();
    assert_eq!(stats.dimension, Some(768));
    assert_eq!(stats.total_vector_count, 12);
    assert_eq!(stats.namespaces.get("docs"), Some(&7));

    let descriptor = resolve_descriptor(&index, 1024, Some("docs".to_string()))
        .await
        .unwrap();
    assert_eq!(descriptor.target_dim, 768);
    assert_eq!(descriptor.namespace.as_deref(), Some("docs"));
}

#[tokio::test]
async fn unauthorized_is_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = client(&server).describe_stats().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn server_error_is_index_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server)
        .query(&IndexQuery {
            vector: vec![1.0],
            top_k: 1,
            include_values: false,
            include_metadata: true,
            filter: None,
            namespace: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
}

#[tokio::test]
async fn connect_resolves_host_through_control_plane() {
    let control = MockServer::start().await;
    let data = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/policies"))
        .and(header("Api-Key", "pc-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "policies",
            "dimension": 1024,
            "host": data.uri()
        })))
        .expect(1)
        .mount(&control)
        .await;

    let index = PineconeIndex::connect(&index_config(control.uri()), "pc-key")
        .await
        .unwrap();
    assert_eq!(index.host(), data.uri());
}

#[tokio::test]
async fn unknown_index_is_configuration_error() {
    let control = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/policies"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&control)
        .await;

    let err = PineconeIndex::connect(&index_config(control.uri()), "pc-key")
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("policies"));
}

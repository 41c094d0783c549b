//! Remote inference provider.
//!
//! Calls a hosted copy of the model that built the index. Two endpoints are
//! tried, in order, at most once each:
//!
//! 1. `POST {base}/embeddings/{model}` with `{"inputs": [...]}`, answering
//!    `{"embeddings": [[...], ...]}` or a bare array.
//! 2. `POST {base}/pipeline/feature-extraction/{model}` with
//!    `{"inputs": [...], "options": {"wait_for_model": true}}`, answering one
//!    item per input, either pooled (`[hidden]`) or token-level
//!    (`[seq_len, hidden]`, mean-pooled here).
//!
//! Any failure of the first (transport, timeout, non-2xx, malformed body)
//! moves on to the second. If that fails too the request fails with
//! [`BridgeError::TransientProvider`]. A well-formed answer at the wrong
//! dimension is a [`BridgeError::Configuration`] error and is never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use vector_bridge_core::embedding::{EmbeddingProvider, ProviderKind};
use vector_bridge_core::error::{BridgeError, Result};
use vector_bridge_core::vector::{mean_pool, renormalize};

use crate::config::EmbeddingConfig;

/// Embedding provider backed by an HTTPS inference API.
pub struct RemoteProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
    token: Option<String>,
    target_dim: usize,
}

impl RemoteProvider {
    /// Build the provider and its HTTP client.
    ///
    /// `token` is sent as a bearer token when present.
    pub fn new(config: &EmbeddingConfig, target_dim: usize, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {e}")))?;

        info!(
            provider = %ProviderKind::Remote,
            model = %config.model,
            target_dim,
            "embedding provider ready"
        );

        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.inference_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            target_dim,
        })
    }

    fn primary_url(&self) -> String {
        format!("{}/embeddings/{}", self.base_url, self.model)
    }

    fn secondary_url(&self) -> String {
        format!("{}/pipeline/feature-extraction/{}", self.base_url, self.model)
    }

    /// POST a JSON body and return the parsed JSON answer, or a description of what went wrong.
    async fn post(&self, url: &str, body: &Value) -> std::result::Result<Value, String> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {}", truncate(&text, 200)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("non-JSON response: {e}"))
    }

    async fn embed_primary(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, String> {
        let body = json!({ "inputs": texts });
        let data = self.post(&self.primary_url(), &body).await?;
        parse_embeddings(&data, texts.len())
    }

    async fn embed_secondary(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, String> {
        let body = json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });
        let data = self.post(&self.secondary_url(), &body).await?;
        parse_feature_extraction(&data, texts.len())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.target_dim
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let raw = match self.embed_primary(texts).await {
            Ok(vectors) => vectors,
            Err(primary) => {
                warn!(
                    model = %self.model,
                    error = %primary,
                    "embeddings endpoint failed, falling back to feature-extraction"
                );
                self.embed_secondary(texts).await.map_err(|secondary| {
                    BridgeError::TransientProvider(format!(
                        "embeddings endpoint: {primary}; feature-extraction endpoint: {secondary}"
                    ))
                })?
            }
        };

        let vectors = raw
            .into_iter()
            .map(renormalize)
            .collect::<Result<Vec<_>>>()?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.target_dim) {
            return Err(BridgeError::Configuration(format!(
                "model '{}' produces {}-dimensional embeddings but the index has {}; \
                 the model and index do not match",
                self.model,
                bad.len(),
                self.target_dim
            )));
        }
        Ok(vectors)
    }
}

/// Numbers-only JSON array as a vector.
fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}

/// Array of numeric arrays as a matrix.
fn as_matrix(value: &Value) -> Option<Vec<Vec<f32>>> {
    value.as_array()?.iter().map(as_vector).collect()
}

/// Parse a dedicated-endpoint answer: `{"embeddings": [...]}` or a bare array
/// of vectors. A single bare vector is accepted for a single input.
pub(crate) fn parse_embeddings(data: &Value, expected: usize) -> std::result::Result<Vec<Vec<f32>>, String> {
    let payload = match data {
        Value::Object(map) => map
            .get("embeddings")
            .ok_or_else(|| "response object has no 'embeddings' field".to_string())?,
        other => other,
    };

    let vectors = match as_matrix(payload) {
        Some(m) => m,
        None => match as_vector(payload) {
            Some(v) if expected == 1 => vec![v],
            _ => return Err("embeddings payload is not an array of vectors".into()),
        },
    };
    check_count(vectors, expected)
}

/// Parse a feature-extraction answer: one item per input, each either a
/// pooled vector or a `[seq_len, hidden]` matrix to mean-pool.
pub(crate) fn parse_feature_extraction(
    data: &Value,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, String> {
    let items = data
        .as_array()
        .ok_or_else(|| "feature-extraction payload is not an array".to_string())?;

    // a single input may come back as one pooled vector
    if expected == 1 {
        if let Some(v) = as_vector(data) {
            return check_count(vec![v], expected);
        }
    }

    let vectors = items
        .iter()
        .map(|item| {
            as_vector(item)
                .or_else(|| as_matrix(item).and_then(|rows| mean_pool(&rows)))
                .ok_or_else(|| "feature-extraction item is neither [hidden] nor [seq_len, hidden]".to_string())
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;
    check_count(vectors, expected)
}

fn check_count(vectors: Vec<Vec<f32>>, expected: usize) -> std::result::Result<Vec<Vec<f32>>, String> {
    if vectors.len() != expected {
        return Err(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        ));
    }
    if vectors.iter().any(|v| v.is_empty()) {
        return Err("empty embedding in response".into());
    }
    Ok(vectors)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

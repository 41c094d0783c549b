//! HTTP [`VectorIndex`] client for a Pinecone-compatible data plane.
//!
//! Every response is deserialized into wire structs and converted to the
//! core's [`IndexMatch`] / [`FetchedVector`] / [`IndexStats`] right here, so
//! nothing past this module sees the service's JSON shapes.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | query | `POST {host}/query` |
//! | fetch | `GET {host}/vectors/fetch?ids=..&namespace=..` |
//! | describe_stats | `POST {host}/describe_index_stats` |
//! | host lookup | `GET {control_url}/indexes/{name}` |

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vector_bridge_core::error::{BridgeError, Result};
use vector_bridge_core::index::{FetchedVector, IndexMatch, IndexQuery, IndexStats, VectorIndex};
use vector_bridge_core::models::Metadata;

use crate::config::IndexConfig;

const API_VERSION: &str = "2024-07";

/// Client for one index's data plane.
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl PineconeIndex {
    /// Client for a known data-plane host.
    pub fn new(host: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            host: normalize_host(host),
            api_key: api_key.to_string(),
        })
    }

    /// Client for the configured index, looking its host up through the
    /// control plane when `index.host` is not set.
    pub async fn connect(config: &IndexConfig, api_key: &str) -> Result<Self> {
        let client = build_client(config.timeout_secs)?;
        let host = match &config.host {
            Some(host) if !host.is_empty() => normalize_host(host),
            _ => resolve_host(&client, &config.control_url, &config.name, api_key).await?,
        };
        info!(index = %config.name, host = %host, "vector index client ready");
        Ok(Self {
            client,
            host,
            api_key: api_key.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| BridgeError::Index(format!("POST {url}: {e}")))?;
        read_json(response, &url).await
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Hosts reported by the control plane carry no scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BridgeError::Configuration(format!(
                "vector index rejected the API key ({status}): {body}"
            )),
            _ => BridgeError::Index(format!("{url} returned {status}: {body}")),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| BridgeError::Index(format!("malformed response from {url}: {e}")))
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

async fn resolve_host(
    client: &reqwest::Client,
    control_url: &str,
    name: &str,
    api_key: &str,
) -> Result<String> {
    let url = format!("{}/indexes/{}", control_url.trim_end_matches('/'), name);
    let response = client
        .get(&url)
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
        .send()
        .await
        .map_err(|e| BridgeError::Index(format!("GET {url}: {e}")))?;
    if response.status() == StatusCode::NOT_FOUND {
        return Err(BridgeError::Configuration(format!(
            "vector index '{name}' does not exist"
        )));
    }
    let described: DescribeIndexResponse = read_json(response, &url).await?;
    Ok(normalize_host(&described.host))
}

// ============ Wire types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, WireVector>,
}

#[derive(Deserialize)]
struct WireVector {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    total_vector_count: u64,
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
        let body = QueryRequest {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: query.include_metadata,
            include_values: query.include_values,
            filter: query.filter.as_ref(),
            namespace: query.namespace.as_deref(),
        };
        let response: QueryResponse = self.post("/query", &body).await?;
        debug!(matches = response.matches.len(), "index query");

        Ok(response
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                id: m.id,
                score: m.score,
                values: query.include_values.then_some(m.values),
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, FetchedVector>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/vectors/fetch", self.host);
        let mut params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        if let Some(ns) = namespace {
            params.push(("namespace", ns));
        }
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .query(&params)
            .send()
            .await
            .map_err(|e| BridgeError::Index(format!("GET {url}: {e}")))?;
        let fetched: FetchResponse = read_json(response, &url).await?;

        Ok(fetched
            .vectors
            .into_iter()
            .map(|(key, v)| {
                let id = v.id.unwrap_or_else(|| key.clone());
                (
                    key,
                    FetchedVector {
                        id,
                        values: v.values,
                        metadata: v.metadata.unwrap_or_default(),
                    },
                )
            })
            .collect())
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        let stats: StatsResponse = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await?;
        Ok(IndexStats {
            dimension: stats.dimension.filter(|d| *d > 0),
            total_vector_count: stats.total_vector_count,
            namespaces: stats
                .namespaces
                .into_iter()
                .map(|(ns, summary)| (ns, summary.vector_count))
                .collect(),
        })
    }
}

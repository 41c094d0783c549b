//! In-memory [`VectorIndex`] implementation for tests and offline tooling.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Query is brute-force cosine
//! similarity over every stored vector in the namespace. Filters support
//! plain equality plus the `$eq`, `$ne`, `$in` and `$nin` operators.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::models::Metadata;
use crate::vector::cosine_similarity;

use super::{FetchedVector, IndexMatch, IndexQuery, IndexStats, VectorIndex};

struct StoredVector {
    id: String,
    namespace: String,
    values: Vec<f32>,
    metadata: Metadata,
}

/// In-memory index with call counters.
pub struct InMemoryIndex {
    dimension: Option<usize>,
    vectors: RwLock<Vec<StoredVector>>,
    query_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryIndex {
    /// An index that reports (and enforces) dimension `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            vectors: RwLock::new(Vec::new()),
            query_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// An index whose stats report no dimension.
    pub fn without_dimension() -> Self {
        Self {
            dimension: None,
            ..Self::new(0)
        }
    }

    /// Insert or replace a vector in the default namespace.
    pub fn upsert(&self, id: &str, values: Vec<f32>, metadata: Metadata) {
        self.upsert_in("", id, values, metadata);
    }

    /// Insert or replace a vector in `namespace`.
    pub fn upsert_in(&self, namespace: &str, id: &str, values: Vec<f32>, metadata: Metadata) {
        let mut stored = self.vectors.write().unwrap();
        stored.retain(|v| !(v.id == id && v.namespace == namespace));
        stored.push(StoredVector {
            id: id.to_string(),
            namespace: namespace.to_string(),
            values,
            metadata,
        });
    }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::without_dimension()
    }
}

/// Does `meta` satisfy every clause of `filter`?
pub fn matches_filter(meta: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(key, cond)| {
        let actual = meta.get(key);
        match cond {
            Value::Object(ops) => ops.iter().all(|(op, expected)| match op.as_str() {
                "$eq" => actual == Some(expected),
                "$ne" => actual != Some(expected),
                "$in" => expected
                    .as_array()
                    .is_some_and(|opts| actual.is_some_and(|a| opts.contains(a))),
                "$nin" => expected
                    .as_array()
                    .is_some_and(|opts| !actual.is_some_and(|a| opts.contains(a))),
                _ => false,
            }),
            expected => actual == Some(expected),
        }
    })
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(dim) = self.dimension {
            if query.vector.len() != dim {
                return Err(BridgeError::Index(format!(
                    "query vector dimension {} does not match index dimension {}",
                    query.vector.len(),
                    dim
                )));
            }
        }

        let namespace = query.namespace.as_deref().unwrap_or("");
        let stored = self.vectors.read().unwrap();

        let mut matches: Vec<IndexMatch> = stored
            .iter()
            .filter(|v| v.namespace == namespace)
            .filter(|v| {
                query
                    .filter
                    .as_ref()
                    .is_none_or(|f| matches_filter(&v.metadata, f))
            })
            .map(|v| IndexMatch {
                id: v.id.clone(),
                score: cosine_similarity(&query.vector, &v.values),
                values: query.include_values.then(|| v.values.clone()),
                metadata: if query.include_metadata {
                    v.metadata.clone()
                } else {
                    Metadata::new()
                },
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(query.top_k);
        Ok(matches)
    }

    async fn fetch(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, FetchedVector>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let namespace = namespace.unwrap_or("");
        let stored = self.vectors.read().unwrap();
        Ok(stored
            .iter()
            .filter(|v| v.namespace == namespace && ids.contains(&v.id))
            .map(|v| {
                (
                    v.id.clone(),
                    FetchedVector {
                        id: v.id.clone(),
                        values: v.values.clone(),
                        metadata: v.metadata.clone(),
                    },
                )
            })
            .collect())
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        let stored = self.vectors.read().unwrap();
        let mut namespaces: BTreeMap<String, u64> = BTreeMap::new();
        for v in stored.iter() {
            *namespaces.entry(v.namespace.clone()).or_default() += 1;
        }
        Ok(IndexStats {
            dimension: self.dimension,
            total_vector_count: stored.len() as u64,
            namespaces,
        })
    }
}

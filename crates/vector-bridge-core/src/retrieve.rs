//! Query pipeline: text in, ranked candidates out.
//!
//! [`retrieve`] is stateless per call. It runs a fixed sequence of steps:
//!
//! 1. Normalize the query (NFC + whitespace collapse).
//! 2. Apply the query prefix when the model family needs one.
//! 3. Embed with the configured provider; the vector must already be at
//!    `target_dim` (a mismatch fails the request), then it is re-normalized.
//! 4. Merge caller filters with the optional source-tag equality constraint.
//! 5. Query the index for `max(candidate_k, top_k)` matches with metadata.
//! 6. Extract passage text and silently drop noise.
//! 7. Drop matches below `min_score`, when given.
//! 8. Stable-sort by score, descending.
//! 9. Truncate to `top_k`.
//!
//! Any failure aborts the whole request: there is no partial result set.

use serde_json::Value;
use tracing::debug;

use crate::embedding::{ensure_dim, EmbeddingProvider};
use crate::error::{BridgeError, Result};
use crate::index::{IndexQuery, VectorIndex};
use crate::metadata::query_text;
use crate::models::{IndexDescriptor, Metadata, RetrievalCandidate};
use crate::prefix::PrefixPolicy;
use crate::text::{is_noise, normalize_query, NoiseThresholds};
use crate::vector::reconcile;

/// Per-process settings the pipeline needs besides the request itself.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub descriptor: IndexDescriptor,
    pub prefix: PrefixPolicy,
    pub noise: NoiseThresholds,
    /// Metadata keys checked, in order, for passage text.
    pub text_keys: Vec<String>,
    /// Metadata field the source-tag convenience filter constrains.
    pub source_tag_field: String,
}

impl RetrievalSettings {
    pub fn new(descriptor: IndexDescriptor, prefix: PrefixPolicy) -> Self {
        Self {
            descriptor,
            prefix,
            noise: NoiseThresholds::default(),
            text_keys: vec!["text".to_string(), "chunk".to_string()],
            source_tag_field: "company".to_string(),
        }
    }
}

/// One retrieval request.
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub query: String,
    pub top_k: usize,
    pub candidate_k: usize,
    pub filters: Option<Metadata>,
    /// Equality constraint on the source-tag field.
    pub source_tag: Option<String>,
    pub min_score: Option<f32>,
}

impl RetrieveRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            candidate_k: top_k,
            filters: None,
            source_tag: None,
            min_score: None,
        }
    }
}

/// Run one query through the pipeline.
///
/// # Errors
///
/// - [`BridgeError::DegenerateInput`] for an empty query, a provider vector
///   at the wrong dimension, or a zero-norm vector. The index is not called.
/// - Provider and index errors pass through unchanged.
pub async fn retrieve(
    index: &dyn VectorIndex,
    provider: &dyn EmbeddingProvider,
    settings: &RetrievalSettings,
    request: &RetrieveRequest,
) -> Result<Vec<RetrievalCandidate>> {
    let normalized = normalize_query(&request.query);
    if normalized.is_empty() {
        return Err(BridgeError::DegenerateInput("query text is empty".into()));
    }
    let prefixed = settings.prefix.query(&normalized);

    let target_dim = settings.descriptor.target_dim;
    let vector = provider
        .embed(&[prefixed])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BridgeError::TransientProvider("provider returned no vectors".into()))?;
    ensure_dim(&vector, target_dim)?;
    let vector = reconcile(vector, target_dim)?;

    let filter = build_filter(
        request.filters.as_ref(),
        &settings.source_tag_field,
        request.source_tag.as_deref(),
    );

    let matches = index
        .query(&IndexQuery {
            vector,
            top_k: request.candidate_k.max(request.top_k),
            include_values: false,
            include_metadata: true,
            filter,
            namespace: settings.descriptor.namespace.clone(),
        })
        .await?;
    let returned = matches.len();

    let mut candidates: Vec<RetrievalCandidate> = matches
        .into_iter()
        .filter_map(|m| {
            let text = query_text(&m.metadata, &settings.text_keys).unwrap_or_default();
            if is_noise(&text, &settings.noise) {
                return None;
            }
            Some(RetrievalCandidate {
                id: m.id,
                score: m.score,
                text,
                metadata: m.metadata,
            })
        })
        .collect();
    let kept = candidates.len();

    if let Some(min) = request.min_score {
        candidates.retain(|c| c.score >= min);
    }

    // sort_by is stable: equal scores keep index order
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(request.top_k);

    debug!(
        returned,
        noise_dropped = returned - kept,
        results = candidates.len(),
        provider = %provider.kind(),
        "retrieve complete"
    );
    Ok(candidates)
}

/// Merge caller filters with the source-tag constraint.
///
/// The tag wins over a caller filter on the same field. Returns `None`
/// when nothing constrains the query.
pub fn build_filter(
    filters: Option<&Metadata>,
    source_tag_field: &str,
    source_tag: Option<&str>,
) -> Option<Metadata> {
    let mut merged = filters.cloned().unwrap_or_default();
    if let Some(tag) = source_tag.filter(|t| !t.is_empty()) {
        merged.insert(source_tag_field.to_string(), Value::String(tag.to_string()));
    }
    (!merged.is_empty()).then_some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::adapter::SpaceAdapter;
    use crate::embedding::testing::FakeEncoder;
    use crate::embedding::{AdaptedLocalProvider, PlainLocalProvider, ProviderKind};
    use crate::index::memory::InMemoryIndex;
    use crate::index::{FetchedVector, IndexMatch, IndexStats};

    const LONG_A: &str = "The policy covers water damage from burst pipes.";
    const LONG_B: &str = "Deductibles apply per occurrence for all claims.";

    fn meta(v: Value) -> Metadata {
        v.as_object().cloned().unwrap()
    }

    /// Index returning a fixed match list and recording the last query.
    struct StaticIndex {
        matches: Vec<IndexMatch>,
        calls: AtomicUsize,
        last: Mutex<Option<IndexQuery>>,
    }

    impl StaticIndex {
        fn new(matches: Vec<IndexMatch>) -> Self {
            Self {
                matches,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(query.clone());
            Ok(self.matches.clone())
        }
        async fn fetch(
            &self,
            _ids: &[String],
            _namespace: Option<&str>,
        ) -> Result<HashMap<String, FetchedVector>> {
            Ok(HashMap::new())
        }
        async fn describe_stats(&self) -> Result<IndexStats> {
            Ok(IndexStats::default())
        }
    }

    fn hit(id: &str, score: f32, text: &str) -> IndexMatch {
        IndexMatch {
            id: id.into(),
            score,
            values: None,
            metadata: meta(json!({ "text": text })),
        }
    }

    fn two_matches() -> StaticIndex {
        StaticIndex::new(vec![hit("a", 0.9, LONG_A), hit("b", 0.5, LONG_B)])
    }

    fn provider(dim: usize) -> PlainLocalProvider {
        let mut out = vec![0.0; dim];
        out[0] = 1.0;
        PlainLocalProvider::new(Arc::new(FakeEncoder::new(dim, out)), dim)
    }

    fn settings(dim: usize) -> RetrievalSettings {
        RetrievalSettings::new(
            IndexDescriptor {
                target_dim: dim,
                namespace: Some("docs".into()),
            },
            PrefixPolicy::new(true),
        )
    }

    #[tokio::test]
    async fn test_top_k_one_returns_best() {
        let index = two_matches();
        let mut req = RetrieveRequest::new("water damage", 1);
        req.candidate_k = 20;
        let out = retrieve(&index, &provider(4), &settings(4), &req).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
        assert!((out[0].score - 0.9).abs() < 1e-6);

        let last = index.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.top_k, 20);
        assert!(last.include_metadata);
        assert_eq!(last.namespace.as_deref(), Some("docs"));
    }

    #[tokio::test]
    async fn test_min_score_drops_weak_matches() {
        let index = two_matches();
        let mut req = RetrieveRequest::new("water damage", 5);
        req.min_score = Some(0.6);
        let out = retrieve(&index, &provider(4), &settings(4), &req).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }

    #[tokio::test]
    async fn test_noise_is_dropped_not_raised() {
        let index = StaticIndex::new(vec![
            hit("short", 0.99, "too short"),
            hit("garbage", 0.95, "가 나 다 라 마 바 사 아 자 차 카 타 파 하"),
            IndexMatch {
                id: "no-text".into(),
                score: 0.93,
                values: None,
                metadata: meta(json!({"page": 4})),
            },
            hit("good", 0.4, LONG_A),
        ]);
        let out = retrieve(&index, &provider(4), &settings(4), &RetrieveRequest::new("q", 5))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "good");
    }

    #[tokio::test]
    async fn test_chunk_key_and_stable_ties() {
        let index = StaticIndex::new(vec![
            hit("first", 0.7, LONG_A),
            IndexMatch {
                id: "second".into(),
                score: 0.7,
                values: None,
                metadata: meta(json!({"chunk": LONG_B})),
            },
            hit("top", 0.8, LONG_B),
        ]);
        let out = retrieve(&index, &provider(4), &settings(4), &RetrieveRequest::new("q", 5))
            .await
            .unwrap();
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "first", "second"]);
        assert_eq!(out[2].text, LONG_B);
    }

    #[tokio::test]
    async fn test_nan_score_keeps_total_order() {
        let index = StaticIndex::new(vec![
            hit("low", 0.3, LONG_A),
            hit("nan", f32::NAN, LONG_B),
            hit("high", 0.9, LONG_A),
            hit("mid", 0.5, LONG_B),
        ]);
        let out = retrieve(&index, &provider(4), &settings(4), &RetrieveRequest::new("q", 5))
            .await
            .unwrap();
        assert_eq!(out.len(), 4);
        let ranked: Vec<_> = out
            .iter()
            .filter(|c| !c.score.is_nan())
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ranked, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_query_is_normalized_and_prefixed() {
        let encoder = Arc::new(FakeEncoder::new(4, vec![1.0, 0.0, 0.0, 0.0]));
        let provider = PlainLocalProvider::new(encoder.clone(), 4);
        let index = two_matches();
        retrieve(
            &index,
            &provider,
            &settings(4),
            &RetrieveRequest::new("  water \n\t damage ", 1),
        )
        .await
        .unwrap();
        assert_eq!(encoder.seen.lock().unwrap()[0], "query: water damage");
    }

    #[tokio::test]
    async fn test_source_tag_merges_into_filter() {
        let index = two_matches();
        let mut req = RetrieveRequest::new("q", 1);
        req.filters = Some(meta(json!({"year": 2024, "company": "caller"})));
        req.source_tag = Some("acme".into());
        retrieve(&index, &provider(4), &settings(4), &req).await.unwrap();

        let filter = index.last.lock().unwrap().clone().unwrap().filter.unwrap();
        assert_eq!(filter["company"], "acme");
        assert_eq!(filter["year"], 2024);
    }

    #[test]
    fn test_build_filter_empty_is_none() {
        assert!(build_filter(None, "company", None).is_none());
        assert!(build_filter(None, "company", Some("")).is_none());
        let f = build_filter(None, "insurer", Some("acme")).unwrap();
        assert_eq!(f["insurer"], "acme");
    }

    #[tokio::test]
    async fn test_small_dim_mismatch_never_reaches_index() {
        let w = ndarray::Array2::from_shape_fn((2, 4), |(i, j)| if i == j { 1.0 } else { 0.0 });
        let adapter = Arc::new(SpaceAdapter::new(w).unwrap());
        // encoder claims 2 dims but emits 3
        let encoder = Arc::new(FakeEncoder::new(2, vec![1.0, 0.0, 0.0]));
        let provider = AdaptedLocalProvider::new(encoder, adapter, 4).unwrap();
        assert_eq!(provider.kind(), ProviderKind::AdaptedLocal);

        let index = InMemoryIndex::new(4);
        let err = retrieve(&index, &provider, &settings(4), &RetrieveRequest::new("q", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DegenerateInput(_)));
        assert_eq!(index.query_count(), 0);
    }

    #[tokio::test]
    async fn test_target_dim_mismatch_is_fatal() {
        let index = two_matches();
        let err = retrieve(&index, &provider(3), &settings(4), &RetrieveRequest::new("q", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DegenerateInput(_)));
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let index = two_matches();
        let err = retrieve(&index, &provider(4), &settings(4), &RetrieveRequest::new(" \n ", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DegenerateInput(_)));
    }

    #[tokio::test]
    async fn test_end_to_end_with_memory_index() {
        let index = InMemoryIndex::new(4);
        index.upsert_in("docs", "near", vec![1.0, 0.0, 0.0, 0.0], meta(json!({"text": LONG_A})));
        index.upsert_in("docs", "far", vec![0.0, 1.0, 0.0, 0.0], meta(json!({"text": LONG_B})));
        index.upsert("other-ns", vec![1.0, 0.0, 0.0, 0.0], meta(json!({"text": LONG_A})));

        let out = retrieve(&index, &provider(4), &settings(4), &RetrieveRequest::new("q", 5))
            .await
            .unwrap();
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(out[0].score > 0.99);
    }
}

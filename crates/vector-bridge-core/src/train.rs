//! Offline adapter training: harvest (text, vector) pairs from the index
//! and fit a [`SpaceAdapter`].
//!
//! The index has no "list everything" operation, so [`collect_pairs`] uses
//! nearest-neighbor search as a sampler: each round queries with a fresh
//! near-zero random probe and keeps the matches it has not seen yet.
//! [`collect_pairs_by_ids`] is the alternative for a known id list.

use std::collections::HashSet;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::adapter::{self, AlignmentReport, SpaceAdapter};
use crate::embedding::LocalEncoder;
use crate::error::{BridgeError, Result};
use crate::index::{IndexQuery, VectorIndex};
use crate::metadata::{training_text, TRAINING_TEXT_KEYS};
use crate::models::{IndexDescriptor, TrainingPair};
use crate::prefix::PrefixPolicy;
use crate::vector::renormalize;

/// Probe-sampling budget.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    /// Stop once this many pairs are collected.
    pub target_samples: usize,
    /// Matches requested per probe.
    pub scan_top_k: usize,
    /// Maximum number of probes.
    pub scan_rounds: usize,
    /// Probe components are drawn uniformly from `[-probe_scale, probe_scale]`.
    pub probe_scale: f32,
    pub seed: u64,
    /// Training texts are truncated to this many characters.
    pub max_text_chars: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            target_samples: 4000,
            scan_top_k: 128,
            scan_rounds: 80,
            probe_scale: 1e-3,
            seed: 0,
            max_text_chars: 512,
        }
    }
}

/// Fitting parameters.
#[derive(Debug, Clone)]
pub struct FitParams {
    pub ridge_alpha: f64,
    pub min_pairs: usize,
    /// Texts per encoder call.
    pub batch_size: usize,
    /// Prefix policy of the small model.
    pub prefix: PrefixPolicy,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            ridge_alpha: 1.0,
            min_pairs: 200,
            batch_size: 64,
            prefix: PrefixPolicy::default(),
        }
    }
}

/// Sample training pairs by probing the index with near-zero random vectors.
///
/// Matches are deduplicated by id across rounds. A match is skipped when it
/// carries no stored values, values of the wrong length, or no usable text.
pub async fn collect_pairs(
    index: &dyn VectorIndex,
    descriptor: &IndexDescriptor,
    params: &SamplingParams,
) -> Result<Vec<TrainingPair>> {
    let dim = descriptor.target_dim;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut seen: HashSet<String> = HashSet::new();
    let mut pairs: Vec<TrainingPair> = Vec::new();
    let scale = params.probe_scale.abs();

    for round in 0..params.scan_rounds {
        if pairs.len() >= params.target_samples {
            break;
        }
        let probe: Vec<f32> = (0..dim)
            .map(|_| rng.random_range(-scale..=scale))
            .collect();

        let matches = index
            .query(&IndexQuery {
                vector: probe,
                top_k: params.scan_top_k,
                include_values: true,
                include_metadata: true,
                filter: None,
                namespace: descriptor.namespace.clone(),
            })
            .await?;

        let mut fresh = 0usize;
        for m in matches {
            if !seen.insert(m.id.clone()) {
                continue;
            }
            fresh += 1;
            let Some(values) = m.values.filter(|v| v.len() == dim) else {
                continue;
            };
            let Some(text) = training_text(&m.metadata, params.max_text_chars) else {
                continue;
            };
            let Ok(target) = renormalize(values) else {
                continue;
            };
            pairs.push(TrainingPair {
                id: m.id,
                text,
                target,
            });
            if pairs.len() >= params.target_samples {
                break;
            }
        }
        debug!(round, fresh, pairs = pairs.len(), "probe round");
        if (round + 1) % 10 == 0 {
            info!(round = round + 1, pairs = pairs.len(), "sampling progress");
        }
    }

    info!(pairs = pairs.len(), seen = seen.len(), "sampling finished");
    Ok(pairs)
}

/// Build pairs from known `(id, text)` records by fetching their stored vectors.
///
/// Ids the index does not know and vectors of the wrong dimension are skipped.
/// Fails with [`BridgeError::Index`] when nothing could be fetched.
pub async fn collect_pairs_by_ids(
    index: &dyn VectorIndex,
    descriptor: &IndexDescriptor,
    records: &[(String, String)],
    fetch_batch: usize,
) -> Result<Vec<TrainingPair>> {
    let mut pairs = Vec::with_capacity(records.len());
    for chunk in records.chunks(fetch_batch.max(1)) {
        let ids: Vec<String> = chunk.iter().map(|(id, _)| id.clone()).collect();
        let mut fetched = index.fetch(&ids, descriptor.namespace.as_deref()).await?;
        for (id, text) in chunk {
            let Some(found) = fetched.remove(id) else {
                debug!(id = %id, "id not found in index");
                continue;
            };
            if found.values.len() != descriptor.target_dim {
                continue;
            }
            let Ok(target) = renormalize(found.values) else {
                continue;
            };
            pairs.push(TrainingPair {
                id: id.clone(),
                text: text.clone(),
                target,
            });
        }
    }

    if pairs.is_empty() {
        return Err(BridgeError::Index(format!(
            "none of the {} requested ids could be fetched at dimension {}",
            records.len(),
            descriptor.target_dim
        )));
    }
    Ok(pairs)
}

/// Encode every pair's text with the small model and stack `X` and `Y`.
async fn stack_pairs(
    encoder: &dyn LocalEncoder,
    pairs: &[TrainingPair],
    params: &FitParams,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let small_dim = encoder.dims();
    let target_dim = pairs.first().map(|p| p.target.len()).unwrap_or(0);
    let mut x_flat: Vec<f32> = Vec::with_capacity(pairs.len() * small_dim);
    let mut y_flat: Vec<f32> = Vec::with_capacity(pairs.len() * target_dim);

    for batch in pairs.chunks(params.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| params.prefix.passage(&p.text)).collect();
        let encoded = encoder.encode(&texts).await?;
        if encoded.len() != batch.len() {
            return Err(BridgeError::DegenerateInput(format!(
                "encoder returned {} vectors for {} texts",
                encoded.len(),
                batch.len()
            )));
        }
        for (x, pair) in encoded.iter().zip(batch) {
            if x.len() != small_dim {
                return Err(BridgeError::DegenerateInput(format!(
                    "local model produced {} dimensions, expected {}",
                    x.len(),
                    small_dim
                )));
            }
            if pair.target.len() != target_dim {
                return Err(BridgeError::DegenerateInput(format!(
                    "pair '{}' has a {}-dimensional target, expected {}",
                    pair.id,
                    pair.target.len(),
                    target_dim
                )));
            }
            x_flat.extend_from_slice(x);
            y_flat.extend_from_slice(&pair.target);
        }
    }

    let n = pairs.len();
    let x = Array2::from_shape_vec((n, small_dim), x_flat)
        .map_err(|e| BridgeError::DegenerateInput(e.to_string()))?;
    let y = Array2::from_shape_vec((n, target_dim), y_flat)
        .map_err(|e| BridgeError::DegenerateInput(e.to_string()))?;
    Ok((x, y))
}

/// Fit an adapter on collected pairs.
///
/// # Errors
///
/// [`BridgeError::InsufficientTrainingData`] when fewer than
/// `params.min_pairs` pairs are given.
pub async fn fit_adapter(
    encoder: &dyn LocalEncoder,
    pairs: &[TrainingPair],
    params: &FitParams,
) -> Result<SpaceAdapter> {
    if pairs.len() < params.min_pairs {
        return Err(BridgeError::InsufficientTrainingData {
            found: pairs.len(),
            required: params.min_pairs,
            keys: TRAINING_TEXT_KEYS.join(", "),
        });
    }
    info!(
        pairs = pairs.len(),
        model = encoder.model_name(),
        "encoding training texts"
    );
    let (x, y) = stack_pairs(encoder, pairs, params).await?;
    let adapter = SpaceAdapter::fit_ridge(&x, &y, params.ridge_alpha)?;
    info!(
        small_dim = adapter.small_dim(),
        target_dim = adapter.target_dim(),
        alpha = params.ridge_alpha,
        "adapter fit"
    );
    Ok(adapter)
}

/// Measure how well `adapter` maps the small model onto the stored vectors of `pairs`.
pub async fn evaluate_adapter(
    encoder: &dyn LocalEncoder,
    adapter: &SpaceAdapter,
    pairs: &[TrainingPair],
    params: &FitParams,
) -> Result<AlignmentReport> {
    if pairs.is_empty() {
        return Err(BridgeError::DegenerateInput("no evaluation pairs".into()));
    }
    let (x, y) = stack_pairs(encoder, pairs, params).await?;
    adapter::evaluate(adapter, &x, &y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::index::memory::InMemoryIndex;
    use crate::models::Metadata;

    fn meta(v: serde_json::Value) -> Metadata {
        v.as_object().cloned().unwrap()
    }

    fn descriptor(dim: usize) -> IndexDescriptor {
        IndexDescriptor {
            target_dim: dim,
            namespace: None,
        }
    }

    /// Encoder backed by a text → vector table.
    struct KeyedEncoder {
        dims: usize,
        by_text: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl LocalEncoder for KeyedEncoder {
        fn model_name(&self) -> &str {
            "keyed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    self.by_text
                        .get(t)
                        .cloned()
                        .unwrap_or_else(|| vec![0.0; self.dims])
                })
                .collect())
        }
    }

    /// Index with `n` passages whose stored vector is `x · W_true`.
    ///
    /// `W_true` has orthonormal rows, so unit `x` maps to unit `y`.
    fn synthetic(n: usize) -> (InMemoryIndex, KeyedEncoder) {
        let small = 3;
        let target = 5;
        let w_true = Array2::from_shape_fn((small, target), |(i, j)| match (i, j) {
            (0, 0) | (2, 4) => 1.0,
            (1, 2) => -1.0,
            _ => 0.0,
        });
        let mut rng = StdRng::seed_from_u64(11);
        let index = InMemoryIndex::new(target);
        let mut by_text = HashMap::new();
        for i in 0..n {
            let mut x: Vec<f32> = (0..small).map(|_| rng.random_range(-1.0f32..1.0)).collect();
            crate::vector::l2_normalize(&mut x);
            let y = ndarray::ArrayView1::from(&x[..]).dot(&w_true).to_vec();
            let text = format!("passage number {i}");
            by_text.insert(text.clone(), x);
            index.upsert(&format!("id-{i}"), y, meta(json!({ "text": text })));
        }
        (
            index,
            KeyedEncoder {
                dims: small,
                by_text,
            },
        )
    }

    #[tokio::test]
    async fn test_collect_pairs_dedupes_and_reaches_target() {
        let (index, _) = synthetic(30);
        let params = SamplingParams {
            target_samples: 1000,
            scan_top_k: 10,
            scan_rounds: 25,
            ..SamplingParams::default()
        };
        let pairs = collect_pairs(&index, &descriptor(5), &params).await.unwrap();
        let ids: HashSet<_> = pairs.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), pairs.len());
        assert!(pairs.len() <= 30);
        assert!(pairs.iter().all(|p| p.target.len() == 5));
        assert_eq!(index.query_count(), 25);
    }

    #[tokio::test]
    async fn test_collect_pairs_stops_at_target() {
        let (index, _) = synthetic(30);
        let params = SamplingParams {
            target_samples: 4,
            scan_top_k: 10,
            scan_rounds: 50,
            ..SamplingParams::default()
        };
        let pairs = collect_pairs(&index, &descriptor(5), &params).await.unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(index.query_count(), 1);
    }

    #[tokio::test]
    async fn test_collect_pairs_skips_textless_metadata() {
        let index = InMemoryIndex::new(2);
        index.upsert("a", vec![1.0, 0.0], meta(json!({"page": 2})));
        index.upsert("b", vec![0.0, 1.0], meta(json!({"text": "tiny"})));
        index.upsert("c", vec![1.0, 1.0], meta(json!({"title": "Home Policy", "page": 3})));
        let params = SamplingParams {
            scan_rounds: 3,
            ..SamplingParams::default()
        };
        let pairs = collect_pairs(&index, &descriptor(2), &params).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].text, "Home Policy (p.3)");
        assert!((crate::vector::l2_norm(&pairs[0].target) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_insufficient_pairs_fail_loudly() {
        let (index, encoder) = synthetic(10);
        let pairs = collect_pairs(&index, &descriptor(5), &SamplingParams::default())
            .await
            .unwrap();
        let err = fit_adapter(&encoder, &pairs, &FitParams::default())
            .await
            .unwrap_err();
        match err {
            BridgeError::InsufficientTrainingData { found, required, .. } => {
                assert_eq!(found, 10);
                assert_eq!(required, 200);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fit_and_evaluate_recover_map() {
        let (index, encoder) = synthetic(60);
        let pairs = collect_pairs(&index, &descriptor(5), &SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(pairs.len(), 60);

        let params = FitParams {
            ridge_alpha: 1e-6,
            min_pairs: 50,
            batch_size: 16,
            ..FitParams::default()
        };
        let adapter = fit_adapter(&encoder, &pairs, &params).await.unwrap();
        assert_eq!(adapter.small_dim(), 3);
        assert_eq!(adapter.target_dim(), 5);

        let report = evaluate_adapter(&encoder, &adapter, &pairs, &params)
            .await
            .unwrap();
        assert_eq!(report.n, 60);
        assert!(report.mean > 0.99, "{report}");
    }

    #[tokio::test]
    async fn test_collect_by_ids_skips_missing_and_wrong_dim() {
        let index = InMemoryIndex::default();
        index.upsert("a", vec![3.0, 4.0], Metadata::new());
        index.upsert("short", vec![1.0], Metadata::new());
        let records = vec![
            ("a".to_string(), "alpha".to_string()),
            ("short".to_string(), "bad".to_string()),
            ("missing".to_string(), "gone".to_string()),
        ];
        let pairs = collect_pairs_by_ids(&index, &descriptor(2), &records, 2)
            .await
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].text, "alpha");
        assert!((pairs[0].target[0] - 0.6).abs() < 1e-6);
        assert_eq!(index.fetch_count(), 2);

        let none = vec![("missing".to_string(), "gone".to_string())];
        assert!(matches!(
            collect_pairs_by_ids(&index, &descriptor(2), &none, 2).await,
            Err(BridgeError::Index(_))
        ));
    }

    #[tokio::test]
    async fn test_encoder_dimension_mismatch_is_fatal() {
        struct Lying;
        #[async_trait]
        impl LocalEncoder for Lying {
            fn model_name(&self) -> &str {
                "lying"
            }
            fn dims(&self) -> usize {
                4
            }
            async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
            }
        }

        let (index, _) = synthetic(5);
        let pairs = collect_pairs(&index, &descriptor(5), &SamplingParams::default())
            .await
            .unwrap();
        let params = FitParams {
            min_pairs: 1,
            ..FitParams::default()
        };
        assert!(matches!(
            fit_adapter(&Lying, &pairs, &params).await,
            Err(BridgeError::DegenerateInput(_))
        ));
    }
}

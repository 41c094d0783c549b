//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only view the pipeline and the trainer
//! have of the deployed index. Implementations normalize whatever shape
//! their backend returns into [`IndexMatch`] / [`FetchedVector`] /
//! [`IndexStats`] at the boundary, so nothing deeper ever branches on
//! response shape.
//!
//! Implementations must be `Send + Sync` to be shared across concurrent queries.

pub mod memory;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::info;

use crate::error::{BridgeError, Result};
use crate::models::{IndexDescriptor, Metadata};

/// A nearest-neighbor request.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_values: bool,
    pub include_metadata: bool,
    /// Metadata filter; `None` means unfiltered.
    pub filter: Option<Metadata>,
    pub namespace: Option<String>,
}

/// One nearest-neighbor match.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    /// Stored vector, present only when requested.
    pub values: Option<Vec<f32>>,
    /// Stored metadata; empty when not requested or absent.
    pub metadata: Metadata,
}

/// A vector fetched by id.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// Index-level statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    /// Declared dimensionality, when the backend reports one.
    pub dimension: Option<usize>,
    pub total_vector_count: u64,
    /// Vector count per namespace (`""` is the default namespace).
    pub namespaces: BTreeMap<String, u64>,
}

/// Abstract vector index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`query`](VectorIndex::query) | Nearest neighbors of a vector |
/// | [`fetch`](VectorIndex::fetch) | Stored vectors by id |
/// | [`describe_stats`](VectorIndex::describe_stats) | Dimension and namespace counts |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` matches ordered by descending score.
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>>;

    /// Fetch stored vectors by id. Unknown ids are absent from the map.
    async fn fetch(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, FetchedVector>>;

    /// Describe the index: dimension and per-namespace counts.
    async fn describe_stats(&self) -> Result<IndexStats>;
}

/// Resolve the index's vector space.
///
/// Uses the dimension reported by [`VectorIndex::describe_stats`], falling
/// back to `fallback_dim` only when the backend reports none.
pub async fn resolve_descriptor(
    index: &dyn VectorIndex,
    fallback_dim: usize,
    namespace: Option<String>,
) -> Result<IndexDescriptor> {
    let stats = index.describe_stats().await?;
    let target_dim = match stats.dimension {
        Some(d) if d > 0 => d,
        _ => {
            info!(fallback_dim, "index reported no dimension, using configured value");
            fallback_dim
        }
    };
    if target_dim == 0 {
        return Err(BridgeError::Configuration(
            "index dimension is unknown and no fallback dimension is configured".into(),
        ));
    }
    Ok(IndexDescriptor {
        target_dim,
        namespace,
    })
}

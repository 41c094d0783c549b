//! Embedding provider abstraction and the two local provider variants.
//!
//! Every provider turns texts into unit vectors in the target index space.
//! Three variants exist, selected once from configuration as a
//! [`ProviderKind`]:
//!
//! - **Remote**: an HTTPS inference endpoint serving the same model that
//!   built the index (implemented in the application crate).
//! - **[`AdaptedLocalProvider`]**: a small local model projected through a
//!   [`SpaceAdapter`] into the target space.
//! - **[`PlainLocalProvider`]**: a local model at its native dimension,
//!   padded or truncated by [`reconcile`]. Lowest retrieval quality.
//!
//! Local inference backends implement [`LocalEncoder`]; the providers here
//! are generic over it. Query/passage prefixing is not a provider concern:
//! callers apply a [`PrefixPolicy`](crate::prefix::PrefixPolicy) first.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapter::SpaceAdapter;
use crate::error::{BridgeError, Result};
use crate::prefix::PrefixPolicy;
use crate::vector::reconcile;

/// Which embedding path a provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Remote,
    AdaptedLocal,
    Local,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Remote => "remote",
            ProviderKind::AdaptedLocal => "adapted-local",
            ProviderKind::Local => "local",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces unit vectors in the target index space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    /// Model identifier (e.g. `"intfloat/multilingual-e5-large"`).
    fn model_name(&self) -> &str;
    /// Dimensionality of the returned vectors.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per text in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A local embedding model running in-process.
#[async_trait]
pub trait LocalEncoder: Send + Sync {
    fn model_name(&self) -> &str;
    /// Native output dimensionality.
    fn dims(&self) -> usize;
    /// Encode texts into unit-normalized vectors at the native dimension.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Adapted Local Provider ============

/// Small local model + learned projection into the target space.
pub struct AdaptedLocalProvider {
    encoder: Arc<dyn LocalEncoder>,
    adapter: Arc<SpaceAdapter>,
}

impl AdaptedLocalProvider {
    /// # Errors
    ///
    /// [`BridgeError::Configuration`] when the adapter's output dimension is
    /// not `target_dim`, or the encoder's declared dimension is not the
    /// adapter's `small_dim`.
    pub fn new(
        encoder: Arc<dyn LocalEncoder>,
        adapter: Arc<SpaceAdapter>,
        target_dim: usize,
    ) -> Result<Self> {
        if adapter.target_dim() != target_dim {
            return Err(BridgeError::Configuration(format!(
                "space adapter projects to {} dimensions but the index has {}",
                adapter.target_dim(),
                target_dim
            )));
        }
        if encoder.dims() != adapter.small_dim() {
            return Err(BridgeError::Configuration(format!(
                "local model '{}' produces {} dimensions but the adapter expects {}",
                encoder.model_name(),
                encoder.dims(),
                adapter.small_dim()
            )));
        }
        Ok(Self { encoder, adapter })
    }
}

#[async_trait]
impl EmbeddingProvider for AdaptedLocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AdaptedLocal
    }
    fn model_name(&self) -> &str {
        self.encoder.model_name()
    }
    fn dims(&self) -> usize {
        self.adapter.target_dim()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let small = self.encoder.encode(texts).await?;
        small.iter().map(|x| self.adapter.project(x)).collect()
    }
}

// ============ Plain Local Provider ============

/// Local model at native dimension, reconciled to the target dimension.
pub struct PlainLocalProvider {
    encoder: Arc<dyn LocalEncoder>,
    target_dim: usize,
}

impl PlainLocalProvider {
    pub fn new(encoder: Arc<dyn LocalEncoder>, target_dim: usize) -> Self {
        if encoder.dims() != target_dim {
            warn!(
                model = encoder.model_name(),
                native_dim = encoder.dims(),
                target_dim,
                "plain local embeddings will be padded/truncated; expect degraded retrieval"
            );
        }
        Self {
            encoder,
            target_dim,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for PlainLocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }
    fn model_name(&self) -> &str {
        self.encoder.model_name()
    }
    fn dims(&self) -> usize {
        self.target_dim
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let native = self.encoder.encode(texts).await?;
        native
            .into_iter()
            .map(|v| reconcile(v, self.target_dim))
            .collect()
    }
}

// ============ Helpers ============

/// Embed one query with the model family's query prefix applied.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    policy: &PrefixPolicy,
    text: &str,
) -> Result<Vec<f32>> {
    provider
        .embed(&[policy.query(text)])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BridgeError::TransientProvider("empty embedding response".into()))
}

/// Embed passages with the model family's passage prefix applied.
pub async fn embed_passages(
    provider: &dyn EmbeddingProvider,
    policy: &PrefixPolicy,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    provider.embed(&policy.passages(texts)).await
}

/// Fail with [`BridgeError::DegenerateInput`] unless `vector` has `expected` components.
pub fn ensure_dim(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(BridgeError::DegenerateInput(format!(
            "embedding dimension {} does not match index dimension {}",
            vector.len(),
            expected
        )));
    }
    Ok(())
}

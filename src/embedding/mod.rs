//! Concrete embedding backends and provider construction.
//!
//! The provider trait and the two local provider variants live in
//! [`vector_bridge_core::embedding`]. This module supplies what needs the
//! network or native inference:
//!
//! - **[`RemoteProvider`]**: hosted inference endpoint with a single
//!   primary → secondary fallback.
//! - **`FastembedEncoder`**: fastembed (ONNX Runtime bundled) local encoder,
//!   feature `local-embeddings-fastembed` (default).
//! - **`TractEncoder`**: pure-Rust tract local encoder for musl and Intel
//!   Mac, feature `local-embeddings-tract`.
//!
//! # Provider Selection
//!
//! | `embedding.provider` | Provider | Needs |
//! |----------------------|----------|-------|
//! | `remote` | [`RemoteProvider`] | network, optional `HF_TOKEN` |
//! | `adapted-local` | [`AdaptedLocalProvider`] | local model + adapter file |
//! | `local` | [`PlainLocalProvider`] | local model |

#[cfg(feature = "local-embeddings-fastembed")]
mod local;
#[cfg(feature = "local-embeddings-tract")]
mod local_tract;
mod remote;

use std::sync::Arc;

use tracing::info;

use vector_bridge_core::adapter::SpaceAdapter;
use vector_bridge_core::embedding::{
    AdaptedLocalProvider, EmbeddingProvider, LocalEncoder, PlainLocalProvider, ProviderKind,
};
use vector_bridge_core::error::{BridgeError, Result};

use crate::config::EmbeddingConfig;

pub use remote::RemoteProvider;

/// Native dimensionality of the supported local models.
pub fn local_model_dims(model_name: &str) -> Option<usize> {
    match model_name {
        "paraphrase-multilingual-minilm-l12-v2" => Some(384),
        "paraphrase-multilingual-mpnet-base-v2" => Some(768),
        "all-minilm-l6-v2" => Some(384),
        "bge-small-en-v1.5" => Some(384),
        "bge-base-en-v1.5" => Some(768),
        "multilingual-e5-small" => Some(384),
        "multilingual-e5-base" => Some(768),
        "multilingual-e5-large" => Some(1024),
        _ => None,
    }
}

/// Load the configured local model (`embedding.small_model`).
pub async fn create_local_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn LocalEncoder>> {
    let name = config.small_model.as_str();
    let dims = local_model_dims(name).ok_or_else(|| {
        BridgeError::Configuration(format!("Unknown local embedding model: '{name}'"))
    })?;
    load_encoder(name, dims, config.batch_size).await
}

#[cfg(feature = "local-embeddings-fastembed")]
async fn load_encoder(name: &str, dims: usize, batch_size: usize) -> Result<Arc<dyn LocalEncoder>> {
    Ok(Arc::new(
        local::FastembedEncoder::load(name, dims, batch_size).await?,
    ))
}

#[cfg(all(
    feature = "local-embeddings-tract",
    not(feature = "local-embeddings-fastembed")
))]
async fn load_encoder(name: &str, dims: usize, batch_size: usize) -> Result<Arc<dyn LocalEncoder>> {
    Ok(Arc::new(
        local_tract::TractEncoder::load(name, dims, batch_size).await?,
    ))
}

#[cfg(not(any(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract")))]
async fn load_encoder(
    _name: &str,
    _dims: usize,
    _batch_size: usize,
) -> Result<Arc<dyn LocalEncoder>> {
    Err(BridgeError::Configuration(
        "Local embedding provider requires one of: --features local-embeddings-fastembed, --features local-embeddings-tract".into(),
    ))
}

/// Create the configured [`EmbeddingProvider`] for an index of `target_dim`.
///
/// `adapter` is required for `adapted-local` and ignored otherwise;
/// `token` is only used by `remote`.
///
/// # Errors
///
/// [`BridgeError::Configuration`] when the adapter is missing or does not
/// fit the local model and index, or the local model cannot be loaded.
pub async fn create_provider(
    config: &EmbeddingConfig,
    target_dim: usize,
    adapter: Option<Arc<SpaceAdapter>>,
    token: Option<String>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Remote => Arc::new(RemoteProvider::new(config, target_dim, token)?),
        ProviderKind::AdaptedLocal => {
            let adapter = adapter.ok_or_else(|| {
                BridgeError::Configuration(
                    "provider 'adapted-local' requires a trained space adapter".into(),
                )
            })?;
            let encoder = create_local_encoder(config).await?;
            Arc::new(AdaptedLocalProvider::new(encoder, adapter, target_dim)?)
        }
        ProviderKind::Local => {
            let encoder = create_local_encoder(config).await?;
            Arc::new(PlainLocalProvider::new(encoder, target_dim))
        }
    };
    info!(
        provider = %provider.kind(),
        model = provider.model_name(),
        dims = provider.dims(),
        "embedding provider selected"
    );
    Ok(provider)
}

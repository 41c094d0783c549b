//! Process-wide registry of lazily initialized collaborators.
//!
//! A [`BridgeContext`] is built once at startup and shared by reference. It
//! owns four single-initialization cells: the vector index client, the
//! resolved [`IndexDescriptor`], the loaded [`SpaceAdapter`] and the
//! embedding provider. Concurrent first callers wait on one initialization;
//! a failed initialization is not cached and the next caller retries.

use std::sync::Arc;

use tokio::sync::OnceCell;

use vector_bridge_core::adapter::SpaceAdapter;
use vector_bridge_core::embedding::{EmbeddingProvider, ProviderKind};
use vector_bridge_core::error::{BridgeError, Result};
use vector_bridge_core::index::{resolve_descriptor, VectorIndex};
use vector_bridge_core::models::{IndexDescriptor, RetrievalCandidate};
use vector_bridge_core::retrieve::{retrieve, RetrievalSettings, RetrieveRequest};

use crate::adapter_store::load_adapter;
use crate::config::{Config, INDEX_API_KEY_ENV, INFERENCE_TOKEN_ENV};
use crate::embedding::create_provider;
use crate::pinecone::PineconeIndex;

pub struct BridgeContext {
    config: Config,
    index: OnceCell<Arc<dyn VectorIndex>>,
    descriptor: OnceCell<IndexDescriptor>,
    adapter: OnceCell<Arc<SpaceAdapter>>,
    provider: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl BridgeContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            index: OnceCell::new(),
            descriptor: OnceCell::new(),
            adapter: OnceCell::new(),
            provider: OnceCell::new(),
        }
    }

    /// Use `index` instead of connecting to the configured one.
    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = OnceCell::new_with(Some(index));
        self
    }

    /// Use `provider` instead of building one from configuration.
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = OnceCell::new_with(Some(provider));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The vector index client, connecting on first use.
    pub async fn index(&self) -> Result<Arc<dyn VectorIndex>> {
        self.index
            .get_or_try_init(|| async {
                let api_key = std::env::var(INDEX_API_KEY_ENV)
                    .ok()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        BridgeError::Configuration(format!(
                            "{INDEX_API_KEY_ENV} environment variable not set"
                        ))
                    })?;
                let index = PineconeIndex::connect(&self.config.index, &api_key).await?;
                Ok::<Arc<dyn VectorIndex>, BridgeError>(Arc::new(index))
            })
            .await
            .cloned()
    }

    /// The index's dimension and namespace, resolved on first use.
    pub async fn descriptor(&self) -> Result<&IndexDescriptor> {
        self.descriptor
            .get_or_try_init(|| async {
                let index = self.index().await?;
                resolve_descriptor(
                    index.as_ref(),
                    self.config.index.dimension,
                    self.config.index.namespace(),
                )
                .await
            })
            .await
    }

    /// The space adapter at `adapter.path`, loaded on first use.
    pub async fn adapter(&self) -> Result<Arc<SpaceAdapter>> {
        self.adapter
            .get_or_try_init(|| async {
                load_adapter(&self.config.adapter.path).await.map(Arc::new)
            })
            .await
            .cloned()
    }

    /// The configured embedding provider, built on first use.
    pub async fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.provider
            .get_or_try_init(|| async {
                let target_dim = self.descriptor().await?.target_dim;
                let adapter = match self.config.embedding.provider {
                    ProviderKind::AdaptedLocal => Some(self.adapter().await?),
                    ProviderKind::Remote | ProviderKind::Local => None,
                };
                let token = std::env::var(INFERENCE_TOKEN_ENV).ok();
                create_provider(&self.config.embedding, target_dim, adapter, token).await
            })
            .await
            .cloned()
    }

    /// Pipeline settings derived from configuration and the resolved index.
    pub async fn retrieval_settings(&self) -> Result<RetrievalSettings> {
        let descriptor = self.descriptor().await?.clone();
        Ok(RetrievalSettings {
            descriptor,
            prefix: self.config.embedding.prefix_policy(),
            noise: self.config.filter.thresholds(),
            text_keys: self.config.retrieval.text_keys.clone(),
            source_tag_field: self.config.retrieval.source_tag_field.clone(),
        })
    }

    /// A request pre-filled with the configured retrieval defaults.
    pub fn request(&self, query: &str) -> RetrieveRequest {
        RetrieveRequest {
            query: query.to_string(),
            top_k: self.config.retrieval.top_k,
            candidate_k: self.config.retrieval.candidate_k,
            filters: None,
            source_tag: None,
            min_score: self.config.retrieval.min_score,
        }
    }

    /// Run one query through the pipeline.
    pub async fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<RetrievalCandidate>> {
        let index = self.index().await?;
        let provider = self.provider().await?;
        let settings = self.retrieval_settings().await?;
        retrieve(index.as_ref(), provider.as_ref(), &settings, request).await
    }
}

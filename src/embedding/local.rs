//! fastembed-backed local encoder (primary platforms).
//!
//! The ONNX model is downloaded on first use and cached by fastembed; after
//! that inference is fully offline. The loaded model is kept for the life of
//! the encoder and every call runs on the blocking thread pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use vector_bridge_core::embedding::LocalEncoder;
use vector_bridge_core::error::{BridgeError, Result};
use vector_bridge_core::vector::l2_normalize;

/// Local encoder running a fastembed model in-process.
pub struct FastembedEncoder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastembedEncoder {
    /// Load (downloading if needed) the named model.
    pub async fn load(model_name: &str, dims: usize, batch_size: usize) -> Result<Self> {
        let fastembed_model = config_to_fastembed_model(model_name)?;
        let name = model_name.to_string();
        let model = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(
                InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
        })
        .await
        .map_err(|e| BridgeError::Configuration(format!("local model loader panicked: {e}")))?
        .map_err(|e| {
            BridgeError::Configuration(format!(
                "failed to initialize local embedding model '{name}': {e}"
            ))
        })?;

        info!(model = %model_name, dims, "local embedding model loaded");
        Ok(Self {
            model_name: model_name.to_string(),
            dims,
            batch_size,
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl LocalEncoder for FastembedEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        let mut embeddings = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| BridgeError::TransientProvider("local model lock poisoned".into()))?;
            guard
                .embed(texts, Some(batch_size))
                .map_err(|e| BridgeError::TransientProvider(format!("local embedding failed: {e}")))
        })
        .await
        .map_err(|e| BridgeError::TransientProvider(format!("local embedding task failed: {e}")))??;

        for v in &mut embeddings {
            l2_normalize(v);
        }
        Ok(embeddings)
    }
}

/// Map a configured model identifier to its fastembed model.
pub(crate) fn config_to_fastembed_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "paraphrase-multilingual-minilm-l12-v2" => Ok(EmbeddingModel::ParaphraseMLMiniLML12V2),
        "paraphrase-multilingual-mpnet-base-v2" => Ok(EmbeddingModel::ParaphraseMLMpnetBaseV2),
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(EmbeddingModel::MultilingualE5Large),
        other => Err(BridgeError::Configuration(format!(
            "Unknown local embedding model: '{other}'. Supported models: \
             paraphrase-multilingual-minilm-l12-v2, paraphrase-multilingual-mpnet-base-v2, \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large"
        ))),
    }
}

//! Tract-based local encoder (fallback for musl and Intel Mac).
//!
//! Pure-Rust path: the ONNX export and tokenizer are downloaded from the
//! model's Hugging Face repository into `~/.cache/vector-bridge/models`,
//! loaded with tract-onnx once, and run on the blocking thread pool.
#![cfg_attr(
    all(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"),
    allow(dead_code)
)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tract_onnx::prelude::*;
use tracing::info;

use vector_bridge_core::embedding::LocalEncoder;
use vector_bridge_core::error::{BridgeError, Result};
use vector_bridge_core::vector::{l2_normalize, mean_pool};

const MAX_SEQ_LEN: usize = 256;

type Runnable = TypedRunnableModel<TypedModel>;

/// Model manifest: name -> (hub repo, onnx path in repo, tokenizer path in repo).
fn model_manifest(model_name: &str) -> anyhow::Result<(&'static str, &'static str, &'static str)> {
    match model_name {
        "paraphrase-multilingual-minilm-l12-v2" => Ok((
            "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2",
            "onnx/model.onnx",
            "tokenizer.json",
        )),
        "all-minilm-l6-v2" => Ok((
            "sentence-transformers/all-MiniLM-L6-v2",
            "onnx/model.onnx",
            "tokenizer.json",
        )),
        _ => bail!(
            "Tract backend supports paraphrase-multilingual-minilm-l12-v2 and all-minilm-l6-v2. Requested: '{}'",
            model_name
        ),
    }
}

fn cache_dir() -> anyhow::Result<PathBuf> {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(base)
        .join(".cache")
        .join("vector-bridge")
        .join("models");
    std::fs::create_dir_all(&dir).context("Create cache dir")?;
    Ok(dir)
}

fn download_to_cache(repo: &str, path: &str, cache_path: &Path) -> anyhow::Result<()> {
    if cache_path.exists() {
        return Ok(());
    }
    let url = format!("https://huggingface.co/{}/resolve/main/{}", repo, path);
    let bytes = reqwest::blocking::get(&url)
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .with_context(|| format!("Download {}", url))?;
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent).context("Create cache parent")?;
    }
    std::fs::write(cache_path, &bytes).context("Write cache")?;
    Ok(())
}

struct TractModel {
    tokenizer: tokenizers::Tokenizer,
    plan: Runnable,
}

fn load_model(model_name: &str) -> anyhow::Result<TractModel> {
    let (repo, onnx_rel, tokenizer_rel) = model_manifest(model_name)?;
    let model_dir = cache_dir()?.join(model_name);
    let onnx_path = model_dir.join(onnx_rel);
    let tokenizer_path = model_dir.join(tokenizer_rel);
    download_to_cache(repo, onnx_rel, &onnx_path)?;
    download_to_cache(repo, tokenizer_rel, &tokenizer_path)?;

    let tokenizer =
        tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| anyhow!("Load tokenizer: {}", e))?;
    let plan = tract_onnx::onnx()
        .model_for_path(&onnx_path)?
        .into_optimized()?
        .into_runnable()?;
    Ok(TractModel { tokenizer, plan })
}

fn run_batch(model: &TractModel, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
    let encodings = texts
        .iter()
        .map(|s| {
            model
                .tokenizer
                .encode(s.as_str(), true)
                .map_err(|e| anyhow!("Tokenize: {}", e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(1)
        .clamp(1, MAX_SEQ_LEN);
    let rows = encodings.len();
    let mut input_ids = vec![0i64; rows * seq_len];
    let mut attention_mask = vec![0i64; rows * seq_len];
    for (i, enc) in encodings.iter().enumerate() {
        for (j, &id) in enc.get_ids().iter().take(seq_len).enumerate() {
            input_ids[i * seq_len + j] = id as i64;
            attention_mask[i * seq_len + j] = 1;
        }
    }

    let ids: Tensor = ndarray::Array2::from_shape_vec((rows, seq_len), input_ids)?.into();
    let mask: Tensor = ndarray::Array2::from_shape_vec((rows, seq_len), attention_mask)?.into();
    let outputs = model.plan.run(tvec!(ids.into(), mask.into()))?;
    let output = outputs
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No output tensor"))?;
    let view = output.to_array_view::<f32>()?;

    // [batch, hidden] sentence embeddings or [batch, seq_len, hidden] token states
    match view.shape().len() {
        2 => Ok(view
            .outer_iter()
            .map(|row| row.iter().copied().collect())
            .collect()),
        3 => encodings
            .iter()
            .enumerate()
            .map(|(i, enc)| {
                let valid = enc.get_ids().len().clamp(1, seq_len);
                let tokens: Vec<Vec<f32>> = (0..valid)
                    .map(|j| view.slice(ndarray::s![i, j, ..]).iter().copied().collect())
                    .collect();
                mean_pool(&tokens).ok_or_else(|| anyhow!("Empty token output"))
            })
            .collect(),
        _ => bail!("Unexpected output shape: {:?}", view.shape()),
    }
}

/// Local encoder running an ONNX export through tract.
pub struct TractEncoder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<TractModel>,
}

impl TractEncoder {
    /// Download (if needed) and load the named model.
    pub async fn load(model_name: &str, dims: usize, batch_size: usize) -> Result<Self> {
        let name = model_name.to_string();
        let model = tokio::task::spawn_blocking(move || load_model(&name))
            .await
            .map_err(|e| BridgeError::Configuration(format!("local model loader panicked: {e}")))?
            .map_err(|e| {
                BridgeError::Configuration(format!(
                    "failed to initialize local embedding model '{model_name}': {e:#}"
                ))
            })?;
        info!(model = %model_name, dims, backend = "tract", "local embedding model loaded");
        Ok(Self {
            model_name: model_name.to_string(),
            dims,
            batch_size,
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl LocalEncoder for TractEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size.max(1);

        tokio::task::spawn_blocking(move || {
            let mut out = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                let mut vectors = run_batch(&model, chunk)?;
                for v in &mut vectors {
                    l2_normalize(v);
                }
                out.extend(vectors);
            }
            Ok::<_, anyhow::Error>(out)
        })
        .await
        .map_err(|e| BridgeError::TransientProvider(format!("local embedding task failed: {e}")))?
        .map_err(|e| BridgeError::TransientProvider(format!("local embedding failed: {e:#}")))
    }
}

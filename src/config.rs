use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vector_bridge_core::embedding::ProviderKind;
use vector_bridge_core::prefix::{is_prefix_sensitive, PrefixPolicy};
use vector_bridge_core::text::NoiseThresholds;
use vector_bridge_core::train::{FitParams, SamplingParams};

/// Environment variable holding the vector index API key.
pub const INDEX_API_KEY_ENV: &str = "PINECONE_API_KEY";
/// Environment variable holding the optional inference API token.
pub const INFERENCE_TOKEN_ENV: &str = "HF_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub name: String,
    /// Data-plane URL; resolved through the control plane when absent.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_control_url")]
    pub control_url: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Used only when the index does not report its own dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_control_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_dimension() -> usize {
    1024
}
fn default_timeout_secs() -> u64 {
    45
}

impl IndexConfig {
    /// The configured namespace, with an empty string meaning the default one.
    pub fn namespace(&self) -> Option<String> {
        self.namespace.clone().filter(|ns| !ns.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    /// Model that built the index; served by the remote endpoint.
    #[serde(default = "default_model")]
    pub model: String,
    /// Local model used by the `adapted-local` and `local` providers.
    #[serde(default = "default_small_model")]
    pub small_model: String,
    /// Overrides prefix detection from the model identifier.
    #[serde(default)]
    pub prefix_sensitive: Option<bool>,
    #[serde(default = "default_inference_url")]
    pub inference_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            small_model: default_small_model(),
            prefix_sensitive: None,
            inference_url: default_inference_url(),
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Remote
}
fn default_model() -> String {
    "intfloat/multilingual-e5-large".to_string()
}
fn default_small_model() -> String {
    "paraphrase-multilingual-minilm-l12-v2".to_string()
}
fn default_inference_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}
fn default_batch_size() -> usize {
    64
}

impl EmbeddingConfig {
    /// The model that actually encodes queries for the configured provider.
    pub fn active_model(&self) -> &str {
        match self.provider {
            ProviderKind::Remote => &self.model,
            ProviderKind::AdaptedLocal | ProviderKind::Local => &self.small_model,
        }
    }

    /// Prefix policy for the active model.
    pub fn prefix_policy(&self) -> PrefixPolicy {
        PrefixPolicy::new(
            self.prefix_sensitive
                .unwrap_or_else(|| is_prefix_sensitive(self.active_model())),
        )
    }

    /// Prefix policy for the local model, used when training adapters.
    pub fn small_prefix_policy(&self) -> PrefixPolicy {
        match self.provider {
            ProviderKind::Remote => PrefixPolicy::for_model(&self.small_model),
            ProviderKind::AdaptedLocal | ProviderKind::Local => self.prefix_policy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    #[serde(default = "default_adapter_path")]
    pub path: PathBuf,
    #[serde(default = "default_target_samples")]
    pub target_samples: usize,
    #[serde(default = "default_scan_top_k")]
    pub scan_top_k: usize,
    #[serde(default = "default_scan_rounds")]
    pub scan_rounds: usize,
    #[serde(default = "default_min_pairs")]
    pub min_pairs: usize,
    #[serde(default = "default_ridge_alpha")]
    pub ridge_alpha: f64,
    #[serde(default = "default_probe_scale")]
    pub probe_scale: f32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_fetch_batch")]
    pub fetch_batch: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            path: default_adapter_path(),
            target_samples: default_target_samples(),
            scan_top_k: default_scan_top_k(),
            scan_rounds: default_scan_rounds(),
            min_pairs: default_min_pairs(),
            ridge_alpha: default_ridge_alpha(),
            probe_scale: default_probe_scale(),
            seed: 0,
            max_text_chars: default_max_text_chars(),
            fetch_batch: default_fetch_batch(),
        }
    }
}

fn default_adapter_path() -> PathBuf {
    PathBuf::from("models/space_adapter_v1.vba")
}
fn default_target_samples() -> usize {
    4000
}
fn default_scan_top_k() -> usize {
    128
}
fn default_scan_rounds() -> usize {
    80
}
fn default_min_pairs() -> usize {
    200
}
fn default_ridge_alpha() -> f64 {
    1.0
}
fn default_probe_scale() -> f32 {
    1e-3
}
fn default_max_text_chars() -> usize {
    512
}
fn default_fetch_batch() -> usize {
    256
}

impl AdapterConfig {
    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            target_samples: self.target_samples,
            scan_top_k: self.scan_top_k,
            scan_rounds: self.scan_rounds,
            probe_scale: self.probe_scale,
            seed: self.seed,
            max_text_chars: self.max_text_chars,
        }
    }

    pub fn fit_params(&self, embedding: &EmbeddingConfig) -> FitParams {
        FitParams {
            ridge_alpha: self.ridge_alpha,
            min_pairs: self.min_pairs,
            batch_size: embedding.batch_size,
            prefix: embedding.small_prefix_policy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default = "default_source_tag_field")]
    pub source_tag_field: String,
    #[serde(default = "default_text_keys")]
    pub text_keys: Vec<String>,
    /// Reserved. Ranking uses the index score as-is; the weights are not combined.
    #[serde(default = "default_w_semantic")]
    pub w_semantic: f64,
    /// Reserved, see `w_semantic`.
    #[serde(default = "default_w_lexical")]
    pub w_lexical: f64,
    /// Reserved, see `w_semantic`.
    #[serde(default)]
    pub w_recency: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            min_score: None,
            source_tag_field: default_source_tag_field(),
            text_keys: default_text_keys(),
            w_semantic: default_w_semantic(),
            w_lexical: default_w_lexical(),
            w_recency: 0.0,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_candidate_k() -> usize {
    20
}
fn default_source_tag_field() -> String {
    "company".to_string()
}
fn default_text_keys() -> Vec<String> {
    vec!["text".to_string(), "chunk".to_string()]
}
fn default_w_semantic() -> f64 {
    0.7
}
fn default_w_lexical() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_single_char_ratio")]
    pub max_single_char_ratio: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_single_char_ratio: default_max_single_char_ratio(),
        }
    }
}

fn default_min_chars() -> usize {
    25
}
fn default_max_single_char_ratio() -> f64 {
    0.30
}

impl FilterConfig {
    pub fn thresholds(&self) -> NoiseThresholds {
        NoiseThresholds {
            min_chars: self.min_chars,
            max_single_char_ratio: self.max_single_char_ratio,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate index
    if config.index.name.trim().is_empty() {
        anyhow::bail!("index.name must not be empty");
    }
    if config.index.timeout_secs == 0 || config.embedding.timeout_secs == 0 {
        anyhow::bail!("timeout_secs must be > 0");
    }

    // Validate embedding
    if config.embedding.model.trim().is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }
    if config.embedding.provider != ProviderKind::Remote
        && config.embedding.small_model.trim().is_empty()
    {
        anyhow::bail!(
            "embedding.small_model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.candidate_k < 1 {
        anyhow::bail!("retrieval.candidate_k must be >= 1");
    }
    if config.retrieval.text_keys.is_empty() {
        anyhow::bail!("retrieval.text_keys must list at least one key");
    }

    // Validate filter
    if !(0.0..=1.0).contains(&config.filter.max_single_char_ratio) {
        anyhow::bail!("filter.max_single_char_ratio must be in [0.0, 1.0]");
    }

    // Validate adapter
    if !(config.adapter.ridge_alpha >= 0.0) {
        anyhow::bail!("adapter.ridge_alpha must be >= 0");
    }
    if config.adapter.min_pairs < 1 {
        anyhow::bail!("adapter.min_pairs must be >= 1");
    }
    if !(config.adapter.probe_scale > 0.0) {
        anyhow::bail!("adapter.probe_scale must be > 0");
    }
    if config.adapter.scan_top_k == 0 || config.adapter.fetch_batch == 0 {
        anyhow::bail!("adapter.scan_top_k and adapter.fetch_batch must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config("[index]\nname = \"insurance\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.index.dimension, 1024);
        assert_eq!(config.index.timeout_secs, 45);
        assert_eq!(config.embedding.provider, ProviderKind::Remote);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.candidate_k, 20);
        assert_eq!(config.adapter.min_pairs, 200);
        assert_eq!(config.filter.min_chars, 25);
        assert!(config.embedding.prefix_policy().prefix_sensitive);
    }

    #[test]
    fn test_provider_parsing() {
        let file = write_config(
            "[index]\nname = \"insurance\"\n[embedding]\nprovider = \"adapted-local\"\n",
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.embedding.provider, ProviderKind::AdaptedLocal);
        // minilm is not prefix-sensitive
        assert!(!config.embedding.prefix_policy().prefix_sensitive);

        let file = write_config("[index]\nname = \"i\"\n[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_prefix_override() {
        let file = write_config(
            "[index]\nname = \"i\"\n[embedding]\nprefix_sensitive = false\n",
        );
        let config = load_config(file.path()).unwrap();
        assert!(!config.embedding.prefix_policy().prefix_sensitive);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        for body in [
            "[index]\nname = \"\"\n",
            "[index]\nname = \"i\"\n[retrieval]\ntop_k = 0\n",
            "[index]\nname = \"i\"\n[filter]\nmax_single_char_ratio = 1.5\n",
            "[index]\nname = \"i\"\n[adapter]\nridge_alpha = -1.0\n",
            "[index]\nname = \"i\"\n[adapter]\nmin_pairs = 0\n",
        ] {
            let file = write_config(body);
            assert!(load_config(file.path()).is_err(), "accepted: {body}");
        }
    }

    #[test]
    fn test_empty_namespace_is_default() {
        let file = write_config("[index]\nname = \"i\"\nnamespace = \"\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.index.namespace(), None);
    }

    #[test]
    fn test_example_config_loads() {
        let file = write_config(include_str!("../config/vbr.example.toml"));
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.index.name, "insurance-policies");
        assert_eq!(config.adapter.fetch_batch, 256);
        assert_eq!(config.retrieval.text_keys, vec!["text", "chunk"]);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/vbr.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

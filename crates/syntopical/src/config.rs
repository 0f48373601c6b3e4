//! TOML configuration.
//!
//! Every section and field has a default, so an empty (or missing) file is a
//! valid configuration that uses the offline hashing embedder and an SQLite
//! database under `data/`.
//!
//! ```toml
//! [db]
//! path = "data/syntopical.sqlite"
//!
//! [chunking]
//! target_tokens = 250
//! overlap_tokens = 50
//!
//! [retrieval]
//! top_k = 8
//! min_documents = 3
//! token_budget = 3000
//!
//! [embedding]
//! provider = "openai"            # hashing | openai | ollama
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! provider = "openai"            # openai | ollama | disabled
//! model = "gpt-3.5-turbo"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use syntopical_core::analysis::AnalysisConfig;
use syntopical_core::chunk::ChunkParams;
use syntopical_core::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/syntopical.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_target_tokens() -> usize {
    250
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Distinct papers `analyze` draws on before backfilling.
    #[serde(default = "default_min_documents")]
    pub min_documents: usize,
    /// Context budget in estimated tokens (4 bytes per token).
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_documents: default_min_documents(),
            token_budget: default_token_budget(),
        }
    }
}

fn default_top_k() -> usize {
    8
}
fn default_min_documents() -> usize {
    3
}
fn default_token_budget() -> usize {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Base URL override (e.g. a local Ollama or an OpenAI-compatible proxy).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    32
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            url: None,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArxivConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_results: default_max_results(),
            url: None,
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("data/arxiv_papers")
}
fn default_max_results() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Globs applied to files found under directory arguments.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

impl Config {
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams::new(self.chunking.target_tokens, self.chunking.overlap_tokens)
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            top_k: self.retrieval.top_k,
            token_budget: self.retrieval.token_budget,
            min_documents: self.retrieval.min_documents,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_retries)
    }
}

/// Load and validate the configuration at `path`.
///
/// A missing file yields [`Config::default`].
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.target_tokens == 0 {
        bail!("chunking.target_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.target_tokens {
        bail!("chunking.overlap_tokens must be smaller than chunking.target_tokens");
    }

    // Retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.token_budget == 0 {
        bail!("retrieval.token_budget must be > 0");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "hashing" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashing, openai, or ollama.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Language model
    match config.llm.provider.as_str() {
        "openai" | "ollama" | "disabled" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be openai, ollama, or disabled.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.retry.max_retries > 1 {
        bail!("retry.max_retries must be 0 or 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.target_tokens, 250);
        assert_eq!(config.retrieval.min_documents, 3);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.upload.include_globs, vec!["**/*.pdf"]);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/syntopical.toml")).unwrap();
        assert_eq!(config.db.path, PathBuf::from("data/syntopical.sqlite"));
    }

    #[test]
    fn test_rejects_overlap_not_below_target() {
        let config: Config =
            toml::from_str("[chunking]\ntarget_tokens = 100\noverlap_tokens = 100\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_more_than_one_retry() {
        let config: Config = toml::from_str("[retry]\nmax_retries = 3\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_network_embedder_requires_model() {
        let config: Config = toml::from_str("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(validate(&config).is_err());
        let config: Config = toml::from_str(
            "[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        )
        .unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn test_llm_disabled_provider() {
        assert!(Config::default().llm.is_enabled());
        let config: Config = toml::from_str("[llm]\nprovider = \"disabled\"\n").unwrap();
        assert!(!config.llm.is_enabled());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let config: Config = toml::from_str("[llm]\nprovider = \"magic\"\n").unwrap();
        assert!(validate(&config).is_err());
    }
}

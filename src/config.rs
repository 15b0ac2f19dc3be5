//! TOML configuration.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration. See `config/fitflix.toml` for a commented example.
//!
//! ```toml
//! [knowledge_base]
//! dir = "./data/knowledge_base"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! provider = "hash"           # local | openai | ollama | hash | disabled
//!
//! [generation]
//! provider = "gemini"         # gemini | openai
//! model = "gemini-1.5-flash"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fitflix_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use fitflix_core::store::DEFAULT_COLLECTION;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where knowledge-base files are read from.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_dir")]
    pub dir: PathBuf,
    /// Matched against paths relative to `dir`.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Descend into subdirectories.
    #[serde(default)]
    pub recursive: bool,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            dir: default_kb_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            recursive: false,
        }
    }
}

fn default_kb_dir() -> PathBuf {
    PathBuf::from("./data/knowledge_base")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.md".to_string(), "*.txt".to_string()]
}

/// Text splitter budget, in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLite database file. Parent directories are created on connect.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/fitflix.sqlite")
}
fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// `local` when fastembed is compiled in, otherwise the offline `hash`
/// provider, so an empty config works in every build.
fn default_embedding_provider() -> String {
    if cfg!(feature = "local-embeddings") {
        "local".to_string()
    } else {
        "hash".to_string()
    }
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Results passed to the generator per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Drop results below this similarity before generation. Off by default.
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: None,
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// Replaces the built-in FIT-FLIX persona.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Environment variable holding the API key. Defaults per provider:
    /// `GOOGLE_API_KEY` for gemini, `OPENAI_API_KEY` for openai.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override the provider's API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_generation_timeout_secs(),
            system_prompt: None,
            api_key_env: None,
            base_url: None,
        }
    }
}

impl GenerationConfig {
    pub fn api_key_var(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(var), _) => var,
            (None, "openai") => "OPENAI_API_KEY",
            (None, _) => "GOOGLE_API_KEY",
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    1000
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Chat sessions kept in memory. The least recently used one is
    /// dropped when a new session would exceed this.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_sessions() -> usize {
    1000
}

/// Log filter settings. `RUST_LOG` overrides both fields.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    /// Per-target overrides, e.g. `fitflix::server = "info"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.store.collection.trim().is_empty() {
        bail!("store.collection must not be empty");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if let Some(min) = config.retrieval.min_similarity {
        if !(0.0..=1.0).contains(&min) {
            bail!("retrieval.min_similarity must be in [0.0, 1.0]");
        }
    }

    // Embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "openai" | "ollama" => {
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
        }
        "local" | "hash" | "disabled" => {
            if embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, hash, or disabled.",
            other
        ),
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Generation
    let generation = &config.generation;
    match generation.provider.as_str() {
        "gemini" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini or openai.",
            other
        ),
    }
    if generation.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }
    if !(0.0..=2.0).contains(&generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if generation.max_output_tokens == 0 {
        bail!("generation.max_output_tokens must be > 0");
    }

    if config.server.max_sessions == 0 {
        bail!("server.max_sessions must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.store.collection, "fitflix_documents");
        assert_eq!(config.generation.model, "gemini-1.5-flash");
        assert!((config.generation.temperature - 0.7).abs() < 1e-6);
        assert_eq!(config.generation.max_output_tokens, 1000);
        assert_eq!(config.server.max_sessions, 1000);
        assert_eq!(config.knowledge_base.include_globs, vec!["*.md", "*.txt"]);
        assert!(!config.knowledge_base.recursive);
        assert_eq!(config.logging.default, "warn");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = parse_config(
            r#"
            [chunking]
            chunk_size = 500
            chunk_overlap = 50

            [embedding]
            provider = "hash"
            dims = 128

            [retrieval]
            top_k = 3
            min_similarity = 0.2

            [logging]
            default = "info"
            [logging.modules]
            "fitflix::server" = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.embedding.dims, Some(128));
        assert_eq!(config.retrieval.min_similarity, Some(0.2));
        assert_eq!(config.logging.modules["fitflix::server"], "debug");
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        assert!(parse_config("[chunking]\nchunk_size = 0\nchunk_overlap = 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_openai_embedding_requires_model_and_dims() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
        assert!(parse_config("[retrieval]\nmin_similarity = 1.5\n").is_err());
        assert!(parse_config("[generation]\ntemperature = 3.0\n").is_err());
        assert!(parse_config("[generation]\nmax_output_tokens = 0\n").is_err());
    }

    #[test]
    fn test_api_key_var_defaults() {
        let mut generation = GenerationConfig::default();
        assert_eq!(generation.api_key_var(), "GOOGLE_API_KEY");
        generation.provider = "openai".into();
        assert_eq!(generation.api_key_var(), "OPENAI_API_KEY");
        generation.api_key_env = Some("MY_KEY".into());
        assert_eq!(generation.api_key_var(), "MY_KEY");
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = parse_config(include_str!("../config/fitflix.toml")).unwrap();
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_default_embedding_provider_is_built_in() {
        let config = parse_config("").unwrap();
        if cfg!(feature = "local-embeddings") {
            assert_eq!(config.embedding.provider, "local");
        } else {
            assert_eq!(config.embedding.provider, "hash");
        }
        assert!(crate::embedding::create_provider(&config.embedding).is_ok());
    }

    #[test]
    fn test_rejects_zero_max_sessions() {
        let err = parse_config("[server]\nmax_sessions = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_sessions"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/fitflix.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

//! TOML configuration.
//!
//! Only `[store]` and `[documents]` are required; every other section falls
//! back to documented defaults. A handful of keys can be overridden from the
//! environment after parsing (see [`apply_env_overrides`]).

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub dates: DatesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding the on-disk index. Created when missing.
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "joe_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by adjacent windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: default_embedding_base_url(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Model name recorded on the store collection. Matches what the
    /// configured provider reports as its `model_name`.
    pub fn model_id(&self) -> &str {
        match self.provider.as_str() {
            "hashing" => "hashing",
            _ => &self.model,
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_attempts() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    /// Name the sanitizer watches for in third-person slips.
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: PathBuf,
    #[serde(default = "default_brainlift_path")]
    pub brainlift_path: PathBuf,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            system_prompt_path: default_system_prompt_path(),
            brainlift_path: default_brainlift_path(),
        }
    }
}

fn default_persona_name() -> String {
    "Joe".to_string()
}
fn default_system_prompt_path() -> PathBuf {
    PathBuf::from("prompt/system.md")
}
fn default_brainlift_path() -> PathBuf {
    PathBuf::from("docs/brainliftV0.txt")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_provider() -> String {
    "anthropic".to_string()
}
fn default_completion_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}
fn default_max_output_tokens() -> u32 {
    1200
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatesConfig {
    /// IANA zone name used to decide what "today" is.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for DatesConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

/// Read, parse, override from the process environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content)
        .map_err(|e| Error::Configuration(format!("failed to parse config file: {}", e)))
}

/// Apply `JOE_AI_PROVIDER`, `JOE_AI_TIMEZONE` and `BRAINLIFT_PATH`.
///
/// The lookup is injected so tests never touch the real environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(provider) = lookup("JOE_AI_PROVIDER").filter(|v| !v.trim().is_empty()) {
        config.completion.provider = provider.trim().to_lowercase();
    }
    if let Some(tz) = lookup("JOE_AI_TIMEZONE").filter(|v| !v.trim().is_empty()) {
        config.dates.timezone = tz.trim().to_string();
    }
    if let Some(path) = lookup("BRAINLIFT_PATH").filter(|v| !v.trim().is_empty()) {
        config.persona.brainlift_path = PathBuf::from(path);
    }
}

pub fn validate(config: &Config) -> Result<()> {
    validate_chunking(config.chunking.chunk_size, config.chunking.overlap)?;

    if config.embedding.batch_size == 0 {
        return Err(Error::Configuration(
            "embedding.batch_size must be > 0".to_string(),
        ));
    }
    if config.embedding.max_attempts == 0 {
        return Err(Error::Configuration(
            "embedding.max_attempts must be >= 1".to_string(),
        ));
    }
    if config.embedding.dims == 0 {
        return Err(Error::Configuration("embedding.dims must be > 0".to_string()));
    }
    match config.embedding.provider.as_str() {
        "openai" | "hashing" => {}
        other => {
            return Err(Error::Configuration(format!(
                "Unknown embedding provider: '{}'. Must be openai or hashing.",
                other
            )))
        }
    }

    if config.retrieval.top_k == 0 {
        return Err(Error::Configuration(
            "retrieval.top_k must be >= 1".to_string(),
        ));
    }

    match config.completion.provider.as_str() {
        "anthropic" | "openai" => {}
        other => {
            return Err(Error::Configuration(format!(
                "Unknown completion provider: '{}'. Must be anthropic or openai.",
                other
            )))
        }
    }
    if config.completion.max_output_tokens == 0 {
        return Err(Error::Configuration(
            "completion.max_output_tokens must be > 0".to_string(),
        ));
    }

    if config.store.collection.trim().is_empty() {
        return Err(Error::Configuration(
            "store.collection must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// A window that does not advance would never terminate.
pub fn validate_chunking(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size <= overlap {
        return Err(Error::Configuration(format!(
            "chunking.chunk_size ({}) must be greater than chunking.overlap ({})",
            chunk_size, overlap
        )));
    }
    Ok(())
}

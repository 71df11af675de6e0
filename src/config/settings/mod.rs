
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";
pub const PINECONE_ENV_VAR: &str = "PINECONE_ENV";

const CONFIG_FILE_NAME: &str = "config.toml";
const SUPPORTED_METRICS: [&str; 3] = ["cosine", "euclidean", "dotproduct"];

/// Where chunk vectors live
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory index rebuilt on every run
    #[default]
    Local,
    /// Durable index hosted by a Pinecone-compatible service
    Remote,
}

/// Whether previous exchanges are replayed in front of a new question
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    #[default]
    None,
    Accumulated,
}

impl fmt::Display for Backend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

impl fmt::Display for HistoryMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Accumulated => f.write_str("accumulated"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub credentials: Credentials,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub backend: Backend,
    pub history: HistoryMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub completion_model: String,
    pub embedding_dimension: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub batch_size: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            completion_model: "gpt-3.5-turbo-instruct".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            temperature: 0.7,
            max_tokens: 256,
            batch_size: 100,
            timeout_seconds: 60,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PineconeConfig {
    pub control_url: String,
    pub api_version: String,
    pub cloud: String,
    pub metric: String,
    pub upsert_batch_size: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    /// How many times to poll a freshly created index before giving up
    pub ready_poll_attempts: u32,
    pub ready_poll_interval_ms: u64,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            control_url: "https://api.pinecone.io/".to_string(),
            api_version: "2024-07".to_string(),
            cloud: "aws".to_string(),
            metric: "cosine".to_string(),
            upsert_batch_size: 100,
            timeout_seconds: 60,
            retry_attempts: 3,
            ready_poll_attempts: 60,
            ready_poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub local_top_k: usize,
    pub remote_top_k: usize,
    pub wrap_width: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            local_top_k: 5,
            remote_top_k: 4,
            wrap_width: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_turns: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// API secrets. Never written to disk; read from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub pinecone_environment: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_deref().map(mask_secret))
            .field(
                "pinecone_api_key",
                &self.pinecone_api_key.as_deref().map(mask_secret),
            )
            .field("pinecone_environment", &self.pinecone_environment)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 20000)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be greater than 0)")]
    InvalidMaxTokens(u32),
    #[error("Invalid batch size: {0} (must be between 1 and {1})")]
    InvalidBatchSize(u32, u32),
    #[error("Invalid timeout: {0} (must be greater than 0 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid metric: {0} (must be one of cosine, euclidean, dotproduct)")]
    InvalidMetric(String),
    #[error("Invalid cloud: {0} (cannot be empty)")]
    InvalidCloud(String),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Chunk separator cannot be empty")]
    EmptySeparator,
    #[error("Invalid top k: {0} (must be greater than 0)")]
    InvalidTopK(usize),
    #[error("Invalid wrap width: {0} (must be greater than 0)")]
    InvalidWrapWidth(usize),
    #[error("Invalid history size: {0} (must be greater than 0)")]
    InvalidHistorySize(usize),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid host: {0} (cannot be empty)")]
    InvalidHost(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            openai: OpenAiConfig::default(),
            pinecone: PineconeConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            history: HistoryConfig::default(),
            server: ServerConfig::default(),
            credentials: Credentials::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl Config {
    /// Default configuration directory, `~/.pdf-rag`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".pdf-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("pdf-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when the file is absent.
    ///
    /// Credentials are left empty; see [`Config::with_env_credentials`].
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Attach credentials read from the process environment
    #[inline]
    #[must_use]
    pub fn with_env_credentials(mut self) -> Self {
        self.credentials = Credentials::from_env();
        self
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;
        self.pinecone.validate()?;
        self.chunking.validate()?;
        self.validate_retrieval()?;
        self.validate_server()?;

        if self.history.max_turns == 0 {
            return Err(ConfigError::InvalidHistorySize(self.history.max_turns));
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let retrieval = &self.retrieval;

        if retrieval.local_top_k == 0 {
            return Err(ConfigError::InvalidTopK(retrieval.local_top_k));
        }
        if retrieval.remote_top_k == 0 {
            return Err(ConfigError::InvalidTopK(retrieval.remote_top_k));
        }
        if retrieval.wrap_width == 0 {
            return Err(ConfigError::InvalidWrapWidth(retrieval.wrap_width));
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost(self.server.host.clone()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }
        Ok(())
    }

    /// Number of chunks retrieved per question for the given backend
    #[inline]
    pub fn top_k(&self, backend: Backend) -> usize {
        match backend {
            Backend::Local => self.retrieval.local_top_k,
            Backend::Remote => self.retrieval.remote_top_k,
        }
    }

    #[inline]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl OpenAiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.completion_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.completion_model.clone()));
        }

        if !(1..=20_000).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        if self.batch_size == 0 || self.batch_size > 2048 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size, 2048));
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        validate_retry_attempts(self.retry_attempts)
    }

    /// API root with a trailing slash so relative endpoints join beneath it
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.base_url)
    }
}

impl PineconeConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control_url()?;

        if self.cloud.trim().is_empty() {
            return Err(ConfigError::InvalidCloud(self.cloud.clone()));
        }

        if !SUPPORTED_METRICS.contains(&self.metric.as_str()) {
            return Err(ConfigError::InvalidMetric(self.metric.clone()));
        }

        if self.upsert_batch_size == 0 || self.upsert_batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.upsert_batch_size, 1000));
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        validate_retry_attempts(self.retry_attempts)
    }

    #[inline]
    pub fn control_url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.control_url)
    }
}

impl Credentials {
    /// Read credentials from the process environment
    #[inline]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`; blank values count as unset
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            openai_api_key: read(OPENAI_API_KEY_VAR),
            pinecone_api_key: read(PINECONE_API_KEY_VAR),
            pinecone_environment: read(PINECONE_ENV_VAR),
        }
    }

    #[inline]
    pub fn require_openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential(OPENAI_API_KEY_VAR))
    }

    /// Pinecone API key and environment (region), both required for the remote backend
    #[inline]
    pub fn require_pinecone(&self) -> Result<(&str, &str), ConfigError> {
        let api_key = self
            .pinecone_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential(PINECONE_API_KEY_VAR))?;
        let environment = self
            .pinecone_environment
            .as_deref()
            .ok_or(ConfigError::MissingCredential(PINECONE_ENV_VAR))?;
        Ok((api_key, environment))
    }
}

/// Show only the last four characters of a secret
#[inline]
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", visible)
}

fn validate_retry_attempts(attempts: u32) -> Result<(), ConfigError> {
    if !(1..=10).contains(&attempts) {
        return Err(ConfigError::InvalidRetryAttempts(attempts));
    }
    Ok(())
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };

    let url = Url::parse(&normalized).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

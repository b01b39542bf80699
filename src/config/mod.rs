//! Configuration management for ragsync
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Vector store connection
    #[serde(default)]
    pub vector: VectorConfig,

    /// Object store connection (uploaded document files)
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Hosted OCR parser
    #[serde(default)]
    pub parser: ParserConfig,

    /// Embedding API backend
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Sync workflow and scanner tuning
    #[serde(default)]
    pub sync: SyncConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub url: String,
}

/// Object store configuration (S3-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Service endpoint
    #[serde(default = "default_object_store_endpoint")]
    pub endpoint: String,

    /// Bucket holding uploaded documents
    #[serde(default = "default_object_store_bucket")]
    pub bucket: String,

    /// Signing region
    #[serde(default = "default_object_store_region")]
    pub region: String,

    /// Environment variable name for the access key
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    /// Environment variable name for the secret key
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,

    /// How long signed download URLs stay valid, in seconds
    #[serde(default = "default_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
}

/// Hosted OCR parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// OCR service URL
    #[serde(default = "default_parser_url")]
    pub url: String,

    /// OCR model identifier
    #[serde(default = "default_parser_model")]
    pub model: String,

    /// Environment variable name for the API key
    #[serde(default = "default_parser_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout, in seconds
    #[serde(default = "default_parser_timeout_secs")]
    pub timeout_secs: u64,

    /// Client-side cap on requests per second
    #[serde(default = "default_parser_requests_per_sec")]
    pub requests_per_sec: u32,
}

/// Embedding API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// API base URL (OpenAI-compatible)
    #[serde(default = "default_embedding_api_base")]
    pub api_base: String,

    /// Environment variable name for the API key
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,

    /// Batch size for embedding requests
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout, in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Minimum chunk size (don't create tiny chunks)
    #[serde(default = "default_chunk_min_chars")]
    pub min_chars: usize,

    /// Prefer breaking at heading boundaries
    #[serde(default = "default_prefer_heading_boundaries")]
    pub prefer_heading_boundaries: bool,
}

/// Retry policy knobs for one class of workflow step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry, in seconds
    pub initial_secs: u64,

    /// Ceiling on the exponential backoff delay, in seconds
    pub max_secs: u64,

    /// Total attempts before the step is declared failed
    pub max_attempts: u32,
}

/// Sync workflow and scanner tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between scan ticks
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Upper bound on entities enqueued per scan tick
    #[serde(default = "default_scan_batch_limit")]
    pub scan_batch_limit: usize,

    /// Seconds between execution-runner polls
    #[serde(default = "default_runner_poll_secs")]
    pub runner_poll_secs: u64,

    /// Schedule-to-close timeout for one workflow step, in seconds
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Retry policy for external steps (parse, embed, index)
    #[serde(default = "default_external_retry")]
    pub external_retry: RetryConfig,

    /// Retry policy for status-write steps against the local store
    #[serde(default = "default_status_retry")]
    pub status_retry: RetryConfig,
}

fn default_external_retry() -> RetryConfig {
    RetryConfig {
        initial_secs: default_external_initial_secs(),
        max_secs: default_external_max_secs(),
        max_attempts: default_external_max_attempts(),
    }
}

fn default_status_retry() -> RetryConfig {
    RetryConfig {
        initial_secs: default_status_initial_secs(),
        max_secs: default_status_max_secs(),
        max_attempts: default_status_max_attempts(),
    }
}

/// Paths used by ragsync (derived, not stored in the TOML)
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Base directory
    pub base_dir: PathBuf,

    /// Config file path
    pub config_file: PathBuf,

    /// SQLite database path
    pub db_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base_dir = default_base_dir();
        Self {
            config_file: base_dir.join("config.toml"),
            db_file: base_dir.join("records.db"),
            base_dir,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
        }
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_object_store_endpoint(),
            bucket: default_object_store_bucket(),
            region: default_object_store_region(),
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
            signed_url_ttl_secs: default_signed_url_ttl_secs(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            url: default_parser_url(),
            model: default_parser_model(),
            api_key_env: default_parser_api_key_env(),
            timeout_secs: default_parser_timeout_secs(),
            requests_per_sec: default_parser_requests_per_sec(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: default_embedding_api_base(),
            api_key_env: default_embedding_api_key_env(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            min_chars: default_chunk_min_chars(),
            prefer_heading_boundaries: default_prefer_heading_boundaries(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            scan_batch_limit: default_scan_batch_limit(),
            runner_poll_secs: default_runner_poll_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            external_retry: default_external_retry(),
            status_retry: default_status_retry(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config at {}: {}", path.display(), e))
        })?;

        let mut config: Config = toml::from_str(&content)?;
        config.paths.config_file = path.to_path_buf();
        config.paths.base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(default_base_dir);
        config.paths.db_file = config.paths.base_dir.join("records.db");

        Ok(config)
    }

    /// Load from an explicit path, or the default location
    pub fn load_or_default_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = PathsConfig::default().config_file;
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Err(Error::NotInitialized)
                }
            }
        }
    }

    /// Save configuration to its config file path
    pub fn save(&self) -> Result<()> {
        let path = &self.paths.config_file;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        debug!("Saved config to {:?}", path);
        Ok(())
    }
}

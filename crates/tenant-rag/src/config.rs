//! Configuration for the tenant RAG backend

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "TENANT_RAG_CONFIG";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload validation
    #[serde(default)]
    pub upload: UploadConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding service and retry policy
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Layout analysis service
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Retrieval tuning
    #[serde(default)]
    pub search: SearchConfig,
    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: RagConfig =
            toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.apply_env();
        Ok(config)
    }

    /// Load from `TENANT_RAG_CONFIG` when set, otherwise defaults
    pub fn from_env_or_default() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => {
                let mut config = Self::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    /// Secrets are only read from the environment
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("LAYOUT_API_KEY") {
            self.extraction.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("EMBEDDING_API_KEY") {
            self.embeddings.api_key = Some(key);
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// Upload validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted upload in megabytes
    pub max_file_size_mb: u64,
    /// Lowercase extensions without the dot
    pub allowed_extensions: BTreeSet<String>,
}

impl UploadConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn is_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions.contains(&extension.to_ascii_lowercase())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        let allowed = [
            "txt", "pdf", "docx", "xlsx", "xls", "csv", "pptx", "html", "jpg", "jpeg", "png",
            "bmp", "tiff", "tif", "heif", "md", "json",
        ];
        Self {
            max_file_size_mb: 16,
            allowed_extensions: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive windows in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL (the `/embeddings` path is appended)
    pub endpoint: String,
    /// Model or deployment name
    pub model: String,
    /// Expected vector length
    pub dimensions: usize,
    /// Retries after the first throttled attempt
    pub max_retries: u32,
    /// First backoff delay in seconds
    pub initial_delay_secs: f64,
    /// Backoff growth factor
    pub delay_multiplier: f64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Filled from `EMBEDDING_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl EmbeddingConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.initial_delay_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-ada-002".to_string(),
            dimensions: 1536,
            max_retries: 5,
            initial_delay_secs: 1.0,
            delay_multiplier: 2.0,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

/// Layout analysis (document intelligence) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Service base URL, e.g. `https://<resource>.cognitiveservices.azure.com`
    pub endpoint: String,
    /// Analysis model identifier
    pub model_id: String,
    /// REST API version
    pub api_version: String,
    /// Seconds between status polls
    pub poll_interval_secs: u64,
    /// Wall-clock ceiling for one analysis in seconds
    pub max_wait_secs: u64,
    /// Words per synthetic page when the service returns no page structure
    pub words_per_page: usize,
    /// Filled from `LAYOUT_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl ExtractionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000".to_string(),
            model_id: "prebuilt-read".to_string(),
            api_version: "2023-07-31".to_string(),
            poll_interval_secs: 5,
            max_wait_secs: 1600,
            words_per_page: 500,
            api_key: None,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of results
    pub top_n: usize,
    /// Chunks per index upload batch
    pub index_batch_size: usize,
    /// Weight of the vector score in the hybrid blend (0.0 = lexical only)
    pub hybrid_alpha: f32,
    /// Lexical candidates fetched for the citation filename lookup
    pub citation_candidates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_n: 12,
            index_batch_size: 100,
            hybrid_alpha: 0.5,
            citation_candidates: 100,
        }
    }
}

/// Local persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding metadata and both search indexes
    pub database_path: PathBuf,
    /// Root directory of the filesystem blob store
    pub blob_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tenant-rag");

        Self {
            database_path: root.join("tenant-rag.db"),
            blob_dir: root.join("blobs"),
        }
    }
}

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion and retrieval engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible embedding provider.
    pub embedding_url: String,
    /// Optional bearer token sent to the embedding provider.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of texts sent per provider call.
    pub embedding_batch_size: usize,
    /// Per-request timeout applied to provider calls, in seconds.
    pub embedding_timeout_secs: u64,
    /// Retries attempted for transient provider failures.
    pub embedding_max_retries: usize,
    /// Vector index implementation requested at startup.
    pub vector_backend: VectorBackend,
    /// Base URL of the Qdrant instance, when one is configured.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Per-request timeout applied to Qdrant calls, in seconds.
    pub qdrant_timeout_secs: u64,
    /// Soft upper bound on chunk length, in characters.
    pub chunk_size: usize,
    /// Sentence-aligned overlap budget between consecutive chunks, in characters.
    pub chunk_overlap: usize,
    /// Minimum cosine similarity accepted for search results.
    pub min_similarity: f32,
    /// Result count used when a caller does not pass `top_k`.
    pub search_default_top_k: usize,
    /// Root directory of the filesystem object store.
    pub documents_root: PathBuf,
    /// Namespaces visited by a full ingestion run.
    pub namespaces: Vec<String>,
    /// Cron expression driving recurring ingestion.
    pub ingest_schedule: String,
    /// Whether `serve` starts the recurring ingestion scheduler.
    pub auto_processing_enabled: bool,
    /// Whether unchanged documents are skipped and changed ones replaced.
    pub ingest_deduplicate: bool,
    /// Capacity of the recent-document history kept by the state tracker.
    pub recent_documents_capacity: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported vector index implementations.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// External Qdrant approximate-nearest-neighbor service.
    Qdrant,
    /// In-process linear-scan store.
    Memory,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let qdrant_url = load_env_optional("QDRANT_URL");
        let vector_backend = match load_env_optional("VECTOR_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("VECTOR_BACKEND".to_string()))?,
            None if qdrant_url.is_some() => VectorBackend::Qdrant,
            None => VectorBackend::Memory,
        };

        let embedding_dimension: usize = load_env("EMBEDDING_DIMENSION")?
            .parse()
            .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }

        let embedding_batch_size = parse_optional("EMBEDDING_BATCH_SIZE", 32)?;
        if embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "EMBEDDING_BATCH_SIZE".to_string(),
            ));
        }

        let chunk_size = parse_optional("CHUNK_SIZE", 1000)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".to_string()));
        }

        let min_similarity: f32 = parse_optional("MIN_SIMILARITY", 0.7)?;
        if !(-1.0..=1.0).contains(&min_similarity) {
            return Err(ConfigError::InvalidValue("MIN_SIMILARITY".to_string()));
        }

        Ok(Self {
            embedding_url: load_env("EMBEDDING_URL")?,
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension,
            embedding_batch_size,
            embedding_timeout_secs: parse_optional("EMBEDDING_TIMEOUT_SECS", 30)?,
            embedding_max_retries: parse_optional("EMBEDDING_MAX_RETRIES", 2)?,
            vector_backend,
            qdrant_url,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| "documents".to_string()),
            qdrant_timeout_secs: parse_optional("QDRANT_TIMEOUT_SECS", 10)?,
            chunk_size,
            chunk_overlap: parse_optional("CHUNK_OVERLAP", 0)?,
            min_similarity,
            search_default_top_k: parse_optional("SEARCH_DEFAULT_TOP_K", 5)?,
            documents_root: load_env_optional("DOCUMENTS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("documents")),
            namespaces: load_env_optional("INGEST_NAMESPACES")
                .map(|value| parse_list(&value))
                .unwrap_or_default(),
            ingest_schedule: load_env_optional("INGEST_SCHEDULE")
                .unwrap_or_else(|| "0 0 * * * *".to_string()),
            auto_processing_enabled: parse_flag("AUTO_PROCESSING_ENABLED", false)?,
            ingest_deduplicate: parse_flag("INGEST_DEDUPLICATE", true)?,
            recent_documents_capacity: parse_optional("RECENT_DOCUMENTS_CAPACITY", 50)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Settings consumed by the HTTP embedding client.
    pub fn embedding_settings(&self) -> EmbeddingSettings {
        EmbeddingSettings {
            base_url: self.embedding_url.clone(),
            api_key: self.embedding_api_key.clone(),
            model: self.embedding_model.clone(),
            dimension: self.embedding_dimension,
            batch_size: self.embedding_batch_size,
            timeout: Duration::from_secs(self.embedding_timeout_secs),
            max_retries: self.embedding_max_retries,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Settings consumed by the Qdrant-backed index, when a URL is configured.
    pub fn qdrant_settings(&self) -> Option<QdrantSettings> {
        self.qdrant_url.as_ref().map(|url| QdrantSettings {
            url: url.clone(),
            api_key: self.qdrant_api_key.clone(),
            collection_name: self.qdrant_collection_name.clone(),
            vector_size: self.embedding_dimension,
            timeout: Duration::from_secs(self.qdrant_timeout_secs),
        })
    }

    /// Settings consumed by the chunker.
    pub fn chunking_settings(&self) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    /// Settings consumed by the ingestion orchestrator.
    pub fn ingestion_settings(&self) -> IngestionSettings {
        IngestionSettings {
            namespaces: self.namespaces.clone(),
            chunking: self.chunking_settings(),
            embedding_dimension: self.embedding_dimension,
            deduplicate: self.ingest_deduplicate,
        }
    }

    /// Settings consumed by the retrieval service.
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            min_similarity: self.min_similarity,
            embedding_dimension: self.embedding_dimension,
        }
    }
}

/// Connection parameters for the embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Provider base URL; requests go to `{base_url}/embeddings`.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Model identifier sent with each request.
    pub model: String,
    /// Expected vector size.
    pub dimension: usize,
    /// Texts per provider call.
    pub batch_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for transient failures.
    pub max_retries: usize,
    /// Base delay of the exponential backoff.
    pub retry_backoff: Duration,
}

/// Connection parameters for Qdrant.
#[derive(Debug, Clone)]
pub struct QdrantSettings {
    /// Base URL of the Qdrant HTTP API.
    pub url: String,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Collection holding chunk vectors.
    pub collection_name: String,
    /// Vector size the collection is created with.
    pub vector_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Chunk sizing parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingSettings {
    /// Soft maximum chunk length in characters.
    pub chunk_size: usize,
    /// Sentence-aligned overlap budget in characters.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
        }
    }
}

/// Parameters for full and single-document ingestion runs.
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Namespaces visited by `process_all`.
    pub namespaces: Vec<String>,
    /// Chunker parameters.
    pub chunking: ChunkingSettings,
    /// Vector size every stored embedding must have.
    pub embedding_dimension: usize,
    /// Skip unchanged documents and replace changed ones.
    pub deduplicate: bool,
}

/// Parameters for query-time retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    /// Results below this cosine similarity are dropped.
    pub min_similarity: f32,
    /// Vector size the query embedding must have.
    pub embedding_dimension: usize,
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

fn parse_flag(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl std::str::FromStr for VectorBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        embedding_url = %config.embedding_url,
        embedding_model = %config.embedding_model,
        backend = ?config.vector_backend,
        namespaces = ?config.namespaces,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

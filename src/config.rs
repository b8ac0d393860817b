use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub blobstore: BlobStoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobStoreConfig {
    /// `"local"`, `"s3"`, or `"memory"`.
    #[serde(default = "default_blob_backend")]
    pub backend: String,
    /// Root directory for the local backend.
    #[serde(default = "default_blob_root")]
    pub root: PathBuf,
    /// Bucket name for the s3 backend.
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_blob_backend(),
            root: default_blob_root(),
            bucket: None,
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_blob_backend() -> String {
    "local".to_string()
}
fn default_blob_root() -> PathBuf {
    PathBuf::from("./data")
}
fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"memory"` or `"pinecone"`.
    #[serde(default = "default_index_backend")]
    pub backend: String,
    /// Data-plane host of the pinecone backend.
    #[serde(default)]
    pub host: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            host: None,
        }
    }
}

fn default_index_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Chunks embedded per request during ingestion.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between ingestion batches, to respect remote rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// `"openai"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_completion_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
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
    1000
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    /// Threshold applied to sessions created without an explicit one.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Per-bucket short-circuit cutoff during the assignment scan.
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
    /// Wall-clock budget for a whole assignment scan.
    #[serde(default = "default_scan_budget_ms")]
    pub scan_budget_ms: u64,
    /// Representative members compared per bucket.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
            high_confidence: default_high_confidence(),
            scan_budget_ms: default_scan_budget_ms(),
            sample_limit: default_sample_limit(),
        }
    }
}

fn default_threshold() -> f64 {
    0.7
}
fn default_high_confidence() -> f64 {
    0.9
}
fn default_scan_budget_ms() -> u64 {
    30_000
}
fn default_sample_limit() -> usize {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
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
    match config.blobstore.backend.as_str() {
        "local" | "memory" => {}
        "s3" => {
            if config.blobstore.bucket.is_none() {
                anyhow::bail!("blobstore.bucket must be set when backend is 's3'");
            }
        }
        other => anyhow::bail!(
            "Unknown blobstore backend: '{}'. Must be local, s3, or memory.",
            other
        ),
    }

    match config.index.backend.as_str() {
        "memory" => {}
        "pinecone" => {
            if config.index.host.is_none() {
                anyhow::bail!("index.host must be set when backend is 'pinecone'");
            }
        }
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be memory or pinecone.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if !(0.0..=1.0).contains(&config.clustering.default_threshold) {
        anyhow::bail!("clustering.default_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.clustering.high_confidence) {
        anyhow::bail!("clustering.high_confidence must be in [0.0, 1.0]");
    }
    if config.clustering.sample_limit == 0 {
        anyhow::bail!("clustering.sample_limit must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.clustering.default_threshold, 0.7);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.blobstore.backend, "local");
        assert_eq!(config.index.backend, "memory");
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let config: Config = toml::from_str("[blobstore]\nbackend = \"s3\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_openai_embedding_requires_model_and_dims() {
        let config: Config = toml::from_str("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(validate(&config).is_err());

        let config: Config = toml::from_str(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        )
        .unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config: Config =
            toml::from_str("[clustering]\ndefault_threshold = 1.5\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let config: Config = toml::from_str("[index]\nbackend = \"faiss\"\n").unwrap();
        assert!(validate(&config).is_err());
    }
}

//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum size of a single image upload in bytes.
    #[serde(default = "default_max_image_size")]
    pub max_image_size: u64,
    /// Maximum size of a dataset archive upload in bytes.
    #[serde(default = "default_max_dataset_size")]
    pub max_dataset_size: u64,
    /// Enable request tracing.
    #[serde(default)]
    pub enable_tracing: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_image_size() -> u64 {
    crate::MAX_IMAGE_SIZE
}

fn default_max_dataset_size() -> u64 {
    crate::MAX_DATASET_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_image_size: default_max_image_size(),
            max_dataset_size: default_max_dataset_size(),
            enable_tracing: false,
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (recommended for testing and small deployments only).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer SHUTTER_METADATA__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Authentication configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign identity tokens (HMAC-SHA256).
    /// WARNING: Prefer the SHUTTER_AUTH__TOKEN_SECRET env var over config files.
    pub token_secret: String,
    /// Secret used to decrypt password transport envelopes.
    /// Must be 32 bytes of base64 when set; defaults to a key derived
    /// from the token secret.
    pub transport_key: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_token_ttl_secs() -> u64 {
    crate::DEFAULT_TOKEN_TTL_SECS
}

impl AuthConfig {
    /// Create a test configuration with a fixed secret.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            token_secret: "test-token-secret-do-not-use".to_string(),
            transport_key: None,
            token_ttl_secs: default_token_ttl_secs(),
        }
    }

    /// Validate auth configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_secret.len() < 16 {
            return Err("auth.token_secret must be at least 16 bytes".to_string());
        }
        if self.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Semantic search service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the search service (e.g., "http://localhost:5000").
    #[serde(default = "default_search_url")]
    pub url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum similarity score for results.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Directory for temporary image copies handed to the service.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

fn default_search_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_search_timeout_secs() -> u64 {
    crate::SEARCH_TIMEOUT_SECS
}

fn default_min_score() -> f64 {
    crate::DEFAULT_MIN_SCORE
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./data/search-scratch")
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            timeout_secs: default_search_timeout_secs(),
            min_score: default_min_score(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl SearchConfig {
    /// Validate search configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("search.timeout_secs cannot be 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(format!(
                "search.min_score {} must be between 0.0 and 1.0",
                self.min_score
            ));
        }
        Ok(())
    }
}

/// Managed training platform configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// AWS region for the training platform.
    pub region: Option<String>,
    /// IAM execution role ARN assumed by training and hosting jobs.
    pub execution_role: String,
    /// Container image URI used for training jobs.
    pub training_image: String,
    /// Container image URI used for inference endpoints.
    pub inference_image: String,
    /// Instance type for training jobs.
    #[serde(default = "default_training_instance")]
    pub training_instance_type: String,
    /// Instance type for hosted endpoints.
    #[serde(default = "default_inference_instance")]
    pub inference_instance_type: String,
    /// Hard runtime cap for a training job in seconds.
    #[serde(default = "default_max_runtime_secs")]
    pub max_runtime_secs: u32,
}

fn default_training_instance() -> String {
    "ml.m5.xlarge".to_string()
}

fn default_inference_instance() -> String {
    "ml.m5.large".to_string()
}

fn default_max_runtime_secs() -> u32 {
    7200
}

impl PlatformConfig {
    /// Create a test configuration with dummy ARNs.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            region: Some("us-east-1".to_string()),
            execution_role: "arn:aws:iam::000000000000:role/test-role".to_string(),
            training_image: "000000000000.dkr.ecr.us-east-1.amazonaws.com/train:latest".to_string(),
            inference_image: "000000000000.dkr.ecr.us-east-1.amazonaws.com/infer:latest"
                .to_string(),
            training_instance_type: default_training_instance(),
            inference_instance_type: default_inference_instance(),
            max_runtime_secs: default_max_runtime_secs(),
        }
    }

    /// Validate platform configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.execution_role.is_empty() {
            return Err("platform.execution_role cannot be empty".to_string());
        }
        if self.max_runtime_secs == 0 {
            return Err("platform.max_runtime_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Job poller configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Seconds between status polls for one job.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Maximum polls for one job before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval_secs() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_attempts() -> u32 {
    crate::DEFAULT_MAX_POLL_ATTEMPTS
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollerConfig {
    /// Get the poll interval as a std::time::Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Validate poller configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("poller.interval_secs cannot be 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("poller.max_attempts cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Authentication configuration (required).
    pub auth: AuthConfig,
    /// Semantic search service configuration.
    #[serde(default)]
    pub search: SearchConfig,
    /// Training platform configuration (optional; training routes
    /// return an error when absent).
    pub platform: Option<PlatformConfig>,
    /// Job poller configuration.
    #[serde(default)]
    pub poller: PollerConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// and a fixed token secret.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            auth: AuthConfig::for_testing(),
            search: SearchConfig::default(),
            platform: Some(PlatformConfig::for_testing()),
            poller: PollerConfig::default(),
        }
    }

    /// Validate all sections. Returns the first error found.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.auth.validate()?;
        self.search.validate()?;
        if let Some(platform) = &self.platform {
            platform.validate()?;
        }
        self.poller.validate()?;
        Ok(())
    }
}

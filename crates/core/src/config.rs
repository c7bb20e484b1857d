//! Configuration types shared across crates.

use crate::chunk::EmptyFilePolicy;
use crate::disposition::Disposition;
use crate::{
    DEFAULT_BUCKET, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Directory served for requests that match no API route.
    /// Ignored when the directory does not exist.
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_static_dir() -> Option<PathBuf> {
    Some(PathBuf::from("public"))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            static_dir: default_static_dir(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for chunk objects.
        path: PathBuf,
    },
    /// Process-local storage. Contents are lost on restart.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/chunks"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, SQLite cannot cancel
        /// running statements). Slow queries are logged.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { path, .. } if path.as_os_str().is_empty() => {
                Err("metadata.path must not be empty".to_string())
            }
            MetadataConfig::Sqlite { .. } => Ok(()),
        }
    }
}

/// Blob engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Namespace for chunk keys and file records.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Chunk writes kept in flight per upload.
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
    /// Chunk reads kept ahead of the client per download.
    #[serde(default = "default_read_ahead")]
    pub read_ahead: usize,
    /// How zero-byte uploads are persisted.
    #[serde(default)]
    pub empty_file_policy: EmptyFilePolicy,
    /// Disposition used when a download request does not ask for one.
    #[serde(default)]
    pub default_disposition: Disposition,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_UPLOAD_SIZE
}

fn default_write_concurrency() -> usize {
    4
}

fn default_read_ahead() -> usize {
    2
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            chunk_size: default_chunk_size(),
            max_upload_size: default_max_upload_size(),
            write_concurrency: default_write_concurrency(),
            read_ahead: default_read_ahead(),
            empty_file_policy: EmptyFilePolicy::default(),
            default_disposition: Disposition::default(),
        }
    }
}

impl BlobConfig {
    /// Validate blob engine settings.
    pub fn validate(&self) -> crate::Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(crate::Error::InvalidChunkSize {
                size: self.chunk_size,
                min: MIN_CHUNK_SIZE,
                max: MAX_CHUNK_SIZE,
            });
        }
        if self.bucket.is_empty()
            || !self
                .bucket
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(crate::Error::InvalidConfig(format!(
                "blob.bucket {:?} must be non-empty and contain only [A-Za-z0-9_-]",
                self.bucket
            )));
        }
        if self.max_upload_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "blob.max_upload_size must be positive".to_string(),
            ));
        }
        if self.write_concurrency == 0 || self.read_ahead == 0 {
            return Err(crate::Error::InvalidConfig(
                "blob.write_concurrency and blob.read_ahead must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend connection retry policy used at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Delay between connection attempts in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Give up after this many attempts. Zero retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_retry_interval_ms() -> u64 {
    1000
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            max_attempts: 0,
        }
    }
}

impl ConnectConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Orphan chunk sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Run the sweep periodically (disabled by default).
    #[serde(default)]
    pub enabled: bool,
    /// Interval in seconds between sweeps (default: 1 hour).
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Orphans younger than this are left alone so in-flight uploads
    /// are never touched (default: 1 hour).
    #[serde(default = "default_sweep_grace_period_secs")]
    pub grace_period_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_sweep_grace_period_secs() -> u64 {
    3600
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_sweep_interval_secs(),
            grace_period_secs: default_sweep_grace_period_secs(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Get the grace period as a `time::Duration`.
    pub fn grace_period(&self) -> time::Duration {
        let secs = i64::try_from(self.grace_period_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.interval_secs == 0 {
            return Err("sweep.interval_secs must be positive when the sweep is enabled".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
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
    /// Blob engine configuration.
    #[serde(default)]
    pub blob: BlobConfig,
    /// Startup connection policy.
    #[serde(default)]
    pub connect: ConnectConfig,
    /// Orphan sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses in-memory storage and a small chunk size.
    pub fn for_testing() -> Self {
        Self {
            storage: StorageConfig::Memory,
            server: ServerConfig {
                static_dir: None,
                ..ServerConfig::default()
            },
            blob: BlobConfig {
                chunk_size: MIN_CHUNK_SIZE,
                ..BlobConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.storage.validate().map_err(crate::Error::InvalidConfig)?;
        self.metadata.validate().map_err(crate::Error::InvalidConfig)?;
        self.sweep.validate().map_err(crate::Error::InvalidConfig)?;
        self.blob.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.blob.chunk_size, 255 * 1024);
        assert_eq!(config.blob.bucket, "uploads");
        assert_eq!(config.blob.empty_file_policy, EmptyFilePolicy::NoChunks);
        assert_eq!(config.blob.default_disposition, Disposition::Inline);
        assert!(!config.sweep.enabled);
    }

    #[test]
    fn test_server_config_defaults_metrics_enabled() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert!(config.metrics_enabled);
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
    }

    #[test]
    fn test_storage_config_tagged() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"type":"filesystem","path":"/var/lib/hoard"}"#).unwrap();
        assert!(matches!(config, StorageConfig::Filesystem { .. }));

        let config: StorageConfig = serde_json::from_str(r#"{"type":"memory"}"#).unwrap();
        assert!(matches!(config, StorageConfig::Memory));
    }

    #[test]
    fn test_blob_config_parses_policies() {
        let config: BlobConfig = serde_json::from_str(
            r#"{"empty_file_policy":"single_empty_chunk","default_disposition":"attachment"}"#,
        )
        .unwrap();
        assert_eq!(config.empty_file_policy, EmptyFilePolicy::SingleEmptyChunk);
        assert_eq!(config.default_disposition, Disposition::Attachment);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_blob_config_rejects_out_of_range_chunk_size() {
        for size in [0, MIN_CHUNK_SIZE - 1, MAX_CHUNK_SIZE + 1] {
            let config = BlobConfig {
                chunk_size: size,
                ..BlobConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(crate::Error::InvalidChunkSize { .. })
            ));
        }
    }

    #[test]
    fn test_blob_config_rejects_bad_bucket_and_zero_concurrency() {
        let config = BlobConfig {
            bucket: "../up".to_string(),
            ..BlobConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BlobConfig {
            write_concurrency: 0,
            ..BlobConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sweep_enabled_requires_interval() {
        let config = SweepConfig {
            enabled: true,
            interval_secs: 0,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(SweepConfig::default().grace_period(), time::Duration::hours(1));
    }

    #[test]
    fn test_for_testing_is_valid() {
        let config = AppConfig::for_testing();
        config.validate().unwrap();
        assert!(matches!(config.storage, StorageConfig::Memory));
    }
}

//! Configuration loading and types for docsearch.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct.  Two environment variables are applied on top of
//! the file, matching how the service is deployed:
//! `AZURE_STORAGE_CONNECTION_STRING` and `AZURE_CONTAINER_NAME`.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the storage account connection string.
pub const ENV_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";

/// Environment variable holding the container to search.
pub const ENV_CONTAINER_NAME: &str = "AZURE_CONTAINER_NAME";

/// Largest page size the List Blobs operation accepts.
pub const MAX_PAGE_SIZE: u32 = 5000;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Blob storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Download link settings.
    #[serde(default)]
    pub download: DownloadConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Which listing backend serves searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Azure Blob Storage over the SharedKey-signed REST API.
    #[default]
    Azure,
    /// In-process fixture listing, for local runs without an account.
    Memory,
}

/// Blob storage configuration.
#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    /// Listing backend.
    #[serde(default)]
    pub backend: BackendKind,

    /// `AccountName=...;AccountKey=...` connection string.
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Container to search.
    #[serde(default = "default_container")]
    pub container: String,

    /// Optional listing prefix scoping the search to a virtual folder.
    #[serde(default)]
    pub prefix: Option<String>,

    /// `maxresults` sent with every List Blobs call.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Timeout for one upstream HTTP call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Deadline for a whole search (all pages and retries), in seconds.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Retries after the first attempt, for 5xx and transport failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds; grows 4x per retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Fixture blobs served by the `memory` backend.
    #[serde(default)]
    pub memory: MemoryStorageConfig,
}

impl StorageConfig {
    /// Page size clamped to what the service accepts.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            connection_string: None,
            container: default_container(),
            prefix: None,
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout(),
            search_timeout_secs: default_search_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            memory: MemoryStorageConfig::default(),
        }
    }
}

// Hand-written so the connection string (which embeds the account key)
// never reaches a log line.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("container", &self.container)
            .field("prefix", &self.prefix)
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("search_timeout_secs", &self.search_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("memory", &self.memory)
            .finish()
    }
}

/// Memory backend configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemoryStorageConfig {
    /// Blobs listed by the memory backend, in listing order.
    #[serde(default)]
    pub blobs: Vec<MemoryBlobConfig>,
}

/// One fixture blob for the memory backend.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryBlobConfig {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Download link settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Return read-only SAS URLs instead of plain blob URLs.
    #[serde(default = "default_true")]
    pub signed_urls: bool,

    /// SAS validity after the time of the search, in minutes.
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: u64,

    /// How far in the past the SAS window starts, in minutes.
    #[serde(default = "default_start_skew_minutes")]
    pub start_skew_minutes: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            signed_urls: true,
            expiry_minutes: default_expiry_minutes(),
            start_skew_minutes: default_start_skew_minutes(),
        }
    }
}

impl DownloadConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_minutes.saturating_mul(60))
    }

    pub fn start_skew(&self) -> Duration {
        Duration::from_secs(self.start_skew_minutes.saturating_mul(60))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7071
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_container() -> String {
    "documents".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_search_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_expiry_minutes() -> u64 {
    60
}

fn default_start_skew_minutes() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`, then apply
/// environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let mut config: Config = serde_yaml::from_str(&contents)?;
    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

/// Default configuration with environment overrides, for runs without a file.
pub fn from_env() -> Config {
    let mut config = Config::default();
    config.apply_env(|name| std::env::var(name).ok());
    config
}

impl Config {
    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// mask a value from the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(conn) = lookup(ENV_CONNECTION_STRING).filter(|v| !v.trim().is_empty()) {
            self.storage.connection_string = Some(conn);
        }
        if let Some(container) = lookup(ENV_CONTAINER_NAME).filter(|v| !v.trim().is_empty()) {
            self.storage.container = container;
        }
    }
}

// -- Tests -------------------------------------------------------------------

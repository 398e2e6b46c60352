//! Configuration loading and types for s3proxy.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct.  Environment variables then override individual
//! fields, so a container can run the gateway with no file at all:
//!
//! | Variable              | Field                         |
//! |-----------------------|-------------------------------|
//! | `AWS_REGION`          | `storage.s3.region`           |
//! | `AWS_ACCESS_KEY`      | `storage.s3.access_key_id`    |
//! | `AWS_SECRET_KEY`      | `storage.s3.secret_access_key`|
//! | `S3PROXY_S3_BUCKET`   | `storage.s3.bucket`           |
//! | `S3PROXY_S3_ENDPOINT` | `storage.s3.endpoint_url`     |
//! | `S3PROXY_PORT`        | `server.port`                 |
//!
//! The resulting value is immutable and handed to the router at startup.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Object source settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probe).
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
///
/// Every path on the public listener is an object key, so the metrics and
/// health endpoints live on a separate admin listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,

    /// Port of the admin listener (bound on `server.host`).
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
            admin_port: default_admin_port(),
        }
    }
}

impl ObservabilityConfig {
    /// Whether any admin endpoint is enabled.
    pub fn admin_enabled(&self) -> bool {
        self.metrics || self.health_check
    }
}

/// Object source configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// S3 fetcher configuration.
    #[serde(default)]
    pub s3: S3StorageConfig,
}

/// S3 fetcher configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3StorageConfig {
    /// Bucket every request key is resolved against.
    #[serde(default)]
    pub bucket: String,
    /// AWS region.  Required.
    #[serde(default)]
    pub region: Option<String>,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Explicit secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl S3StorageConfig {
    /// Endpoint URL to use, defaulting to the regional AWS endpoint.
    pub fn endpoint(&self, region: &str) -> String {
        match &self.endpoint_url {
            Some(url) => url.clone(),
            None => format!("https://s3.{region}.amazonaws.com"),
        }
    }
}

impl Config {
    /// Override file values with the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override file values using `lookup` as the variable source.
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(region) = get("AWS_REGION") {
            self.storage.s3.region = Some(region);
        }
        if let Some(ak) = get("AWS_ACCESS_KEY") {
            self.storage.s3.access_key_id = Some(ak);
        }
        if let Some(sk) = get("AWS_SECRET_KEY") {
            self.storage.s3.secret_access_key = Some(sk);
        }
        if let Some(bucket) = get("S3PROXY_S3_BUCKET") {
            self.storage.s3.bucket = bucket;
        }
        if let Some(endpoint) = get("S3PROXY_S3_ENDPOINT") {
            self.storage.s3.endpoint_url = Some(endpoint);
        }
        if let Some(port) = get("S3PROXY_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid S3PROXY_PORT value: {}", port),
            }
        }
    }

    /// Check that the configuration can start a server.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.s3.region.is_none() {
            anyhow::bail!("AWS_REGION is not set (storage.s3.region)");
        }
        if self.storage.s3.bucket.is_empty() {
            anyhow::bail!("S3PROXY_S3_BUCKET is not set (storage.s3.bucket)");
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("unknown logging.format '{other}' (expected 'text' or 'json')"),
        }
        Ok(())
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
    8080
}

fn default_admin_port() -> u16 {
    9090
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

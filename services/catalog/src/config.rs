use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Object storage configuration
    pub s3: S3Config,
    /// Token and password configuration
    pub auth: AuthConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Which repository implementation backs the API
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Volatile maps, for local development
    Memory,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// S3-compatible storage configuration (Backblaze B2, MinIO, AWS)
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket receiving uploaded models. Checked per request, so the
    /// service starts without it and reports a configuration error on upload.
    pub bucket: Option<String>,
    /// Service endpoint, also the base of the public URLs handed back
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key id
    pub key_id: String,
    /// Secret application key
    pub application_key: String,
    /// Force path-style access (required by B2 and MinIO)
    #[serde(default = "default_true")]
    pub force_path_style: bool,
    /// Bodies above this size go through multipart upload (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for issued tokens
    pub jwt_secret: String,
    /// Token lifetime in seconds
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Admin account created at startup when missing
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Request body cap, which bounds uploaded files (50MB default)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "catalog-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_token_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "catalog-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/catalog").required(false))
            .add_source(config::File::with_name("/etc/catalog/catalog").required(false))
            // CATALOG__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("CATALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get token lifetime as Duration
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs)
    }
}

impl DatabaseConfig {
    /// Get pool acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle connection timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_max_body_bytes(), 50 * 1024 * 1024);
        assert_eq!(default_api_port(), 8080);
        assert!(default_true());
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let raw = config::Config::builder()
            .set_override("database.url", "postgres://localhost/catalog")
            .unwrap()
            .set_override("s3.endpoint", "https://s3.example.com")
            .unwrap()
            .set_override("s3.key_id", "key")
            .unwrap()
            .set_override("s3.application_key", "secret")
            .unwrap()
            .set_override("auth.jwt_secret", "jwt-secret")
            .unwrap()
            .build()
            .unwrap();

        let config: Config = raw.try_deserialize().unwrap();

        assert_eq!(config.database.backend, StorageBackend::Postgres);
        assert!(config.s3.bucket.is_none());
        assert!(config.s3.force_path_style);
        assert_eq!(config.api.max_body_bytes, 50 * 1024 * 1024);
        assert_eq!(config.service.name, "catalog-service");
        assert_eq!(config.token_ttl(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(30));
    }
}

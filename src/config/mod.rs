pub mod env;
pub use env::{apply_env_overrides, apply_overrides_from};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LandingConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Submission bodies above this size are rejected with 413
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Submission store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "landing.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterBackend {
    /// Per-process DashMap. Counters are not shared between processes.
    Memory,
    /// SQLite file shared by every process pointed at the same path.
    Sqlite,
}

impl std::str::FromStr for CounterBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(CounterBackend::Memory),
            "sqlite" => Ok(CounterBackend::Sqlite),
            other => Err(format!("unknown counter backend '{}'", other)),
        }
    }
}

/// What the admission filter does when the counter store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorPolicy {
    /// Admit the request and log the failure
    FailOpen,
    /// Reject the request with 503
    FailClosed,
}

impl std::str::FromStr for StoreErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fail_open" => Ok(StoreErrorPolicy::FailOpen),
            "fail_closed" => Ok(StoreErrorPolicy::FailClosed),
            other => Err(format!("unknown store error policy '{}'", other)),
        }
    }
}

/// Admission filter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests admitted per client per window
    #[serde(default = "default_capacity")]
    pub capacity: u64,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_backend")]
    pub backend: CounterBackend,
    /// Only read when `backend = "sqlite"`
    #[serde(default = "default_counter_database_path")]
    pub counter_database_path: String,
    #[serde(default = "default_on_store_error")]
    pub on_store_error: StoreErrorPolicy,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Exact request paths the filter applies to
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_capacity() -> u64 {
    5
}

fn default_window_seconds() -> u64 {
    10
}

fn default_backend() -> CounterBackend {
    CounterBackend::Memory
}

fn default_counter_database_path() -> String {
    "ratelimit.db".to_string()
}

fn default_on_store_error() -> StoreErrorPolicy {
    StoreErrorPolicy::FailOpen
}

fn default_key_prefix() -> String {
    "landing:ratelimit".to_string()
}

fn default_paths() -> Vec<String> {
    vec!["/api/waitlist".to_string(), "/api/demo".to_string()]
}

fn default_purge_interval() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            capacity: default_capacity(),
            window_seconds: default_window_seconds(),
            backend: default_backend(),
            counter_database_path: default_counter_database_path(),
            on_store_error: default_on_store_error(),
            key_prefix: default_key_prefix(),
            paths: default_paths(),
            purge_interval_seconds: default_purge_interval(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for LandingConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<LandingConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: LandingConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load the TOML file if it exists (defaults otherwise), then apply env overrides.
pub fn load_with_env(path: impl AsRef<Path>) -> Result<LandingConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        LandingConfig::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LandingConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.server.max_body_bytes, 16384);
        assert_eq!(config.store.database_path, "landing.db");
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.capacity, 5);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(10));
        assert_eq!(config.rate_limit.backend, CounterBackend::Memory);
        assert_eq!(config.rate_limit.on_store_error, StoreErrorPolicy::FailOpen);
        assert_eq!(config.rate_limit.paths, vec!["/api/waitlist", "/api/demo"]);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:8080"
            max_body_bytes = 2048

            [store]
            database_path = "/tmp/leads.db"

            [rate_limit]
            enabled = true
            capacity = 20
            window_seconds = 60
            backend = "sqlite"
            counter_database_path = "/tmp/counters.db"
            on_store_error = "fail_closed"
            key_prefix = "test"
            paths = ["/api/waitlist"]
            purge_interval_seconds = 5
        "#;

        let config: LandingConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.server.max_body_bytes, 2048);
        assert_eq!(config.store.database_path, "/tmp/leads.db");
        assert_eq!(config.rate_limit.capacity, 20);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.rate_limit.backend, CounterBackend::Sqlite);
        assert_eq!(config.rate_limit.counter_database_path, "/tmp/counters.db");
        assert_eq!(
            config.rate_limit.on_store_error,
            StoreErrorPolicy::FailClosed
        );
        assert_eq!(config.rate_limit.key_prefix, "test");
        assert_eq!(config.rate_limit.paths, vec!["/api/waitlist"]);
        assert_eq!(config.rate_limit.purge_interval_seconds, 5);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections and keys fall back to defaults
        let toml = r#"
            [rate_limit]
            capacity = 3
        "#;

        let config: LandingConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.rate_limit.capacity, 3);
        assert_eq!(config.rate_limit.window_seconds, 10);
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let toml = r#"
            [rate_limit]
            backend = "redis"
        "#;
        assert!(toml::from_str::<LandingConfig>(toml).is_err());
    }

    #[test]
    fn test_load_with_env_missing_file_uses_defaults() {
        assert!(load_with_env("/nonexistent/landing.toml").is_ok());
    }
}

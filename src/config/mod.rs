//! Configuration loading for the Umbral signals service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `UMBRAL_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `UMBRAL_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Empty means no database: votes go to the in-memory store.
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions_file: Option<PathBuf>,
}

/// Tuning for outbound calls to the outage statistics API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UpstreamConfig {
    /// Maximum number of region requests in flight per batch (default: 5)
    ///
    /// Environment variable: `UMBRAL_FANOUT_CONCURRENCY`
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,

    /// Per-request timeout in milliseconds (default: 15000)
    ///
    /// Environment variable: `UMBRAL_UPSTREAM_TIMEOUT_MS`
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,

    /// How long a successful upstream body is reused (default: 300)
    ///
    /// Environment variable: `UMBRAL_UPSTREAM_CACHE_TTL_SECONDS`
    #[serde(default = "default_upstream_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Maximum number of cached upstream bodies (default: 256)
    ///
    /// Environment variable: `UMBRAL_UPSTREAM_CACHE_CAPACITY`
    #[serde(default = "default_upstream_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            fanout_concurrency: default_fanout_concurrency(),
            timeout_ms: default_upstream_timeout_ms(),
            cache_ttl_seconds: default_upstream_cache_ttl_seconds(),
            cache_capacity: default_upstream_cache_capacity(),
        }
    }
}

impl UpstreamConfig {
    /// Validate upstream tuning bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fanout_concurrency == 0 || self.fanout_concurrency > 32 {
            return Err(ConfigError::InvalidFanoutConcurrency {
                value: self.fanout_concurrency,
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::InvalidUpstreamTimeout {
                value: self.timeout_ms,
            });
        }

        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity);
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: String::new(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            upstream_base_url: default_upstream_base_url(),
            upstream: UpstreamConfig::default(),
            vote_salt: None,
            cron_secret: None,
            regions_file: None,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Whether a database is configured for vote storage.
    pub fn has_database(&self) -> bool {
        !self.database_url.trim().is_empty()
    }

    fn is_dev_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.vote_salt.is_some() {
            config.vote_salt = Some(REDACTED.to_string());
        }
        if config.cron_secret.is_some() {
            config.cron_secret = Some(REDACTED.to_string());
        }
        // Database URLs usually embed credentials
        if config.has_database() {
            config.database_url = REDACTED.to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_dev_profile() && self.vote_salt.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingVoteSalt);
        }

        if url::Url::parse(&self.upstream_base_url).is_err() {
            return Err(ConfigError::InvalidUpstreamBaseUrl {
                value: self.upstream_base_url.clone(),
            });
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        self.upstream.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_upstream_base_url() -> String {
    "https://api.ioda.inetintel.cc.gatech.edu/v2".to_string()
}

fn default_fanout_concurrency() -> usize {
    5
}

fn default_upstream_timeout_ms() -> u64 {
    15_000
}

fn default_upstream_cache_ttl_seconds() -> u64 {
    300
}

fn default_upstream_cache_capacity() -> usize {
    256
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid numeric value for UMBRAL_{key}: '{value}'")]
    InvalidNumber { key: String, value: String },
    #[error("vote salt is missing; set UMBRAL_VOTE_SALT environment variable")]
    MissingVoteSalt,
    #[error("upstream base url '{value}' is not a valid URL")]
    InvalidUpstreamBaseUrl { value: String },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("fan-out concurrency must be between 1 and 32, got {value}")]
    InvalidFanoutConcurrency { value: usize },
    #[error("upstream timeout must be at least 100 ms, got {value}")]
    InvalidUpstreamTimeout { value: u64 },
    #[error("upstream cache capacity must be positive")]
    InvalidCacheCapacity,
}

/// Loads configuration using layered `.env` files and `UMBRAL_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`, then the
    /// process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("UMBRAL_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_string(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url = take_string(&mut layered, "DATABASE_URL").unwrap_or_default();
        let db_max_connections = take_number(&mut layered, "DB_MAX_CONNECTIONS")?
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take_number(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")?
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let upstream_base_url = take_string(&mut layered, "UPSTREAM_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(default_upstream_base_url);

        let upstream = UpstreamConfig {
            fanout_concurrency: take_number(&mut layered, "FANOUT_CONCURRENCY")?
                .unwrap_or_else(default_fanout_concurrency),
            timeout_ms: take_number(&mut layered, "UPSTREAM_TIMEOUT_MS")?
                .unwrap_or_else(default_upstream_timeout_ms),
            cache_ttl_seconds: take_number(&mut layered, "UPSTREAM_CACHE_TTL_SECONDS")?
                .unwrap_or_else(default_upstream_cache_ttl_seconds),
            cache_capacity: take_number(&mut layered, "UPSTREAM_CACHE_CAPACITY")?
                .unwrap_or_else(default_upstream_cache_capacity),
        };

        let vote_salt = take_string(&mut layered, "VOTE_SALT");
        let cron_secret = take_string(&mut layered, "CRON_SECRET");
        let regions_file = take_string(&mut layered, "REGIONS_FILE").map(PathBuf::from);

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            upstream_base_url,
            upstream,
            vote_salt,
            cron_secret,
            regions_file,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("UMBRAL_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("UMBRAL_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn take_number<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match take_string(layered, key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.has_database());
        assert_eq!(config.upstream.fanout_concurrency, 5);
    }

    #[test]
    fn test_production_profile_requires_vote_salt() {
        let config = AppConfig {
            profile: "production".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVoteSalt)
        ));

        let config = AppConfig {
            profile: "production".to_string(),
            vote_salt: Some("pepper".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_upstream_validation() {
        let mut upstream = UpstreamConfig::default();
        assert!(upstream.validate().is_ok());

        upstream.fanout_concurrency = 0;
        assert!(upstream.validate().is_err());

        upstream.fanout_concurrency = 5;
        upstream.timeout_ms = 10;
        assert!(upstream.validate().is_err());

        upstream.timeout_ms = 1000;
        upstream.cache_capacity = 0;
        assert!(upstream.validate().is_err());
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let config = AppConfig {
            database_url: "postgres://user:hunter2@db/umbral".to_string(),
            vote_salt: Some("pepper".to_string()),
            cron_secret: Some("cron-token".to_string()),
            ..Default::default()
        };

        let json = config.redacted_json().unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("pepper"));
        assert!(!json.contains("cron-token"));
        assert!(json.contains(REDACTED));
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        let config = AppConfig {
            log_format: "xml".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogFormat { .. })
        ));
    }
}

//! Service configuration.
//!
//! Configuration can be loaded from:
//! 1. A TOML file (`conveyor.toml`)
//! 2. Environment variables (with the `CONVEYOR_` prefix)
//!
//! Environment variables override TOML configuration, which overrides the
//! built-in defaults. The value is constructed once at startup and passed
//! explicitly to each component constructor; nothing in the core reads
//! configuration through globals.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! queue_type = "redis"
//! redis_url = "redis://127.0.0.1:6379/0"
//! result_store_type = "redis"
//! result_store_ttl = 3600
//! api_workers = 8
//! api_key = "dogs-are-awesome"
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable prefix for all configuration overrides.
pub const ENV_PREFIX: &str = "CONVEYOR_";

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "conveyor.toml";

/// Which backend implementation serves a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process backend; state is lost on exit.
    Memory,
    /// Redis-backed backend.
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown backend type {other:?}; expected \"memory\" or \"redis\"")),
        }
    }
}

/// Configuration for a deployment, covering the queue, the result store,
/// the worker pool, and the HTTP surface.
///
/// # Defaults
///
/// | Key | Default |
/// |-----|---------|
/// | `queue_type` | `memory` |
/// | `redis_url` | `redis://127.0.0.1:6379/` |
/// | `queue_key` | `conveyor:queue` |
/// | `result_store_type` | `memory` |
/// | `result_store_ttl` | `3600` (seconds) |
/// | `result_store_redis_url` | falls back to `redis_url` |
/// | `result_key_prefix` | `conveyor:result` |
/// | `api_workers` | `4` |
/// | `api_key` | none (required for the HTTP surface) |
/// | `poll_timeout_ms` | `1000` |
/// | `handler_timeout_ms` | none (handlers run unbounded) |
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Queue backend selection.
    pub queue_type: BackendKind,

    /// Redis endpoint for the queue.
    pub redis_url: String,

    /// Redis list key holding the queue.
    pub queue_key: String,

    /// Result store backend selection.
    pub result_store_type: BackendKind,

    /// Result retention, in seconds.
    pub result_store_ttl: u64,

    /// Redis endpoint for the result store; may differ from the queue's.
    /// Falls back to `redis_url` when unset.
    pub result_store_redis_url: Option<String>,

    /// Redis key prefix for result records.
    pub result_key_prefix: String,

    /// Worker pool size.
    pub api_workers: usize,

    /// Bearer key required on every HTTP endpoint.
    pub api_key: Option<String>,

    /// Executor queue-poll timeout, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Per-task execution deadline, in milliseconds. Unset means none.
    pub handler_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_type: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            queue_key: crate::queue::redis::DEFAULT_QUEUE_KEY.to_string(),
            result_store_type: BackendKind::Memory,
            result_store_ttl: 3600,
            result_store_redis_url: None,
            result_key_prefix: crate::store::redis::DEFAULT_RESULT_KEY_PREFIX.to_string(),
            api_workers: 4,
            api_key: None,
            poll_timeout_ms: 1000,
            handler_timeout_ms: None,
        }
    }
}

impl Config {
    /// Loads configuration with standard precedence:
    /// environment > `conveyor.toml` (if present) > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a specific file path, then applies
    /// environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parses configuration from TOML content. Missing keys take their
    /// defaults.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies `CONVEYOR_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary lookup. Factored out of
    /// [`apply_env_overrides`](Config::apply_env_overrides) so tests do not
    /// have to mutate process-wide environment state.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(value) = var("QUEUE_TYPE") {
            self.queue_type = parse_value("CONVEYOR_QUEUE_TYPE", &value)?;
        }
        if let Some(value) = var("REDIS_URL") {
            self.redis_url = value;
        }
        if let Some(value) = var("QUEUE_KEY") {
            self.queue_key = value;
        }
        if let Some(value) = var("RESULT_STORE_TYPE") {
            self.result_store_type = parse_value("CONVEYOR_RESULT_STORE_TYPE", &value)?;
        }
        if let Some(value) = var("RESULT_STORE_TTL") {
            self.result_store_ttl = parse_value("CONVEYOR_RESULT_STORE_TTL", &value)?;
        }
        if let Some(value) = var("RESULT_STORE_REDIS_URL") {
            self.result_store_redis_url = Some(value);
        }
        if let Some(value) = var("RESULT_KEY_PREFIX") {
            self.result_key_prefix = value;
        }
        if let Some(value) = var("API_WORKERS") {
            self.api_workers = parse_value("CONVEYOR_API_WORKERS", &value)?;
        }
        if let Some(value) = var("API_KEY") {
            self.api_key = Some(value);
        }
        if let Some(value) = var("POLL_TIMEOUT_MS") {
            self.poll_timeout_ms = parse_value("CONVEYOR_POLL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("HANDLER_TIMEOUT_MS") {
            self.handler_timeout_ms = Some(parse_value("CONVEYOR_HANDLER_TIMEOUT_MS", &value)?);
        }

        Ok(())
    }

    /// Result retention as a [`Duration`].
    pub fn result_store_ttl(&self) -> Duration {
        Duration::from_secs(self.result_store_ttl)
    }

    /// Executor poll timeout as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Per-task execution deadline, if configured.
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }

    /// Redis endpoint for the result store, falling back to the queue's.
    pub fn result_store_redis_url(&self) -> &str {
        self.result_store_redis_url
            .as_deref()
            .unwrap_or(&self.redis_url)
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_table() {
        let config = Config::default();
        assert_eq!(config.queue_type, BackendKind::Memory);
        assert_eq!(config.result_store_type, BackendKind::Memory);
        assert_eq!(config.result_store_ttl, 3600);
        assert_eq!(config.api_workers, 4);
        assert_eq!(config.poll_timeout_ms, 1000);
        assert!(config.handler_timeout_ms.is_none());
        assert!(config.api_key.is_none());
        assert_eq!(config.queue_key, "conveyor:queue");
        assert_eq!(config.result_key_prefix, "conveyor:result");
    }

    #[test]
    fn from_toml_overrides_defaults_keeps_rest() {
        let config = Config::from_toml(
            r#"
            queue_type = "redis"
            result_store_ttl = 120
            api_key = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.queue_type, BackendKind::Redis);
        assert_eq!(config.result_store_ttl, 120);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        // Untouched keys keep their defaults.
        assert_eq!(config.result_store_type, BackendKind::Memory);
        assert_eq!(config.api_workers, 4);
    }

    #[test]
    fn from_toml_rejects_bad_backend_kind() {
        let result = Config::from_toml(r#"queue_type = "postgres""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::from_toml(
            r#"
            queue_type = "memory"
            result_store_ttl = 120
            "#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("CONVEYOR_QUEUE_TYPE", "redis"),
            ("CONVEYOR_RESULT_STORE_TTL", "60"),
            ("CONVEYOR_API_WORKERS", "16"),
            ("CONVEYOR_RESULT_STORE_REDIS_URL", "redis://results:6379/"),
            ("CONVEYOR_HANDLER_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|name| env.get(name).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.queue_type, BackendKind::Redis);
        assert_eq!(config.result_store_ttl, 60);
        assert_eq!(config.api_workers, 16);
        assert_eq!(
            config.result_store_redis_url(),
            "redis://results:6379/"
        );
        assert_eq!(config.handler_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn env_override_rejects_unparseable_value() {
        let mut config = Config::default();
        let result = config.apply_overrides(|name| {
            (name == "CONVEYOR_API_WORKERS").then(|| "lots".to_string())
        });
        match result {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "CONVEYOR_API_WORKERS"),
            other => panic!("expected Invalid, got: {other:?}"),
        }
    }

    #[test]
    fn result_store_url_falls_back_to_queue_url() {
        let config = Config {
            redis_url: "redis://shared:6379/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.result_store_redis_url(), "redis://shared:6379/");
    }

    #[test]
    fn duration_accessors_convert_units() {
        let config = Config {
            result_store_ttl: 2,
            poll_timeout_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.result_store_ttl(), Duration::from_secs(2));
        assert_eq!(config.poll_timeout(), Duration::from_millis(250));
        assert!(config.handler_timeout().is_none());
    }

    #[test]
    fn backend_kind_from_str() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("redis".parse::<BackendKind>().unwrap(), BackendKind::Redis);
        assert!("postgres".parse::<BackendKind>().is_err());
    }
}

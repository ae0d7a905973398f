//! Configuration loading for Meridian clients.
//!
//! Only the `[api]` section is required; the other sections fall back to the
//! defaults of the caching runtime.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "MERIDIAN_CONFIG";
pub const LOCAL_DEFAULT_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeridianConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Configured backend URL, if any.
    pub base_url: Option<String>,
    /// Host the client itself runs on; used to detect local development.
    pub client_host: Option<String>,
    /// Hosts that must never be reached from a local development host.
    #[serde(default)]
    pub production_hosts: Vec<String>,
    #[serde(default = "default_local_url")]
    pub local_default: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    pub gc_time_ms: u64,
    pub retry: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub gc_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationSettings {
    pub max_visible: usize,
    pub default_duration_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Where the bearer token is persisted. `None` keeps it in memory only.
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or MERIDIAN_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn default_local_url() -> String {
    LOCAL_DEFAULT_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            client_host: None,
            production_hosts: Vec::new(),
            local_default: default_local_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_ms: 5 * 60 * 1000,
            gc_time_ms: 10 * 60 * 1000,
            retry: 1,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            gc_interval_ms: 60_000,
        }
    }
}

impl CacheSettings {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            max_visible: 3,
            default_duration_ms: 5_000,
        }
    }
}

impl NotificationSettings {
    pub fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "meridian=info,warn".to_string(),
            json: false,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl MeridianConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: MeridianConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.api.base_url {
            if !is_http_url(base_url) {
                return Err(ConfigError::InvalidValue {
                    field: "api.base_url",
                    reason: "must start with http:// or https://".to_string(),
                });
            }
        }
        if !is_http_url(&self.api.local_default) {
            return Err(ConfigError::InvalidValue {
                field: "api.local_default",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.api.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.gc_time_ms < self.cache.stale_time_ms {
            return Err(ConfigError::InvalidValue {
                field: "cache.gc_time_ms",
                reason: "must be >= stale_time_ms".to_string(),
            });
        }
        if self.cache.max_retry_delay_ms < self.cache.retry_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_retry_delay_ms",
                reason: "must be >= retry_delay_ms".to_string(),
            });
        }
        if self.cache.gc_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.gc_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.notifications.max_visible == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifications.max_visible",
                reason: "must be > 0".to_string(),
            });
        }
        if self.notifications.default_duration_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifications.default_duration_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

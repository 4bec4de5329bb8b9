//! Typed process configuration derived from [`Settings`].

use crate::persistence::DEFAULT_CACHE_TTL;
use civicsync_core::settings::{Settings, SettingsError};
use civicsync_core::sources::HttpOptions;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const KEY_DATABASE_PATH: &str = "DATABASE_PATH";
pub const KEY_REDIS_URL: &str = "REDIS_URL";
pub const KEY_REDIS_PREFIX: &str = "REDIS_KEY_PREFIX";
pub const KEY_CACHE_BACKEND: &str = "CACHE_BACKEND";
pub const KEY_CACHE_TTL_SECS: &str = "CACHE_TTL_SECS";
pub const KEY_SNAPSHOT_DIR: &str = "SNAPSHOT_DIR";
pub const KEY_BLOB_BASE_URL: &str = "BLOB_BASE_URL";
pub const KEY_BLOB_TOKEN: &str = "BLOB_READ_WRITE_TOKEN";
pub const KEY_CRON_SECRET: &str = "CRON_SECRET";
pub const KEY_REFRESH_WORKERS: &str = "REFRESH_WORKERS";
pub const KEY_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
pub const KEY_HTTP_MAX_RETRIES: &str = "HTTP_MAX_RETRIES";
pub const KEY_HANDLER_TIMEOUT_SECS: &str = "HANDLER_TIMEOUT_SECS";

/// Wall-clock limit on one source handler, across all of its requests.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("{key} requires {requires}")]
    Incomplete { key: &'static str, requires: &'static str },

    #[error("{key} must be one of {allowed}, got '{value}'")]
    UnknownChoice {
        key: &'static str,
        allowed: &'static str,
        value: String,
    },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheConfig {
    Redis { url: String, prefix: Option<String> },
    Memory,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotConfig {
    Directory(PathBuf),
    Http { base_url: String, token: String },
    Disabled,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: Option<PathBuf>,
    pub cache: CacheConfig,
    pub cache_ttl: Duration,
    pub snapshot: SnapshotConfig,
    /// Shared secret for the refresh trigger. `None` refuses every request.
    pub cron_secret: Option<String>,
    pub workers: usize,
    pub handler_timeout: Duration,
    pub http: HttpOptions,
}

impl AppConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let cache = match (settings.get(KEY_REDIS_URL), settings.get(KEY_CACHE_BACKEND)) {
            (_, Some("none")) => CacheConfig::Disabled,
            (_, Some("memory")) => CacheConfig::Memory,
            (Some(url), None | Some("redis")) => CacheConfig::Redis {
                url: url.to_string(),
                prefix: settings.get(KEY_REDIS_PREFIX).map(String::from),
            },
            (None, Some("redis")) => {
                return Err(ConfigError::Incomplete {
                    key: KEY_CACHE_BACKEND,
                    requires: KEY_REDIS_URL,
                })
            }
            (None, None) => CacheConfig::Disabled,
            (_, Some(other)) => {
                return Err(ConfigError::UnknownChoice {
                    key: KEY_CACHE_BACKEND,
                    allowed: "redis, memory, none",
                    value: other.to_string(),
                })
            }
        };

        let snapshot = match (
            settings.get(KEY_SNAPSHOT_DIR),
            settings.get(KEY_BLOB_BASE_URL),
            settings.get(KEY_BLOB_TOKEN),
        ) {
            (Some(dir), _, _) => SnapshotConfig::Directory(PathBuf::from(dir)),
            (None, Some(base_url), Some(token)) => SnapshotConfig::Http {
                base_url: base_url.to_string(),
                token: token.to_string(),
            },
            (None, Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    key: KEY_BLOB_BASE_URL,
                    requires: KEY_BLOB_TOKEN,
                })
            }
            (None, None, _) => SnapshotConfig::Disabled,
        };

        let cache_ttl = positive_secs(settings, KEY_CACHE_TTL_SECS)?.unwrap_or(DEFAULT_CACHE_TTL);
        let workers = settings.parse::<usize>(KEY_REFRESH_WORKERS)?.unwrap_or(1);
        if workers == 0 {
            return Err(ConfigError::Zero {
                key: KEY_REFRESH_WORKERS,
            });
        }

        let handler_timeout =
            positive_secs(settings, KEY_HANDLER_TIMEOUT_SECS)?.unwrap_or(DEFAULT_HANDLER_TIMEOUT);

        let mut http = HttpOptions::default();
        if let Some(timeout) = positive_secs(settings, KEY_HTTP_TIMEOUT_SECS)? {
            http.timeout = timeout;
        }
        if let Some(retries) = settings.parse::<u32>(KEY_HTTP_MAX_RETRIES)? {
            http.max_retries = retries;
        }

        Ok(Self {
            database_path: settings.get(KEY_DATABASE_PATH).map(PathBuf::from),
            cache,
            cache_ttl,
            snapshot,
            cron_secret: settings.get(KEY_CRON_SECRET).map(String::from),
            workers,
            handler_timeout,
            http,
        })
    }
}

fn positive_secs(settings: &Settings, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match settings.parse::<u64>(key)? {
        Some(0) => Err(ConfigError::Zero { key }),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

//! Process-level configuration: a flat string key/value snapshot.
//!
//! Resolved once at start-up from, lowest precedence first, an optional TOML
//! file, an optional `.env` file and the process environment. Source handlers
//! and the runner read their keys from this snapshot instead of the live
//! environment, which keeps them testable.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("settings key '{key}' must be a string, number or boolean")]
    UnsupportedValue { key: String },

    #[error("failed to load env file {path}: {message}")]
    EnvFile { path: String, message: String },

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn from_env() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a flat TOML table. Numbers and booleans are kept as their text.
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let table: toml::Table = s.parse()?;
        let mut values = BTreeMap::new();
        for (key, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                _ => return Err(SettingsError::UnsupportedValue { key }),
            };
            values.insert(key, text);
        }
        Ok(Self { values })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Read a `.env` file without touching the process environment.
    pub fn from_env_file(path: &Path) -> Result<Self, SettingsError> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| SettingsError::EnvFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut values = BTreeMap::new();
        for item in iter {
            let (k, v) = item.map_err(|e| SettingsError::EnvFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            values.insert(k, v);
        }
        Ok(Self { values })
    }

    /// Layer `other` on top of `self`; keys in `other` win.
    pub fn overlay(mut self, other: Settings) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Value for `key`. Blank values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys from `required` that are absent, in the order given.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|k| !self.contains(k))
            .collect()
    }

    /// Parse an optional typed value; absent is `Ok(None)`.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| SettingsError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
        }
    }
}

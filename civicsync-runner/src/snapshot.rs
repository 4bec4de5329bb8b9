//! Audit snapshot of the merged series, written to a fixed object key.
//!
//! The export is best-effort but never silent: every attempt yields a
//! [`SnapshotOutcome`] that the sync pipeline folds into its logs.

use crate::store::Backend;
use civicsync_core::domain::IndicatorSeries;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Object key of the series snapshot, overwritten on every export.
pub const SNAPSHOT_KEY: &str = "snapshots/indicator-series.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("snapshot write to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot upload: {0}")]
    Upload(String),
}

/// Write-only object store.
pub trait SnapshotSink: Send + Sync {
    /// Store `body` under `key`; returns where it landed.
    fn put(&self, key: &str, body: &[u8]) -> Result<String, SnapshotError>;
}

/// Snapshot sink on the local filesystem, rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsSnapshotSink {
    root: PathBuf,
}

impl FsSnapshotSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl SnapshotSink for FsSnapshotSink {
    /// Writes are atomic: write to `.tmp` then rename.
    fn put(&self, key: &str, body: &[u8]) -> Result<String, SnapshotError> {
        let path = self.root.join(key);
        let io_err = |source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, body).map_err(io_err)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(e)
        })?;
        Ok(path.display().to_string())
    }
}

/// Snapshot sink that PUTs to `{base_url}/{key}` with a bearer token.
pub struct HttpSnapshotSink {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl HttpSnapshotSink {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, SnapshotError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SnapshotError::Upload(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }
}

impl SnapshotSink for HttpSnapshotSink {
    fn put(&self, key: &str, body: &[u8]) -> Result<String, SnapshotError> {
        let url = format!("{}/{}", self.base_url, key);
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|e| SnapshotError::Upload(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SnapshotError::Upload(format!("{url} returned {}", resp.status())));
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Exported { location: String, hash: String },
    Disabled,
    Failed(String),
}

impl SnapshotOutcome {
    /// Log line for this outcome; nothing when export is disabled.
    pub fn log_line(&self) -> Option<String> {
        match self {
            SnapshotOutcome::Exported { location, hash } => {
                Some(format!("Snapshot: exported {location} (blake3 {})", &hash[..hash.len().min(12)]))
            }
            SnapshotOutcome::Disabled => None,
            SnapshotOutcome::Failed(msg) => Some(format!("Snapshot: failed ({msg})")),
        }
    }
}

impl fmt::Display for SnapshotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.log_line() {
            Some(line) => f.write_str(&line),
            None => f.write_str("Snapshot: disabled"),
        }
    }
}

pub struct SnapshotExporter {
    sink: Backend<Arc<dyn SnapshotSink>>,
}

impl SnapshotExporter {
    pub fn new(sink: Backend<Arc<dyn SnapshotSink>>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self::new(Backend::Unconfigured)
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_configured()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(indicators = series.len()))]
    pub fn export(&self, series: &IndicatorSeries) -> SnapshotOutcome {
        let Some(sink) = self.sink.as_configured() else {
            return SnapshotOutcome::Disabled;
        };
        match Self::encode(series).and_then(|(body, hash)| Ok((sink.put(SNAPSHOT_KEY, &body)?, hash))) {
            Ok((location, hash)) => {
                tracing::info!(%location, %hash, "snapshot exported");
                SnapshotOutcome::Exported { location, hash }
            }
            Err(err) => {
                tracing::error!(error = %err, "snapshot export failed");
                SnapshotOutcome::Failed(err.to_string())
            }
        }
    }

    fn encode(series: &IndicatorSeries) -> Result<(Vec<u8>, String), SnapshotError> {
        let body = serde_json::to_vec_pretty(series)?;
        let hash = blake3::hash(&body).to_hex().to_string();
        Ok((body, hash))
    }
}

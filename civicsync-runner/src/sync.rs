//! The sync pipeline: read current series, refresh, merge, write through,
//! export a snapshot.
//!
//! Runs are serialised in-process. Concurrent processes still race at the
//! row level (last write wins per indicator).

use crate::config::{AppConfig, CacheConfig, SnapshotConfig};
use crate::orchestrator::{RefreshOrchestrator, SourceOutcome};
use crate::persistence::{Repository, WriteOutcome};
use crate::snapshot::{FsSnapshotSink, HttpSnapshotSink, SnapshotExporter, SnapshotOutcome, SnapshotSink};
use crate::store::{Backend, DurableStore, Entity, KvCache, MemoryCache, RedisCache, SqliteStore};
use civicsync_core::defaults::BundledDefaults;
use civicsync_core::registry::SourceRegistry;
use civicsync_core::series::merge_into_global;
use civicsync_core::settings::Settings;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub const SKIPPED_WRITE_LINE: &str = "Persistence: skipped write, current series unavailable";

/// What a refresh run reports to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Ids of indicators whose series changed.
    pub updated: Vec<String>,
    /// One line per handler, then persistence and snapshot lines.
    pub logs: Vec<String>,
    #[serde(skip)]
    pub outcomes: Vec<SourceOutcome>,
    #[serde(skip)]
    pub persisted: Option<WriteOutcome>,
    #[serde(skip)]
    pub snapshot: Option<SnapshotOutcome>,
}

pub struct SyncService {
    repository: Arc<Repository>,
    orchestrator: RefreshOrchestrator,
    exporter: SnapshotExporter,
    run_lock: Mutex<()>,
}

impl SyncService {
    pub fn new(repository: Arc<Repository>, orchestrator: RefreshOrchestrator, exporter: SnapshotExporter) -> Self {
        Self {
            repository,
            orchestrator,
            exporter,
            run_lock: Mutex::new(()),
        }
    }

    /// Wire the production pipeline from configuration.
    ///
    /// Backends that fail to open are logged and treated as unconfigured;
    /// reads then fall through to the next tier.
    pub fn from_config(config: &AppConfig, settings: Settings) -> anyhow::Result<Self> {
        let defaults = Arc::new(BundledDefaults::load()?);
        let repository = Arc::new(
            Repository::new(open_cache(config), open_durable(config), defaults.clone())
                .with_ttl(config.cache_ttl),
        );
        let registry = SourceRegistry::standard(&config.http)?;
        let orchestrator = RefreshOrchestrator::new(registry, Arc::new(settings))
            .with_workers(config.workers)
            .with_deadline(config.handler_timeout)
            .with_definitions(&defaults.definitions);
        let exporter = SnapshotExporter::new(open_snapshot_sink(config));
        Ok(Self::new(repository, orchestrator, exporter))
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    pub fn orchestrator(&self) -> &RefreshOrchestrator {
        &self.orchestrator
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub fn run(&self) -> SyncReport {
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.repository.current_series_for_refresh();
        tracing::debug!(origin = %current.origin, degraded = current.degraded, "current series loaded");
        let result = self.orchestrator.refresh_all(&current.value);
        let has_updates = result.has_updates();
        let updated = result.updated_ids();
        let mut logs = result.logs;

        // Merging into stand-in defaults would overwrite real history.
        if current.degraded {
            tracing::warn!("durable store unreadable, refresh not persisted");
            logs.push(SKIPPED_WRITE_LINE.to_string());
            return SyncReport {
                updated: Vec::new(),
                logs,
                outcomes: result.outcomes,
                persisted: None,
                snapshot: None,
            };
        }

        if !has_updates {
            tracing::info!("no indicators updated, nothing written");
            return SyncReport {
                updated,
                logs,
                outcomes: result.outcomes,
                persisted: None,
                snapshot: None,
            };
        }

        let merged = merge_into_global(&current.value, &result.updates);
        let persisted = self.repository.write_indicator_series(&merged);
        logs.extend(persisted.failure_lines(Entity::IndicatorSeries));

        // A failed durable write leaves nothing to audit.
        let snapshot = if persisted.durable.is_failed() {
            None
        } else {
            let outcome = self.exporter.export(&merged);
            logs.extend(outcome.log_line());
            Some(outcome)
        };

        tracing::info!(updated = updated.len(), durable = ?persisted.durable, "refresh complete");
        SyncReport {
            updated,
            logs,
            outcomes: result.outcomes,
            persisted: Some(persisted),
            snapshot,
        }
    }
}

fn open_cache(config: &AppConfig) -> Backend<Arc<dyn KvCache>> {
    match &config.cache {
        CacheConfig::Disabled => Backend::Unconfigured,
        CacheConfig::Memory => Backend::Configured(Arc::new(MemoryCache::new())),
        CacheConfig::Redis { url, prefix } => {
            match RedisCache::new(url, REDIS_CONNECT_TIMEOUT, prefix.clone()) {
                Ok(cache) => Backend::Configured(Arc::new(cache)),
                Err(err) => {
                    tracing::warn!(error = %err, "cache disabled");
                    Backend::Unconfigured
                }
            }
        }
    }
}

fn open_durable(config: &AppConfig) -> Backend<Arc<dyn DurableStore>> {
    let Some(path) = &config.database_path else {
        return Backend::Unconfigured;
    };
    match SqliteStore::open(path) {
        Ok(store) => Backend::Configured(Arc::new(store)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "durable store disabled");
            Backend::Unconfigured
        }
    }
}

fn open_snapshot_sink(config: &AppConfig) -> Backend<Arc<dyn SnapshotSink>> {
    match &config.snapshot {
        SnapshotConfig::Disabled => Backend::Unconfigured,
        SnapshotConfig::Directory(dir) => Backend::Configured(Arc::new(FsSnapshotSink::new(dir))),
        SnapshotConfig::Http { base_url, token } => {
            match HttpSnapshotSink::new(base_url, token, config.http.timeout) {
                Ok(sink) => Backend::Configured(Arc::new(sink)),
                Err(err) => {
                    tracing::warn!(error = %err, "snapshot export disabled");
                    Backend::Unconfigured
                }
            }
        }
    }
}

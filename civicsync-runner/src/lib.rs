//! CivicSync Runner: refresh orchestration, layered persistence, snapshots.
//!
//! This crate builds on `civicsync-core` to provide:
//! - The refresh orchestrator (per-source isolation, priority merge, outcomes)
//! - Cache / durable store / bundled-defaults read-through with write-through
//! - Audit snapshot export to a filesystem or HTTP object store
//! - The sync pipeline and typed process configuration

pub mod config;
pub mod orchestrator;
pub mod persistence;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use config::{AppConfig, CacheConfig, ConfigError, SnapshotConfig};
pub use orchestrator::{RefreshOrchestrator, RefreshResult, SourceOutcome, SourceStatus};
pub use persistence::{Loaded, Origin, Repository, StepOutcome, WriteOutcome};
pub use snapshot::{
    FsSnapshotSink, HttpSnapshotSink, SnapshotError, SnapshotExporter, SnapshotOutcome, SnapshotSink,
    SNAPSHOT_KEY,
};
pub use store::{Backend, DurableStore, Entity, KvCache, MemoryCache, RedisCache, SqliteStore, StoreError, Table};
pub use sync::{SyncReport, SyncService, SKIPPED_WRITE_LINE};

//! Layered persistence: cache → durable store → bundled defaults.
//!
//! Reads never fail. Each tier that cannot answer (unconfigured, unreachable,
//! empty or corrupt) is logged and skipped, ending at the bundled defaults.
//! Whatever tier answers, the cache is repopulated with the configured TTL.
//! Defaults served because the durable store failed are flagged `degraded`;
//! the refresh path reads the store directly and never merges into them.
//!
//! Writes go durable first, then cache. The two are independent: neither is
//! rolled back when the other fails, and both outcomes are returned.

use crate::store::{Backend, DurableStore, Entity, KvCache, StoreError, Table};
use crate::store::durable::SINGLETON_ID;
use civicsync_core::defaults::BundledDefaults;
use civicsync_core::domain::{
    DatasetCatalogEntry, IndicatorDefinition, IndicatorSeries, InternalAggregates, Neighborhood,
    Project, SeriesPoint,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Which tier answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Durable,
    Defaults,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Cache => "cache",
            Origin::Durable => "durable",
            Origin::Defaults => "defaults",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub origin: Origin,
    /// Set when the durable store is configured but could not be read, so
    /// `value` is the bundled defaults standing in for real history.
    pub degraded: bool,
}

/// Outcome of one write step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Written,
    Disabled,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub durable: StepOutcome,
    pub cache: StepOutcome,
}

impl WriteOutcome {
    /// Log lines for the failed steps, labelled with the entity.
    pub fn failure_lines(&self, entity: Entity) -> Vec<String> {
        let mut lines = Vec::new();
        if let StepOutcome::Failed(msg) = &self.durable {
            lines.push(format!("Persistence: durable write of {entity} failed ({msg})"));
        }
        if let StepOutcome::Failed(msg) = &self.cache {
            lines.push(format!("Persistence: cache write of {entity} failed ({msg})"));
        }
        lines
    }
}

pub struct Repository {
    cache: Backend<Arc<dyn KvCache>>,
    durable: Backend<Arc<dyn DurableStore>>,
    defaults: Arc<BundledDefaults>,
    ttl: Duration,
}

impl Repository {
    pub fn new(
        cache: Backend<Arc<dyn KvCache>>,
        durable: Backend<Arc<dyn DurableStore>>,
        defaults: Arc<BundledDefaults>,
    ) -> Self {
        Self {
            cache,
            durable,
            defaults,
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Defaults only; every read ends at the bundled data.
    pub fn defaults_only(defaults: Arc<BundledDefaults>) -> Self {
        Self::new(Backend::Unconfigured, Backend::Unconfigured, defaults)
    }

    pub fn defaults(&self) -> &BundledDefaults {
        &self.defaults
    }

    /// Indicator definitions are static and come from the bundle.
    pub fn definitions(&self) -> &[IndicatorDefinition] {
        &self.defaults.definitions
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn indicator_series(&self) -> Loaded<IndicatorSeries> {
        self.read_through(Entity::IndicatorSeries, read_series, || {
            self.defaults.series.clone()
        })
    }

    pub fn neighborhoods(&self) -> Loaded<Vec<Neighborhood>> {
        self.read_through(Entity::Neighborhoods, read_document, || {
            self.defaults.neighborhoods.clone()
        })
    }

    pub fn projects(&self) -> Loaded<Vec<Project>> {
        self.read_through(Entity::Projects, read_document, || self.defaults.projects.clone())
    }

    pub fn internal_aggregates(&self) -> Loaded<InternalAggregates> {
        self.read_through(Entity::InternalAggregates, read_document, || {
            self.defaults.aggregates.clone()
        })
    }

    pub fn catalog(&self) -> Loaded<Vec<DatasetCatalogEntry>> {
        self.read_through(Entity::Catalog, read_document, || self.defaults.catalog.clone())
    }

    /// The series a refresh merges into.
    ///
    /// Reads the durable store directly when one is configured, since a stale
    /// cache entry must not be written back over newer rows. An empty store is
    /// a first run and yields the defaults; a failing store yields the
    /// defaults marked `degraded`.
    pub fn current_series_for_refresh(&self) -> Loaded<IndicatorSeries> {
        let Some(store) = self.durable.as_configured() else {
            return self.indicator_series();
        };
        let fallback = || self.defaults.series.clone();
        match read_series(store.as_ref(), Table::IndicatorSeries) {
            Ok(Some(value)) => Loaded {
                value,
                origin: Origin::Durable,
                degraded: false,
            },
            Ok(None) => Loaded {
                value: fallback(),
                origin: Origin::Defaults,
                degraded: false,
            },
            Err(err) => {
                tracing::warn!(error = %err, "durable read failed before refresh");
                Loaded {
                    value: fallback(),
                    origin: Origin::Defaults,
                    degraded: true,
                }
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, from_durable, fallback))]
    fn read_through<T, R, D>(&self, entity: Entity, from_durable: R, fallback: D) -> Loaded<T>
    where
        T: Serialize + DeserializeOwned,
        R: FnOnce(&dyn DurableStore, Table) -> Result<Option<T>, StoreError>,
        D: FnOnce() -> T,
    {
        if let Some(value) = self.cache_lookup(entity) {
            return Loaded {
                value,
                origin: Origin::Cache,
                degraded: false,
            };
        }

        let mut degraded = false;
        let durable = match (self.durable.as_configured(), entity.table()) {
            (Some(store), Some(table)) => match from_durable(store.as_ref(), table) {
                Ok(found) => found,
                Err(err) => {
                    tracing::warn!(%entity, error = %err, "durable read failed, using defaults");
                    degraded = true;
                    None
                }
            },
            _ => None,
        };

        let (value, origin) = match durable {
            Some(value) => (value, Origin::Durable),
            None => (fallback(), Origin::Defaults),
        };
        if let Err(err) = self.cache_store(entity, &value) {
            tracing::warn!(%entity, error = %err, "cache populate failed");
        }
        tracing::debug!(%entity, %origin, degraded, "read resolved");
        Loaded { value, origin, degraded }
    }

    fn cache_lookup<T: DeserializeOwned>(&self, entity: Entity) -> Option<T> {
        let cache = self.cache.as_configured()?;
        match cache.get(entity.cache_key()) {
            Ok(Some(text)) => match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(%entity, error = %err, "ignoring corrupt cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%entity, error = %err, "cache read failed");
                None
            }
        }
    }

    fn cache_store<T: Serialize + ?Sized>(&self, entity: Entity, value: &T) -> Result<StepOutcome, StoreError> {
        let Some(cache) = self.cache.as_configured() else {
            return Ok(StepOutcome::Disabled);
        };
        let text = serde_json::to_string(value)?;
        cache.set(entity.cache_key(), &text, self.ttl)?;
        Ok(StepOutcome::Written)
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Upsert every indicator row, then overwrite the cached series.
    pub fn write_indicator_series(&self, series: &IndicatorSeries) -> WriteOutcome {
        let durable = self.durable_step(|store| {
            let rows = series
                .iter()
                .map(|(id, points)| -> Result<(String, String), StoreError> {
                    Ok((id.clone(), serde_json::to_string(points)?))
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            store.upsert_rows(Table::IndicatorSeries, &rows)
        });
        let cache = self.cache_step(Entity::IndicatorSeries, series);
        WriteOutcome { durable, cache }
    }

    pub fn write_neighborhoods(&self, neighborhoods: &[Neighborhood]) -> WriteOutcome {
        self.write_document(Entity::Neighborhoods, neighborhoods)
    }

    pub fn write_projects(&self, projects: &[Project]) -> WriteOutcome {
        self.write_document(Entity::Projects, projects)
    }

    pub fn write_internal_aggregates(&self, aggregates: &InternalAggregates) -> WriteOutcome {
        self.write_document(Entity::InternalAggregates, aggregates)
    }

    fn write_document<T: Serialize + ?Sized>(&self, entity: Entity, value: &T) -> WriteOutcome {
        let durable = match entity.table() {
            Some(table) => self.durable_step(|store| {
                let payload = serde_json::to_string(value)?;
                store.upsert_rows(table, &[(SINGLETON_ID.to_string(), payload)])
            }),
            None => StepOutcome::Disabled,
        };
        let cache = self.cache_step(entity, value);
        WriteOutcome { durable, cache }
    }

    fn durable_step<F>(&self, write: F) -> StepOutcome
    where
        F: FnOnce(&dyn DurableStore) -> Result<(), StoreError>,
    {
        let Some(store) = self.durable.as_configured() else {
            return StepOutcome::Disabled;
        };
        match write(store.as_ref()) {
            Ok(()) => StepOutcome::Written,
            Err(err) => {
                tracing::error!(error = %err, "durable write failed");
                StepOutcome::Failed(err.to_string())
            }
        }
    }

    fn cache_step<T: Serialize + ?Sized>(&self, entity: Entity, value: &T) -> StepOutcome {
        match self.cache_store(entity, value) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(%entity, error = %err, "cache write failed");
                StepOutcome::Failed(err.to_string())
            }
        }
    }
}

fn read_series(store: &dyn DurableStore, table: Table) -> Result<Option<IndicatorSeries>, StoreError> {
    let rows = store.read_rows(table)?;
    if rows.is_empty() {
        return Ok(None);
    }
    let mut series = IndicatorSeries::new();
    for (id, payload) in rows {
        let points: Vec<SeriesPoint> = serde_json::from_str(&payload)?;
        series.insert(id, points);
    }
    Ok(Some(series))
}

fn read_document<T: DeserializeOwned>(store: &dyn DurableStore, table: Table) -> Result<Option<T>, StoreError> {
    let rows = store.read_rows(table)?;
    match rows.into_iter().find(|(id, _)| id == SINGLETON_ID) {
        Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

//! Storage backends behind the persistence layer.
//!
//! Each backend is resolved once at start-up into a [`Backend`]: either a
//! configured client or explicitly unconfigured. Nothing here knows about
//! fallbacks; that policy lives in [`crate::persistence`].

pub mod cache;
pub mod durable;

pub use cache::{KvCache, MemoryCache, RedisCache};
pub use durable::{DurableStore, SqliteStore, Table};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("payload encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A store client resolved from configuration.
#[derive(Debug, Clone)]
pub enum Backend<T> {
    Configured(T),
    Unconfigured,
}

impl<T> Backend<T> {
    pub fn as_configured(&self) -> Option<&T> {
        match self {
            Backend::Configured(inner) => Some(inner),
            Backend::Unconfigured => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Backend::Configured(_))
    }
}

impl<T> From<Option<T>> for Backend<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Backend::Unconfigured, Backend::Configured)
    }
}

/// The readable entities and their fixed cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    IndicatorSeries,
    Neighborhoods,
    Projects,
    InternalAggregates,
    Catalog,
}

impl Entity {
    pub fn cache_key(self) -> &'static str {
        match self {
            Entity::IndicatorSeries => "indicator_series",
            Entity::Neighborhoods => "neighborhoods",
            Entity::Projects => "projects",
            Entity::InternalAggregates => "internal_aggregates",
            Entity::Catalog => "catalog",
        }
    }

    /// Durable table backing this entity; the catalog has none.
    pub fn table(self) -> Option<Table> {
        match self {
            Entity::IndicatorSeries => Some(Table::IndicatorSeries),
            Entity::Neighborhoods => Some(Table::Neighborhoods),
            Entity::Projects => Some(Table::Projects),
            Entity::InternalAggregates => Some(Table::InternalAggregates),
            Entity::Catalog => None,
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cache_key())
    }
}

//! CivicSync Core: domain types, series merging, source handlers, bundled data.
//!
//! This crate holds everything that does not touch storage:
//! - Domain types (indicator definitions, series points, city entities)
//! - Period granularity and the series merge primitives
//! - Flat key/value settings resolved from TOML, `.env` and the environment
//! - One source handler per external provider, plus the ordered registry
//! - Bundled defaults, indicator summaries and data validation

pub mod defaults;
pub mod domain;
pub mod granularity;
pub mod registry;
pub mod series;
pub mod settings;
pub mod sources;
pub mod summary;
pub mod validate;

pub use domain::{IndicatorSeries, SeriesPoint};
pub use settings::Settings;

#[cfg(test)]
mod tests {
    use super::*;

    /// Handlers run on worker threads; everything they share must be Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<IndicatorSeries>();
        require_sync::<IndicatorSeries>();
        require_send::<Settings>();
        require_sync::<Settings>();
        require_send::<registry::SourceRegistry>();
        require_sync::<registry::SourceRegistry>();
        require_send::<sources::SourceUpdate>();
        require_send::<sources::SourceError>();
        require_send::<defaults::BundledDefaults>();
        require_sync::<defaults::BundledDefaults>();
    }
}

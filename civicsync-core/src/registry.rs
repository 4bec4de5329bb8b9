//! Source registry: the ordered list of handlers a refresh runs.
//!
//! Registration order is the order log lines are reported in. Each entry also
//! carries a merge priority; see [`SourceRegistry::merge_order`].

use crate::sources::{
    CdcPlaces, CensusAcs, EpaAirQuality, HttpOptions, LaborStatistics, NoaaClimate, SourceError,
    SourceHandler, TransitAlerts,
};
use std::sync::Arc;

/// One registered handler and its merge priority.
#[derive(Clone)]
pub struct RegisteredSource {
    pub handler: Arc<dyn SourceHandler>,
    pub priority: i32,
}

impl std::fmt::Debug for RegisteredSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSource")
            .field("id", &self.handler.id())
            .field("priority", &self.priority)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register with the default priority (0).
    pub fn register(&mut self, handler: Arc<dyn SourceHandler>) {
        self.register_with_priority(handler, 0);
    }

    pub fn register_with_priority(&mut self, handler: Arc<dyn SourceHandler>, priority: i32) {
        self.entries.push(RegisteredSource { handler, priority });
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, handler: Arc<dyn SourceHandler>) -> Self {
        self.register(handler);
        self
    }

    /// The production handler set, in registration order.
    pub fn standard(opts: &HttpOptions) -> Result<Self, SourceError> {
        Ok(Self::new()
            .with(Arc::new(CensusAcs::new(opts)?))
            .with(Arc::new(LaborStatistics::new(opts)?))
            .with(Arc::new(TransitAlerts::new(opts)?))
            .with(Arc::new(NoaaClimate::new(opts)?))
            .with(Arc::new(EpaAirQuality::new(opts)?))
            .with(Arc::new(CdcPlaces::new(opts)?)))
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[RegisteredSource] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registration indices in the order updates are merged.
    ///
    /// Ascending `(priority, index)`: a later merge overwrites an earlier one,
    /// so the highest priority wins and equal priorities fall back to the
    /// later registration.
    pub fn merge_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| (self.entries[i].priority, i));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IndicatorSeries;
    use crate::settings::Settings;
    use crate::sources::{Cadence, SourceUpdate};

    struct Named(&'static str);

    impl SourceHandler for Named {
        fn id(&self) -> &str {
            self.0
        }
        fn label(&self) -> &str {
            self.0
        }
        fn cadence(&self) -> Cadence {
            Cadence::Daily
        }
        fn required_keys(&self) -> &[&'static str] {
            &[]
        }
        fn fetch(&self, _: &IndicatorSeries, _: &Settings) -> Result<SourceUpdate, SourceError> {
            Ok(SourceUpdate::default())
        }
    }

    #[test]
    fn standard_registry_order() {
        let registry = SourceRegistry::standard(&HttpOptions::default()).unwrap();
        let ids: Vec<&str> = registry.entries().iter().map(|e| e.handler.id()).collect();
        assert_eq!(
            ids,
            vec!["census_acs", "bls", "mbta", "noaa_ncei", "epa_aqs", "cdc_places"]
        );
    }

    #[test]
    fn merge_order_sorts_by_priority_then_registration() {
        let mut registry = SourceRegistry::new();
        registry.register_with_priority(Arc::new(Named("a")), 5);
        registry.register(Arc::new(Named("b")));
        registry.register(Arc::new(Named("c")));
        registry.register_with_priority(Arc::new(Named("d")), -1);
        assert_eq!(registry.merge_order(), vec![3, 1, 2, 0]);
    }

    #[test]
    fn empty_registry() {
        let registry = SourceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.merge_order().is_empty());
    }
}

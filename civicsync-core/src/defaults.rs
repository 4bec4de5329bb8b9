//! Bundled defaults compiled into the binary.
//!
//! The last tier of every read-through: when neither cache nor durable store
//! can answer, these values are served. Indicator definitions only ever come
//! from here.

use crate::domain::{
    DatasetCatalogEntry, IndicatorDefinition, IndicatorSeries, InternalAggregates, Neighborhood,
    Project,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

const DEFINITIONS_JSON: &str = include_str!("../data/indicator-definitions.json");
const VALUES_JSON: &str = include_str!("../data/indicator-values.json");
const NEIGHBORHOODS_JSON: &str = include_str!("../data/neighborhoods.json");
const PROJECTS_JSON: &str = include_str!("../data/projects.json");
const AGGREGATES_JSON: &str = include_str!("../data/internal-aggregates.json");
const CATALOG_JSON: &str = include_str!("../data/catalog.json");

#[derive(Debug, Error)]
#[error("bundled {file} is invalid: {source}")]
pub struct DefaultsError {
    pub file: &'static str,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundledDefaults {
    pub definitions: Vec<IndicatorDefinition>,
    pub series: IndicatorSeries,
    pub neighborhoods: Vec<Neighborhood>,
    pub projects: Vec<Project>,
    pub aggregates: InternalAggregates,
    pub catalog: Vec<DatasetCatalogEntry>,
}

fn parse<T: DeserializeOwned>(file: &'static str, json: &str) -> Result<T, DefaultsError> {
    serde_json::from_str(json).map_err(|source| DefaultsError { file, source })
}

impl BundledDefaults {
    pub fn load() -> Result<Self, DefaultsError> {
        Ok(Self {
            definitions: parse("indicator-definitions.json", DEFINITIONS_JSON)?,
            series: parse("indicator-values.json", VALUES_JSON)?,
            neighborhoods: parse("neighborhoods.json", NEIGHBORHOODS_JSON)?,
            projects: parse("projects.json", PROJECTS_JSON)?,
            aggregates: parse("internal-aggregates.json", AGGREGATES_JSON)?,
            catalog: parse("catalog.json", CATALOG_JSON)?,
        })
    }

    /// Defaults with the given definitions and series and no entities.
    pub fn from_parts(definitions: Vec<IndicatorDefinition>, series: IndicatorSeries) -> Self {
        Self {
            definitions,
            series,
            neighborhoods: Vec::new(),
            projects: Vec::new(),
            aggregates: InternalAggregates { requests: Vec::new() },
            catalog: Vec::new(),
        }
    }

    pub fn definition(&self, id: &str) -> Option<&IndicatorDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SeriesPoint;

    #[test]
    fn bundled_files_parse() {
        let defaults = BundledDefaults::load().unwrap();
        assert_eq!(defaults.definitions.len(), 9);
        assert!(!defaults.catalog.is_empty());
        assert!(!defaults.aggregates.requests.is_empty());
    }

    #[test]
    fn unemployment_starts_in_january() {
        let defaults = BundledDefaults::load().unwrap();
        assert_eq!(
            defaults.series["unemployment_rate"],
            vec![SeriesPoint::new("2023-01", 4.5)]
        );
    }

    #[test]
    fn every_handler_indicator_is_defined() {
        let defaults = BundledDefaults::load().unwrap();
        for id in [
            "median_rent",
            "commute_time",
            "unemployment_rate",
            "job_growth_proxy",
            "transit_reliability",
            "extreme_heat_days",
            "precipitation_anomaly",
            "air_quality_index",
            "health_disparity",
        ] {
            assert!(defaults.definition(id).is_some(), "{id} missing");
        }
    }
}

//! Domain types: indicators, series points, and the reference entities the
//! dashboard reads alongside them.
//!
//! Field names serialize in camelCase so the bundled JSON, the durable store
//! payloads and the HTTP responses all share one wire shape.

use crate::granularity::Granularity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One dated observation of an indicator.
///
/// `date` is a period label (`2023`, `2023-02`, `2023-02-14`), compared as an
/// exact string by the series merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: String,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(date: impl Into<String>, value: f64) -> Self {
        Self {
            date: date.into(),
            value,
        }
    }
}

/// Indicator id → points ascending by date, no duplicate dates.
///
/// A `BTreeMap` keeps serialization deterministic, so an indicator that no
/// handler touched serializes to the same bytes before and after a refresh.
pub type IndicatorSeries = BTreeMap<String, Vec<SeriesPoint>>;

/// Which way is "better" for an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Threshold policy used to grade the latest value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub direction: Direction,
    pub good: f64,
    pub warn: f64,
    pub alert: f64,
}

/// Static indicator metadata, loaded once at process start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorDefinition {
    pub id: String,
    pub label: String,
    pub pillar: String,
    pub unit: String,
    pub format: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_source_ids: Vec<String>,
    pub update_frequency: String,
    pub granularity: Granularity,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Innovation pipeline stage of a city project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    Explore,
    Pilot,
    Scale,
    Commercialize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub department: String,
    pub status: ProjectStatus,
    pub budget: f64,
    pub timeline: String,
    pub outcome: String,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One row of the 311 service-request summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub category: String,
    pub volume: u64,
    pub median_resolution_days: f64,
}

/// Internal-only aggregates, stored as a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalAggregates {
    pub requests: Vec<RequestSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetCatalogEntry {
    pub id: String,
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub license: String,
    pub refresh_cadence: String,
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_reads_camel_case_json() {
        let json = r#"{
            "id": "median_rent",
            "label": "Median Rent",
            "pillar": "housing",
            "unit": "USD/month",
            "format": "currency",
            "dataSourceIds": ["census_acs"],
            "updateFrequency": "annual",
            "granularity": "annual",
            "thresholds": {"direction": "down", "good": 1400, "warn": 1700, "alert": 2000}
        }"#;
        let def: IndicatorDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.data_source_ids, vec!["census_acs".to_string()]);
        assert_eq!(def.thresholds.direction, Direction::Down);
        assert_eq!(def.granularity, Granularity::Annual);
        assert!(def.description.is_empty());
    }

    #[test]
    fn project_notes_are_omitted_when_absent() {
        let project = Project {
            id: "p1".into(),
            name: "Smart Signals".into(),
            department: "Transportation".into(),
            status: ProjectStatus::Pilot,
            budget: 250_000.0,
            timeline: "2024-2025".into(),
            outcome: "Shorter bus delays".into(),
            metrics: vec!["transit_reliability".into()],
            notes: None,
        };
        let json = serde_json::to_string(&project).unwrap();
        assert!(!json.contains("notes"));
        assert!(json.contains("\"status\":\"Pilot\""));
    }
}

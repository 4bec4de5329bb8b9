//! Indicator summaries for the dashboard read path: latest value, change
//! since the previous point, threshold status, trend and pillar scores.

use crate::domain::{Direction, IndicatorDefinition, IndicatorSeries, SeriesPoint, Thresholds};
use serde::Serialize;
use std::collections::BTreeMap;

/// Changes smaller than this read as flat.
pub const FLAT_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Good,
    Warn,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Improving,
    Worsening,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSummary {
    pub id: String,
    pub label: String,
    pub pillar: String,
    pub unit: String,
    pub format: String,
    /// Date of the latest point; `None` for an empty series.
    pub latest_date: Option<String>,
    pub latest: f64,
    pub previous: f64,
    pub delta: f64,
    pub status: Status,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PillarScore {
    pub pillar: String,
    pub score: i64,
}

/// `(latest, previous)`; a single point is its own previous.
fn last_two(points: &[SeriesPoint]) -> Option<(&SeriesPoint, &SeriesPoint)> {
    let latest = points.last()?;
    let previous = points.len().checked_sub(2).map_or(latest, |i| &points[i]);
    Some((latest, previous))
}

fn better_or_equal(direction: Direction, value: f64, bound: f64) -> bool {
    match direction {
        Direction::Up => value >= bound,
        Direction::Down => value <= bound,
    }
}

pub fn status(thresholds: &Thresholds, value: f64) -> Status {
    if better_or_equal(thresholds.direction, value, thresholds.good) {
        Status::Good
    } else if better_or_equal(thresholds.direction, value, thresholds.warn) {
        Status::Warn
    } else {
        Status::Alert
    }
}

pub fn trend(direction: Direction, delta: f64) -> Trend {
    if delta.abs() < FLAT_EPSILON {
        return Trend::Flat;
    }
    let improving = match direction {
        Direction::Up => delta > 0.0,
        Direction::Down => delta < 0.0,
    };
    if improving {
        Trend::Improving
    } else {
        Trend::Worsening
    }
}

/// Map a value onto 1.0 / 0.65 / 0.35 / 0.15 by threshold band.
pub fn normalize(thresholds: &Thresholds, value: f64) -> f64 {
    let d = thresholds.direction;
    if better_or_equal(d, value, thresholds.good) {
        1.0
    } else if better_or_equal(d, value, thresholds.warn) {
        0.65
    } else if better_or_equal(d, value, thresholds.alert) {
        0.35
    } else {
        0.15
    }
}

pub fn summarize(definition: &IndicatorDefinition, points: &[SeriesPoint]) -> IndicatorSummary {
    let (latest_date, latest, previous) = match last_two(points) {
        Some((l, p)) => (Some(l.date.clone()), l.value, p.value),
        None => (None, 0.0, 0.0),
    };
    let delta = latest - previous;
    IndicatorSummary {
        id: definition.id.clone(),
        label: definition.label.clone(),
        pillar: definition.pillar.clone(),
        unit: definition.unit.clone(),
        format: definition.format.clone(),
        latest_date,
        latest,
        previous,
        delta,
        status: status(&definition.thresholds, latest),
        trend: trend(definition.thresholds.direction, delta),
    }
}

/// One summary per definition, in definition order.
pub fn summarize_all(definitions: &[IndicatorDefinition], series: &IndicatorSeries) -> Vec<IndicatorSummary> {
    definitions
        .iter()
        .map(|def| summarize(def, series.get(&def.id).map_or(&[][..], Vec::as_slice)))
        .collect()
}

/// Average normalized latest value per pillar, ×100 and rounded.
/// Indicators with no points do not count toward their pillar.
pub fn pillar_scores(definitions: &[IndicatorDefinition], series: &IndicatorSeries) -> Vec<PillarScore> {
    let mut by_pillar: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for def in definitions {
        let Some(latest) = series.get(&def.id).and_then(|p| p.last()) else {
            continue;
        };
        by_pillar
            .entry(def.pillar.as_str())
            .or_default()
            .push(normalize(&def.thresholds, latest.value));
    }
    by_pillar
        .into_iter()
        .map(|(pillar, scores)| {
            let avg = scores.iter().sum::<f64>() / scores.len() as f64;
            PillarScore {
                pillar: pillar.to_string(),
                score: (avg * 100.0).round() as i64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granularity::Granularity;

    fn def(id: &str, pillar: &str, direction: Direction, good: f64, warn: f64, alert: f64) -> IndicatorDefinition {
        IndicatorDefinition {
            id: id.into(),
            label: id.into(),
            pillar: pillar.into(),
            unit: "u".into(),
            format: "index".into(),
            description: String::new(),
            data_source_ids: vec![],
            update_frequency: "monthly".into(),
            granularity: Granularity::Monthly,
            thresholds: Thresholds {
                direction,
                good,
                warn,
                alert,
            },
        }
    }

    #[test]
    fn lower_is_better_grading() {
        let d = def("unemployment_rate", "economy", Direction::Down, 4.0, 5.5, 7.0);
        assert_eq!(status(&d.thresholds, 3.9), Status::Good);
        assert_eq!(status(&d.thresholds, 5.0), Status::Warn);
        assert_eq!(status(&d.thresholds, 6.0), Status::Alert);
        assert_eq!(normalize(&d.thresholds, 6.0), 0.35);
        assert_eq!(normalize(&d.thresholds, 9.0), 0.15);
    }

    #[test]
    fn summary_of_two_points() {
        let d = def("unemployment_rate", "economy", Direction::Down, 4.0, 5.5, 7.0);
        let points = vec![SeriesPoint::new("2023-01", 4.5), SeriesPoint::new("2023-02", 4.3)];
        let s = summarize(&d, &points);
        assert_eq!(s.latest, 4.3);
        assert_eq!(s.previous, 4.5);
        assert!((s.delta + 0.2).abs() < 1e-9);
        assert_eq!(s.trend, Trend::Improving);
        assert_eq!(s.status, Status::Warn);
        assert_eq!(s.latest_date.as_deref(), Some("2023-02"));
    }

    #[test]
    fn single_point_is_flat_and_empty_is_zero() {
        let d = def("x", "p", Direction::Up, 10.0, 5.0, 0.0);
        let one = summarize(&d, &[SeriesPoint::new("2023-01", 7.0)]);
        assert_eq!(one.trend, Trend::Flat);
        let none = summarize(&d, &[]);
        assert_eq!(none.latest_date, None);
        assert_eq!(none.latest, 0.0);
        assert_eq!(none.status, Status::Alert);
    }

    #[test]
    fn pillar_scores_average_and_skip_empty() {
        let defs = vec![
            def("a", "economy", Direction::Up, 10.0, 5.0, 0.0),
            def("b", "economy", Direction::Up, 10.0, 5.0, 0.0),
            def("c", "economy", Direction::Up, 10.0, 5.0, 0.0),
            def("d", "climate", Direction::Up, 10.0, 5.0, 0.0),
        ];
        let mut series = IndicatorSeries::new();
        series.insert("a".into(), vec![SeriesPoint::new("2023-01", 12.0)]);
        series.insert("b".into(), vec![SeriesPoint::new("2023-01", 6.0)]);
        series.insert("c".into(), vec![SeriesPoint::new("2023-01", 1.0)]);
        series.insert("d".into(), vec![]);
        let scores = pillar_scores(&defs, &series);
        assert_eq!(
            scores,
            vec![PillarScore {
                pillar: "economy".into(),
                score: 67
            }]
        );
    }
}

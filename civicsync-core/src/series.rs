//! Series merger: the point-append/replace primitive and the full-series
//! merge rule.
//!
//! Both functions are pure. Handlers build their partial updates from a
//! shared read-only view of the current series, so nothing here may mutate
//! its inputs.

use crate::domain::{IndicatorSeries, SeriesPoint};

/// Return a new point sequence for `id` with `(date, value)` applied.
///
/// If the existing sequence ends on `date`, that trailing point is replaced;
/// otherwise the point is appended. `series` is left untouched.
pub fn append_point(series: &IndicatorSeries, id: &str, date: &str, value: f64) -> Vec<SeriesPoint> {
    let mut points = series.get(id).cloned().unwrap_or_default();
    match points.last_mut() {
        Some(last) if last.date == date => last.value = value,
        _ => points.push(SeriesPoint::new(date, value)),
    }
    points
}

/// Return `current` with every key in `updates` replaced wholesale.
///
/// Points are never interleaved: an updated indicator takes exactly the
/// sequence the update carries.
pub fn merge_into_global(current: &IndicatorSeries, updates: &IndicatorSeries) -> IndicatorSeries {
    let mut merged = current.clone();
    for (id, points) in updates {
        merged.insert(id.clone(), points.clone());
    }
    merged
}

/// Dates ascending with no duplicates.
pub fn is_strictly_ascending(points: &[SeriesPoint]) -> bool {
    points.windows(2).all(|w| w[0].date < w[1].date)
}

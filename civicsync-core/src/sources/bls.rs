//! Bureau of Labor Statistics time series (LAUS / CES).
//!
//! Two configured series: the unemployment rate feeds `unemployment_rate`
//! with its latest monthly value; employment feeds `job_growth_proxy` as the
//! year-over-year percent change of the latest month.

use super::fields::{field_f64, field_text};
use super::http::{build_url, HttpFetcher, HttpOptions};
use super::{require, Cadence, SourceError, SourceHandler, SourceUpdate};
use crate::domain::IndicatorSeries;
use crate::series::append_point;
use crate::settings::Settings;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const KEY_SERIES_UNEMPLOYMENT: &str = "BLS_SERIES_UNEMPLOYMENT";
pub const KEY_SERIES_EMPLOYMENT: &str = "BLS_SERIES_EMPLOYMENT";
pub const KEY_API_KEY: &str = "BLS_API_KEY";
pub const KEY_START_YEAR: &str = "BLS_START_YEAR";
pub const KEY_END_YEAR: &str = "BLS_END_YEAR";
pub const KEY_BASE_URL: &str = "BLS_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.bls.gov";
const DATA_PATH: &str = "publicAPI/v2/timeseries/data/";

pub const UNEMPLOYMENT_RATE: &str = "unemployment_rate";
pub const JOB_GROWTH_PROXY: &str = "job_growth_proxy";

#[derive(Debug, Serialize)]
struct BlsRequest<'a> {
    seriesid: Vec<&'a str>,
    startyear: String,
    endyear: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    registrationkey: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BlsResponse {
    #[serde(rename = "Results")]
    results: Option<BlsResults>,
}

#[derive(Debug, Deserialize)]
struct BlsResults {
    #[serde(default)]
    series: Vec<BlsSeries>,
}

#[derive(Debug, Deserialize)]
struct BlsSeries {
    #[serde(rename = "seriesID")]
    series_id: String,
    /// Raw observations, `{"year":"2023","period":"M02","value":"4.3"}`.
    /// Kept loose so one malformed row drops only itself.
    #[serde(default)]
    data: Vec<Value>,
}

/// A parsed monthly observation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Monthly {
    year: i32,
    month: u32,
    value: f64,
}

impl Monthly {
    fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Monthly observations (`M01`..`M12`) sorted ascending. The annual average
/// `M13` and rows with missing or unparseable fields are dropped.
fn monthly(data: &[Value]) -> Vec<Monthly> {
    let mut out: Vec<Monthly> = data
        .iter()
        .filter_map(|obs| {
            let row = obs.as_object()?;
            let month: u32 = field_text(row, "period")?.strip_prefix('M')?.parse().ok()?;
            if !(1..=12).contains(&month) {
                return None;
            }
            Some(Monthly {
                year: field_text(row, "year")?.parse().ok()?,
                month,
                value: field_f64(row, "value")?,
            })
        })
        .collect();
    out.sort_by_key(|m| (m.year, m.month));
    out
}

/// Latest monthly value as `("YYYY-MM", value)`.
pub fn latest_monthly(data: &[Value]) -> Option<(String, f64)> {
    monthly(data).last().map(|m| (m.label(), m.value))
}

/// Year-over-year percent change of the latest month against the same month
/// one year earlier. A zero base is replaced by 1.
pub fn year_over_year(data: &[Value]) -> Option<(String, f64)> {
    let points = monthly(data);
    let latest = *points.last()?;
    let previous = points
        .iter()
        .find(|m| m.year == latest.year - 1 && m.month == latest.month)?;
    let base = if previous.value == 0.0 { 1.0 } else { previous.value };
    Some((latest.label(), (latest.value - previous.value) / base * 100.0))
}

pub struct LaborStatistics {
    http: HttpFetcher,
}

impl LaborStatistics {
    pub fn new(opts: &HttpOptions) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new("BLS", opts)?,
        })
    }
}

impl SourceHandler for LaborStatistics {
    fn id(&self) -> &str {
        "bls"
    }

    fn label(&self) -> &str {
        "BLS Employment"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Monthly
    }

    fn required_keys(&self) -> &[&'static str] {
        &[KEY_SERIES_UNEMPLOYMENT, KEY_SERIES_EMPLOYMENT]
    }

    fn fetch(&self, current: &IndicatorSeries, settings: &Settings) -> Result<SourceUpdate, SourceError> {
        let unemployment = require(settings, KEY_SERIES_UNEMPLOYMENT)?;
        let employment = require(settings, KEY_SERIES_EMPLOYMENT)?;

        let this_year = chrono::Local::now().year();
        let end_year = settings
            .parse::<i32>(KEY_END_YEAR)
            .map_err(|e| SourceError::InvalidConfig {
                key: KEY_END_YEAR.into(),
                reason: e.to_string(),
            })?
            .unwrap_or(this_year);
        let start_year = settings
            .parse::<i32>(KEY_START_YEAR)
            .map_err(|e| SourceError::InvalidConfig {
                key: KEY_START_YEAR.into(),
                reason: e.to_string(),
            })?
            .unwrap_or(end_year - 3);

        let request = BlsRequest {
            seriesid: vec![unemployment, employment],
            startyear: start_year.to_string(),
            endyear: end_year.to_string(),
            registrationkey: settings.get(KEY_API_KEY),
        };
        let url = build_url(settings.get_or(KEY_BASE_URL, DEFAULT_BASE_URL), DATA_PATH, &[])?;
        let response: BlsResponse = self.http.post_json(&url, &request)?;

        let series = response.results.map(|r| r.series).unwrap_or_default();
        if series.is_empty() {
            return Ok(SourceUpdate::empty("BLS returned no series data"));
        }

        let mut update = SourceUpdate::default();
        for s in &series {
            if s.series_id == unemployment {
                if let Some((date, value)) = latest_monthly(&s.data) {
                    update.insert(
                        UNEMPLOYMENT_RATE,
                        append_point(current, UNEMPLOYMENT_RATE, &date, value),
                    );
                }
            }
            if s.series_id == employment {
                if let Some((date, value)) = year_over_year(&s.data) {
                    update.insert(
                        JOB_GROWTH_PROXY,
                        append_point(current, JOB_GROWTH_PROXY, &date, value),
                    );
                }
            }
        }
        Ok(update.note(format!("BLS {start_year}-{end_year}")))
    }
}

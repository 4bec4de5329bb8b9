//! EPA Air Quality System: latest air-quality reading for a configured
//! endpoint (e.g. `dailyData/byCounty`).
//!
//! Field names differ between AQS services, so the value/date/year fields are
//! configurable. Rows are ordered by date (falling back to year) and the last
//! one wins.

use super::fields::{field_f64, field_text};
use super::http::{build_url, HttpFetcher, HttpOptions};
use super::{require, Cadence, SourceError, SourceHandler, SourceUpdate};
use crate::domain::IndicatorSeries;
use crate::series::append_point;
use crate::settings::Settings;
use chrono::Datelike;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const KEY_EMAIL: &str = "EPA_AQS_EMAIL";
pub const KEY_KEY: &str = "EPA_AQS_KEY";
pub const KEY_ENDPOINT: &str = "EPA_AQS_ENDPOINT";
pub const KEY_BASE_URL: &str = "EPA_AQS_BASE_URL";
pub const KEY_VALUE_FIELD: &str = "EPA_AQS_VALUE_FIELD";
pub const KEY_DATE_FIELD: &str = "EPA_AQS_DATE_FIELD";
pub const KEY_YEAR_FIELD: &str = "EPA_AQS_YEAR_FIELD";

/// Optional query filters passed through as-is: (settings key, query name).
const FILTERS: [(&str, &str); 5] = [
    ("EPA_AQS_PARAMETER", "param"),
    ("EPA_AQS_STATE", "state"),
    ("EPA_AQS_COUNTY", "county"),
    ("EPA_AQS_BDATE", "bdate"),
    ("EPA_AQS_EDATE", "edate"),
];

const DEFAULT_BASE_URL: &str = "https://aqs.epa.gov/data/api";

pub const AIR_QUALITY_INDEX: &str = "air_quality_index";

#[derive(Debug, Deserialize)]
struct AqsResponse {
    #[serde(rename = "Data", default)]
    data: Vec<Map<String, Value>>,
}

/// Field names used to read AQS rows.
#[derive(Debug, Clone)]
pub struct AqsFields {
    pub value: String,
    pub date: String,
    pub year: String,
}

impl AqsFields {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            value: settings.get_or(KEY_VALUE_FIELD, "aqi").to_string(),
            date: settings.get_or(KEY_DATE_FIELD, "date_local").to_string(),
            year: settings.get_or(KEY_YEAR_FIELD, "year").to_string(),
        }
    }
}

/// Latest `(date, value)` among `rows`, or `None` if it has no usable value.
///
/// The value falls back from the configured field to `aqi` and then
/// `arithmetic_mean`; the date falls back to the year field and finally the
/// current year.
pub fn latest_reading(rows: &[Map<String, Value>], fields: &AqsFields) -> Option<(String, f64)> {
    let sort_key = |row: &Map<String, Value>| {
        field_text(row, &fields.date)
            .or_else(|| field_text(row, &fields.year))
            .unwrap_or_default()
    };
    let latest = rows.iter().max_by_key(|row| sort_key(*row))?;

    let value = field_f64(latest, &fields.value)
        .or_else(|| field_f64(latest, "aqi"))
        .or_else(|| field_f64(latest, "arithmetic_mean"))?;
    let date = field_text(latest, &fields.date)
        .or_else(|| field_text(latest, &fields.year))
        .unwrap_or_else(|| chrono::Local::now().year().to_string());
    Some((date, value))
}

pub struct EpaAirQuality {
    http: HttpFetcher,
}

impl EpaAirQuality {
    pub fn new(opts: &HttpOptions) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new("EPA AQS", opts)?,
        })
    }
}

impl SourceHandler for EpaAirQuality {
    fn id(&self) -> &str {
        "epa_aqs"
    }

    fn label(&self) -> &str {
        "EPA AQS"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn required_keys(&self) -> &[&'static str] {
        &[KEY_EMAIL, KEY_KEY, KEY_ENDPOINT]
    }

    fn fetch(&self, current: &IndicatorSeries, settings: &Settings) -> Result<SourceUpdate, SourceError> {
        let email = require(settings, KEY_EMAIL)?;
        let key = require(settings, KEY_KEY)?;
        let endpoint = require(settings, KEY_ENDPOINT)?;

        let mut query = vec![("email", email), ("key", key)];
        for (setting, name) in FILTERS {
            if let Some(v) = settings.get(setting) {
                query.push((name, v));
            }
        }
        let url = build_url(settings.get_or(KEY_BASE_URL, DEFAULT_BASE_URL), endpoint, &query)?;
        let response: AqsResponse = self.http.get_json(&url, &[])?;

        if response.data.is_empty() {
            return Ok(SourceUpdate::empty("EPA AQS returned no rows"));
        }
        let fields = AqsFields::from_settings(settings);
        let Some((date, value)) = latest_reading(&response.data, &fields) else {
            return Ok(SourceUpdate::empty("EPA AQS value missing or invalid"));
        };

        let mut update = SourceUpdate::default();
        update.insert(
            AIR_QUALITY_INDEX,
            append_point(current, AIR_QUALITY_INDEX, &date, value),
        );
        Ok(update.note(format!("EPA AQS: {date}")))
    }
}

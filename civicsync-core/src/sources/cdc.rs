//! CDC PLACES (Socrata) pull: latest value of one health measure for one
//! location, e.g. the adult diabetes prevalence for Lowell, MA.
//!
//! Socrata datasets vary in column naming, so every field used in the SoQL
//! query is configurable.

use super::fields::{field_f64, field_text};
use super::http::{build_url, HttpFetcher, HttpOptions};
use super::{require, Cadence, SourceError, SourceHandler, SourceUpdate};
use crate::domain::IndicatorSeries;
use crate::series::append_point;
use crate::settings::Settings;
use chrono::Datelike;
use serde_json::{Map, Value};

pub const KEY_ENDPOINT: &str = "CDC_PLACES_ENDPOINT";
pub const KEY_MEASURE_ID: &str = "CDC_PLACES_MEASURE_ID";
pub const KEY_APP_TOKEN: &str = "CDC_PLACES_APP_TOKEN";
pub const KEY_LOCATION: &str = "CDC_PLACES_LOCATION";
pub const KEY_LOCATION_ID: &str = "CDC_PLACES_LOCATION_ID";
pub const KEY_STATE: &str = "CDC_PLACES_STATE";
pub const KEY_YEAR: &str = "CDC_PLACES_YEAR";

pub const HEALTH_DISPARITY: &str = "health_disparity";

/// Column names in the configured dataset.
#[derive(Debug, Clone)]
pub struct PlacesFields {
    pub location: String,
    pub location_id: String,
    pub state: String,
    pub year: String,
    pub measure: String,
    pub value: String,
}

impl PlacesFields {
    pub fn from_settings(settings: &Settings) -> Self {
        let field = |key: &str, default: &str| settings.get_or(key, default).to_string();
        Self {
            location: field("CDC_PLACES_FIELD_LOCATION", "locationname"),
            location_id: field("CDC_PLACES_FIELD_LOCATION_ID", "locationid"),
            state: field("CDC_PLACES_FIELD_STATE", "stateabbr"),
            year: field("CDC_PLACES_FIELD_YEAR", "year"),
            measure: field("CDC_PLACES_FIELD_MEASURE", "measureid"),
            value: field("CDC_PLACES_FIELD_VALUE", "data_value"),
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SoQL `$select`, `$where`, `$order` and `$limit` for the latest row.
pub fn soql_query(settings: &Settings, fields: &PlacesFields, measure: &str) -> Vec<(String, String)> {
    let mut filters = vec![format!("{}={}", fields.measure, quote(measure))];
    if let Some(id) = settings.get(KEY_LOCATION_ID) {
        filters.push(format!("{}={}", fields.location_id, quote(id)));
    } else {
        let location = settings.get_or(KEY_LOCATION, "Lowell");
        filters.push(format!("{}={}", fields.location, quote(location)));
    }
    filters.push(format!("{}={}", fields.state, quote(settings.get_or(KEY_STATE, "MA"))));
    if let Some(year) = settings.get(KEY_YEAR) {
        filters.push(format!("{}={}", fields.year, quote(year)));
    }

    let mut select: Vec<&str> = Vec::new();
    for f in [&fields.value, &fields.year, &fields.location, &fields.location_id, &fields.measure] {
        if !select.contains(&f.as_str()) {
            select.push(f);
        }
    }

    vec![
        ("$select".to_string(), select.join(",")),
        ("$where".to_string(), filters.join(" AND ")),
        ("$order".to_string(), format!("{} DESC", fields.year)),
        ("$limit".to_string(), "1".to_string()),
    ]
}

pub struct CdcPlaces {
    http: HttpFetcher,
}

impl CdcPlaces {
    pub fn new(opts: &HttpOptions) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new("CDC PLACES", opts)?,
        })
    }
}

impl SourceHandler for CdcPlaces {
    fn id(&self) -> &str {
        "cdc_places"
    }

    fn label(&self) -> &str {
        "CDC PLACES"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Annual
    }

    fn required_keys(&self) -> &[&'static str] {
        &[KEY_ENDPOINT, KEY_MEASURE_ID]
    }

    fn fetch(&self, current: &IndicatorSeries, settings: &Settings) -> Result<SourceUpdate, SourceError> {
        let endpoint = require(settings, KEY_ENDPOINT)?;
        let measure = require(settings, KEY_MEASURE_ID)?;
        let fields = PlacesFields::from_settings(settings);

        let query = soql_query(settings, &fields, measure);
        let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let url = build_url(endpoint, "", &pairs)?;
        let headers: Vec<(&str, &str)> = settings
            .get(KEY_APP_TOKEN)
            .map(|t| vec![("X-App-Token", t)])
            .unwrap_or_default();

        let rows: Vec<Map<String, Value>> = self.http.get_json(&url, &headers)?;
        let Some(row) = rows.first() else {
            return Ok(SourceUpdate::empty("CDC PLACES returned no rows"));
        };
        let Some(value) = field_f64(row, &fields.value) else {
            return Ok(SourceUpdate::empty("CDC PLACES value missing or invalid"));
        };
        let date = field_text(row, &fields.year)
            .unwrap_or_else(|| chrono::Local::now().year().to_string());
        let place = field_text(row, &fields.location)
            .unwrap_or_else(|| settings.get_or(KEY_LOCATION, "selected location").to_string());

        let mut update = SourceUpdate::default();
        update.insert(HEALTH_DISPARITY, append_point(current, HEALTH_DISPARITY, &date, value));
        Ok(update.note(format!("CDC PLACES: {place}")))
    }
}

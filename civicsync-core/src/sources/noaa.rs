//! NOAA NCEI daily climate summaries (GHCND) for one station.
//!
//! Derives two annual indicators: the number of days with a maximum
//! temperature at or above 32.2°C, and the percent anomaly of total
//! precipitation against the previous year. The API reports temperatures in
//! tenths of a degree and pages results with a 1-based offset.

use super::fields::as_f64;
use super::http::{build_url, HttpFetcher, HttpOptions};
use super::{require, Cadence, SourceError, SourceHandler, SourceUpdate};
use crate::domain::IndicatorSeries;
use crate::series::append_point;
use crate::settings::Settings;
use chrono::Datelike;
use serde::Deserialize;
use serde_json::Value;

pub const KEY_TOKEN: &str = "NOAA_TOKEN";
pub const KEY_STATION_ID: &str = "NOAA_STATION_ID";
pub const KEY_YEAR: &str = "NOAA_YEAR";
pub const KEY_BASE_URL: &str = "NOAA_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://www.ncei.noaa.gov/cdo-web/api/v2";
pub const PAGE_SIZE: usize = 1000;
const MAX_PAGES: usize = 50;

/// 90°F.
pub const EXTREME_HEAT_CELSIUS: f64 = 32.2;

pub const EXTREME_HEAT_DAYS: &str = "extreme_heat_days";
pub const PRECIPITATION_ANOMALY: &str = "precipitation_anomaly";

#[derive(Debug, Deserialize)]
struct DataPage {
    #[serde(default)]
    results: Vec<Value>,
}

/// Fetch pages until a short page signals the end.
///
/// `fetch_page` receives the 1-based offset of the page to fetch.
pub fn collect_pages<T, F>(page_size: usize, max_pages: usize, mut fetch_page: F) -> Result<Vec<T>, SourceError>
where
    F: FnMut(usize) -> Result<Vec<T>, SourceError>,
{
    let mut all = Vec::new();
    let mut offset = 1;
    for _ in 0..max_pages {
        let page = fetch_page(offset)?;
        let short = page.len() < page_size;
        all.extend(page);
        if short {
            return Ok(all);
        }
        offset += page_size;
    }
    Err(SourceError::ResponseFormatChanged(format!(
        "NOAA pagination did not finish within {max_pages} pages"
    )))
}

/// Days at or above the extreme-heat threshold, from tenths of °C.
pub fn extreme_heat_days(tmax_tenths: &[f64]) -> usize {
    tmax_tenths
        .iter()
        .filter(|v| **v / 10.0 >= EXTREME_HEAT_CELSIUS)
        .count()
}

/// Percent change of total precipitation versus the previous year.
/// A zero previous total is replaced by 1.
pub fn precipitation_anomaly(current: &[f64], previous: &[f64]) -> f64 {
    let total: f64 = current.iter().sum();
    let prev: f64 = previous.iter().sum();
    let base = if prev == 0.0 { 1.0 } else { prev };
    (total - prev) / base * 100.0
}

pub struct NoaaClimate {
    http: HttpFetcher,
}

impl NoaaClimate {
    pub fn new(opts: &HttpOptions) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new("NOAA", opts)?,
        })
    }

    fn daily_values(
        &self,
        base_url: &str,
        station: &str,
        token: &str,
        year: i32,
        datatype: &str,
    ) -> Result<Vec<f64>, SourceError> {
        let start = format!("{year}-01-01");
        let end = format!("{year}-12-31");
        let limit = PAGE_SIZE.to_string();

        let raw = collect_pages(PAGE_SIZE, MAX_PAGES, |offset| {
            let offset = offset.to_string();
            let url = build_url(
                base_url,
                "data",
                &[
                    ("datasetid", "GHCND"),
                    ("stationid", station),
                    ("datatypeid", datatype),
                    ("startdate", start.as_str()),
                    ("enddate", end.as_str()),
                    ("limit", limit.as_str()),
                    ("offset", offset.as_str()),
                ],
            )?;
            let page: DataPage = self.http.get_json(&url, &[("token", token)])?;
            Ok(page.results)
        })?;

        Ok(raw
            .iter()
            .filter_map(|item| item.get("value").and_then(as_f64))
            .collect())
    }
}

impl SourceHandler for NoaaClimate {
    fn id(&self) -> &str {
        "noaa_ncei"
    }

    fn label(&self) -> &str {
        "NOAA NCEI"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Monthly
    }

    fn required_keys(&self) -> &[&'static str] {
        &[KEY_TOKEN, KEY_STATION_ID]
    }

    fn fetch(&self, current: &IndicatorSeries, settings: &Settings) -> Result<SourceUpdate, SourceError> {
        let token = require(settings, KEY_TOKEN)?;
        let station = require(settings, KEY_STATION_ID)?;
        let base_url = settings.get_or(KEY_BASE_URL, DEFAULT_BASE_URL);
        let year = settings
            .parse::<i32>(KEY_YEAR)
            .map_err(|e| SourceError::InvalidConfig {
                key: KEY_YEAR.into(),
                reason: e.to_string(),
            })?
            .unwrap_or_else(|| chrono::Local::now().year() - 1);
        let period = year.to_string();

        let tmax = self.daily_values(base_url, station, token, year, "TMAX")?;
        let prcp = self.daily_values(base_url, station, token, year, "PRCP")?;
        let prcp_prev = self.daily_values(base_url, station, token, year - 1, "PRCP")?;

        // No TMAX rows is zero hot days; an empty previous year is a zero base.
        let days = extreme_heat_days(&tmax) as f64;
        let anomaly = precipitation_anomaly(&prcp, &prcp_prev);
        let mut update = SourceUpdate::default();
        update.insert(EXTREME_HEAT_DAYS, append_point(current, EXTREME_HEAT_DAYS, &period, days));
        update.insert(
            PRECIPITATION_ANOMALY,
            append_point(current, PRECIPITATION_ANOMALY, &period, anomaly),
        );
        Ok(update.note(format!("NOAA station {station} year {year}")))
    }
}

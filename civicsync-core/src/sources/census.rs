//! American Community Survey (5-year) pull for one place.
//!
//! The API answers with a header row followed by data rows, every cell a
//! string: `[["NAME","B25064_001E","B08303_001E","state","place"], [...]]`.

use super::fields::parse_number;
use super::http::{build_url, HttpFetcher, HttpOptions};
use super::{require, Cadence, SourceError, SourceHandler, SourceUpdate};
use crate::domain::IndicatorSeries;
use crate::series::append_point;
use crate::settings::Settings;

pub const KEY_API_KEY: &str = "CENSUS_API_KEY";
pub const KEY_PLACE_CODE: &str = "CENSUS_PLACE_CODE";
pub const KEY_YEAR: &str = "CENSUS_YEAR";
pub const KEY_STATE: &str = "CENSUS_STATE";
pub const KEY_BASE_URL: &str = "CENSUS_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.census.gov";
const DEFAULT_YEAR: &str = "2022";
/// Massachusetts.
const DEFAULT_STATE: &str = "25";

const VAR_MEDIAN_RENT: &str = "B25064_001E";
const VAR_COMMUTE: &str = "B08303_001E";

pub const MEDIAN_RENT: &str = "median_rent";
pub const COMMUTE_TIME: &str = "commute_time";

/// Values read from the first data row.
#[derive(Debug, Clone, PartialEq)]
pub struct AcsRow {
    pub name: Option<String>,
    pub median_rent: Option<f64>,
    pub commute_time: Option<f64>,
}

/// Locate columns by header name and read the first data row.
///
/// A response without a data row means the place was not found, which fails
/// the whole fetch. Individual unparseable cells only blank that value.
pub fn parse_acs_rows(rows: &[Vec<Option<String>>]) -> Result<AcsRow, SourceError> {
    let header = rows
        .first()
        .ok_or_else(|| SourceError::ResponseFormatChanged("empty Census response".into()))?;
    let data = rows
        .get(1)
        .ok_or_else(|| SourceError::ResponseFormatChanged("no Census data returned for place".into()))?;

    let column = |name: &str| header.iter().position(|h| h.as_deref() == Some(name));
    let cell = |name: &str| -> Option<&str> {
        column(name)
            .and_then(|i| data.get(i))
            .and_then(|v| v.as_deref())
    };

    Ok(AcsRow {
        name: cell("NAME").map(str::to_string),
        median_rent: cell(VAR_MEDIAN_RENT).and_then(parse_number),
        commute_time: cell(VAR_COMMUTE).and_then(parse_number),
    })
}

pub struct CensusAcs {
    http: HttpFetcher,
}

impl CensusAcs {
    pub fn new(opts: &HttpOptions) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new("Census", opts)?,
        })
    }
}

impl SourceHandler for CensusAcs {
    fn id(&self) -> &str {
        "census_acs"
    }

    fn label(&self) -> &str {
        "Census ACS"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Annual
    }

    fn required_keys(&self) -> &[&'static str] {
        &[KEY_API_KEY, KEY_PLACE_CODE]
    }

    fn fetch(&self, current: &IndicatorSeries, settings: &Settings) -> Result<SourceUpdate, SourceError> {
        let api_key = require(settings, KEY_API_KEY)?;
        let place = require(settings, KEY_PLACE_CODE)?;
        let year = settings.get_or(KEY_YEAR, DEFAULT_YEAR);
        let state = settings.get_or(KEY_STATE, DEFAULT_STATE);

        let variables = format!("NAME,{VAR_MEDIAN_RENT},{VAR_COMMUTE}");
        let place_filter = format!("place:{place}");
        let state_filter = format!("state:{state}");
        let url = build_url(
            settings.get_or(KEY_BASE_URL, DEFAULT_BASE_URL),
            &format!("data/{year}/acs/acs5"),
            &[
                ("get", variables.as_str()),
                ("for", place_filter.as_str()),
                ("in", state_filter.as_str()),
                ("key", api_key),
            ],
        )?;

        let rows: Vec<Vec<Option<String>>> = self.http.get_json(&url, &[])?;
        let row = parse_acs_rows(&rows)?;

        let mut update = SourceUpdate::default();
        if let Some(rent) = row.median_rent {
            update.insert(MEDIAN_RENT, append_point(current, MEDIAN_RENT, year, rent));
        }
        if let Some(commute) = row.commute_time {
            update.insert(COMMUTE_TIME, append_point(current, COMMUTE_TIME, year, commute));
        }
        Ok(update.note(format!(
            "Census: {}",
            row.name.as_deref().unwrap_or("unnamed place")
        )))
    }
}

//! Transit reliability from active service alerts on one route.
//!
//! The score is synthetic: 95 minus five points per active alert, floored at
//! 50, dated today.

use super::http::{build_url, HttpFetcher, HttpOptions};
use super::{Cadence, SourceError, SourceHandler, SourceUpdate};
use crate::domain::IndicatorSeries;
use crate::granularity::Granularity;
use crate::series::append_point;
use crate::settings::Settings;
use serde_json::Value;

pub const KEY_ROUTE_ID: &str = "MBTA_ROUTE_ID";
pub const KEY_API_KEY: &str = "MBTA_API_KEY";
pub const KEY_BASE_URL: &str = "MBTA_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api-v3.mbta.com";
const DEFAULT_ROUTE: &str = "CR-Lowell";

pub const TRANSIT_RELIABILITY: &str = "transit_reliability";

pub fn reliability_score(alert_count: usize) -> f64 {
    let penalty = 5.0 * alert_count as f64;
    (95.0 - penalty).max(50.0)
}

pub struct TransitAlerts {
    http: HttpFetcher,
}

impl TransitAlerts {
    pub fn new(opts: &HttpOptions) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new("MBTA", opts)?,
        })
    }
}

impl SourceHandler for TransitAlerts {
    fn id(&self) -> &str {
        "mbta"
    }

    fn label(&self) -> &str {
        "MBTA API"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Hourly
    }

    fn required_keys(&self) -> &[&'static str] {
        &[]
    }

    fn fetch(&self, current: &IndicatorSeries, settings: &Settings) -> Result<SourceUpdate, SourceError> {
        let route = settings.get_or(KEY_ROUTE_ID, DEFAULT_ROUTE);
        let url = build_url(
            settings.get_or(KEY_BASE_URL, DEFAULT_BASE_URL),
            "alerts",
            &[("filter[route]", route)],
        )?;
        let headers: Vec<(&str, &str)> = settings
            .get(KEY_API_KEY)
            .map(|key| vec![("x-api-key", key)])
            .unwrap_or_default();

        let body: Value = self.http.get_json(&url, &headers)?;
        let Some(alerts) = body.get("data").and_then(Value::as_array) else {
            return Ok(SourceUpdate::empty("MBTA response had no alert list"));
        };

        let today = Granularity::Daily.label_for(chrono::Local::now().date_naive());
        let score = reliability_score(alerts.len());
        let mut update = SourceUpdate::default();
        update.insert(
            TRANSIT_RELIABILITY,
            append_point(current, TRANSIT_RELIABILITY, &today, score),
        );
        Ok(update.note(format!("MBTA alerts={}", alerts.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_support::CannedServer;

    #[test]
    fn score_floors_at_fifty() {
        assert_eq!(reliability_score(0), 95.0);
        assert_eq!(reliability_score(3), 80.0);
        assert_eq!(reliability_score(9), 50.0);
        assert_eq!(reliability_score(40), 50.0);
    }

    #[test]
    fn fetch_counts_alerts_for_route() {
        let server = CannedServer::start(vec![(200, r#"{"data":[{"id":"1"},{"id":"2"}]}"#.into())]);
        let settings = Settings::from_pairs([
            (KEY_BASE_URL, server.base_url()),
            (KEY_API_KEY, "secret-key".to_string()),
        ]);
        let handler = TransitAlerts::new(&HttpOptions::default()).unwrap();
        let update = handler.fetch(&IndicatorSeries::new(), &settings).unwrap();

        let points = &update.updated_series[TRANSIT_RELIABILITY];
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 85.0);
        assert!(Granularity::Daily.accepts(&points[0].date));

        let requests = server.finish();
        assert!(requests[0].contains("filter%5Broute%5D=CR-Lowell"));
        assert!(requests[0].to_ascii_lowercase().contains("x-api-key: secret-key"));
    }

    #[test]
    fn missing_alert_list_skips_indicator() {
        let server = CannedServer::start(vec![(200, r#"{"errors":[]}"#.into())]);
        let settings = Settings::from_pairs([(KEY_BASE_URL, server.base_url())]);
        let handler = TransitAlerts::new(&HttpOptions::default()).unwrap();
        let update = handler.fetch(&IndicatorSeries::new(), &settings).unwrap();
        assert_eq!(update.touched(), 0);
        server.finish();
    }
}

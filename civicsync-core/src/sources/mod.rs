//! Source handlers: one self-contained adapter per external provider.
//!
//! A handler declares its identity, cadence and required configuration keys,
//! and turns the current series into a partial update. The orchestrator
//! knows nothing about providers beyond the [`SourceHandler`] trait.

pub mod bls;
pub mod cdc;
pub mod census;
pub mod circuit_breaker;
pub mod epa;
pub mod error;
pub mod fields;
pub mod http;
pub mod mbta;
pub mod noaa;

pub use bls::LaborStatistics;
pub use cdc::CdcPlaces;
pub use census::CensusAcs;
pub use circuit_breaker::CircuitBreaker;
pub use epa::EpaAirQuality;
pub use error::SourceError;
pub use http::{HttpFetcher, HttpOptions};
pub use mbta::TransitAlerts;
pub use noaa::NoaaClimate;

use crate::domain::{IndicatorSeries, SeriesPoint};
use crate::settings::Settings;
use std::fmt;

/// Declared refresh frequency of a provider. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Hourly,
    Daily,
    Monthly,
    Annual,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cadence::Hourly => "hourly",
            Cadence::Daily => "daily",
            Cadence::Monthly => "monthly",
            Cadence::Annual => "annual",
        };
        f.write_str(s)
    }
}

/// What a successful fetch returns: full replacement sequences for the
/// indicators the handler touched, plus free-text notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceUpdate {
    pub updated_series: IndicatorSeries,
    pub logs: Vec<String>,
}

impl SourceUpdate {
    /// An update that touches nothing, with one explanatory note.
    pub fn empty(note: impl Into<String>) -> Self {
        Self {
            updated_series: IndicatorSeries::new(),
            logs: vec![note.into()],
        }
    }

    pub fn insert(&mut self, id: &str, points: Vec<SeriesPoint>) {
        self.updated_series.insert(id.to_string(), points);
    }

    pub fn note(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn touched(&self) -> usize {
        self.updated_series.len()
    }
}

/// Adapter for one external provider.
pub trait SourceHandler: Send + Sync {
    /// Stable identifier (matches indicator `dataSourceIds`).
    fn id(&self) -> &str;

    /// Human-readable label used in refresh log lines.
    fn label(&self) -> &str;

    fn cadence(&self) -> Cadence;

    /// Configuration keys that must be present for the handler to run.
    fn required_keys(&self) -> &[&'static str];

    /// Build a partial update from a read-only view of the current series.
    ///
    /// Must not fail because one indicator's upstream field is missing or
    /// malformed; that indicator is left out of the update instead.
    fn fetch(&self, current: &IndicatorSeries, settings: &Settings) -> Result<SourceUpdate, SourceError>;
}

/// Value of a key the orchestrator already checked for, as an error if absent.
pub(crate) fn require<'a>(settings: &'a Settings, key: &str) -> Result<&'a str, SourceError> {
    settings
        .get(key)
        .ok_or_else(|| SourceError::MissingConfig(key.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal HTTP/1.1 server that replays canned responses in order.

    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::thread::JoinHandle;
    use std::time::Duration;

    pub struct CannedServer {
        addr: SocketAddr,
        handle: Option<JoinHandle<Vec<String>>>,
    }

    impl CannedServer {
        pub fn start(responses: Vec<(u16, String)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            let handle = std::thread::spawn(move || {
                let mut seen = Vec::new();
                for (status, body) in responses {
                    let Ok((mut stream, _)) = listener.accept() else {
                        break;
                    };
                    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
                    seen.push(read_request(&mut stream));
                    let response = format!(
                        "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes());
                    let _ = stream.flush();
                }
                seen
            });
            Self {
                addr,
                handle: Some(handle),
            }
        }

        pub fn base_url(&self) -> String {
            format!("http://{}", self.addr)
        }

        /// Wait for every canned response to be served; returns the raw requests.
        pub fn finish(mut self) -> Vec<String> {
            self.handle.take().unwrap().join().unwrap()
        }
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                let body_len = head
                    .lines()
                    .find_map(|line| {
                        let (k, v) = line.split_once(':')?;
                        if k.trim().eq_ignore_ascii_case("content-length") {
                            v.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

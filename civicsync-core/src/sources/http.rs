//! Blocking JSON fetcher shared by the source handlers.
//!
//! Every handler owns one fetcher, so each provider gets its own circuit
//! breaker. Requests carry a timeout; transient failures (connect/timeout,
//! 429, 5xx) are retried with exponential backoff, anything else fails the
//! fetch immediately.

use super::circuit_breaker::CircuitBreaker;
use super::error::SourceError;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Transport knobs applied to every handler's fetcher.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

pub struct HttpFetcher {
    provider: &'static str,
    client: Client,
    breaker: CircuitBreaker,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    pub fn new(provider: &'static str, opts: &HttpOptions) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(opts.timeout)
            .user_agent(concat!("civicsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;
        Ok(Self {
            provider,
            client,
            breaker: CircuitBreaker::for_provider(),
            max_retries: opts.max_retries,
            base_delay: opts.base_delay,
        })
    }

    pub fn provider(&self) -> &str {
        self.provider
    }

    /// GET `url` with optional headers and decode the JSON body.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &reqwest::Url,
        headers: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        self.send_with_retry(|| {
            let mut req = self.client.get(url.clone());
            for (name, value) in headers {
                req = req.header(*name, *value);
            }
            req
        })
    }

    /// POST a JSON body to `url` and decode the JSON response.
    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &reqwest::Url,
        body: &B,
    ) -> Result<T, SourceError> {
        self.send_with_retry(|| self.client.post(url.clone()).json(body))
    }

    fn send_with_retry<T, F>(&self, build: F) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(provider = self.provider, attempt, ?delay, "retrying request");
                std::thread::sleep(delay);
            }

            if !self.breaker.is_allowed() {
                return Err(SourceError::CircuitBreakerOpen {
                    provider: self.provider.to_string(),
                });
            }

            match self.send_once(&build) {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    self.breaker.record_failure();
                    tracing::warn!(provider = self.provider, attempt, error = %err, "transient fetch failure");
                    last_error = Some(err);
                }
                Err(err) => {
                    if matches!(err, SourceError::HttpStatus { .. }) {
                        self.breaker.record_failure();
                    }
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SourceError::NetworkUnreachable(format!("{}: retries exhausted", self.provider))
        }))
    }

    fn send_once<T, F>(&self, build: &F) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let resp = build()
            .send()
            .map_err(|e| SourceError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited {
                provider: self.provider.to_string(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                provider: self.provider.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json::<T>().map_err(|e| {
            SourceError::ResponseFormatChanged(format!("{} response: {e}", self.provider))
        })
    }
}

/// Parse `base` and append `path` plus query pairs.
pub fn build_url(base: &str, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Url, SourceError> {
    let path = path.trim_start_matches('/');
    let joined = if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    };
    let parsed = if query.is_empty() {
        reqwest::Url::parse(&joined)
    } else {
        reqwest::Url::parse_with_params(&joined, query)
    };
    parsed.map_err(|e| SourceError::InvalidConfig {
        key: "base url".into(),
        reason: format!("{joined}: {e}"),
    })
}

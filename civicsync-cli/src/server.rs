//! HTTP surface: the refresh trigger and read-only data endpoints.
//!
//! Handlers are async; the sync pipeline and repository reads are blocking
//! and run on `spawn_blocking`.

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use civicsync_core::summary::summarize_all;
use civicsync_runner::{Repository, SyncReport, SyncService};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// Something that can run one refresh.
pub trait Refresher: Send + Sync + 'static {
    fn refresh(&self) -> SyncReport;
}

impl Refresher for SyncService {
    fn refresh(&self) -> SyncReport {
        self.run()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub refresher: Arc<dyn Refresher>,
    pub repository: Arc<Repository>,
    /// Shared refresh secret. `None` refuses every refresh request.
    secret: Option<blake3::Hash>,
}

impl AppState {
    pub fn new(refresher: Arc<dyn Refresher>, repository: Arc<Repository>, secret: Option<&str>) -> Self {
        Self {
            refresher,
            repository,
            secret: secret.map(|s| blake3::hash(s.as_bytes())),
        }
    }

    /// `blake3::Hash` equality is constant-time.
    fn authorized(&self, presented: Option<&str>) -> bool {
        match (&self.secret, presented) {
            (Some(expected), Some(given)) => *expected == blake3::hash(given.as_bytes()),
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            ok: false,
            error: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    ok: bool,
    #[serde(flatten)]
    report: SyncReport,
}

#[derive(Debug, Serialize)]
struct DataEnvelope<T> {
    data: T,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/refresh", get(refresh).post(refresh))
        .route("/api/indicators", get(indicators))
        .route("/api/catalog", get(catalog))
        .route("/api/neighborhoods", get(neighborhoods))
        .route("/api/projects", get(projects))
        .route("/health", get(health))
        .layer(Extension(Arc::new(state)))
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tracing::instrument(level = "info", skip_all)]
async fn refresh(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<Json<RefreshResponse>, ApiError> {
    // An unparseable query string carries no usable secret.
    let presented = match &query {
        Ok(Query(query)) => query.secret.as_deref(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "malformed refresh query");
            None
        }
    };
    if !state.authorized(presented) {
        tracing::warn!("refresh refused");
        return Err(ApiError::Unauthorized);
    }
    let refresher = state.refresher.clone();
    let report = tokio::task::spawn_blocking(move || refresher.refresh()).await?;
    Ok(Json(RefreshResponse { ok: true, report }))
}

async fn indicators(Extension(state): Extension<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = state.repository.clone();
    let body = tokio::task::spawn_blocking(move || {
        let definitions = repo.definitions();
        let series = repo.indicator_series().value;
        let summaries = summarize_all(definitions, &series);
        serde_json::json!({
            "definitions": definitions,
            "series": series,
            "summaries": summaries,
        })
    })
    .await?;
    Ok(Json(body))
}

async fn catalog(Extension(state): Extension<Arc<AppState>>) -> Result<Response, ApiError> {
    let repo = state.repository.clone();
    let data = tokio::task::spawn_blocking(move || repo.catalog().value).await?;
    Ok(Json(DataEnvelope { data }).into_response())
}

async fn neighborhoods(Extension(state): Extension<Arc<AppState>>) -> Result<Response, ApiError> {
    let repo = state.repository.clone();
    let data = tokio::task::spawn_blocking(move || repo.neighborhoods().value).await?;
    Ok(Json(DataEnvelope { data }).into_response())
}

async fn projects(Extension(state): Extension<Arc<AppState>>) -> Result<Response, ApiError> {
    let repo = state.repository.clone();
    let data = tokio::task::spawn_blocking(move || repo.projects().value).await?;
    Ok(Json(DataEnvelope { data }).into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use civicsync_core::defaults::BundledDefaults;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct Counting {
        runs: AtomicUsize,
    }

    impl Refresher for Counting {
        fn refresh(&self) -> SyncReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            SyncReport {
                updated: vec!["unemployment_rate".into()],
                logs: vec!["BLS Employment: updated 1 indicators".into()],
                outcomes: Vec::new(),
                persisted: None,
                snapshot: None,
            }
        }
    }

    fn app(secret: Option<&str>) -> (Router, Arc<Counting>) {
        let counting = Arc::new(Counting {
            runs: AtomicUsize::new(0),
        });
        let defaults = Arc::new(BundledDefaults::load().unwrap());
        let repository = Arc::new(Repository::defaults_only(defaults));
        let state = AppState::new(counting.clone(), repository, secret);
        (router(state), counting)
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn wrong_secret_is_refused_without_refreshing() {
        let (app, counting) = app(Some("abc"));
        let (status, body) = call(app, Method::GET, "/api/refresh?secret=xyz").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({ "ok": false, "error": "Unauthorized" }));
        assert_eq!(counting.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_secret_is_refused() {
        let (app, counting) = app(Some("abc"));
        let (status, _) = call(app, Method::POST, "/api/refresh").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(counting.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_secret_is_refused_as_json() {
        let (app, counting) = app(Some("abc"));
        let (status, body) = call(app, Method::GET, "/api/refresh?secret=abc&secret=abc").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({ "ok": false, "error": "Unauthorized" }));
        assert_eq!(counting.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unset_secret_refuses_everything() {
        let (app, counting) = app(None);
        let (status, _) = call(app, Method::GET, "/api/refresh?secret=").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(counting.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn correct_secret_runs_once() {
        let (app, counting) = app(Some("abc"));
        let (status, body) = call(app, Method::POST, "/api/refresh?secret=abc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "ok": true,
                "updated": ["unemployment_rate"],
                "logs": ["BLS Employment: updated 1 indicators"],
            })
        );
        assert_eq!(counting.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn indicators_include_summaries() {
        let (app, _) = app(None);
        let (status, body) = call(app, Method::GET, "/api/indicators").await;
        assert_eq!(status, StatusCode::OK);
        let defs = body["definitions"].as_array().unwrap();
        assert_eq!(defs.len(), body["summaries"].as_array().unwrap().len());
        assert_eq!(body["series"]["unemployment_rate"][0]["date"], "2023-01");
    }

    #[tokio::test]
    async fn read_endpoints_wrap_data() {
        for uri in ["/api/catalog", "/api/neighborhoods", "/api/projects"] {
            let (app, _) = app(None);
            let (status, body) = call(app, Method::GET, uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert!(!body["data"].as_array().unwrap().is_empty(), "{uri}");
        }
    }
}

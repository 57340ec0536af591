//! HTTP server: shared state, router assembly and the listener loop.
//!
//! The JSON API lives under `/api`; `/health` and `/metrics` sit beside it.
//! Uploaded files are served from `/media` to logged-in users.

use crate::config::Config;
use crate::db::Database;
use crate::error::ErrorCode;
use crate::handlers::{self, CurrentUser};
use crate::security::LoginRateLimiter;
use crate::services::{LinkPreviewer, MediaStore};
use crate::telemetry::{RouteTimer, spans};
use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::Instrument;

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub login_limiter: Arc<LoginRateLimiter>,
    pub previewer: Arc<dyn LinkPreviewer>,
    pub media: MediaStore,
}

impl AppState {
    pub fn new(db: Database, config: Config, previewer: Arc<dyn LinkPreviewer>) -> Self {
        let login_limiter = Arc::new(LoginRateLimiter::new(&config.auth));
        let media = MediaStore::new(&config.media.upload_dir);
        Self {
            db,
            config: Arc::new(config),
            login_limiter,
            previewer,
            media,
        }
    }
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Times every matched route and counts error responses by code.
async fn track_route(matched: Option<MatchedPath>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = matched
        .as_ref()
        .map_or("unmatched", |m| m.as_str())
        .to_string();
    let timer = RouteTimer::new(format!("{method} {path}"));

    let response = next
        .run(request)
        .instrument(spans::request(method.as_str(), &path))
        .await;

    if let Some(ErrorCode(code)) = response.extensions().get::<ErrorCode>() {
        crate::metrics::record_route_error(timer.route(), code);
    }
    response
}

/// Uploads are private to forum members.
async fn require_session(_current: CurrentUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let max_upload = state.config.media.max_upload_bytes;
    let media = Router::new()
        .nest_service("/media", ServeDir::new(state.media.root()))
        .layer(middleware::from_fn_with_state(state.clone(), require_session));

    let mut app = handlers::routes()
        .route_layer(middleware::from_fn(track_route))
        .merge(media)
        .route("/health", get(health));

    if state.config.server.metrics {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(DefaultBodyLimit::max(max_upload))
        .with_state(state)
}

/// Bind the configured address and serve until the process is stopped.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.server.listen;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        server = %state.config.server.name,
        "HTTP server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Axum router construction.
//!
//! The public [`app`] sends every request, whatever its method or path,
//! to one handler: the HTTP method is never inspected, so `POST /a`
//! serves the same object as `GET /a`.  `HEAD` works because hyper drops
//! the body of HEAD responses.
//!
//! Since any path can be an object key, the `/metrics` and `/health`
//! endpoints are served by a separate [`admin_app`] on its own port.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ObservabilityConfig;
use crate::errors::ProxyError;
use crate::handlers::object::{get_object, route_key};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Build the public [`Router`] that maps request paths to object keys.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

/// Build the admin [`Router`] with the enabled observability endpoints.
pub fn admin_app(observability: &ObservabilityConfig) -> Router {
    let mut router = Router::new();
    if observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }
    router
}

/// Any method, any path -- derive the key and serve the object.
async fn handle_request(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let key = route_key(uri.path())?;
    get_object(state, key, &headers).await
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

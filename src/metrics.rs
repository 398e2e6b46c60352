//! Prometheus metrics for s3proxy.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` handler served on the admin listener.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "s3proxy_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
///
/// Measured until the response headers are ready; body streaming happens
/// afterwards.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "s3proxy_http_request_duration_seconds";

/// Object fetches by outcome (counter). Labels: outcome.
pub const FETCH_TOTAL: &str = "s3proxy_fetch_total";

/// Total bytes relayed to clients in response bodies (counter).
pub const BYTES_SENT_TOTAL: &str = "s3proxy_bytes_sent_total";

/// Relays aborted mid-transfer (counter). Labels: stage (read, write).
pub const RELAY_ABORTS_TOTAL: &str = "s3proxy_relay_aborts_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests).
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(FETCH_TOTAL, "Object fetches by outcome");
    describe_counter!(BYTES_SENT_TOTAL, "Total bytes sent (response bodies)");
    describe_counter!(RELAY_ABORTS_TOTAL, "Relays aborted mid-transfer");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to a route template for metric labels.
///
/// Every path other than the root names an object, so keys collapse into
/// a single `/{key}` label to keep cardinality bounded.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/" | "" => "/",
        _ => "/{key}",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

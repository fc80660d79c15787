//! Prometheus metrics for docsearch.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a middleware for HTTP RED metrics,
//! and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "docsearch_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "docsearch_http_request_duration_seconds";

/// Total List Blobs calls to the storage service (counter). Labels: outcome.
pub const UPSTREAM_REQUESTS_TOTAL: &str = "docsearch_upstream_requests_total";

/// Total retried upstream calls (counter). Labels: operation.
pub const UPSTREAM_RETRIES_TOTAL: &str = "docsearch_upstream_retries_total";

/// Number of matches returned per search (histogram).
pub const SEARCH_RESULTS: &str = "docsearch_search_results";

/// Total failed searches (counter). Labels: kind.
pub const SEARCH_ERRORS_TOTAL: &str = "docsearch_search_errors_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Idempotent, so tests may call it
/// repeatedly.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    let mut install_error = None;
    let handle = PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if let Err(e) = metrics::set_global_recorder(recorder) {
            install_error = Some(e.to_string());
        }
        handle
    });
    match install_error {
        Some(e) => Err(anyhow::anyhow!("failed to install Prometheus recorder: {}", e)),
        None => Ok(handle),
    }
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        UPSTREAM_REQUESTS_TOTAL,
        "Total List Blobs calls by outcome"
    );
    describe_counter!(UPSTREAM_RETRIES_TOTAL, "Total retried upstream calls");
    describe_histogram!(SEARCH_RESULTS, "Matches returned per search");
    describe_counter!(SEARCH_ERRORS_TOTAL, "Total failed searches by kind");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// `/metrics` itself is not instrumented.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

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

/// Map a request path to a fixed label so unknown paths cannot explode
/// label cardinality.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/api/search" => "/api/search",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/openapi.json" => "/openapi.json",
        _ => "/other",
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
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain")],
            "metrics disabled\n",
        )
            .into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_known_paths() {
        assert_eq!(normalize_path("/api/search"), "/api/search");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/openapi.json"), "/openapi.json");
    }

    #[test]
    fn test_normalize_unknown_paths() {
        assert_eq!(normalize_path("/"), "/other");
        assert_eq!(normalize_path("/api/search/extra"), "/other");
        assert_eq!(normalize_path("/ACC123-report.pdf"), "/other");
    }

    #[test]
    fn test_init_metrics_idempotent() {
        let first = init_metrics().unwrap() as *const PrometheusHandle;
        let second = init_metrics().unwrap() as *const PrometheusHandle;
        assert_eq!(first, second);
    }
}

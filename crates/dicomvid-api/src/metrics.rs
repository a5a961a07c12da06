//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "dicomvid_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "dicomvid_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "dicomvid_http_requests_in_flight";

    // Envelope metrics
    pub const INVOCATIONS_TOTAL: &str = "dicomvid_invocations_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an envelope invocation by kind (`ping`, `convert`, `invalid`).
pub fn record_invocation(kind: &'static str) {
    counter!(names::INVOCATIONS_TOTAL, "kind" => kind).increment(1);
}

/// Collapse unknown paths so scanners cannot inflate label cardinality.
fn sanitize_path(path: &str) -> String {
    match path {
        "/invoke" | "/health" | "/healthz" | "/metrics" => path.to_string(),
        _ => "other".to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/invoke"), "/invoke");
        assert_eq!(sanitize_path("/wp-admin/setup.php"), "other");
    }
}

//! HTTP middleware for request IDs and metrics.

use crate::core::logging::generate_request_id;
use crate::core::metrics::get_metrics;
use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Attach a unique request ID to each request and echo it in the
/// `x-request-id` response header.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = generate_request_id();
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Extension type carrying the request ID assigned by the middleware.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Track request count and duration per endpoint.
pub async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let endpoint = request.uri().path().to_string();
    let method = request.method().to_string();

    // Skip the metrics endpoint itself to avoid recursion
    if endpoint == "/metrics" {
        return next.run(request).await;
    }

    let metrics = get_metrics();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status_code = response.status().as_u16().to_string();

    metrics
        .request_count
        .with_label_values(&[&method, &endpoint, &status_code])
        .inc();
    metrics
        .request_duration
        .with_label_values(&[&method, &endpoint])
        .observe(duration);

    response
}

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::telemetry::instruments;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Record HTTP request count, duration and error metrics
///
/// The route label is the matched path template so label cardinality stays
/// bounded; unmatched requests are grouped under `unmatched`.
pub async fn track_http(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "http_request",
        %method,
        %route,
        request_id = %request_id,
        status = tracing::field::Empty,
    );
    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    span.record("status", status);
    let duration = started.elapsed();
    instruments::record_http_request(&method, &route, status, duration);
    if status >= 400 {
        instruments::record_http_error(&method, &route, status);
    }

    debug!(
        method = %method,
        route = %route,
        status,
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

//! Request size limits enforced ahead of the handler.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Approximate size of the request line and headers on the wire.
pub fn header_bytes(req: &Request) -> usize {
    let request_line = req.method().as_str().len() + req.uri().to_string().len() + 12;
    req.headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum::<usize>()
        + request_line
}

/// Reject requests whose headers exceed `limit` bytes with `431`.
pub async fn enforce_header_limit(State(limit): State<usize>, req: Request, next: Next) -> Response {
    let size = header_bytes(&req);
    if size > limit {
        tracing::debug!(size, limit, "Request headers too large");
        return StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE.into_response();
    }
    next.run(req).await
}

//! Per-request context: trace id and request span.
//!
//! When a trace header is configured, a caller-supplied UUID in that header is
//! reused, anything else is replaced by a fresh v4. The id is attached to the
//! request span, stored as a request extension and echoed in the response.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{field, Instrument};
use uuid::Uuid;

/// Trace id of the current request, available as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(pub Uuid);

#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_header: Option<HeaderName>,
    log_path: bool,
}

impl RequestContext {
    /// `None` when neither a trace header nor path logging is configured.
    pub fn new(trace_header: &str, log_path: bool) -> Option<Self> {
        let trace_header = if trace_header.is_empty() {
            None
        } else {
            match HeaderName::from_bytes(trace_header.as_bytes()) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(header = trace_header, error = %e, "Invalid trace id header, trace ids disabled");
                    None
                }
            }
        };

        if trace_header.is_none() && !log_path {
            return None;
        }
        Some(Self {
            trace_header,
            log_path,
        })
    }
}

/// Reuse the caller's id if it is a non-nil UUID, otherwise mint one.
pub fn trace_id_from(value: Option<&HeaderValue>) -> Uuid {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .filter(|id| !id.is_nil())
        .unwrap_or_else(Uuid::new_v4)
}

pub async fn request_context(
    State(ctx): State<RequestContext>,
    mut req: Request,
    next: Next,
) -> Response {
    let span = tracing::info_span!("request", trace_id = field::Empty, path = field::Empty);
    if ctx.log_path {
        span.record("path", req.uri().path());
    }

    let Some(header) = ctx.trace_header else {
        return next.run(req).instrument(span).await;
    };

    let id = trace_id_from(req.headers().get(&header));
    span.record("trace_id", field::display(id));
    req.extensions_mut().insert(TraceId(id));

    let mut res = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        res.headers_mut().insert(header, value);
    }
    res
}

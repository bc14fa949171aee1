//! Prometheus request metrics.
//!
//! Installed with `route_layer`, so only matched routes are measured and the
//! `path` label stays bounded to the route table.

use std::time::Instant;

use axum::{
    body::HttpBody,
    extract::{MatchedPath, Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};

use crate::config::MiddlewareConfig;
use crate::observability::metrics::{self, RequestLabels};

/// Which request measurements are recorded.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    service: String,
    count: bool,
    size: bool,
    time: bool,
}

impl RequestMetrics {
    /// `None` when every measurement is switched off.
    pub fn new(service: &str, config: &MiddlewareConfig) -> Option<Self> {
        if !config.prom_count && !config.prom_size && !config.prom_time {
            return None;
        }
        Some(Self {
            service: service.to_string(),
            count: config.prom_count,
            size: config.prom_size,
            time: config.prom_time,
        })
    }
}

pub async fn track_metrics(
    State(settings): State<RequestMetrics>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let res = next.run(req).await;

    let labels: RequestLabels = [
        ("service", settings.service.clone()),
        ("method", method),
        ("path", path),
        ("status", res.status().as_u16().to_string()),
    ];

    if settings.count {
        metrics::record_request_count(&labels);
    }
    if settings.time {
        metrics::record_request_duration(&labels, started.elapsed().as_secs_f64());
    }
    if settings.size {
        metrics::record_response_size(&labels, response_size(&res));
    }

    res
}

fn response_size(res: &Response) -> u64 {
    res.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| res.body().size_hint().exact())
        .unwrap_or(0)
}

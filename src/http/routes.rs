//! The API route table.
//!
//! ```text
//! GET /  /healthz  /readyz  /livez            no middleware
//! /v1/<service_name>
//!     /public/hello    GET, OPTIONS           request context, metrics
//!     /private/hello   GET, OPTIONS           request context, metrics, CORS
//! ```
//!
//! The service name in the path lets a load balancer in front of several
//! services route by prefix.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::get,
    Router,
};

use crate::config::{ServiceConfig, TelemetryMode};
use crate::http::middleware::{cors_layer, track_metrics, RequestMetrics};
use crate::http::request::{request_context, RequestContext};
use crate::http::response::{ApiError, Envelope, ErrorCode};
use crate::service::{HelloError, HelloInput, HelloMeta, HelloOutput, HelloService};
use crate::storage::StorageHandle;

pub const VERSION_PREFIX: &str = "/v1";

/// Build the API router for one generation.
pub fn api_router(config: &ServiceConfig, storage: StorageHandle) -> Router {
    let hello = HelloService::new(storage.counter());

    let health = Router::new()
        .route("/", get(ok))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(ok))
        .with_state(storage);

    let metrics = match config.telemetry.mode {
        TelemetryMode::Prometheus => RequestMetrics::new(&config.service_name, &config.middleware),
        TelemetryMode::Otel | TelemetryMode::None => None,
    };

    let public = endpoints(hello.clone(), metrics.clone());
    let mut private = endpoints(hello, metrics);
    if let Some(cors) = cors_layer(&config.middleware) {
        private = private.layer(cors);
    }

    let mut service = Router::new()
        .nest("/public", public)
        .nest("/private", private);
    if let Some(ctx) = RequestContext::new(
        &config.middleware.trace_id_header,
        config.middleware.log_path,
    ) {
        service = service.layer(from_fn_with_state(ctx, request_context));
    }

    health.nest(&service_prefix(&config.service_name), service)
}

/// `/v1/<service_name>`
pub fn service_prefix(service_name: &str) -> String {
    format!("{}/{}", VERSION_PREFIX, service_name)
}

fn endpoints(hello: HelloService, metrics: Option<RequestMetrics>) -> Router {
    let router = Router::new()
        .route("/hello", get(hello_handler).options(ok))
        .with_state(hello);

    match metrics {
        Some(settings) => router.route_layer(from_fn_with_state(settings, track_metrics)),
        None => router,
    }
}

async fn ok() -> StatusCode {
    StatusCode::OK
}

async fn healthz(State(storage): State<StorageHandle>) -> StatusCode {
    probe(&storage).await
}

async fn readyz(State(storage): State<StorageHandle>) -> StatusCode {
    probe(&storage).await
}

async fn probe(storage: &StorageHandle) -> StatusCode {
    if storage.healthy().await {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn hello_handler(
    State(service): State<HelloService>,
    query: Result<Query<HelloInput>, QueryRejection>,
) -> Result<Envelope<HelloOutput, HelloMeta>, ApiError> {
    let Query(input) = query.map_err(|e| {
        tracing::warn!(error = %e, "Cannot decode query parameters");
        ApiError::new(ErrorCode::MalformedRequest, "cannot unmarshal query parameters")
    })?;

    match service.hello(&input).await {
        Ok((data, meta)) => Ok(Envelope::ok(data, Some(meta))),
        Err(e) => {
            tracing::info!(error = %e, "Hello refused");
            Err(e.into())
        }
    }
}

impl From<HelloError> for ApiError {
    fn from(e: HelloError) -> Self {
        let code = match e {
            HelloError::MissingInput | HelloError::InputTooLong { .. } => ErrorCode::MalformedRequest,
            HelloError::Rude => ErrorCode::InvalidArgument,
            HelloError::VeryRude => ErrorCode::PermissionDenied,
        };
        ApiError::new(code, e.to_string())
    }
}

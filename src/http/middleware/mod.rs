//! Middleware applied to the versioned API routes.

pub mod cors;
pub mod metrics;

pub use cors::cors_layer;
pub use metrics::{track_metrics, RequestMetrics};

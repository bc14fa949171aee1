//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → tracing.rs (spans exported over OTLP)
//!
//! Consumers:
//!     → Log aggregation (stdout or stderr, text or JSON)
//!     → Metrics endpoint (Prometheus scrape on the telemetry listener)
//!     → OTLP collector (telemetry mode `otel`)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace ID flows through the request span
//! - Metrics are cheap (atomic increments)
//! - Exactly one telemetry mode runs per generation

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::OtelSlot;
pub use tracing::{OtelGuard, TelemetryError};

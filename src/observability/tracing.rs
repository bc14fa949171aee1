//! OpenTelemetry trace export.
//!
//! # Responsibilities
//! - Build the OTLP batch pipeline for one generation
//! - Plug its layer into the logging subscriber's reload slot
//! - Flush and unplug on shutdown
//!
//! # Design Decisions
//! - Parent-based ratio sampling, so upstream decisions are honoured
//! - Export failures never block request handling; the batch processor drops spans

use std::time::Duration;

use opentelemetry::{KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing_opentelemetry::OpenTelemetryLayer;

use super::logging::OtelSlot;
use crate::config::TelemetryConfig;

/// Errors raised while bringing telemetry up.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP pipeline: {0}")]
    Pipeline(#[from] opentelemetry::trace::TraceError),

    #[error("failed to attach tracing layer: {0}")]
    Reload(#[from] tracing_subscriber::reload::Error),

    #[error("tracer provider shutdown did not complete: {0}")]
    Flush(#[from] tokio::task::JoinError),
}

fn init_tracer(sink_url: &str, sampling_rate: f64, service_name: &str) -> Result<Tracer, TelemetryError> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    sampling_rate,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    Value::from(service_name.to_string()),
                )])),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(sink_url)
                .with_timeout(Duration::from_secs(3)),
        )
        .install_batch(runtime::Tokio)?;
    Ok(tracer)
}

/// A running OTLP pipeline.
pub struct OtelGuard {
    slot: Option<OtelSlot>,
}

impl std::fmt::Debug for OtelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelGuard")
            .field("attached", &self.slot.is_some())
            .finish()
    }
}

/// Start exporting spans to `config.otel_endpoint`.
///
/// Without a slot (logging initialised elsewhere) the pipeline still runs as
/// the global tracer provider, but no `tracing` spans reach it.
pub fn install(
    config: &TelemetryConfig,
    service_name: &str,
    slot: Option<&OtelSlot>,
) -> Result<OtelGuard, TelemetryError> {
    let tracer = init_tracer(&config.otel_endpoint, config.otel_sampling_rate, service_name)?;

    match slot {
        Some(slot) => slot.reload(Some(OpenTelemetryLayer::new(tracer)))?,
        None => tracing::warn!("No tracing slot available, spans will not be exported"),
    }

    tracing::info!(
        endpoint = %config.otel_endpoint,
        sampling_rate = config.otel_sampling_rate,
        "OpenTelemetry export started"
    );

    Ok(OtelGuard {
        slot: slot.cloned(),
    })
}

async fn flush(task: tokio::task::JoinHandle<()>) -> Result<(), TelemetryError> {
    task.await.map_err(|e| {
        tracing::error!(error = %e, "OpenTelemetry flush failed");
        TelemetryError::Flush(e)
    })
}

impl OtelGuard {
    /// Detach the layer and flush buffered spans.
    pub async fn shutdown(self) -> Result<(), TelemetryError> {
        if let Some(slot) = &self.slot {
            slot.reload(None)?;
        }
        // Flushing blocks on the exporter.
        flush(tokio::task::spawn_blocking(opentelemetry::global::shutdown_tracer_provider)).await?;
        tracing::info!("OpenTelemetry export stopped");
        Ok(())
    }
}

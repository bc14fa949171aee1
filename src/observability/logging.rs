//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber once per process
//! - Pick text or JSON output on stdout or stderr
//! - Leave a reloadable slot for the OpenTelemetry layer
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level when set
//! - The OpenTelemetry layer sits directly on the registry behind a
//!   `reload` handle, so telemetry can come and go with each generation
//!   without reinstalling the subscriber

use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::config::{LogFormat, LogTarget, LoggingConfig};

/// The OpenTelemetry layer as it sits on the registry.
pub type OtelLayer = OpenTelemetryLayer<Registry, opentelemetry_sdk::trace::Tracer>;

/// Handle used to install or remove the OpenTelemetry layer at runtime.
pub type OtelSlot = reload::Handle<Option<OtelLayer>, Registry>;

/// Build the level filter: `RUST_LOG` first, the configured level otherwise.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn writer(target: LogTarget) -> BoxMakeWriter {
    match target {
        LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<OtelSlot, TryInitError> {
    let (otel, slot) = reload::Layer::new(None::<OtelLayer>);

    let (json, text) = match config.format {
        LogFormat::Json => (
            Some(fmt::layer().json().with_writer(writer(config.target))),
            None,
        ),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(writer(config.target)))),
    };

    tracing_subscriber::registry()
        .with(otel)
        .with(env_filter(&config.level))
        .with(json)
        .with(text)
        .try_init()?;

    Ok(slot)
}

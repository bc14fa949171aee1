//! Lifecycle error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::ListenerError;
use crate::observability::TelemetryError;
use crate::storage::StorageError;

/// A step of `start` failed. Always fatal, never retried.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("failed to open storage: {0}")]
    StorageOpen(#[source] StorageError),

    #[error("failed to prepare storage: {0}")]
    StorageSetup(#[source] StorageError),

    #[error("listener '{name}' failed to start: {source}")]
    Listener {
        name: &'static str,
        #[source]
        source: ListenerError,
    },
}

/// Errors returned by [`Orchestrator::run`](super::Orchestrator::run).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// The signal hub went away while the service was running.
    #[error("lifecycle signal channel closed")]
    SignalsClosed,
}

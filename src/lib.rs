//! HTTP service skeleton with a reloadable lifecycle.
//!
//! The [`lifecycle::Orchestrator`] brings up one generation of resources
//! (telemetry, storage, API listener), tears it down in registration order and
//! restarts it on reload with freshly read configuration.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod service;
pub mod storage;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use lifecycle::{Orchestrator, SignalHub};
pub use storage::StorageHandle;

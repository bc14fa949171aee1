//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or in-memory value
//!     → loader.rs (parse & deserialize, defaults when the file is absent)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to one orchestrator generation
//!
//! On reload signal:
//!     orchestrator stops the running generation
//!     → ConfigSource::load reads the config again
//!     → the next generation starts from the fresh value
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{
    load_config, save_config, ConfigError, ConfigSource, FileConfigSource, StaticConfigSource,
};
pub use schema::{
    BackendKind, HttpConfig, LogFormat, LogTarget, LoggingConfig, MiddlewareConfig,
    ServiceConfig, ShutdownConfig, StorageConfig, TelemetryConfig, TelemetryMode,
};

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::ListenerSpec;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name of the service, used in the API path and metric labels.
    pub service_name: String,

    /// Public API listener.
    pub http: HttpConfig,

    /// Telemetry mode and the telemetry listener.
    pub telemetry: TelemetryConfig,

    /// Storage backend selection.
    pub storage: StorageConfig,

    /// Middleware toggles for the API router.
    pub middleware: MiddlewareConfig,

    /// Teardown settings.
    pub shutdown: ShutdownConfig,

    /// Logging settings. Only read once at process start.
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "my-service".to_string(),
            http: HttpConfig::default(),
            telemetry: TelemetryConfig::default(),
            storage: StorageConfig::default(),
            middleware: MiddlewareConfig::default(),
            shutdown: ShutdownConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Listener spec for the public API.
    pub fn api_listener(&self) -> ListenerSpec {
        self.http.listener_spec(&self.http.address, self.http.port)
    }

    /// Listener spec for the metrics exporter. Shares the API timeouts.
    pub fn telemetry_listener(&self) -> ListenerSpec {
        self.http
            .listener_spec(&self.telemetry.address, self.telemetry.port)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind to; empty binds all interfaces.
    pub address: String,

    pub port: u16,

    /// Time allowed to read a whole request.
    pub read_timeout_ms: u64,

    /// Time allowed to read the request headers.
    pub read_header_timeout_ms: u64,

    /// Time allowed to produce and write the response.
    pub write_timeout_ms: u64,

    /// How long an idle keep-alive connection is kept open.
    pub idle_timeout_ms: u64,

    /// Upper bound on the size of the request line plus headers.
    pub max_header_bytes: usize,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 3000,
            read_timeout_ms: 1_000,
            read_header_timeout_ms: 1_000,
            write_timeout_ms: 2_000,
            idle_timeout_ms: 30_000,
            max_header_bytes: 8 * 1024,
            max_connections: 10_000,
        }
    }
}

impl HttpConfig {
    fn listener_spec(&self, address: &str, port: u16) -> ListenerSpec {
        ListenerSpec {
            address: address.to_string(),
            port,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            read_header_timeout: Duration::from_millis(self.read_header_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            max_header_bytes: self.max_header_bytes,
            max_connections: self.max_connections,
        }
    }
}

/// Which telemetry subsystem to run next to the API.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    /// Prometheus exporter on its own listener.
    Prometheus,
    /// OTLP trace export.
    Otel,
    None,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,

    /// Metrics listener bind address; empty binds all interfaces.
    pub address: String,

    pub port: u16,

    /// OTLP gRPC collector endpoint.
    pub otel_endpoint: String,

    /// Fraction of root traces to sample (0.0 - 1.0).
    pub otel_sampling_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mode: TelemetryMode::Prometheus,
            address: String::new(),
            port: 9090,
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_sampling_rate: 1.0,
        }
    }
}

/// Storage backend identifier.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded RocksDB directory.
    #[serde(alias = "rocksdb")]
    Local,
    /// Networked Redis server.
    Redis,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,

    /// Directory for `local`, `host:port` or `redis://` URL for `redis`.
    pub address: String,

    /// Credential for `redis`; ignored by `local`.
    pub password: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            address: default_local_path().to_string_lossy().into_owned(),
            password: String::new(),
        }
    }
}

fn default_local_path() -> PathBuf {
    std::env::temp_dir().join("service-skeleton-rocksdb")
}

/// Middleware configuration for the API router.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Header carrying the trace id. Empty disables trace ids.
    pub trace_id_header: String,

    /// Add the request path to the request span.
    pub log_path: bool,

    /// Enable CORS on private routes.
    pub cors: bool,
    pub cors_origins: Vec<String>,
    pub cors_methods: Vec<String>,
    pub cors_headers: Vec<String>,

    /// Prometheus request counter.
    pub prom_count: bool,
    /// Prometheus response size histogram.
    pub prom_size: bool,
    /// Prometheus latency histogram.
    pub prom_time: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            trace_id_header: String::new(),
            log_path: false,
            cors: true,
            cors_origins: vec!["https://example.com".to_string()],
            cors_methods: ["GET", "POST", "PUT", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            cors_headers: Vec::new(),
            prom_count: true,
            prom_size: true,
            prom_time: true,
        }
    }
}

/// Teardown configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Deadline given to each shutdown action.
    pub action_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 500,
        }
    }
}

impl ShutdownConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Log output stream.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level (debug, info, warn, error). `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
    pub target: LogTarget,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            target: LogTarget::Stdout,
        }
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sampling rate in [0, 1])
//! - Check that CORS entries parse as header values and methods
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use axum::http::{HeaderName, HeaderValue, Method};

use crate::config::schema::{ServiceConfig, TelemetryMode};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service_name.is_empty() {
        errors.push(ValidationError::new("service_name", "must not be empty"));
    } else if config
        .service_name
        .chars()
        .any(|c| matches!(c, '/' | '{' | '}') || c.is_whitespace())
    {
        errors.push(ValidationError::new(
            "service_name",
            "must be a single path segment",
        ));
    }

    let http = &config.http;
    for (field, value) in [
        ("http.read_timeout_ms", http.read_timeout_ms),
        ("http.read_header_timeout_ms", http.read_header_timeout_ms),
        ("http.write_timeout_ms", http.write_timeout_ms),
        ("http.idle_timeout_ms", http.idle_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if http.max_header_bytes < 1024 {
        errors.push(ValidationError::new(
            "http.max_header_bytes",
            "must be at least 1024",
        ));
    }
    if http.max_connections == 0 {
        errors.push(ValidationError::new(
            "http.max_connections",
            "must be greater than 0",
        ));
    }

    let telemetry = &config.telemetry;
    if telemetry.mode == TelemetryMode::Otel && telemetry.otel_endpoint.is_empty() {
        errors.push(ValidationError::new(
            "telemetry.otel_endpoint",
            "required when mode is otel",
        ));
    }
    if !(0.0..=1.0).contains(&telemetry.otel_sampling_rate) {
        errors.push(ValidationError::new(
            "telemetry.otel_sampling_rate",
            "must be between 0.0 and 1.0",
        ));
    }

    if config.storage.address.is_empty() {
        errors.push(ValidationError::new("storage.address", "must not be empty"));
    }

    let middleware = &config.middleware;
    if !middleware.trace_id_header.is_empty()
        && HeaderName::from_bytes(middleware.trace_id_header.as_bytes()).is_err()
    {
        errors.push(ValidationError::new(
            "middleware.trace_id_header",
            format!("invalid header name '{}'", middleware.trace_id_header),
        ));
    }
    if middleware.cors {
        for origin in &middleware.cors_origins {
            if HeaderValue::from_str(origin).is_err() {
                errors.push(ValidationError::new(
                    "middleware.cors_origins",
                    format!("invalid origin '{}'", origin),
                ));
            }
        }
        for method in &middleware.cors_methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::new(
                    "middleware.cors_methods",
                    format!("invalid method '{}'", method),
                ));
            }
        }
        for header in &middleware.cors_headers {
            if HeaderName::from_bytes(header.as_bytes()).is_err() {
                errors.push(ValidationError::new(
                    "middleware.cors_headers",
                    format!("invalid header name '{}'", header),
                ));
            }
        }
    }

    if config.shutdown.action_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "shutdown.action_timeout_ms",
            "must be greater than 0",
        ));
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "logging.level",
            format!("unknown level '{}'", config.logging.level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

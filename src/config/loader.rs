//! Configuration loading from disk and configuration sources.
//!
//! The orchestrator never holds on to a config value across generations:
//! every start asks its [`ConfigSource`] for a fresh copy.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// A missing file is not an error: the defaults are validated and returned.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            ServiceConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Write a configuration to disk as TOML.
pub fn save_config(config: &ServiceConfig, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Something that can produce a validated configuration on demand.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<ServiceConfig, ConfigError>;
}

/// Reads a TOML file on every load.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<ServiceConfig, ConfigError> {
        load_config(&self.path)
    }
}

/// In-memory configuration that can be swapped between generations.
#[derive(Debug, Clone)]
pub struct StaticConfigSource {
    inner: Arc<RwLock<ServiceConfig>>,
}

impl StaticConfigSource {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the configuration returned by subsequent loads.
    pub fn set(&self, config: ServiceConfig) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = config;
    }

    /// Apply an in-place edit to the stored configuration.
    pub fn update(&self, f: impl FnOnce(&mut ServiceConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<ServiceConfig, ConfigError> {
        let config = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn save_then_load_preserves_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ServiceConfig::default();
        config.service_name = "greeter".to_string();
        config.http.port = 4000;
        save_config(&config, &path).unwrap();

        let loaded = FileConfigSource::new(&path).load().unwrap();
        assert_eq!(loaded.service_name, "greeter");
        assert_eq!(loaded.http.port, 4000);
    }

    #[test]
    fn invalid_file_reports_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "service_name = \"\"\n[http]\nread_timeout_ms = 0\n").unwrap();

        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[http\nport = 1").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn static_source_returns_latest_value() {
        let source = StaticConfigSource::new(ServiceConfig::default());
        source.update(|c| c.service_name = "second".to_string());
        assert_eq!(source.load().unwrap().service_name, "second");
    }
}

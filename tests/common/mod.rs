//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use service_skeleton::config::{BackendKind, StaticConfigSource, TelemetryMode};
use service_skeleton::{Orchestrator, ServiceConfig, SignalHub};
use tempfile::TempDir;

/// A local-backend configuration listening on ephemeral loopback ports.
pub fn test_config(dir: &TempDir) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.http.address = "127.0.0.1".to_string();
    config.http.port = 0;
    config.telemetry.mode = TelemetryMode::None;
    config.telemetry.address = "127.0.0.1".to_string();
    config.telemetry.port = 0;
    config.storage.backend = BackendKind::Local;
    config.storage.address = dir.path().join("db").to_string_lossy().into_owned();
    config.middleware.trace_id_header = "x-trace-id".to_string();
    config
}

/// A service under test with its own storage directory and signal hub.
pub struct TestService {
    pub dir: TempDir,
    pub source: StaticConfigSource,
    pub hub: SignalHub,
    pub orchestrator: Orchestrator,
}

impl TestService {
    pub fn new(edit: impl FnOnce(&mut ServiceConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        edit(&mut config);

        let source = StaticConfigSource::new(config);
        let hub = SignalHub::new();
        let orchestrator = Orchestrator::new(Arc::new(source.clone()), hub.clone());
        Self {
            dir,
            source,
            hub,
            orchestrator,
        }
    }

    pub async fn api_url(&self, path: &str) -> String {
        let addr = self.orchestrator.api_addr().await.expect("api listener running");
        url(addr, path)
    }

    pub async fn telemetry_url(&self, path: &str) -> String {
        let addr = self
            .orchestrator
            .telemetry_addr()
            .await
            .expect("telemetry listener running");
        url(addr, path)
    }
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

pub async fn get_json(url: &str) -> (u16, Value) {
    let res = client().get(url).send().await.unwrap();
    let status = res.status().as_u16();
    let body = res.json().await.unwrap();
    (status, body)
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

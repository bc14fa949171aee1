//! Service lifecycle state machine.
//!
//! # Responsibilities
//! - Bring a generation up: config, telemetry, storage, API listener
//! - Tear a generation down through its shutdown registry
//! - Restart on SIGHUP, exit on SIGTERM/SIGINT
//!
//! # Data Flow
//! ```text
//! start ── load config ── telemetry ── storage open + ensure_db ── API listener
//!             │                                                       │
//!             └─────────────── any failure: drain, cancel, idle ◀─────┘
//!
//! running ── Reload ──▶ watcher: stop + start under one lock
//!         └─ Terminate ──▶ run: stop, return
//! ```
//!
//! # Design Decisions
//! - One `tokio::sync::Mutex` guards phase, registry and the root token;
//!   start, stop, reload and the watcher all serialize on it
//! - Every generation gets a fresh root `CancellationToken`; cancelling it
//!   ends the watcher, the accept loops and the storage handle
//! - Startup failures are fatal and never retried
//! - A reload watcher hands its signal receiver to the next generation so
//!   signals sent during a reload are not lost

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::error::{LifecycleError, StartupError};
use super::shutdown::{BoxError, ShutdownAction, ShutdownErrors, ShutdownRegistry};
use super::signals::{LifecycleSignal, SignalHub};
use crate::config::{ConfigSource, ServiceConfig, TelemetryMode};
use crate::http::routes::api_router;
use crate::net::ListenerHandle;
use crate::observability::tracing as otel;
use crate::observability::{metrics, OtelSlot};
use crate::storage::StorageHandle;

/// Builds the API handler of a generation from its config and storage.
pub type RouterFactory = Arc<dyn Fn(&ServiceConfig, StorageHandle) -> Router + Send + Sync>;

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
}

struct State {
    /// Set by stop, cleared by a successful start.
    down: bool,
    phase: Phase,
    registry: ShutdownRegistry,
    root: Option<CancellationToken>,
    action_timeout: Duration,
    generation: u64,
    api_addr: Option<SocketAddr>,
    telemetry_addr: Option<SocketAddr>,
    storage: Option<StorageHandle>,
}

impl State {
    fn clear_generation(&mut self) {
        if let Some(root) = self.root.take() {
            root.cancel();
        }
        self.api_addr = None;
        self.telemetry_addr = None;
        self.storage = None;
    }
}

struct Inner {
    config: Arc<dyn ConfigSource>,
    hub: SignalHub,
    router_factory: RouterFactory,
    otel_slot: Option<OtelSlot>,
    state: Mutex<State>,
    phase_tx: watch::Sender<Phase>,
    fatal_tx: mpsc::UnboundedSender<StartupError>,
    fatal_rx: Mutex<mpsc::UnboundedReceiver<StartupError>>,
}

/// Configures an [`Orchestrator`] before it is shared.
pub struct OrchestratorBuilder {
    config: Arc<dyn ConfigSource>,
    hub: SignalHub,
    router_factory: RouterFactory,
    otel_slot: Option<OtelSlot>,
}

impl OrchestratorBuilder {
    /// Replace the default API router.
    pub fn router_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ServiceConfig, StorageHandle) -> Router + Send + Sync + 'static,
    {
        self.router_factory = Arc::new(factory);
        self
    }

    /// Slot the OpenTelemetry layer is attached to in `otel` mode.
    pub fn otel_slot(mut self, slot: OtelSlot) -> Self {
        self.otel_slot = Some(slot);
        self
    }

    pub fn build(self) -> Orchestrator {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        Orchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                hub: self.hub,
                router_factory: self.router_factory,
                otel_slot: self.otel_slot,
                state: Mutex::new(State {
                    down: true,
                    phase: Phase::Idle,
                    registry: ShutdownRegistry::new(),
                    root: None,
                    action_timeout: Duration::from_millis(500),
                    generation: 0,
                    api_addr: None,
                    telemetry_addr: None,
                    storage: None,
                }),
                phase_tx,
                fatal_tx,
                fatal_rx: Mutex::new(fatal_rx),
            }),
        }
    }
}

/// Coordinates startup, teardown and restart of the service.
///
/// Cheap to clone; clones drive the same state machine.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(config: Arc<dyn ConfigSource>, hub: SignalHub) -> Self {
        Self::builder(config, hub).build()
    }

    pub fn builder(config: Arc<dyn ConfigSource>, hub: SignalHub) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            hub,
            router_factory: Arc::new(api_router),
            otel_slot: None,
        }
    }

    /// Start, wait for a terminate signal or a fatal reload failure, stop.
    pub async fn run(&self) -> Result<(), LifecycleError> {
        let mut fatal = self.inner.fatal_rx.lock().await;
        let mut signals = self.inner.hub.subscribe();

        // Failed reloads nobody was running for belong to an earlier lifetime.
        while let Ok(stale) = fatal.try_recv() {
            tracing::warn!(error = %stale, "Discarding reload failure from before run");
        }

        self.start().await?;

        let outcome = loop {
            tokio::select! {
                event = signals.recv() => match event {
                    Ok(LifecycleSignal::Terminate) => {
                        tracing::info!("Terminate requested");
                        break Ok(());
                    }
                    // Reloads belong to the watcher of the running generation.
                    Ok(LifecycleSignal::Reload) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Lifecycle signals dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break Err(LifecycleError::SignalsClosed),
                },
                Some(err) = fatal.recv() => {
                    tracing::error!(error = %err, "Fatal error while reloading");
                    break Err(LifecycleError::Startup(err));
                }
            }
        };

        if let Err(errors) = self.stop().await {
            tracing::warn!(error = %errors, "Shutdown finished with errors");
        }
        tracing::info!("Service stopped");
        outcome
    }

    /// Bring the service up. A no-op while already running.
    pub async fn start(&self) -> Result<(), StartupError> {
        let mut state = self.inner.state.lock().await;
        self.start_locked(&mut state, None).await
    }

    /// Tear the running generation down. A no-op when already stopped.
    pub async fn stop(&self) -> Result<(), ShutdownErrors> {
        let mut state = self.inner.state.lock().await;
        self.stop_locked(&mut state).await
    }

    /// Stop then start under a single lock acquisition.
    pub async fn reload(&self) -> Result<(), StartupError> {
        let mut state = self.inner.state.lock().await;
        self.reload_locked(&mut state, None).await
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase_tx.borrow()
    }

    /// Observe phase changes without taking the lock.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase_tx.subscribe()
    }

    pub fn signals(&self) -> &SignalHub {
        &self.inner.hub
    }

    /// Bound address of the API listener of the running generation.
    pub async fn api_addr(&self) -> Option<SocketAddr> {
        self.inner.state.lock().await.api_addr
    }

    /// Bound address of the metrics listener, in `prometheus` mode.
    pub async fn telemetry_addr(&self) -> Option<SocketAddr> {
        self.inner.state.lock().await.telemetry_addr
    }

    /// Storage of the running generation.
    pub async fn storage(&self) -> Option<StorageHandle> {
        self.inner.state.lock().await.storage.clone()
    }

    /// Number of generations started so far.
    pub async fn generation(&self) -> u64 {
        self.inner.state.lock().await.generation
    }

    /// Names of the registered shutdown actions, in invocation order.
    pub async fn shutdown_actions(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state.registry.names().into_iter().map(String::from).collect()
    }

    fn set_phase(&self, state: &mut State, phase: Phase) {
        state.phase = phase;
        self.inner.phase_tx.send_replace(phase);
    }

    async fn start_locked(
        &self,
        state: &mut State,
        signals: Option<broadcast::Receiver<LifecycleSignal>>,
    ) -> Result<(), StartupError> {
        if state.phase == Phase::Running {
            tracing::info!("Service already running, start ignored");
            return Ok(());
        }

        self.set_phase(state, Phase::Starting);
        // Subscribe before anything runs so no signal slips past the watcher.
        let signals = signals.unwrap_or_else(|| self.inner.hub.subscribe());
        let root = CancellationToken::new();
        state.root = Some(root.clone());

        match self.bring_up(state, &root).await {
            Ok(()) => {
                state.down = false;
                state.generation += 1;
                self.set_phase(state, Phase::Running);
                metrics::record_lifecycle_event("start");
                tracing::info!(
                    generation = state.generation,
                    api_addr = ?state.api_addr,
                    telemetry_addr = ?state.telemetry_addr,
                    actions = ?state.registry.names(),
                    "Service started"
                );
                spawn_reload_watcher(self.clone(), root, signals);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Startup failed");
                if let Err(errors) = state.registry.drain(state.action_timeout).await {
                    tracing::warn!(error = %errors, "Cleanup after failed startup had errors");
                }
                state.clear_generation();
                self.set_phase(state, Phase::Idle);
                metrics::record_lifecycle_event("start_failed");
                Err(e)
            }
        }
    }

    /// Acquire every resource of a generation, registering its teardown.
    async fn bring_up(&self, state: &mut State, root: &CancellationToken) -> Result<(), StartupError> {
        let config = self.inner.config.load()?;
        state.action_timeout = config.shutdown.action_timeout();

        match config.telemetry.mode {
            TelemetryMode::Prometheus => {
                let router = metrics::exporter_router(metrics::exporter_handle());
                let listener =
                    ListenerHandle::start("telemetry", &config.telemetry_listener(), router, root)
                        .await
                        .map_err(|source| StartupError::Listener {
                            name: "telemetry",
                            source,
                        })?;
                state.telemetry_addr = Some(listener.local_addr());
                state.registry.register(ShutdownAction::new("telemetry", |_| async move {
                    listener.stop().await;
                    Ok::<(), BoxError>(())
                }));
            }
            TelemetryMode::Otel => {
                let guard = otel::install(
                    &config.telemetry,
                    &config.service_name,
                    self.inner.otel_slot.as_ref(),
                )?;
                state.registry.register(ShutdownAction::new("telemetry", |_| async move {
                    guard.shutdown().await.map_err(BoxError::from)
                }));
            }
            TelemetryMode::None => {
                tracing::debug!("Telemetry disabled");
            }
        }

        let storage = StorageHandle::open(&config.storage, root)
            .await
            .map_err(StartupError::StorageOpen)?;
        if let Err(e) = storage.ensure_db().await {
            close_quietly(&storage).await;
            return Err(StartupError::StorageSetup(e));
        }
        tracing::info!(backend = %storage.kind(), "Storage ready");

        let router = (self.inner.router_factory)(&config, storage.clone());
        let api = match ListenerHandle::start("api", &config.api_listener(), router, root).await {
            Ok(api) => api,
            Err(source) => {
                close_quietly(&storage).await;
                return Err(StartupError::Listener { name: "api", source });
            }
        };
        state.api_addr = Some(api.local_addr());

        // The API stops before its storage goes away.
        state.registry.register(ShutdownAction::new("api-http-server", |_| async move {
            api.stop().await;
            Ok::<(), BoxError>(())
        }));
        let closing = storage.clone();
        state.registry.register(ShutdownAction::new("storage", |_| async move {
            closing.close().await.map_err(BoxError::from)
        }));
        state.storage = Some(storage);

        Ok(())
    }

    async fn stop_locked(&self, state: &mut State) -> Result<(), ShutdownErrors> {
        if state.down {
            tracing::info!("Service already stopped, stop ignored");
            return Ok(());
        }
        state.down = true;

        self.set_phase(state, Phase::Stopping);
        tracing::info!(actions = state.registry.len(), "Stopping service");

        let result = state.registry.drain(state.action_timeout).await;
        state.clear_generation();

        self.set_phase(state, Phase::Idle);
        metrics::record_lifecycle_event("stop");
        result
    }

    async fn reload_locked(
        &self,
        state: &mut State,
        signals: Option<broadcast::Receiver<LifecycleSignal>>,
    ) -> Result<(), StartupError> {
        tracing::info!(generation = state.generation, "Reloading service");
        metrics::record_lifecycle_event("reload");

        if let Err(errors) = self.stop_locked(state).await {
            tracing::warn!(error = %errors, "Shutdown during reload had errors");
        }
        self.start_locked(state, signals).await
    }

    /// Reload on behalf of the watcher of the generation owning `root`.
    async fn reload_from(
        &self,
        root: &CancellationToken,
        signals: broadcast::Receiver<LifecycleSignal>,
    ) {
        let mut state = self.inner.state.lock().await;
        if root.is_cancelled() {
            tracing::debug!("Generation already stopped, reload skipped");
            return;
        }

        if let Err(e) = self.reload_locked(&mut state, Some(signals)).await {
            tracing::error!(error = %e, "Reload failed");
            let _ = self.inner.fatal_tx.send(e);
        }
    }
}

async fn close_quietly(storage: &StorageHandle) {
    if let Err(e) = storage.close().await {
        tracing::warn!(error = %e, "Failed to close storage after startup error");
    }
}

/// Watch for reload signals until the generation's root scope ends.
fn spawn_reload_watcher(
    orchestrator: Orchestrator,
    root: CancellationToken,
    mut signals: broadcast::Receiver<LifecycleSignal>,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = root.cancelled() => return,
                event = signals.recv() => event,
            };

            match event {
                Ok(LifecycleSignal::Reload) => {
                    orchestrator.reload_from(&root, signals).await;
                    return;
                }
                Ok(LifecycleSignal::Terminate) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Reload watcher dropped signals");
                    continue;
                }
                Err(RecvError::Closed) => return,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, StaticConfigSource};
    use crate::storage::Counter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config(dir: &tempfile::TempDir) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.http.address = "127.0.0.1".to_string();
        config.http.port = 0;
        config.telemetry.mode = TelemetryMode::None;
        config.storage.backend = BackendKind::Local;
        config.storage.address = dir.path().join("db").to_string_lossy().into_owned();
        config
    }

    fn orchestrator(config: ServiceConfig) -> (Orchestrator, StaticConfigSource) {
        let source = StaticConfigSource::new(config);
        let orchestrator = Orchestrator::new(Arc::new(source.clone()), SignalHub::new());
        (orchestrator, source)
    }

    #[tokio::test]
    async fn start_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));

        orch.start().await.unwrap();
        let addr = orch.api_addr().await;
        let actions = orch.shutdown_actions().await;

        orch.start().await.unwrap();
        assert_eq!(orch.api_addr().await, addr);
        assert_eq!(orch.shutdown_actions().await, actions);
        assert_eq!(orch.generation().await, 1);
        assert_eq!(orch.phase(), Phase::Running);

        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn api_stops_before_storage() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));

        orch.start().await.unwrap();
        assert_eq!(orch.shutdown_actions().await, vec!["api-http-server", "storage"]);
        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_twice_runs_actions_once() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));
        orch.start().await.unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        {
            let runs = Arc::clone(&runs);
            let mut state = orch.inner.state.lock().await;
            state.registry.register(ShutdownAction::new("count", move |_| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }));
        }

        orch.stop().await.unwrap();
        orch.stop().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(orch.api_addr().await.is_none());
    }

    #[tokio::test]
    async fn stop_before_start_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));
        orch.stop().await.unwrap();
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));

        orch.start().await.unwrap();
        let storage = orch.storage().await.unwrap();
        assert_eq!(storage.counter().inc_global().await.unwrap(), 1);
        orch.stop().await.unwrap();

        orch.start().await.unwrap();
        assert_eq!(orch.generation().await, 2);
        // The lease tail was released on close, so numbering continues.
        let storage = orch.storage().await.unwrap();
        assert_eq!(storage.counter().inc_global().await.unwrap(), 2);
        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.http.read_timeout_ms = 0;
        let (orch, _) = orchestrator(config);

        let err = orch.start().await.unwrap_err();
        assert!(matches!(err, StartupError::Config(_)));
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn storage_failure_leaves_orchestrator_idle() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let mut config = test_config(&dir);
        config.storage.address = blocker.join("db").to_string_lossy().into_owned();
        let (orch, _) = orchestrator(config);

        let err = orch.start().await.unwrap_err();
        assert!(matches!(err, StartupError::StorageOpen(_)));
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(orch.shutdown_actions().await.is_empty());
        assert!(orch.api_addr().await.is_none());
    }

    #[tokio::test]
    async fn port_conflict_fails_start_and_releases_storage() {
        let dir = tempfile::tempdir().unwrap();
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut config = test_config(&dir);
        config.http.port = taken.local_addr().unwrap().port();
        let (orch, source) = orchestrator(config);

        let err = orch.start().await.unwrap_err();
        assert!(matches!(err, StartupError::Listener { name: "api", .. }));
        assert_eq!(orch.phase(), Phase::Idle);

        // The database lock was released, so a corrected config starts.
        source.update(|c| c.http.port = 0);
        orch.start().await.unwrap();
        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn reload_picks_up_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticConfigSource::new(test_config(&dir));
        let built = Arc::new(std::sync::Mutex::new(Vec::new()));

        let seen = Arc::clone(&built);
        let orch = Orchestrator::builder(Arc::new(source.clone()), SignalHub::new())
            .router_factory(move |config, storage| {
                seen.lock().unwrap().push(config.service_name.clone());
                api_router(config, storage)
            })
            .build();

        orch.start().await.unwrap();
        source.update(|c| c.service_name = "renamed".to_string());
        orch.reload().await.unwrap();

        assert_eq!(*built.lock().unwrap(), vec!["my-service", "renamed"]);
        assert_eq!(orch.generation().await, 2);
        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn reload_signal_restarts_generation() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));
        orch.start().await.unwrap();

        let mut phases = orch.subscribe_phase();
        orch.signals().reload();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                phases.changed().await.unwrap();
                if *phases.borrow() == Phase::Running {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(orch.generation().await, 2);

        // The new generation's watcher still listens.
        orch.signals().reload();
        tokio::time::timeout(Duration::from_secs(5), async {
            while orch.generation().await < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn run_returns_after_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));

        let runner = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run().await })
        };

        let mut phases = orch.subscribe_phase();
        tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p == Phase::Running))
            .await
            .unwrap()
            .unwrap();

        orch.signals().terminate();
        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn failed_reload_is_fatal_for_run() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, source) = orchestrator(test_config(&dir));

        let runner = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run().await })
        };
        let mut phases = orch.subscribe_phase();
        tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p == Phase::Running))
            .await
            .unwrap()
            .unwrap();

        source.update(|c| c.service_name.clear());
        orch.signals().reload();

        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(LifecycleError::Startup(StartupError::Config(_)))
        ));
    }

    #[tokio::test]
    async fn reload_failure_without_run_does_not_end_later_run() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, source) = orchestrator(test_config(&dir));
        orch.start().await.unwrap();

        source.update(|c| c.service_name.clear());
        orch.signals().reload();
        let mut phases = orch.subscribe_phase();
        tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p != Phase::Running))
            .await
            .unwrap()
            .unwrap();
        // Waits for the reload holding the lock to finish.
        orch.generation().await;
        assert_eq!(orch.phase(), Phase::Idle);

        source.update(|c| c.service_name = "my-service".to_string());
        let runner = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run().await })
        };
        tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p == Phase::Running))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!runner.is_finished());
        assert_eq!(orch.phase(), Phase::Running);

        orch.signals().terminate();
        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn terminate_right_after_reload_ends_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(test_config(&dir));

        let runner = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run().await })
        };
        let mut phases = orch.subscribe_phase();
        tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p == Phase::Running))
            .await
            .unwrap()
            .unwrap();
        let addr = orch.api_addr().await.unwrap();

        orch.signals().reload();
        orch.signals().terminate();

        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());

        // A reload that lost the race skips; one that won is torn down by stop.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(orch.api_addr().await.is_none());
        assert!(orch.shutdown_actions().await.is_empty());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}

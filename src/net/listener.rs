//! TCP listener lifecycle with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Apply request timeouts and the header size limit
//! - Stop gracefully: no new connections, in-flight requests finish
//!
//! # Data Flow
//! ```text
//! ListenerHandle::start
//!     → TcpListener::bind
//!     → spawn accept loop ──▶ acquire permit ──▶ accept ──▶ spawn connection task
//!                                                           (hyper auto builder)
//! ListenerHandle::stop
//!     → cancel token (accept loop exits, listener socket closed)
//!     → every connection: graceful_shutdown
//!     → wait for the tracker to drain
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, Router};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::connection::{Activity, ConnectionGuard, ConnectionTracker};
use super::limits::enforce_header_limit;

/// Everything needed to run one network endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerSpec {
    /// Host or IP to bind; empty binds all interfaces.
    pub address: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    pub read_timeout: Duration,
    pub read_header_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_connections: usize,
}

impl ListenerSpec {
    fn host(&self) -> &str {
        if self.address.is_empty() {
            "0.0.0.0"
        } else {
            &self.address
        }
    }

    /// `host:port` as configured.
    pub fn display_addr(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }
}

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Per-connection timings taken from the spec.
#[derive(Debug, Clone, Copy)]
struct ConnectionTimeouts {
    read_header: Duration,
    idle: Duration,
}

/// A running listener.
#[derive(Debug)]
pub struct ListenerHandle {
    name: String,
    local_addr: SocketAddr,
    token: CancellationToken,
    accept_task: JoinHandle<()>,
    tracker: ConnectionTracker,
}

impl ListenerHandle {
    /// Bind `spec` and start serving `router` on it.
    ///
    /// The listener stops on its own when `parent` is cancelled; `stop` also
    /// waits for open connections to finish.
    pub async fn start(
        name: impl Into<String>,
        spec: &ListenerSpec,
        router: Router,
        parent: &CancellationToken,
    ) -> Result<Self, ListenerError> {
        let name = name.into();
        let bind_err = |source| ListenerError::Bind {
            address: spec.display_addr(),
            source,
        };

        let listener = TcpListener::bind((spec.host(), spec.port))
            .await
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        tracing::info!(
            listener = %name,
            address = %local_addr,
            max_connections = spec.max_connections,
            "Listener bound"
        );

        let app = router
            .layer(middleware::from_fn_with_state(
                spec.max_header_bytes,
                enforce_header_limit,
            ))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                spec.read_timeout + spec.write_timeout,
            ))
            .layer(TraceLayer::new_for_http());

        let token = parent.child_token();
        let tracker = ConnectionTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            name.clone(),
            listener,
            app,
            Arc::new(Semaphore::new(spec.max_connections)),
            ConnectionTimeouts {
                read_header: spec.read_header_timeout,
                idle: spec.idle_timeout,
            },
            tracker.clone(),
            token.clone(),
        ));

        Ok(Self {
            name,
            local_addr,
            token,
            accept_task,
            tracker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The address actually bound, with the real port when 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of open connections.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Stop accepting, let in-flight requests finish, wait for every
    /// connection to close.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.accept_task.await {
            tracing::warn!(listener = %self.name, error = %e, "Accept loop ended abnormally");
        }

        let open = self.tracker.active_count();
        if open > 0 {
            tracing::debug!(listener = %self.name, open, "Waiting for connections to drain");
        }
        self.tracker.wait_for_drain().await;

        tracing::info!(listener = %self.name, address = %self.local_addr, "Listener stopped");
    }
}

async fn accept_loop(
    name: String,
    listener: TcpListener,
    app: Router,
    limit: Arc<Semaphore>,
    timeouts: ConnectionTimeouts,
    tracker: ConnectionTracker,
    token: CancellationToken,
) {
    loop {
        // Acquire permit first (backpressure)
        let permit = tokio::select! {
            _ = token.cancelled() => break,
            permit = Arc::clone(&limit).acquire_owned() => match permit {
                Ok(permit) => ConnectionPermit { _permit: permit },
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(listener = %name, error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
        };

        tracing::debug!(
            listener = %name,
            peer_addr = %peer,
            available_permits = limit.available_permits(),
            "Connection accepted"
        );

        tokio::spawn(serve_connection(
            stream,
            app.clone(),
            timeouts,
            token.clone(),
            tracker.track(),
            permit,
        ));
    }

    tracing::debug!(listener = %name, "Accept loop exited");
}

async fn serve_connection(
    stream: TcpStream,
    app: Router,
    timeouts: ConnectionTimeouts,
    shutdown: CancellationToken,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
) {
    let activity = Activity::new();
    let service = {
        let activity = activity.clone();
        service_fn(move |req: hyper::Request<Incoming>| {
            let request = activity.begin();
            let app = app.clone();
            async move {
                let res = app.oneshot(req).await;
                drop(request);
                res
            }
        })
    };

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read_header);
    builder.http2().timer(TokioTimer::new());

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    tracing::debug!(connection_id = %guard.id(), error = %e, "Connection error");
                }
                break;
            }
            _ = shutdown.cancelled(), if !draining => {
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
            _ = activity.idle(timeouts.idle), if !draining => {
                tracing::trace!(connection_id = %guard.id(), "Closing idle connection");
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
        }
    }
}

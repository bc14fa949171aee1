//! Ordered teardown of a running generation.
//!
//! # Responsibilities
//! - Keep the teardown actions of one generation in registration order
//! - Run each action under its own deadline
//! - Report every failure without skipping later actions
//!
//! # Design Decisions
//! - Each action runs in its own task so a timeout can abort it
//! - Draining empties the registry; a second drain does nothing

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

/// Error returned by a teardown action.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The future a teardown action resolves to.
pub type TeardownFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

type Teardown = Box<dyn FnOnce(Instant) -> TeardownFuture + Send>;

/// A named teardown step, given the instant by which it must be done.
pub struct ShutdownAction {
    name: String,
    teardown: Teardown,
}

impl ShutdownAction {
    pub fn new<F, Fut>(name: impl Into<String>, teardown: F) -> Self
    where
        F: FnOnce(Instant) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            teardown: Box::new(move |deadline| Box::pin(teardown(deadline))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ShutdownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownAction")
            .field("name", &self.name)
            .finish()
    }
}

/// Why a single action did not complete cleanly.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("shutdown action '{name}' failed: {reason}")]
    Failed { name: String, reason: String },

    #[error("shutdown action '{name}' timed out after {timeout:?}")]
    TimedOut { name: String, timeout: Duration },
}

impl ShutdownError {
    pub fn action(&self) -> &str {
        match self {
            ShutdownError::Failed { name, .. } | ShutdownError::TimedOut { name, .. } => name,
        }
    }
}

/// Every action failure of one drain, in invocation order.
#[derive(Debug, Error)]
#[error("{}", join(.0))]
pub struct ShutdownErrors(pub Vec<ShutdownError>);

fn join(errors: &[ShutdownError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ShutdownErrors {
    pub fn errors(&self) -> &[ShutdownError] {
        &self.0
    }
}

/// Ordered list of teardown actions.
#[derive(Debug, Default)]
pub struct ShutdownRegistry {
    actions: Vec<ShutdownAction>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action; it runs after every action registered before it.
    pub fn register(&mut self, action: ShutdownAction) {
        tracing::debug!(action = %action.name, position = self.actions.len(), "Shutdown action registered");
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(ShutdownAction::name).collect()
    }

    /// Run every action in order, each bounded by `per_action`.
    pub async fn drain(&mut self, per_action: Duration) -> Result<(), ShutdownErrors> {
        let mut errors = Vec::new();

        for action in std::mem::take(&mut self.actions) {
            let ShutdownAction { name, teardown } = action;
            let started = Instant::now();
            let mut task = tokio::spawn(teardown(started + per_action));

            let outcome = match tokio::time::timeout(per_action, &mut task).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(ShutdownError::Failed {
                    name: name.clone(),
                    reason: e.to_string(),
                }),
                Ok(Err(join)) => Err(ShutdownError::Failed {
                    name: name.clone(),
                    reason: join.to_string(),
                }),
                Err(_) => {
                    task.abort();
                    Err(ShutdownError::TimedOut {
                        name: name.clone(),
                        timeout: per_action,
                    })
                }
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(
                        action = %name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Shutdown action completed"
                    );
                    metrics::record_shutdown_action(&name, "ok");
                }
                Err(e) => {
                    tracing::error!(action = %name, error = %e, "Shutdown action failed");
                    let label = match e {
                        ShutdownError::Failed { .. } => "failed",
                        ShutdownError::TimedOut { .. } => "timeout",
                    };
                    metrics::record_shutdown_action(&name, label);
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ShutdownErrors(errors))
        }
    }
}

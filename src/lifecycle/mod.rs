//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     Load config → Telemetry → Open + verify storage → Start API listener
//!
//! Shutdown (shutdown.rs):
//!     Stop → Drain registry in order (telemetry, API, storage) → Idle
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Terminate: stop and exit
//!     SIGHUP → Reload: stop, re-read config, start
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then storage, then listeners
//! - Ordered shutdown: stop accepting, drain, close storage
//! - Every shutdown action has its own timeout

pub mod error;
pub mod orchestrator;
pub mod shutdown;
pub mod signals;

pub use error::{LifecycleError, StartupError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, Phase, RouterFactory};
pub use shutdown::{BoxError, ShutdownAction, ShutdownError, ShutdownErrors, ShutdownRegistry};
pub use signals::{LifecycleSignal, SignalHub};

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, idle detection)
//!     → limits.rs (header size check)
//!     → Hand off to the axum router
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - A listener knows nothing about routes; it serves whatever router it is given

pub mod connection;
pub mod limits;
pub mod listener;

pub use listener::{ListenerError, ListenerHandle, ListenerSpec};

//! HTTP surface of the service.
//!
//! # Data Flow
//! ```text
//! net::listener (accept, limits, timeouts)
//!     → routes.rs (route table per generation)
//!     → request.rs (trace id, request span)
//!     → middleware/ (metrics, CORS)
//!     → service (business logic)
//!     → response.rs (envelope, status from error code)
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod routes;

pub use request::{RequestContext, TraceId};
pub use response::{ApiError, Envelope, ErrorCode};
pub use routes::api_router;

//! Business logic served over HTTP.

pub mod hello;

pub use hello::{HelloError, HelloInput, HelloMeta, HelloOutput, HelloService};

//! Shared types for the tablet discovery gateway.
//!
//! This crate has no business logic of its own. It holds the data model
//! every other gateway crate shares (`Target`, `TabletAlias`,
//! `TabletRecord`), the unified error type, the event/listener plumbing
//! used to break the cycle between health checking and the caches that
//! consume it, and the backoff abstraction used by both the health check
//! stream reconnect loop and the retry loop.

mod backoff;
mod error;
pub mod events;
mod target;

pub use backoff::{
    health_stream_reconnect_backoff, ExponentialBackoff, FixedInterval, IntervalFunction,
};
pub use error::GatewayError;
pub use target::{KeyRange, Role, ShardRecord, TabletAlias, TabletRecord, Target};

/// Result type threaded through the gateway crates.
pub type Result<T> = std::result::Result<T, GatewayError>;

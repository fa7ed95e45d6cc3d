//! Failover Buffer (spec §4.4).
//!
//! Holds primary-role requests briefly while a shard's primary is known
//! to be in transition, releasing them once a new primary is visible or
//! the window expires.

mod buffer;
mod config;
mod state;

pub use buffer::FailoverBuffer;
pub use config::{FailoverBufferConfig, FailoverBufferConfigBuilder};
pub use state::ShardPhase;

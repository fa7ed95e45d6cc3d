//! Per-cell topology watcher (spec §4.1).
//!
//! One [`TopologyWatcher`] per configured cell; watchers share nothing.
//! Follows the usual background-task wrapper shape (one periodic
//! `tokio::spawn`'d loop, stored as a `JoinHandle` the wrapper can
//! `abort()` on `stop`), generalized from a fixed interval poll of known
//! resources to a list-then-diff refresh against an external topology
//! server.

mod events;
mod server;
mod watcher;

pub use events::TopologyEvent;
pub use server::TopologyServer;
pub use watcher::{TopologyWatcher, TopologyWatcherConfig, TopologyWatcherConfigBuilder};

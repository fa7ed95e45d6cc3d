//! Healthy-Tablet Index (spec §4.3).
//!
//! Maintains `Target -> ordered tablets currently serving for that
//! target`, fed by [`gateway_health::HealthEvent`]. Reads snapshot-copy so
//! callers may shuffle without holding the lock; writers serialize
//! through a single `RwLock`.

mod cache;
mod listener;

pub use cache::{CacheConfig, CacheConfigBuilder, TabletStatsCache};
pub use listener::CacheListener;

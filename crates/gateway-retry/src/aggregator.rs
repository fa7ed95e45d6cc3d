use gateway_core::{Role, Target};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

/// Upper bounds (in milliseconds) of the latency histogram buckets.
const LATENCY_BUCKET_BOUNDS_MS: [u64; 9] = [1, 5, 10, 25, 50, 100, 250, 500, 1000];

/// Moving counts for one `(keyspace, shard, role)` key (spec §4.6).
#[derive(Default)]
pub struct TargetStats {
    success_count: AtomicU64,
    error_count: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKET_BOUNDS_MS.len() + 1],
}

impl TargetStats {
    fn record(&self, #[cfg_attr(not(feature = "metrics"), allow(unused_variables))] target: &Target, elapsed: Duration, success: bool) {
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        let millis = elapsed.as_millis() as u64;
        let bucket = LATENCY_BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| millis <= bound)
            .unwrap_or(LATENCY_BUCKET_BOUNDS_MS.len());
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        {
            counter!(
                "tablet_gateway_target_calls_total",
                "keyspace" => target.keyspace.clone(),
                "shard" => target.shard.clone(),
                "role" => target.role.to_string(),
                "outcome" => if success { "success" } else { "error" }
            )
            .increment(1);
            histogram!(
                "tablet_gateway_target_latency_ms",
                "keyspace" => target.keyspace.clone(),
                "shard" => target.shard.clone(),
                "role" => target.role.to_string()
            )
            .record(millis as f64);
        }
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn latencies(&self) -> Vec<u64> {
        self.latency_buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }
}

/// One row of `cache_status()` (spec §6).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStatusEntry {
    pub keyspace: String,
    pub shard: String,
    pub role: Role,
    pub success_count: u64,
    pub error_count: u64,
    pub latencies: Vec<u64>,
}

/// Per-`(keyspace, shard, role)` moving counts, read-dominated (spec
/// §4.6). Two-phase lookup: read-locked hash lookup, upgrade to write
/// lock and re-check on miss — the same double-checked-insertion
/// shape used by `gateway_cache::TabletStatsCache`'s membership map.
pub struct StatusAggregator {
    stats: RwLock<HashMap<Target, Arc<TargetStats>>>,
}

impl StatusAggregator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stats: RwLock::new(HashMap::new()),
        })
    }

    pub fn record(&self, target: &Target, elapsed: Duration, success: bool) {
        self.stats_for(target).record(target, elapsed, success);
    }

    fn stats_for(&self, target: &Target) -> Arc<TargetStats> {
        if let Some(stats) = self.stats.read().unwrap().get(target) {
            return Arc::clone(stats);
        }
        let mut stats = self.stats.write().unwrap();
        Arc::clone(
            stats
                .entry(target.clone())
                .or_insert_with(|| Arc::new(TargetStats::default())),
        )
    }

    /// Snapshot every tracked target for `cache_status()` / the
    /// `cache_status_for_keyspace` convenience.
    pub fn snapshot(&self) -> Vec<CacheStatusEntry> {
        self.stats
            .read()
            .unwrap()
            .iter()
            .map(|(target, stats)| CacheStatusEntry {
                keyspace: target.keyspace.clone(),
                shard: target.shard.clone(),
                role: target.role,
                success_count: stats.success_count(),
                error_count: stats.error_count(),
                latencies: stats.latencies(),
            })
            .collect()
    }
}

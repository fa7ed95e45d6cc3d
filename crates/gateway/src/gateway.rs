//! The composed `Gateway` (spec §6 "Gateway API").

use crate::config::GatewayConfig;
use crate::listener::{GatewayListener, TopologyToHealthBridge};
use gateway_buffer::{FailoverBuffer, FailoverBufferConfig};
use gateway_cache::{CacheConfig, CacheListener, TabletStatsCache};
use gateway_core::events::EventListeners;
use gateway_core::{GatewayError, Target};
use gateway_health::{HealthCheckTable, TabletQueryService};
use gateway_retry::{
    ActionOutcome, CacheStatusEntry, ConnectionSource, RetryConfig, Retryer, StatusAggregator,
};
use gateway_topo::{TopologyEvent, TopologyServer, TopologyWatcher, TopologyWatcherConfig};
use std::future::Future;
use std::sync::Arc;

/// The gateway composed from one watcher per cell plus the shared
/// Health Check / Stats Cache / Failover Buffer / Retryer stack (spec
/// §2 "System Overview").
pub struct Gateway<Q: TabletQueryService> {
    config: GatewayConfig,
    watchers: Vec<Arc<TopologyWatcher>>,
    health: Arc<HealthCheckTable<Q>>,
    cache: Arc<TabletStatsCache>,
    buffer: Arc<FailoverBuffer>,
    retryer: Retryer<Q::Connection>,
}

impl<Q: TabletQueryService> Gateway<Q> {
    /// Build the gateway and wire the listener graph (spec §9 "Cyclic
    /// references"), but do not yet start any topology watcher — call
    /// [`Gateway::start`] once constructed.
    pub async fn new(
        config: GatewayConfig,
        topology_server: Arc<dyn TopologyServer>,
        query_service: Q,
    ) -> Result<Arc<Self>, GatewayError> {
        let health = HealthCheckTable::new(query_service);

        let cache_config = CacheConfig {
            lag_threshold_seconds: config.lag_threshold_seconds,
            keyspace_allow: if config.keyspaces_to_watch.is_empty() {
                None
            } else {
                Some(config.keyspaces_to_watch.iter().cloned().collect())
            },
            shard_allow: if config.tablet_filters.is_empty() {
                None
            } else {
                Some(config.tablet_filters.iter().cloned().collect())
            },
        };
        let cache = TabletStatsCache::new(cache_config);

        let buffer = FailoverBuffer::new(FailoverBufferConfig {
            max_buffered_per_shard: config.buffer_size_per_shard,
            max_total_buffered: config.max_total_buffered,
            max_failover_duration: config.buffer_max_failover_duration,
        });
        let buffer_as_listener: Arc<dyn CacheListener> = Arc::clone(&buffer);
        cache.set_listener(buffer_as_listener);

        health
            .set_listener(Arc::new(GatewayListener::new(Arc::clone(&cache))), true)
            .await;

        let watcher_config = TopologyWatcherConfig::builder()
            .refresh_interval(config.refresh_interval)
            .refresh_known(config.refresh_known_tablets)
            .topo_read_concurrency(config.topo_read_concurrency)
            .build();

        let watchers = config
            .cells_to_watch
            .iter()
            .map(|cell| {
                let mut listeners: EventListeners<TopologyEvent> = EventListeners::new();
                listeners.add(TopologyToHealthBridge::new(Arc::clone(&health)));
                TopologyWatcher::new(
                    cell.clone(),
                    Arc::clone(&topology_server),
                    watcher_config.clone(),
                    listeners,
                )
            })
            .collect();

        let aggregator = StatusAggregator::new();
        let connections: Arc<dyn ConnectionSource<Q::Connection>> = Arc::clone(&health);
        let retry_config = RetryConfig {
            retry_count: config.gateway_retry_count,
            allowed_tablet_types: config.allowed_tablet_types.clone(),
            replica_routes_to_readonly: config.gateway_route_replica_to_rdonly,
            buffer_enabled: config.buffer_enabled,
        };
        let retryer = Retryer::new(
            config.local_cell.clone(),
            retry_config,
            Arc::clone(&cache),
            Arc::clone(&buffer),
            connections,
            aggregator,
        );

        Ok(Arc::new(Self {
            config,
            watchers,
            health,
            cache,
            buffer,
            retryer,
        }))
    }

    /// Start every cell's periodic refresh loop.
    pub async fn start(&self) {
        for watcher in &self.watchers {
            watcher.start().await;
        }
    }

    /// Run `action` against a healthy tablet for `target`, retrying per
    /// `gateway_retry_count` and buffering primary requests through a
    /// failover window (spec §6 `execute`).
    pub async fn execute<F, Fut, T>(
        &self,
        target: &Target,
        in_transaction: bool,
        action: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(Q::Connection) -> Fut,
        Fut: Future<Output = ActionOutcome<T>>,
    {
        self.retryer
            .execute(
                target,
                in_transaction,
                self.config.buffer_max_failover_duration,
                action,
            )
            .await
    }

    /// Block until every target in `target_roles` has at least one
    /// healthy tablet (spec §6 `wait_for_tablets`).
    pub async fn wait_for_tablets(&self, target_roles: &[Target]) -> Result<(), GatewayError> {
        self.cache
            .wait_for_all_serving(target_roles, self.config.wait_for_tablets_timeout)
            .await
            .map_err(|unsatisfied| GatewayError::NoHealthyTablet {
                target: unsatisfied
                    .into_iter()
                    .next()
                    .or_else(|| target_roles.first().cloned())
                    .expect("wait_for_tablets called with an empty target list"),
            })
    }

    /// Per-`(keyspace, shard, role)` query/error counts and latency
    /// histograms (spec §6 `cache_status`).
    pub fn cache_status(&self) -> Vec<CacheStatusEntry> {
        self.retryer.aggregator().snapshot()
    }

    /// `cache_status` filtered to one keyspace — read-side convenience
    /// over the same `StatusAggregator` table, no new data.
    pub fn cache_status_for_keyspace(&self, keyspace: &str) -> Vec<CacheStatusEntry> {
        self.cache_status()
            .into_iter()
            .filter(|entry| entry.keyspace == keyspace)
            .collect()
    }

    /// Graceful shutdown (spec §6 `close`): stop topology watchers, then
    /// the health check table (spec §4.2 "Termination"), then cancel
    /// outstanding buffer waiters (spec §4.4 "Cancellation") — in that
    /// order, matching the "Graceful shutdown ordering" supplemented
    /// feature.
    pub async fn close(&self) -> Result<(), GatewayError> {
        for watcher in &self.watchers {
            watcher.stop().await;
        }
        self.health.close().await;
        self.buffer.shutdown();
        Ok(())
    }
}

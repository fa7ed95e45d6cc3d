//! The two forwarding listeners that wire the cyclic callback graph
//! without a compile-time dependency cycle (spec §9 "Cyclic references").

use gateway_cache::TabletStatsCache;
use gateway_core::events::EventListener;
use gateway_health::{HealthCheckTable, HealthEvent, TabletQueryService};
use gateway_topo::TopologyEvent;
use std::sync::Arc;

/// Installed as the [`HealthCheckTable`]'s sole listener. Forwards every
/// health event into the Stats Cache, which in turn forwards
/// primary-target transitions into the Failover Buffer through its own
/// [`gateway_cache::CacheListener`] — the gateway only needs to know
/// about the first hop.
pub struct GatewayListener {
    cache: Arc<TabletStatsCache>,
}

impl GatewayListener {
    pub fn new(cache: Arc<TabletStatsCache>) -> Self {
        Self { cache }
    }
}

impl EventListener<HealthEvent> for GatewayListener {
    fn on_event(&self, event: &HealthEvent) {
        self.cache.on_event(event);
    }
}

/// Installed as one of the topology watcher's listeners. Translates
/// topology deltas (spec §4.1 step 3) into Health Check subscription
/// changes (spec §4.2 `add_tablet`/`remove_tablet`/`replace_tablet`).
///
/// `on_event` is a synchronous trait method but the table's operations
/// are async, so each delta is handed to a spawned task — the same shape
/// `HealthCheckTable` itself uses for per-tablet subscriptions.
pub struct TopologyToHealthBridge<Q: TabletQueryService> {
    health: Arc<HealthCheckTable<Q>>,
}

impl<Q: TabletQueryService> TopologyToHealthBridge<Q> {
    pub fn new(health: Arc<HealthCheckTable<Q>>) -> Self {
        Self { health }
    }
}

impl<Q: TabletQueryService> EventListener<TopologyEvent> for TopologyToHealthBridge<Q> {
    fn on_event(&self, event: &TopologyEvent) {
        let health = Arc::clone(&self.health);
        match event {
            TopologyEvent::Added { record, .. } => {
                let record = record.clone();
                tokio::spawn(async move { health.add_tablet(record).await });
            }
            TopologyEvent::Updated { new, .. } => {
                let alias = new.alias.clone();
                let record = new.clone();
                tokio::spawn(async move { health.replace_tablet(&alias, record).await });
            }
            TopologyEvent::Removed { alias, .. } => {
                let alias = alias.clone();
                tokio::spawn(async move { health.remove_tablet(&alias).await });
            }
        }
    }
}

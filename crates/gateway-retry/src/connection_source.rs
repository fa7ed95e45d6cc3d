use async_trait::async_trait;
use gateway_core::TabletAlias;
use gateway_health::{HealthCheckTable, TabletQueryService};

/// What the retry loop needs from Health Check: the cached RPC client for
/// a tablet, or `None` if it hasn't dialed successfully (spec §4.5 step
/// 6). Defined here rather than consumed directly off `HealthCheckTable`
/// so the retry loop depends on a capability, not a concrete table type.
#[async_trait]
pub trait ConnectionSource<C>: Send + Sync {
    async fn get_connection(&self, alias: &TabletAlias) -> Option<C>;
}

#[async_trait]
impl<Q: TabletQueryService> ConnectionSource<Q::Connection> for HealthCheckTable<Q> {
    async fn get_connection(&self, alias: &TabletAlias) -> Option<Q::Connection> {
        HealthCheckTable::get_connection(self, alias).await
    }
}

//! The topology server contract (spec §6, out-of-scope external
//! collaborator consumed as a read API plus per-cell watch).

use async_trait::async_trait;
use gateway_core::{GatewayError, ShardRecord, TabletAlias, TabletRecord};

/// A strongly-consistent external metadata store listing cells,
/// keyspaces, shards, tablet records, and primary elections.
///
/// Modeled as a trait the same way a reconnect layer abstracts the
/// service it dials through (`tower::MakeService`) — tests supply an
/// in-memory fake instead of a real topology server.
#[async_trait]
pub trait TopologyServer: Send + Sync {
    /// List every tablet alias known in a cell.
    async fn list_tablets(&self, cell: &str) -> Result<Vec<TabletAlias>, GatewayError>;

    /// Fetch a single tablet's full record.
    async fn get_tablet(&self, alias: &TabletAlias) -> Result<TabletRecord, GatewayError>;

    /// Fetch a shard's record, including its current primary election.
    async fn get_shard(&self, keyspace: &str, shard: &str) -> Result<ShardRecord, GatewayError>;
}

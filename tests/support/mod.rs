//! Shared fakes for the workspace-root integration tests: a controllable
//! topology server and tablet query service, driven from the test body
//! via channels rather than fixed fixtures.

use async_trait::async_trait;
use futures::stream::BoxStream;
use gateway_core::{GatewayError, Role, TabletAlias, TabletRecord};
use gateway_health::{HealthMessage, TabletQueryService};
use gateway_topo::TopologyServer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A topology server whose tablet set the test can mutate at will via
/// `set`/`remove`.
pub struct ControllableTopologyServer {
    records: Mutex<HashMap<TabletAlias, TabletRecord>>,
}

impl ControllableTopologyServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(HashMap::new()),
        })
    }

    pub fn set(&self, record: TabletRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.alias.clone(), record);
    }

    pub fn remove(&self, alias: &TabletAlias) {
        self.records.lock().unwrap().remove(alias);
    }
}

#[async_trait]
impl TopologyServer for ControllableTopologyServer {
    async fn list_tablets(&self, cell: &str) -> Result<Vec<TabletAlias>, GatewayError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.alias.cell == cell)
            .map(|r| r.alias.clone())
            .collect())
    }

    async fn get_tablet(&self, alias: &TabletAlias) -> Result<TabletRecord, GatewayError> {
        self.records
            .lock()
            .unwrap()
            .get(alias)
            .cloned()
            .ok_or_else(|| GatewayError::TabletUnreachable {
                alias: alias.to_string(),
                reason: "not found".into(),
            })
    }

    async fn get_shard(
        &self,
        keyspace: &str,
        shard: &str,
    ) -> Result<gateway_core::ShardRecord, GatewayError> {
        Ok(gateway_core::ShardRecord {
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
            primary_alias: self
                .records
                .lock()
                .unwrap()
                .values()
                .find(|r| r.keyspace == keyspace && r.shard == shard && r.role == Role::Primary)
                .map(|r| r.alias.clone()),
        })
    }
}

#[derive(Clone)]
pub struct ControllableConnection {
    pub alias: TabletAlias,
}

/// A tablet query service whose health stream is a per-tablet channel the
/// test holds the sending half of, so it can push `HealthMessage`s (or
/// close the channel to simulate a dead stream) at will.
pub struct ControllableQueryService {
    senders: Mutex<HashMap<TabletAlias, mpsc::UnboundedSender<Result<HealthMessage, GatewayError>>>>,
}

impl ControllableQueryService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(HashMap::new()),
        })
    }

    /// Push one health update for `alias`. Panics if the tablet hasn't
    /// dialed yet (call after `add_tablet`/topology refresh has had a
    /// chance to run and a short `sleep`).
    pub fn push_health(&self, alias: &TabletAlias, serving: bool, role: Role, lag: f64) {
        let senders = self.senders.lock().unwrap();
        let sender = senders
            .get(alias)
            .unwrap_or_else(|| panic!("no live stream for {alias}"));
        let _ = sender.send(Ok(HealthMessage {
            serving,
            declared_role: role,
            replication_lag_seconds: lag,
            error: None,
        }));
    }

    pub fn is_dialed(&self, alias: &TabletAlias) -> bool {
        self.senders.lock().unwrap().contains_key(alias)
    }
}

/// Poll `service.is_dialed(alias)` until it's true or the deadline passes.
pub async fn wait_for_dial(service: &ControllableQueryService, alias: &TabletAlias) {
    for _ in 0..200 {
        if service.is_dialed(alias) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("tablet never dialed: {alias}");
}

#[async_trait]
impl TabletQueryService for ControllableQueryService {
    type Connection = ControllableConnection;

    async fn dial(&self, record: &TabletRecord) -> Result<Self::Connection, GatewayError> {
        Ok(ControllableConnection {
            alias: record.alias.clone(),
        })
    }

    async fn health_stream(
        &self,
        connection: &Self::Connection,
    ) -> Result<BoxStream<'static, Result<HealthMessage, GatewayError>>, GatewayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap()
            .insert(connection.alias.clone(), tx);
        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

pub fn tablet(cell: &str, uid: u32, keyspace: &str, shard: &str, role: Role) -> TabletRecord {
    TabletRecord {
        alias: TabletAlias::new(cell, uid),
        hostname: format!("{cell}-{uid}.test.local"),
        port: 15991,
        keyspace: keyspace.into(),
        shard: shard.into(),
        role,
        key_range: None,
    }
}

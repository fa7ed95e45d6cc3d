//! Demo/ambient CLI surface for the tablet discovery gateway.
//!
//! Loads [`gateway::GatewayConfigRaw`] from a layered TOML file + `GATEWAY_*`
//! env vars + CLI flags, wires an in-memory demo topology/tablet backend
//! (the real topology server and per-tablet RPC stack are out of scope,
//! spec §1), and serves `cache_status()` over a tiny HTTP status endpoint.
//! Not part of the core routing surface — every crate in this workspace
//! ships a runnable example, and this binary is the gateway's.

use async_trait::async_trait;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use futures::stream::BoxStream;
use gateway::{Gateway, GatewayConfigRaw};
use gateway_core::{GatewayError, Role, TabletAlias, TabletRecord};
use gateway_health::{HealthMessage, TabletQueryService};
use gateway_topo::TopologyServer;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "tablet-gatewayd", about = "Tablet discovery gateway demo daemon")]
struct Cli {
    /// Path to a TOML config file. Missing files are tolerated; defaults
    /// and `GATEWAY_*` env vars still apply.
    #[arg(long, default_value = "tablet-gatewayd.toml")]
    config: String,

    /// Overrides `cells_to_watch` when set.
    #[arg(long, value_delimiter = ',')]
    cells: Option<Vec<String>>,

    /// Address the status endpoint listens on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut raw = config::Config::builder()
        .add_source(config::File::with_name(&cli.config).required(false))
        .add_source(config::Environment::with_prefix("GATEWAY").try_parsing(true))
        .build()
        .and_then(|c| c.try_deserialize::<GatewayConfigRaw>())
        .unwrap_or_default();

    if let Some(cells) = cli.cells {
        raw.cells_to_watch = cells;
    }
    if raw.cells_to_watch.is_empty() {
        raw.cells_to_watch = vec!["zone1".to_string(), "zone2".to_string()];
    }

    let gateway_config = raw
        .into_config()
        .expect("invalid gateway configuration");

    let topology = Arc::new(DemoTopologyServer::new(&gateway_config.cells_to_watch));
    let gateway = Gateway::new(gateway_config, topology, DemoQueryService)
        .await
        .expect("gateway construction failed");
    gateway.start().await;

    tracing::info!(addr = %cli.listen, "tablet-gatewayd listening");

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/status", get(status_handler))
        .with_state(Arc::clone(&gateway));

    let listener = TcpListener::bind(cli.listen)
        .await
        .expect("bind error");
    axum::serve(listener, app).await.expect("server error");

    gateway.close().await.expect("shutdown error");
}

async fn status_handler(
    State(gateway): State<Arc<Gateway<DemoQueryService>>>,
) -> Json<Vec<gateway::CacheStatusEntry>> {
    Json(gateway.cache_status())
}

/// A fixed two-cell, one-primary, four-replica topology (spec §8
/// end-to-end scenario 1: "Two cells a,b; one primary in a, two replicas
/// each cell").
struct DemoTopologyServer {
    tablets: Vec<TabletRecord>,
}

impl DemoTopologyServer {
    fn new(cells: &[String]) -> Self {
        let mut tablets = Vec::new();
        let mut uid = 1;
        for (index, cell) in cells.iter().enumerate() {
            if index == 0 {
                tablets.push(TabletRecord {
                    alias: TabletAlias::new(cell.clone(), uid),
                    hostname: format!("{cell}-{uid}.demo.local"),
                    port: 15991,
                    keyspace: "commerce".into(),
                    shard: "-80".into(),
                    role: Role::Primary,
                    key_range: None,
                });
                uid += 1;
            }
            for _ in 0..2 {
                tablets.push(TabletRecord {
                    alias: TabletAlias::new(cell.clone(), uid),
                    hostname: format!("{cell}-{uid}.demo.local"),
                    port: 15991,
                    keyspace: "commerce".into(),
                    shard: "-80".into(),
                    role: Role::Replica,
                    key_range: None,
                });
                uid += 1;
            }
        }
        Self { tablets }
    }
}

#[async_trait]
impl TopologyServer for DemoTopologyServer {
    async fn list_tablets(&self, cell: &str) -> Result<Vec<TabletAlias>, GatewayError> {
        Ok(self
            .tablets
            .iter()
            .filter(|t| t.alias.cell == cell)
            .map(|t| t.alias.clone())
            .collect())
    }

    async fn get_tablet(&self, alias: &TabletAlias) -> Result<TabletRecord, GatewayError> {
        self.tablets
            .iter()
            .find(|t| &t.alias == alias)
            .cloned()
            .ok_or_else(|| GatewayError::TabletUnreachable {
                alias: alias.to_string(),
                reason: "unknown demo tablet".into(),
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
                .tablets
                .iter()
                .find(|t| t.keyspace == keyspace && t.shard == shard && t.role == Role::Primary)
                .map(|t| t.alias.clone()),
        })
    }
}

#[derive(Clone)]
struct DemoConnection {
    alias: TabletAlias,
}

/// Reports every dialed tablet serving, forever, on a fixed interval, with
/// replicas occasionally flapping non-serving so the status endpoint has
/// something to show. Stands in for the out-of-scope per-tablet RPC stack
/// (spec §1, §6).
struct DemoQueryService;

#[async_trait]
impl TabletQueryService for DemoQueryService {
    type Connection = DemoConnection;

    async fn dial(&self, record: &TabletRecord) -> Result<Self::Connection, GatewayError> {
        Ok(DemoConnection {
            alias: record.alias.clone(),
        })
    }

    async fn health_stream(
        &self,
        connection: &Self::Connection,
    ) -> Result<BoxStream<'static, Result<HealthMessage, GatewayError>>, GatewayError> {
        let alias = connection.alias.clone();
        let role = demo_role_for(&alias);
        let stream = futures::stream::unfold((), move |_| {
            let role = role;
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                let flapping = role != Role::Primary && rand::rng().random_bool(0.05);
                let message = HealthMessage {
                    serving: !flapping,
                    declared_role: role,
                    replication_lag_seconds: 0.5,
                    error: None,
                };
                Some((Ok(message), ()))
            }
        });
        Ok(Box::pin(stream))
    }
}

/// The demo topology only ever hands out uid 1 as PRIMARY; every other
/// uid is a REPLICA (mirrors `DemoTopologyServer::new`'s layout).
fn demo_role_for(alias: &TabletAlias) -> Role {
    if alias.uid == 1 {
        Role::Primary
    } else {
        Role::Replica
    }
}

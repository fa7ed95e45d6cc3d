use async_trait::async_trait;
use futures::stream::BoxStream;
use gateway_core::{GatewayError, Role, TabletRecord};

/// One message on a tablet's health stream.
#[derive(Debug, Clone)]
pub struct HealthMessage {
    pub serving: bool,
    pub declared_role: Role,
    pub replication_lag_seconds: f64,
    pub error: Option<String>,
}

/// The per-tablet RPC surface the Health Check module needs: a way to
/// dial a tablet and a way to open its streaming health subscription.
///
/// `Connection` is the opaque, cached client handed back by
/// [`HealthCheckTable::get_connection`][crate::HealthCheckTable::get_connection]
/// for the retry loop's action closures to invoke — the gateway never
/// interprets it beyond cloning and holding it.
#[async_trait]
pub trait TabletQueryService: Send + Sync + 'static {
    type Connection: Clone + Send + Sync + 'static;

    /// Dial the tablet named by `record`, establishing (but not yet
    /// subscribing on) a connection.
    async fn dial(&self, record: &TabletRecord) -> Result<Self::Connection, GatewayError>;

    /// Open the bidirectional health stream on an established connection.
    /// Each yielded item is one health update; an `Err` item or the end of
    /// the stream both mean "the subscription died, reconnect."
    async fn health_stream(
        &self,
        connection: &Self::Connection,
    ) -> Result<BoxStream<'static, Result<HealthMessage, GatewayError>>, GatewayError>;
}

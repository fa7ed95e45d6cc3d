use crate::{HealthEntry, HealthEvent, HealthMessage, TabletQueryService};
use futures::StreamExt;
use gateway_core::events::EventListener;
use gateway_core::{
    health_stream_reconnect_backoff, GatewayError, IntervalFunction, TabletAlias, TabletRecord,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Bound on how long `close()` waits for aborted subscription tasks to
/// unwind before giving up and returning anyway.
const CLOSE_JOIN_DEADLINE: Duration = Duration::from_secs(5);

struct ListenerSlot {
    listener: Arc<dyn EventListener<HealthEvent>>,
    send_down_events: bool,
}

struct TrackedTablet<C> {
    record: TabletRecord,
    connection: Option<C>,
    health: Option<HealthEntry>,
    task: JoinHandle<()>,
}

/// Fast lookup from tablet identity to live health state and RPC client
/// (spec §4.2). One background task per subscribed tablet maintains a
/// long-lived stream and republishes updates to the installed listener.
pub struct HealthCheckTable<Q: TabletQueryService> {
    service: Arc<Q>,
    entries: Arc<RwLock<HashMap<TabletAlias, TrackedTablet<Q::Connection>>>>,
    listener: Arc<RwLock<Option<ListenerSlot>>>,
}

impl<Q: TabletQueryService> HealthCheckTable<Q> {
    pub fn new(service: Q) -> Arc<Self> {
        Arc::new(Self {
            service: Arc::new(service),
            entries: Arc::new(RwLock::new(HashMap::new())),
            listener: Arc::new(RwLock::new(None)),
        })
    }

    /// Install the sole listener. `send_down_events` gates delivery of
    /// [`HealthEvent::Down`] — the always-delivered [`HealthEvent::Health`]
    /// updates are unaffected.
    pub async fn set_listener(
        &self,
        listener: Arc<dyn EventListener<HealthEvent>>,
        send_down_events: bool,
    ) {
        *self.listener.write().await = Some(ListenerSlot {
            listener,
            send_down_events,
        });
    }

    /// Start a streaming health subscription for `record`. Idempotent on
    /// the tablet's alias: a tablet already tracked is left untouched.
    pub async fn add_tablet(self: &Arc<Self>, record: TabletRecord) {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&record.alias) {
            return;
        }
        let task = self.spawn_subscription(record.clone());
        entries.insert(
            record.alias.clone(),
            TrackedTablet {
                record,
                connection: None,
                health: None,
                task,
            },
        );
    }

    /// Stop tracking a tablet. Aborts its subscription task and, if a
    /// listener is installed for down events, publishes a final
    /// [`HealthEvent::Down`].
    pub async fn remove_tablet(&self, alias: &TabletAlias) {
        let removed = { self.entries.write().await.remove(alias) };
        let Some(tracked) = removed else {
            return;
        };
        tracked.task.abort();
        self.publish_down(tracked.record, tracked.health).await;
    }

    /// Replace a tracked tablet's record, e.g. after a topology `Updated`
    /// event. Implemented as remove-then-add rather than reusing the
    /// underlying connection when only metadata changed, since the
    /// hostname/port pair may have moved.
    pub async fn replace_tablet(self: &Arc<Self>, alias: &TabletAlias, record: TabletRecord) {
        self.remove_tablet(alias).await;
        self.add_tablet(record).await;
    }

    /// The cached RPC client for a tracked tablet, if its subscription has
    /// dialed successfully at least once.
    pub async fn get_connection(&self, alias: &TabletAlias) -> Option<Q::Connection> {
        self.entries
            .read()
            .await
            .get(alias)
            .and_then(|t| t.connection.clone())
    }

    /// Snapshot of the last known health entry for a tablet.
    pub async fn get_health(&self, alias: &TabletAlias) -> Option<HealthEntry> {
        self.entries.read().await.get(alias).and_then(|t| t.health.clone())
    }

    /// Stop every subscription task and drop all tracked tablets, waiting
    /// up to a bounded deadline for the aborted tasks to actually exit.
    /// After this returns, `get_connection` is absent for every alias
    /// (spec §8 invariant 5), matching the ordering in `Gateway::close`
    /// (spec §4.2 "Termination").
    pub async fn close(&self) {
        let handles: Vec<_> = {
            let mut entries = self.entries.write().await;
            entries
                .drain()
                .map(|(_, tracked)| {
                    tracked.task.abort();
                    tracked.task
                })
                .collect()
        };
        let _ = tokio::time::timeout(CLOSE_JOIN_DEADLINE, futures::future::join_all(handles)).await;
    }

    async fn publish_health(&self, record: TabletRecord, old: Option<HealthEntry>, new: HealthEntry) {
        let event = HealthEvent::Health {
            record,
            old,
            new,
            timestamp: Instant::now(),
        };
        if let Some(slot) = self.listener.read().await.as_ref() {
            slot.listener.on_event(&event);
        }
    }

    async fn publish_down(&self, record: TabletRecord, last: Option<HealthEntry>) {
        let slot_guard = self.listener.read().await;
        let Some(slot) = slot_guard.as_ref() else {
            return;
        };
        if !slot.send_down_events {
            return;
        }
        let event = HealthEvent::Down {
            record,
            last,
            timestamp: Instant::now(),
        };
        slot.listener.on_event(&event);
    }

    fn spawn_subscription(self: &Arc<Self>, record: TabletRecord) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            table.run_subscription(record).await;
        })
    }

    async fn run_subscription(self: Arc<Self>, record: TabletRecord) {
        let backoff = health_stream_reconnect_backoff();
        let mut attempt = 0usize;

        loop {
            let connection = match self.service.dial(&record).await {
                Ok(connection) => connection,
                Err(err) => {
                    self.mark_error(&record, err.to_string()).await;
                    tokio::time::sleep(backoff.next_interval(attempt)).await;
                    attempt += 1;
                    continue;
                }
            };
            {
                let mut entries = self.entries.write().await;
                if let Some(tracked) = entries.get_mut(&record.alias) {
                    tracked.connection = Some(connection.clone());
                } else {
                    // Removed while dialing.
                    return;
                }
            }

            let mut stream = match self.service.health_stream(&connection).await {
                Ok(stream) => stream,
                Err(err) => {
                    self.mark_error(&record, err.to_string()).await;
                    tokio::time::sleep(backoff.next_interval(attempt)).await;
                    attempt += 1;
                    continue;
                }
            };

            attempt = 0;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) => self.apply_message(&record, message).await,
                    Err(err) => {
                        self.mark_error(&record, err.to_string()).await;
                        break;
                    }
                }
                if !self.entries.read().await.contains_key(&record.alias) {
                    return;
                }
            }

            {
                let mut entries = self.entries.write().await;
                if let Some(tracked) = entries.get_mut(&record.alias) {
                    tracked.connection = None;
                } else {
                    return;
                }
            }
            self.publish_down(record.clone(), self.get_health(&record.alias).await)
                .await;
            tokio::time::sleep(backoff.next_interval(attempt)).await;
            attempt += 1;
        }
    }

    async fn apply_message(&self, record: &TabletRecord, message: HealthMessage) {
        let new = HealthEntry {
            serving: message.serving,
            declared_role: message.declared_role,
            replication_lag_seconds: message.replication_lag_seconds,
            last_error: message.error,
            last_update: Instant::now(),
        };
        let old = {
            let mut entries = self.entries.write().await;
            let Some(tracked) = entries.get_mut(&record.alias) else {
                return;
            };
            tracked.health.replace(new.clone())
        };
        let went_down = old.as_ref().map(|e| e.serving).unwrap_or(true) && !new.serving;
        self.publish_health(record.clone(), old, new.clone()).await;
        if went_down {
            self.publish_down(record.clone(), Some(new)).await;
        }
    }

    async fn mark_error(&self, record: &TabletRecord, reason: String) {
        let mut entries = self.entries.write().await;
        if let Some(tracked) = entries.get_mut(&record.alias) {
            if let Some(health) = tracked.health.as_mut() {
                health.last_error = Some(reason);
            }
        }
    }
}

impl<Q: TabletQueryService> Drop for HealthCheckTable<Q> {
    fn drop(&mut self) {
        if let Ok(mut entries) = self.entries.try_write() {
            for (_, tracked) in entries.drain() {
                tracked.task.abort();
            }
        }
    }
}

//! The topology watcher itself (spec §4.1 "Operations" and "Algorithm").

use crate::events::TopologyEvent;
use crate::server::TopologyServer;
use futures::stream::{self, StreamExt};
use gateway_core::events::EventListeners;
use gateway_core::{TabletAlias, TabletRecord};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use metrics::gauge;

/// Configuration for one cell's watcher (spec §6 "per-watcher" fields).
#[derive(Debug, Clone)]
pub struct TopologyWatcherConfig {
    pub(crate) refresh_interval: Duration,
    pub(crate) refresh_known: bool,
    pub(crate) topo_read_concurrency: usize,
}

impl Default for TopologyWatcherConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            refresh_known: false,
            topo_read_concurrency: 32,
        }
    }
}

impl TopologyWatcherConfig {
    pub fn builder() -> TopologyWatcherConfigBuilder {
        TopologyWatcherConfigBuilder::default()
    }
}

/// Builder for [`TopologyWatcherConfig`].
#[derive(Default)]
pub struct TopologyWatcherConfigBuilder {
    refresh_interval: Option<Duration>,
    refresh_known: Option<bool>,
    topo_read_concurrency: Option<usize>,
}

impl TopologyWatcherConfigBuilder {
    /// Default: 60 seconds.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Default: false. When true, every refresh re-reads every known
    /// tablet's record even if the cell listing alone detected no change.
    pub fn refresh_known(mut self, refresh_known: bool) -> Self {
        self.refresh_known = Some(refresh_known);
        self
    }

    /// Default: 32.
    pub fn topo_read_concurrency(mut self, concurrency: usize) -> Self {
        self.topo_read_concurrency = Some(concurrency);
        self
    }

    pub fn build(self) -> TopologyWatcherConfig {
        let default = TopologyWatcherConfig::default();
        TopologyWatcherConfig {
            refresh_interval: self.refresh_interval.unwrap_or(default.refresh_interval),
            refresh_known: self.refresh_known.unwrap_or(default.refresh_known),
            topo_read_concurrency: self
                .topo_read_concurrency
                .unwrap_or(default.topo_read_concurrency),
        }
    }
}

/// Maintains the tablet set for a single cell, emitting add/update/remove
/// events as it diffs successive refreshes (spec §4.1).
pub struct TopologyWatcher {
    cell: String,
    server: Arc<dyn TopologyServer>,
    config: TopologyWatcherConfig,
    known: RwLock<HashMap<TabletAlias, TabletRecord>>,
    listeners: EventListeners<TopologyEvent>,
    last_refresh: Mutex<Option<Instant>>,
    checksum: AtomicU32,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TopologyWatcher {
    pub fn new(
        cell: impl Into<String>,
        server: Arc<dyn TopologyServer>,
        config: TopologyWatcherConfig,
        listeners: EventListeners<TopologyEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cell: cell.into(),
            server,
            config,
            known: RwLock::new(HashMap::new()),
            listeners,
            last_refresh: Mutex::new(None),
            checksum: AtomicU32::new(0),
            task: Mutex::new(None),
        })
    }

    pub fn cell(&self) -> &str {
        &self.cell
    }

    /// Spawn the periodic refresh loop (spec §4.1 `start()`).
    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                this.refresh().await;
            }
        });
        *self.task.lock().await = Some(handle);
    }

    /// Cancel background work, drain (spec §4.1 `stop()`).
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Duration since last successful refresh completion. Grows
    /// monotonically while the topology server is unreachable (spec §4.1
    /// `refresh_lag()`, §4.1.5).
    pub async fn refresh_lag(&self) -> Duration {
        let lag = match *self.last_refresh.lock().await {
            Some(instant) => instant.elapsed(),
            None => Duration::MAX,
        };
        #[cfg(feature = "metrics")]
        gauge!(
            "tablet_gateway_topology_watcher_max_refresh_lag_seconds",
            "cell" => self.cell.clone()
        )
        .set(lag.as_secs_f64());
        lag
    }

    /// 32-bit hash of the sorted canonical encoding of the current tablet
    /// set, exported as the `TopologyWatcherChecksum` gauge (spec §4.1,
    /// §6).
    pub fn topo_checksum(&self) -> u32 {
        self.checksum.load(Ordering::Acquire)
    }

    /// Run one refresh cycle (spec §4.1 "Algorithm").
    pub async fn refresh(&self) {
        let aliases = match self.server.list_tablets(&self.cell).await {
            Ok(aliases) => aliases,
            Err(_err) => {
                // List errors: retried next tick. Do not mutate the
                // snapshot; refresh_lag keeps growing.
                #[cfg(feature = "tracing")]
                warn!(cell = %self.cell, error = %_err, "topology list_tablets failed, retrying next tick");
                return;
            }
        };
        // Empty cell-list entries are skipped (spec §8 "Boundary behaviors").
        let mut current: Vec<TabletAlias> = aliases
            .into_iter()
            .filter(|a| !a.cell.is_empty())
            .collect();
        current.sort_by(|a, b| (a.cell.as_str(), a.uid).cmp(&(b.cell.as_str(), b.uid)));

        let previously_known: Vec<TabletAlias> = {
            let known = self.known.read().await;
            known.keys().cloned().collect()
        };

        let current_set: std::collections::HashSet<&TabletAlias> = current.iter().collect();
        let removed: Vec<TabletAlias> = previously_known
            .iter()
            .filter(|a| !current_set.contains(a))
            .cloned()
            .collect();

        let mut to_read: Vec<TabletAlias> = current
            .iter()
            .filter(|a| !previously_known.contains(a))
            .cloned()
            .collect();
        if self.config.refresh_known {
            to_read.extend(
                current
                    .iter()
                    .filter(|a| previously_known.contains(a))
                    .cloned(),
            );
        }

        let concurrency = self.config.topo_read_concurrency.max(1);
        let server = Arc::clone(&self.server);
        let reads: Vec<(TabletAlias, Result<TabletRecord, gateway_core::GatewayError>)> =
            stream::iter(to_read.into_iter())
                .map(|alias| {
                    let server = Arc::clone(&server);
                    async move {
                        let result = server.get_tablet(&alias).await;
                        (alias, result)
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut known = self.known.write().await;

        for alias in &removed {
            known.remove(alias);
            self.listeners.emit(&TopologyEvent::Removed {
                cell: self.cell.clone(),
                alias: alias.clone(),
                timestamp: Instant::now(),
            });
        }

        for (alias, result) in reads {
            match result {
                Ok(record) => match known.get(&alias) {
                    None => {
                        known.insert(alias.clone(), record.clone());
                        self.listeners.emit(&TopologyEvent::Added {
                            cell: self.cell.clone(),
                            record,
                            timestamp: Instant::now(),
                        });
                    }
                    Some(old) if *old != record => {
                        let old = old.clone();
                        known.insert(alias.clone(), record.clone());
                        self.listeners.emit(&TopologyEvent::Updated {
                            cell: self.cell.clone(),
                            old,
                            new: record,
                            timestamp: Instant::now(),
                        });
                    }
                    Some(_) => {
                        // Unchanged; no event.
                    }
                },
                Err(_err) => {
                    // Partial per-tablet read errors: that tablet retains
                    // its previous record (or stays absent if it was new).
                    #[cfg(feature = "tracing")]
                    debug!(alias = %alias, error = %_err, "topology get_tablet failed, retaining previous record");
                }
            }
        }

        let checksum = checksum_of(&known);
        self.checksum.store(checksum, Ordering::Release);
        drop(known);

        let completed_at = Instant::now();
        *self.last_refresh.lock().await = Some(completed_at);

        #[cfg(feature = "metrics")]
        gauge!("tablet_gateway_topology_watcher_checksum", "cell" => self.cell.clone())
            .set(checksum as f64);
    }
}

fn checksum_of(known: &HashMap<TabletAlias, TabletRecord>) -> u32 {
    let mut entries: Vec<(&TabletAlias, &TabletRecord)> = known.iter().collect();
    entries.sort_by(|a, b| (a.0.cell.as_str(), a.0.uid).cmp(&(b.0.cell.as_str(), b.0.uid)));

    let mut hasher = DefaultHasher::new();
    for (alias, record) in entries {
        alias.cell.hash(&mut hasher);
        alias.uid.hash(&mut hasher);
        record.hostname.hash(&mut hasher);
        record.port.hash(&mut hasher);
        record.keyspace.hash(&mut hasher);
        record.shard.hash(&mut hasher);
        record.role.to_string().hash(&mut hasher);
    }
    (hasher.finish() & 0xFFFF_FFFF) as u32
}

use crate::CacheListener;
use gateway_core::events::EventListener;
use gateway_core::{Role, Target, TabletAlias, TabletRecord};
use gateway_health::HealthEvent;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;

/// Tuning knobs for the Healthy-Tablet Index.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum replication lag, in seconds, for a tablet to count as
    /// healthy (spec §4.3 "Healthy-Tablet Index").
    pub lag_threshold_seconds: f64,
    /// If set, only tablets in these keyspaces are admitted.
    pub keyspace_allow: Option<HashSet<String>>,
    /// If set, only tablets in these (keyspace, shard) pairs are admitted.
    pub shard_allow: Option<HashSet<(String, String)>>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lag_threshold_seconds: 30.0,
            keyspace_allow: None,
            shard_allow: None,
        }
    }
}

#[derive(Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lag_threshold_seconds(mut self, seconds: f64) -> Self {
        self.config.lag_threshold_seconds = seconds;
        self
    }

    pub fn keyspace_allow(mut self, keyspaces: impl IntoIterator<Item = String>) -> Self {
        self.config.keyspace_allow = Some(keyspaces.into_iter().collect());
        self
    }

    pub fn shard_allow(mut self, shards: impl IntoIterator<Item = (String, String)>) -> Self {
        self.config.shard_allow = Some(shards.into_iter().collect());
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}

/// Maintains `Target -> ordered serving tablets` (spec §4.3).
///
/// The index itself sits behind a plain `std::sync::RwLock`, not an
/// async one: every critical section is a bounded `HashMap` operation
/// with no `.await` inside it, so there is nothing to gain from an async
/// lock and `on_event` (the `EventListener` contract, spec §9) stays
/// synchronous — matching "provide synchronous lookup on the hot read
/// path".
pub struct TabletStatsCache {
    config: CacheConfig,
    index: RwLock<HashMap<Target, Vec<TabletRecord>>>,
    membership: RwLock<HashMap<TabletAlias, Target>>,
    notify: Notify,
    listener: RwLock<Option<Arc<dyn CacheListener>>>,
}

impl TabletStatsCache {
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            index: RwLock::new(HashMap::new()),
            membership: RwLock::new(HashMap::new()),
            notify: Notify::new(),
            listener: RwLock::new(None),
        })
    }

    /// Install the listener that observes primary-target transitions
    /// (spec §9 "Cyclic references").
    pub fn set_listener(&self, listener: Arc<dyn CacheListener>) {
        *self.listener.write().unwrap() = Some(listener);
    }

    /// Snapshot copy of the ordered tablets currently healthy for
    /// `target`. O(1) amortized (spec §4.3).
    pub fn get_healthy(&self, target: &Target) -> Vec<TabletRecord> {
        self.index
            .read()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Block until every target has at least one healthy tablet, or the
    /// deadline elapses. Returns the still-unsatisfied targets on timeout.
    pub async fn wait_for_all_serving(
        &self,
        targets: &[Target],
        deadline: Duration,
    ) -> Result<(), Vec<Target>> {
        let start = tokio::time::Instant::now();
        loop {
            let unsatisfied = self.unsatisfied(targets);
            if unsatisfied.is_empty() {
                return Ok(());
            }
            let Some(remaining) = deadline.checked_sub(start.elapsed()) else {
                return Err(unsatisfied);
            };
            if tokio::time::timeout(remaining, self.notify.notified())
                .await
                .is_err()
            {
                return Err(unsatisfied);
            }
        }
    }

    fn unsatisfied(&self, targets: &[Target]) -> Vec<Target> {
        let index = self.index.read().unwrap();
        targets
            .iter()
            .filter(|t| index.get(t).map(|v| v.is_empty()).unwrap_or(true))
            .cloned()
            .collect()
    }

    fn is_admitted(&self, record: &TabletRecord) -> bool {
        if let Some(allow) = &self.config.keyspace_allow {
            if !allow.contains(&record.keyspace) {
                return false;
            }
        }
        if let Some(allow) = &self.config.shard_allow {
            if !allow.contains(&(record.keyspace.clone(), record.shard.clone())) {
                return false;
            }
        }
        true
    }

    /// Remove `alias` from whatever target it currently occupies, if any.
    fn remove_alias(&self, alias: &TabletAlias) {
        let previous_target = self.membership.write().unwrap().remove(alias);
        let Some(target) = previous_target else {
            return;
        };
        let remaining = {
            let mut index = self.index.write().unwrap();
            let entry = index.entry(target.clone()).or_default();
            entry.retain(|r| &r.alias != alias);
            entry.clone()
        };
        self.notify.notify_waiters();
        self.notify_listener(&target, &remaining);
    }

    /// Insert or refresh a healthy tablet. A role change vs. its previous
    /// membership is handled as remove-from-old + add-to-new (spec §4.3
    /// "A role change is handled as remove-from-old + add-to-new under
    /// the same critical section").
    fn upsert(&self, record: TabletRecord, declared_role: Role) {
        let target = Target::new(record.keyspace.clone(), record.shard.clone(), declared_role);

        let old_target = self.membership.read().unwrap().get(&record.alias).cloned();
        if old_target.as_ref().is_some_and(|t| *t != target) {
            self.remove_alias(&record.alias);
        }

        let snapshot = {
            let mut index = self.index.write().unwrap();
            let entry = index.entry(target.clone()).or_default();
            entry.retain(|r| r.alias != record.alias);
            entry.push(record.clone());
            entry.clone()
        };
        self.membership
            .write()
            .unwrap()
            .insert(record.alias.clone(), target.clone());
        self.notify.notify_waiters();
        self.notify_listener(&target, &snapshot);
    }

    fn notify_listener(&self, target: &Target, healthy: &[TabletRecord]) {
        if target.role != Role::Primary {
            return;
        }
        let Some(listener) = self.listener.read().unwrap().clone() else {
            return;
        };
        if healthy.is_empty() {
            listener.down_event(target);
        } else {
            listener.stats_update(target, healthy);
        }
    }
}

impl EventListener<HealthEvent> for TabletStatsCache {
    fn on_event(&self, event: &HealthEvent) {
        match event {
            HealthEvent::Health { record, new, .. } => {
                if !self.is_admitted(record) {
                    return;
                }
                let healthy = new.serving
                    && new.replication_lag_seconds <= self.config.lag_threshold_seconds;
                if healthy {
                    self.upsert(record.clone(), new.declared_role);
                } else {
                    self.remove_alias(&record.alias);
                }
            }
            HealthEvent::Down { record, .. } => {
                self.remove_alias(&record.alias);
            }
        }
    }
}

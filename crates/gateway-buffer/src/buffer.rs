use crate::state::ShardState;
use crate::FailoverBufferConfig;
use gateway_cache::CacheListener;
use gateway_core::{GatewayError, Target, TabletAlias};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;

#[cfg(feature = "metrics")]
use metrics::gauge;

type ShardKey = (String, String);

/// Holds primary-role requests during a shard's failover window
/// (spec §4.4).
pub struct FailoverBuffer {
    config: FailoverBufferConfig,
    shards: RwLock<HashMap<ShardKey, Arc<ShardState>>>,
    global_capacity: Arc<Semaphore>,
    shutdown: AtomicBool,
}

impl FailoverBuffer {
    pub fn new(config: FailoverBufferConfig) -> Arc<Self> {
        let global_capacity = Arc::new(Semaphore::new(config.max_total_buffered));
        Arc::new(Self {
            config,
            shards: RwLock::new(HashMap::new()),
            global_capacity,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Prevent further admission and release every currently buffered
    /// waiter with an error (spec §4.4 "Cancellation").
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        for state in self.shards.read().unwrap().values() {
            state.notify.notify_waiters();
        }
    }

    fn shard_state(&self, keyspace: &str, shard: &str) -> Arc<ShardState> {
        let key = (keyspace.to_string(), shard.to_string());
        if let Some(state) = self.shards.read().unwrap().get(&key) {
            return Arc::clone(state);
        }
        let mut shards = self.shards.write().unwrap();
        Arc::clone(
            shards
                .entry(key)
                .or_insert_with(|| Arc::new(ShardState::new())),
        )
    }

    /// Admission per spec §4.4. `last_error` is the retryable error that
    /// triggered this call; callers must invoke this at most once per
    /// request (on the first retryable primary error).
    ///
    /// Returns `Ok(true)` if the request was buffered and then released,
    /// `Ok(false)` if the shard was idle and `last_error` did not look
    /// like a failover signal (nothing to wait for).
    pub async fn wait(
        &self,
        keyspace: &str,
        shard: &str,
        last_error: &GatewayError,
        deadline: Duration,
    ) -> Result<bool, GatewayError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(GatewayError::BufferShutdown);
        }

        let state = self.shard_state(keyspace, shard);
        match state.phase() {
            crate::ShardPhase::Idle => {
                if !looks_like_failover_signal(last_error) {
                    return Ok(false);
                }
                if state.try_enter_buffering() {
                    self.spawn_window_timer(
                        keyspace.to_string(),
                        shard.to_string(),
                        Arc::clone(&state),
                    );
                }
            }
            // A fresh waiter arriving while the shard is still draining has
            // nothing left to wait for: `release()` already fired and its
            // `notify_waiters()` only wakes waiters registered *before* the
            // call, so a new `notified()` here would sit until the window
            // timer times it out instead of being woken. The new primary
            // that triggered the drain is already visible, so skip
            // buffering and let the caller proceed straight to selection
            // (spec §3 invariant 5: no admission until a fresh failover
            // event re-enters `Idle -> Buffering`).
            crate::ShardPhase::Draining => return Ok(false),
            crate::ShardPhase::Buffering => {}
        }

        let _global_permit = match self.global_capacity.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                return Err(GatewayError::BufferFull {
                    keyspace: keyspace.to_string(),
                    shard: shard.to_string(),
                })
            }
        };
        if state.buffered_count() >= self.config.max_buffered_per_shard {
            return Err(GatewayError::BufferFull {
                keyspace: keyspace.to_string(),
                shard: shard.to_string(),
            });
        }
        state.increment_buffered();
        self.publish_utilization(keyspace, shard, &state);

        let start = tokio::time::Instant::now();
        let timed_out = || GatewayError::FailoverTimeout {
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
            waited: start.elapsed(),
            last_error: last_error.to_string(),
        };

        let outcome = if self.shutdown.load(Ordering::Acquire) {
            Err(GatewayError::BufferShutdown)
        } else if let Some(remaining) = deadline.checked_sub(start.elapsed()) {
            match tokio::time::timeout(remaining, state.notify.notified()).await {
                Ok(()) if self.shutdown.load(Ordering::Acquire) => {
                    Err(GatewayError::BufferShutdown)
                }
                Ok(()) => Ok(true),
                Err(_) => Err(timed_out()),
            }
        } else {
            Err(timed_out())
        };

        state.decrement_buffered();
        self.publish_utilization(keyspace, shard, &state);
        outcome
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn publish_utilization(&self, keyspace: &str, shard: &str, state: &ShardState) {
        #[cfg(feature = "metrics")]
        {
            gauge!(
                "tablet_gateway_buffer_shard_buffered",
                "keyspace" => keyspace.to_string(),
                "shard" => shard.to_string()
            )
            .set(state.buffered_count() as f64);
            gauge!("tablet_gateway_buffer_total_buffered")
                .set((self.config.max_total_buffered - self.global_capacity.available_permits()) as f64);
        }
    }

    fn spawn_window_timer(&self, keyspace: String, shard: String, state: Arc<ShardState>) {
        let window = self.config.max_failover_duration;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if state.phase() == crate::ShardPhase::Buffering {
                state.release();
            }
            let _ = (keyspace, shard);
        });
    }
}

fn looks_like_failover_signal(err: &GatewayError) -> bool {
    matches!(
        err,
        GatewayError::NoHealthyTablet { .. } | GatewayError::TabletUnreachable { .. }
    )
}

impl CacheListener for FailoverBuffer {
    fn stats_update(&self, target: &Target, healthy: &[gateway_core::TabletRecord]) {
        let Some(primary) = healthy.first() else {
            return;
        };
        let state = self.shard_state(&target.keyspace, &target.shard);
        let alias_changed = {
            let mut last = state.last_primary_alias.lock().unwrap();
            let changed = last.as_ref() != Some(&primary.alias);
            *last = Some(primary.alias.clone());
            changed
        };
        if alias_changed && state.phase() != crate::ShardPhase::Idle {
            state.release();
        }
    }

    fn down_event(&self, target: &Target) {
        let state = self.shard_state(&target.keyspace, &target.shard);
        *state.last_primary_alias.lock().unwrap() = None;
        if state.try_enter_buffering() {
            self.spawn_window_timer(
                target.keyspace.clone(),
                target.shard.clone(),
                Arc::clone(&state),
            );
        }
    }
}

use gateway_core::TabletAlias;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Per-shard buffering phase (spec §4.4 "State per shard").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardPhase {
    /// No failover in progress; admission is refused unless the request
    /// itself looks like a failover signal.
    Idle,
    /// A failover is in progress; primary requests are queued.
    Buffering,
    /// Release has been signaled; queued waiters are waking up but
    /// haven't all departed yet. No new entry triggers are accepted until
    /// the shard reaches `Idle` again.
    Draining,
}

impl ShardPhase {
    fn encode(self) -> u64 {
        match self {
            ShardPhase::Idle => 0,
            ShardPhase::Buffering => 1,
            ShardPhase::Draining => 2,
        }
    }

    fn decode(value: u64) -> Self {
        match value {
            0 => ShardPhase::Idle,
            1 => ShardPhase::Buffering,
            _ => ShardPhase::Draining,
        }
    }
}

/// State tracked for one `(keyspace, shard)`, using the same atomic-phase
/// encoding as a reconnect backoff state machine.
pub struct ShardState {
    phase: AtomicU64,
    buffered_count: AtomicUsize,
    pub(crate) notify: Notify,
    pub(crate) last_primary_alias: Mutex<Option<TabletAlias>>,
}

impl ShardState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU64::new(ShardPhase::Idle.encode()),
            buffered_count: AtomicUsize::new(0),
            notify: Notify::new(),
            last_primary_alias: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> ShardPhase {
        ShardPhase::decode(self.phase.load(Ordering::Acquire))
    }

    /// Transition `Idle -> Buffering`. Returns `true` if this call made
    /// the transition.
    pub fn try_enter_buffering(&self) -> bool {
        self.phase
            .compare_exchange(
                ShardPhase::Idle.encode(),
                ShardPhase::Buffering.encode(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move `Buffering -> Draining` and wake every waiter. No-op if not
    /// currently buffering.
    pub fn release(&self) {
        let _ = self.phase.compare_exchange(
            ShardPhase::Buffering.encode(),
            ShardPhase::Draining.encode(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.notify.notify_waiters();
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered_count.load(Ordering::Acquire)
    }

    pub fn increment_buffered(&self) -> usize {
        self.buffered_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the buffered count; if this call observes the count
    /// reaching zero while draining, complete the transition to `Idle`.
    pub fn decrement_buffered(&self) {
        let previous = self.buffered_count.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            let _ = self.phase.compare_exchange(
                ShardPhase::Draining.encode(),
                ShardPhase::Idle.encode(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }
}

impl Default for ShardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_buffering_transition_succeeds_once() {
        let state = ShardState::new();
        assert!(state.try_enter_buffering());
        assert_eq!(state.phase(), ShardPhase::Buffering);
        assert!(!state.try_enter_buffering());
    }

    #[test]
    fn release_moves_to_draining_then_last_waiter_reaches_idle() {
        let state = ShardState::new();
        state.try_enter_buffering();
        state.increment_buffered();
        state.increment_buffered();
        state.release();
        assert_eq!(state.phase(), ShardPhase::Draining);

        state.decrement_buffered();
        assert_eq!(state.phase(), ShardPhase::Draining);
        state.decrement_buffered();
        assert_eq!(state.phase(), ShardPhase::Idle);
    }
}

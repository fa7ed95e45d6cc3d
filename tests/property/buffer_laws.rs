//! Invariants tested:
//! - Per-shard buffered requests never exceed `max_buffered_per_shard`
//!   (spec §8 quantified invariant 3).
//! - A `stats_update` that repeats the already-known primary alias never
//!   releases buffered waiters (spec §8 Law "idempotent add").
//! - A genuinely new primary alias releases every currently buffered
//!   waiter exactly once (spec §8 Law "buffer round-trip exactly-once
//!   release").

use gateway_buffer::{FailoverBuffer, FailoverBufferConfigBuilder};
use gateway_cache::CacheListener;
use gateway_core::{GatewayError, Role, TabletAlias, TabletRecord, Target};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

/// A single-threaded runtime: the buffer's per-shard admission check is a
/// load-then-increment, not a compare-and-swap, so it only stays race-free
/// under cooperative (non-parallel) scheduling.
fn runtime() -> Runtime {
    Builder::new_current_thread().enable_all().build().unwrap()
}

fn primary_record(uid: u32) -> TabletRecord {
    TabletRecord {
        alias: TabletAlias::new("zone1", uid),
        hostname: format!("zone1-{uid}.test.local"),
        port: 15991,
        keyspace: "commerce".into(),
        shard: "-80".into(),
        role: Role::Primary,
        key_range: None,
    }
}

fn failover_signal() -> GatewayError {
    GatewayError::NoHealthyTablet {
        target: Target::new("commerce", "-80", Role::Primary),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn buffer_capacity_admits_at_most_configured_per_shard(
        max_buffered in 1usize..=8,
        overflow in 0usize..=5,
    ) {
        let num_requests = max_buffered + overflow;
        let rt = runtime();
        rt.block_on(async {
            let config = FailoverBufferConfigBuilder::new()
                .max_buffered_per_shard(max_buffered)
                .build();
            let buffer = FailoverBuffer::new(config);

            let mut handles = Vec::new();
            for _ in 0..num_requests {
                let buffer = Arc::clone(&buffer);
                handles.push(tokio::spawn(async move {
                    buffer
                        .wait("commerce", "-80", &failover_signal(), Duration::from_secs(5))
                        .await
                }));
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
            buffer.stats_update(
                &Target::new("commerce", "-80", Role::Primary),
                &[primary_record(1)],
            );

            let mut admitted = 0usize;
            let mut rejected = 0usize;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(true) => admitted += 1,
                    Err(err) if err.is_buffer_full() => rejected += 1,
                    other => prop_assert!(false, "unexpected outcome: {other:?}"),
                }
            }

            prop_assert_eq!(admitted, max_buffered.min(num_requests));
            prop_assert_eq!(rejected, num_requests.saturating_sub(max_buffered));
            Ok(())
        })?;
    }

    #[test]
    fn repeated_primary_alias_never_releases_buffered_waiters(num_requests in 1usize..=10) {
        let rt = runtime();
        rt.block_on(async {
            let buffer = FailoverBuffer::new(FailoverBufferConfigBuilder::new().build());

            let mut handles = Vec::new();
            for _ in 0..num_requests {
                let buffer = Arc::clone(&buffer);
                handles.push(tokio::spawn(async move {
                    buffer
                        .wait(
                            "commerce",
                            "-80",
                            &failover_signal(),
                            Duration::from_millis(150),
                        )
                        .await
                }));
            }

            tokio::time::sleep(Duration::from_millis(30)).await;
            // Same alias reported three times: no change, so no release.
            let target = Target::new("commerce", "-80", Role::Primary);
            for _ in 0..3 {
                buffer.stats_update(&target, &[primary_record(1)]);
            }

            for handle in handles {
                let outcome = handle.await.unwrap();
                prop_assert!(
                    matches!(outcome, Err(GatewayError::FailoverTimeout { .. })),
                    "expected a timeout with no release, got {outcome:?}"
                );
            }
            Ok(())
        })?;
    }

    #[test]
    fn a_new_primary_alias_releases_every_waiter_exactly_once(num_requests in 1usize..=15) {
        let rt = runtime();
        rt.block_on(async {
            let buffer = FailoverBuffer::new(FailoverBufferConfigBuilder::new().build());
            let released = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for _ in 0..num_requests {
                let buffer = Arc::clone(&buffer);
                let released = Arc::clone(&released);
                handles.push(tokio::spawn(async move {
                    let outcome = buffer
                        .wait("commerce", "-80", &failover_signal(), Duration::from_secs(5))
                        .await;
                    if matches!(outcome, Ok(true)) {
                        released.fetch_add(1, Ordering::SeqCst);
                    }
                    outcome
                }));
            }

            tokio::time::sleep(Duration::from_millis(30)).await;
            buffer.stats_update(
                &Target::new("commerce", "-80", Role::Primary),
                &[primary_record(2)],
            );

            for handle in handles {
                prop_assert_eq!(handle.await.unwrap(), Ok(true));
            }
            prop_assert_eq!(released.load(Ordering::SeqCst), num_requests);
            Ok(())
        })?;
    }
}

//! Workspace end-to-end scenarios (spec §8 "End-to-end scenarios"),
//! driven entirely through `gateway::Gateway`'s public API against the
//! controllable topology/tablet fakes in `support`.

mod support;

use gateway::{ActionOutcome, Gateway, GatewayConfig};
use gateway_core::{Role, Target, TabletAlias};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::{tablet, wait_for_dial, ControllableQueryService, ControllableTopologyServer};

#[tokio::test]
async fn happy_path_picks_primary_and_favors_same_cell_replicas() {
    let topology = ControllableTopologyServer::new();
    topology.set(tablet("a", 1, "commerce", "-80", Role::Primary));
    topology.set(tablet("a", 2, "commerce", "-80", Role::Replica));
    topology.set(tablet("a", 3, "commerce", "-80", Role::Replica));
    topology.set(tablet("b", 4, "commerce", "-80", Role::Replica));
    topology.set(tablet("b", 5, "commerce", "-80", Role::Replica));

    let query = ControllableQueryService::new();
    let config = GatewayConfig::builder()
        .cells_to_watch(["a".to_string(), "b".to_string()])
        .local_cell("a")
        .refresh_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    let gateway = Gateway::new(config, topology, Arc::clone(&query))
        .await
        .unwrap();
    gateway.start().await;

    for uid in 1..=5 {
        let cell = if uid <= 3 { "a" } else { "b" };
        wait_for_dial(&query, &TabletAlias::new(cell, uid)).await;
    }
    query.push_health(&TabletAlias::new("a", 1), true, Role::Primary, 0.0);
    query.push_health(&TabletAlias::new("a", 2), true, Role::Replica, 1.0);
    query.push_health(&TabletAlias::new("a", 3), true, Role::Replica, 1.0);
    query.push_health(&TabletAlias::new("b", 4), true, Role::Replica, 1.0);
    query.push_health(&TabletAlias::new("b", 5), true, Role::Replica, 1.0);

    let primary_target = Target::new("commerce", "-80", Role::Primary);
    let replica_target = Target::new("commerce", "-80", Role::Replica);
    gateway
        .wait_for_tablets(&[primary_target.clone(), replica_target.clone()])
        .await
        .unwrap();

    let primary_alias = gateway
        .execute(&primary_target, false, |conn| async move {
            ActionOutcome::Success(conn.alias)
        })
        .await
        .unwrap();
    assert_eq!(primary_alias, TabletAlias::new("a", 1));

    let mut same_cell_hits = 0;
    for _ in 0..1000 {
        let alias = gateway
            .execute(&replica_target, false, |conn| async move {
                ActionOutcome::Success(conn.alias)
            })
            .await
            .unwrap();
        if alias.cell == "a" {
            same_cell_hits += 1;
        }
    }
    assert!(
        same_cell_hits > 500,
        "expected same-cell affinity, got {same_cell_hits}/1000"
    );

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn primary_failover_completes_buffered_writes_on_the_new_primary() {
    let topology = ControllableTopologyServer::new();
    topology.set(tablet("a", 1, "commerce", "-80", Role::Primary));
    let query = ControllableQueryService::new();
    let config = GatewayConfig::builder()
        .cells_to_watch(["a".to_string()])
        .refresh_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    let gateway = Gateway::new(config, topology.clone(), Arc::clone(&query))
        .await
        .unwrap();
    gateway.start().await;

    wait_for_dial(&query, &TabletAlias::new("a", 1)).await;
    query.push_health(&TabletAlias::new("a", 1), true, Role::Primary, 0.0);

    let primary_target = Target::new("commerce", "-80", Role::Primary);
    gateway
        .wait_for_tablets(&[primary_target.clone()])
        .await
        .unwrap();

    // Mark the current primary down and give the Down event time to reach
    // the buffer (Idle -> Buffering) before any writes are issued.
    query.push_health(&TabletAlias::new("a", 1), false, Role::Primary, 0.0);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let mut writers = Vec::new();
    for _ in 0..5 {
        let gateway = Arc::clone(&gateway);
        let target = primary_target.clone();
        writers.push(tokio::spawn(async move {
            gateway
                .execute(&target, false, |conn| async move {
                    ActionOutcome::Success(conn.alias)
                })
                .await
        }));
    }

    // A new primary is topology-discovered and starts reporting healthy,
    // releasing the buffered writers.
    topology.set(tablet("a", 6, "commerce", "-80", Role::Primary));
    tokio::time::sleep(Duration::from_millis(60)).await;
    wait_for_dial(&query, &TabletAlias::new("a", 6)).await;
    query.push_health(&TabletAlias::new("a", 6), true, Role::Primary, 0.0);

    for writer in writers {
        let alias = writer.await.unwrap().unwrap();
        assert_eq!(alias, TabletAlias::new("a", 6));
    }
    assert!(
        start.elapsed() < Duration::from_millis(2500),
        "failover took too long: {:?}",
        start.elapsed()
    );

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn buffer_capacity_rejects_the_overflow_write_immediately() {
    let topology = ControllableTopologyServer::new();
    topology.set(tablet("a", 1, "commerce", "-80", Role::Primary));
    let query = ControllableQueryService::new();
    let config = GatewayConfig::builder()
        .cells_to_watch(["a".to_string()])
        .refresh_interval(Duration::from_millis(20))
        .buffer_size_per_shard(3)
        .build()
        .unwrap();

    let gateway = Gateway::new(config, topology.clone(), Arc::clone(&query))
        .await
        .unwrap();
    gateway.start().await;

    wait_for_dial(&query, &TabletAlias::new("a", 1)).await;
    query.push_health(&TabletAlias::new("a", 1), true, Role::Primary, 0.0);
    let primary_target = Target::new("commerce", "-80", Role::Primary);
    gateway
        .wait_for_tablets(&[primary_target.clone()])
        .await
        .unwrap();

    query.push_health(&TabletAlias::new("a", 1), false, Role::Primary, 0.0);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut writers = Vec::new();
    for _ in 0..3 {
        let gateway = Arc::clone(&gateway);
        let target = primary_target.clone();
        writers.push(tokio::spawn(async move {
            gateway
                .execute(&target, false, |conn| async move {
                    ActionOutcome::Success(conn.alias)
                })
                .await
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let overflow = gateway
        .execute(&primary_target, false, |conn| async move {
            ActionOutcome::Success(conn.alias)
        })
        .await;
    assert!(
        matches!(&overflow, Err(err) if err.is_buffer_full()),
        "expected BufferFull, got {overflow:?}"
    );

    topology.set(tablet("a", 7, "commerce", "-80", Role::Primary));
    tokio::time::sleep(Duration::from_millis(60)).await;
    wait_for_dial(&query, &TabletAlias::new("a", 7)).await;
    query.push_health(&TabletAlias::new("a", 7), true, Role::Primary, 0.0);

    for writer in writers {
        assert!(writer.await.unwrap().is_ok());
    }

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn no_healthy_replica_fails_fast_without_invoking_the_action() {
    let topology = ControllableTopologyServer::new();
    topology.set(tablet("a", 1, "commerce", "-80", Role::Replica));
    topology.set(tablet("a", 2, "commerce", "-80", Role::Replica));
    let query = ControllableQueryService::new();
    let config = GatewayConfig::builder()
        .cells_to_watch(["a".to_string()])
        .refresh_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    let gateway = Gateway::new(config, topology, Arc::clone(&query))
        .await
        .unwrap();
    gateway.start().await;

    wait_for_dial(&query, &TabletAlias::new("a", 1)).await;
    wait_for_dial(&query, &TabletAlias::new("a", 2)).await;
    query.push_health(&TabletAlias::new("a", 1), true, Role::Replica, 1.0);
    query.push_health(&TabletAlias::new("a", 2), true, Role::Replica, 1.0);

    let replica_target = Target::new("commerce", "-80", Role::Replica);
    gateway
        .wait_for_tablets(&[replica_target.clone()])
        .await
        .unwrap();

    query.push_health(&TabletAlias::new("a", 1), false, Role::Replica, 1.0);
    query.push_health(&TabletAlias::new("a", 2), false, Role::Replica, 1.0);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let result = gateway
        .execute(&replica_target, false, move |conn| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async move { ActionOutcome::Success(conn.alias) }
        })
        .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn retry_exhaustion_tries_every_distinct_tablet_then_gives_up() {
    let topology = ControllableTopologyServer::new();
    topology.set(tablet("a", 1, "commerce", "-80", Role::Replica));
    topology.set(tablet("a", 2, "commerce", "-80", Role::Replica));
    topology.set(tablet("a", 3, "commerce", "-80", Role::Replica));
    let query = ControllableQueryService::new();
    let config = GatewayConfig::builder()
        .cells_to_watch(["a".to_string()])
        .refresh_interval(Duration::from_millis(20))
        .gateway_retry_count(2)
        .build()
        .unwrap();

    let gateway = Gateway::new(config, topology, Arc::clone(&query))
        .await
        .unwrap();
    gateway.start().await;

    for uid in 1..=3 {
        wait_for_dial(&query, &TabletAlias::new("a", uid)).await;
        query.push_health(&TabletAlias::new("a", uid), true, Role::Replica, 1.0);
    }
    let replica_target = Target::new("commerce", "-80", Role::Replica);
    gateway
        .wait_for_tablets(&[replica_target.clone()])
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let result = gateway
        .execute(&replica_target, false, move |_conn| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async {
                ActionOutcome::Retryable(gateway_core::GatewayError::Application(
                    "simulated query failure".into(),
                ))
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn replica_target_falls_back_to_read_only_when_no_replica_is_healthy() {
    let topology = ControllableTopologyServer::new();
    topology.set(tablet("a", 1, "commerce", "-80", Role::ReadOnly));
    let query = ControllableQueryService::new();
    let config = GatewayConfig::builder()
        .cells_to_watch(["a".to_string()])
        .refresh_interval(Duration::from_millis(20))
        .gateway_route_replica_to_rdonly(true)
        .build()
        .unwrap();

    let gateway = Gateway::new(config, topology, Arc::clone(&query))
        .await
        .unwrap();
    gateway.start().await;

    wait_for_dial(&query, &TabletAlias::new("a", 1)).await;
    query.push_health(&TabletAlias::new("a", 1), true, Role::ReadOnly, 2.0);

    let read_only_target = Target::new("commerce", "-80", Role::ReadOnly);
    gateway
        .wait_for_tablets(&[read_only_target])
        .await
        .unwrap();

    let replica_target = Target::new("commerce", "-80", Role::Replica);
    let alias = gateway
        .execute(&replica_target, false, |conn| async move {
            ActionOutcome::Success(conn.alias)
        })
        .await
        .unwrap();
    assert_eq!(alias, TabletAlias::new("a", 1));

    gateway.close().await.unwrap();
}

//! tests/integration/adversarial.rs
//!
//! Tests for how a node behaves when a peer becomes unreachable: it should
//! keep running, keep accepting transactions, and surface the failure in
//! its sync-rate stat rather than stalling or panicking.

use crate::common::harness;
use std::time::Duration;
use test_log::test;

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn node_survives_an_unreachable_peer() {
    let test_timeout = Duration::from_secs(10);
    let result = tokio::time::timeout(test_timeout, async {
        let nodes = harness::build_cluster(2, Duration::from_millis(15), 500).await;

        // Sever node 1 so node 0's gossip rounds against it always fail with
        // `Error::NoPeer`.
        nodes[1].sever();

        nodes[0].submit_tx.send(b"still-alive".to_vec()).await.unwrap();

        // Give node 0 several heartbeats worth of failing gossip rounds.
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(nodes[0].is_running(), "node 0 must not crash when its only peer is unreachable");

        let snapshot = nodes[0].stats.snapshot().await;
        let sync_rate: f64 = snapshot.get("sync_rate").unwrap().parse().unwrap();
        assert!(sync_rate < 1.0, "sync_rate should reflect the failed rounds against the severed peer");

        for node in &nodes {
            node.shutdown.cancel();
        }
        for node in nodes {
            let _ = node.task.await;
        }
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn lone_node_with_no_peers_stays_alive_and_queues_transactions() {
    let test_timeout = Duration::from_secs(10);
    let result = tokio::time::timeout(test_timeout, async {
        let nodes = harness::build_cluster(1, Duration::from_millis(15), 500).await;

        nodes[0].submit_tx.send(b"nowhere-to-send".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(nodes[0].is_running(), "a node with zero peers must stay alive");
        let snapshot = nodes[0].stats.snapshot().await;
        assert_eq!(snapshot.get("num_peers").unwrap(), "0");

        nodes[0].shutdown.cancel();
        let _ = nodes.into_iter().next().unwrap().task.await;
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}

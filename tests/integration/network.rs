//! tests/integration/network.rs
//!
//! Full end-to-end test for the gossip network. Spins up two real
//! `NodeRuntime`s wired through the in-process transport and verifies a
//! transaction submitted to one node is eventually committed on both.

use crate::common::harness;
use std::time::Duration;
use test_log::test;

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn transaction_propagates_and_commits_on_both_nodes() {
    let test_timeout = Duration::from_secs(10);
    let result = tokio::time::timeout(test_timeout, async {
        let nodes = harness::build_cluster(2, Duration::from_millis(20), 500).await;

        nodes[0].submit_tx.send(b"hello-network".to_vec()).await.unwrap();

        let converged = harness::wait_until(
            || {
                let committed = |i: usize| {
                    nodes[i]
                        .core
                        .try_lock()
                        .map(|c| c.blocks().iter().any(|b| b.transactions.iter().any(|tx| tx == b"hello-network")))
                        .unwrap_or(false)
                };
                committed(0) && committed(1)
            },
            Duration::from_secs(5),
            Duration::from_millis(20),
        )
        .await;

        assert!(converged, "both nodes should have committed the submitted transaction");

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
